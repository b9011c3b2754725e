//! frontend ノードのパース

use super::{all_strings, child_key, first_bool, first_string};
use crate::error::Result;
use crate::model::FrontendSpec;
use kdl::KdlNode;
use std::path::PathBuf;

/// frontend ノードをパース
pub fn parse_frontend(node: &KdlNode, base: FrontendSpec) -> Result<FrontendSpec> {
    let mut frontend = base;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child_key(child).as_str() {
                "bucket" => {
                    if let Some(id) = first_string(child) {
                        frontend.bucket_id = id;
                    }
                }
                "distribution" => {
                    if let Some(id) = first_string(child) {
                        frontend.distribution_id = id;
                    }
                }
                "deployment" => {
                    if let Some(id) = first_string(child) {
                        frontend.deployment_id = id;
                    }
                }
                "assets" | "source" => {
                    if let Some(path) = first_string(child) {
                        frontend.assets = PathBuf::from(path);
                    }
                }
                "exclude" => {
                    // 複数のパターンを引数として受け取る（累積）
                    frontend.exclude.extend(all_strings(child));
                }
                "default-root-object" | "index" => {
                    if let Some(object) = first_string(child) {
                        frontend.default_root_object = object;
                    }
                }
                "invalidate" | "invalidation-paths" => {
                    frontend.invalidation_paths = all_strings(child);
                }
                "auto-delete-objects" => {
                    frontend.auto_delete_objects = first_bool(child, "frontend.auto-delete-objects")?;
                }
                "prune" => {
                    frontend.prune = first_bool(child, "frontend.prune")?;
                }
                _ => {}
            }
        }
    }

    Ok(frontend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frontend() {
        let doc: kdl::KdlDocument = r#"
            frontend {
                bucket "SiteBucket"
                distribution "SiteCdn"
                assets "web/dist"
                exclude "*.map" ".DS_Store"
                default-root-object "home.html"
                invalidate "/index.html" "/assets/*"
                auto-delete-objects #false
                prune #false
            }
        "#
        .parse()
        .unwrap();

        let frontend =
            parse_frontend(doc.nodes().first().unwrap(), FrontendSpec::default()).unwrap();
        assert_eq!(frontend.bucket_id, "SiteBucket");
        assert_eq!(frontend.distribution_id, "SiteCdn");
        assert_eq!(frontend.assets, PathBuf::from("web/dist"));
        assert_eq!(frontend.exclude, vec!["*.map", ".DS_Store"]);
        assert_eq!(frontend.default_root_object, "home.html");
        assert_eq!(frontend.invalidation_paths, vec!["/index.html", "/assets/*"]);
        assert!(!frontend.auto_delete_objects);
        assert!(!frontend.prune);
    }

    #[test]
    fn test_parse_frontend_defaults() {
        let doc: kdl::KdlDocument = "frontend".parse().unwrap();
        let frontend =
            parse_frontend(doc.nodes().first().unwrap(), FrontendSpec::default()).unwrap();
        assert_eq!(frontend, FrontendSpec::default());
    }
}
