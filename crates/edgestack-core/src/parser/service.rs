//! サービスノードのパース

use super::{child_key, first_bool, first_integer, first_string, prop_string};
use crate::error::{Result, StackError};
use crate::model::{ImageRef, ServiceSpec, SubnetKind};
use kdl::KdlNode;

/// service ノードの子要素を既存のサービス定義に適用
///
/// 指定されなかった項目は `spec` の値がそのまま残ります。
pub fn apply_service(node: &KdlNode, spec: &mut ServiceSpec) -> Result<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };

    for child in children.nodes() {
        match child_key(child).as_str() {
            "image" => {
                // image "api1" tag="v2" / image "api1:v2"
                if let Some(image) = first_string(child) {
                    let mut image_ref = ImageRef::parse(&image);
                    if let Some(tag) = prop_string(child, "tag") {
                        image_ref.tag = tag;
                    }
                    spec.image = image_ref;
                }
            }
            "tag" => {
                if let Some(tag) = first_string(child) {
                    spec.image.tag = tag;
                }
            }
            "port" => {
                spec.port = first_integer(child, &format!("service.{}.port", spec.name))?;
            }
            "cpu" => {
                spec.cpu = first_integer(child, &format!("service.{}.cpu", spec.name))?;
            }
            "memory" | "memory-mib" | "memory-limit-mib" => {
                spec.memory_mib =
                    first_integer(child, &format!("service.{}.memory", spec.name))?;
            }
            "desired-count" | "replicas" => {
                spec.desired_count =
                    first_integer(child, &format!("service.{}.desired-count", spec.name))?;
            }
            "public-ip" | "assign-public-ip" => {
                spec.assign_public_ip =
                    first_bool(child, &format!("service.{}.public-ip", spec.name))?;
            }
            "subnets" => {
                if let Some(kind) = first_string(child) {
                    spec.subnets = SubnetKind::parse(&kind).ok_or_else(|| {
                        StackError::InvalidConfig(format!(
                            "service '{}': unknown subnet type '{}'",
                            spec.name, kind
                        ))
                    })?;
                }
            }
            "health-check" | "healthcheck" => {
                if let Some(path) = first_string(child) {
                    spec.health_check_path = path;
                }
            }
            "path" | "path-pattern" => {
                if let Some(pattern) = first_string(child) {
                    spec.path_pattern = pattern;
                }
            }
            "priority" => {
                spec.priority = first_integer(child, &format!("service.{}.priority", spec.name))?;
            }
            "log-prefix" | "log-stream-prefix" => {
                if let Some(prefix) = first_string(child) {
                    spec.log_stream_prefix = prefix;
                }
            }
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(kdl: &str, spec: &mut ServiceSpec) -> Result<()> {
        let doc: kdl::KdlDocument = kdl.parse().unwrap();
        apply_service(doc.nodes().first().unwrap(), spec)
    }

    #[test]
    fn test_apply_service_full() {
        let mut spec = ServiceSpec::new("orders", 0);
        apply(
            r#"
            service "orders" {
                image "shop/orders" tag="2024.06"
                port 8080
                cpu 512
                memory 1024
                desired-count 3
                public-ip #false
                subnets "private"
                health-check "/healthz"
                path "/orders*"
                priority 10
                log-prefix "orders-api"
            }
        "#,
            &mut spec,
        )
        .unwrap();

        assert_eq!(spec.image, ImageRef::new("shop/orders", "2024.06"));
        assert_eq!(spec.port, 8080);
        assert_eq!(spec.cpu, 512);
        assert_eq!(spec.memory_mib, 1024);
        assert_eq!(spec.desired_count, 3);
        assert!(!spec.assign_public_ip);
        assert_eq!(spec.subnets, SubnetKind::Private);
        assert_eq!(spec.health_check_path, "/healthz");
        assert_eq!(spec.path_pattern, "/orders*");
        assert_eq!(spec.priority, 10);
        assert_eq!(spec.log_stream_prefix, "orders-api");
    }

    #[test]
    fn test_apply_service_partial_keeps_values() {
        let mut spec = ServiceSpec::new("api1", 5000);
        spec.priority = 1;
        apply(r#"service "api1" { tag "v2" }"#, &mut spec).unwrap();

        assert_eq!(spec.image.to_string(), "api1:v2");
        assert_eq!(spec.port, 5000);
        assert_eq!(spec.priority, 1);
    }

    #[test]
    fn test_apply_service_image_with_inline_tag() {
        let mut spec = ServiceSpec::new("api1", 5000);
        apply(r#"service "api1" { image "api1:sha-abc123" }"#, &mut spec).unwrap();
        assert_eq!(spec.image.tag, "sha-abc123");
    }

    #[test]
    fn test_apply_service_bool_as_string() {
        // 文字列 "false" も受け付ける
        let mut spec = ServiceSpec::new("api1", 5000);
        apply(r#"service "api1" { public-ip "false" }"#, &mut spec).unwrap();
        assert!(!spec.assign_public_ip);
    }

    #[test]
    fn test_apply_service_port_out_of_range() {
        let mut spec = ServiceSpec::new("api1", 5000);
        let result = apply(r#"service "api1" { port 70000 }"#, &mut spec);
        assert!(matches!(result, Err(StackError::InvalidConfig(_))));
    }
}
