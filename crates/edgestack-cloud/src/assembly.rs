//! Cloud assembly: the synthesized output directory
//!
//! ```text
//! edgestack.out/
//! ├── manifest.json
//! ├── InfraStack.template.json
//! └── asset.<sha256>.tar.gz
//! ```

use crate::asset::{self, StagedAsset};
use crate::error::{CloudError, Result};
use crate::synth;
use crate::template::Template;
use edgestack_core::StackDefinition;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const ASSEMBLY_VERSION: &str = "1.0.0";

/// Contents of `manifest.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyManifest {
    pub version: String,
    pub stack_name: String,
    /// `aws://<account>/<region>`
    pub environment: String,
    pub template_file: String,
    #[serde(default)]
    pub assets: Vec<StagedAsset>,
}

/// A synthesized stack on disk
#[derive(Debug, Clone)]
pub struct CloudAssembly {
    pub dir: PathBuf,
    pub manifest: AssemblyManifest,
    pub template: Template,
}

impl CloudAssembly {
    /// Stage the assets, synthesize the template and write the assembly
    ///
    /// Without an asset directory the bucket deployment takes its object key
    /// from a template parameter.
    #[instrument(skip_all, fields(stack = %stack.name, out = %out_dir.display()))]
    pub fn build(
        stack: &StackDefinition,
        assets_dir: Option<&Path>,
        out_dir: &Path,
    ) -> Result<Self> {
        fs::create_dir_all(out_dir)?;

        let staged = match assets_dir {
            Some(dir) => Some(asset::stage(dir, &stack.frontend.exclude, out_dir)?),
            None => None,
        };

        let template = synth::synthesize(stack, staged.as_ref())?;
        let template_file = format!("{}.template.json", stack.name);
        fs::write(out_dir.join(&template_file), template.to_json_pretty()?)?;

        let manifest = AssemblyManifest {
            version: ASSEMBLY_VERSION.to_string(),
            stack_name: stack.name.clone(),
            environment: stack.env.uri(),
            template_file,
            assets: staged.into_iter().collect(),
        };
        fs::write(
            out_dir.join(MANIFEST_FILE),
            serde_json::to_string_pretty(&manifest)?,
        )?;

        info!(
            resources = template.resources.len(),
            assets = manifest.assets.len(),
            "Wrote cloud assembly"
        );
        Ok(Self {
            dir: out_dir.to_path_buf(),
            manifest,
            template,
        })
    }

    /// Read an assembly written by [`CloudAssembly::build`]
    pub fn load(dir: &Path) -> Result<Self> {
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(CloudError::AssemblyError(format!(
                "{} not found",
                manifest_path.display()
            )));
        }
        let manifest: AssemblyManifest = serde_json::from_str(&fs::read_to_string(&manifest_path)?)?;
        if manifest.version != ASSEMBLY_VERSION {
            return Err(CloudError::AssemblyError(format!(
                "unsupported assembly version {} (expected {})",
                manifest.version, ASSEMBLY_VERSION
            )));
        }

        let template_path = dir.join(&manifest.template_file);
        let template = Template::from_json(&fs::read_to_string(&template_path).map_err(|e| {
            CloudError::AssemblyError(format!("{}: {}", template_path.display(), e))
        })?)?;

        for staged in &manifest.assets {
            if !staged.path_in(dir).exists() {
                return Err(CloudError::AssemblyError(format!(
                    "asset {} is missing from the assembly",
                    staged.file_name
                )));
            }
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            manifest,
            template,
        })
    }

    pub fn stack_name(&self) -> &str {
        &self.manifest.stack_name
    }

    pub fn template_path(&self) -> PathBuf {
        self.dir.join(&self.manifest.template_file)
    }

    /// Staged asset referenced by the bucket deployment
    pub fn frontend_asset(&self) -> Option<&StagedAsset> {
        self.manifest.assets.first()
    }

    pub fn asset_path(&self, staged: &StagedAsset) -> PathBuf {
        staged.path_in(&self.dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn stack() -> StackDefinition {
        let mut stack = StackDefinition::reference();
        stack.env.account = Some("111111111111".to_string());
        stack
    }

    #[test]
    fn test_build_and_load() {
        let assets = tempdir().unwrap();
        fs::write(assets.path().join("index.html"), "<h1>hi</h1>").unwrap();
        let out = tempdir().unwrap();

        let built = CloudAssembly::build(&stack(), Some(assets.path()), out.path()).unwrap();
        assert!(out.path().join("manifest.json").exists());
        assert!(out.path().join("InfraStack.template.json").exists());
        assert_eq!(built.manifest.environment, "aws://111111111111/us-west-2");

        let staged = built.frontend_asset().unwrap();
        assert!(built.asset_path(staged).exists());
        // the deployment points at the staged object, no parameter needed
        assert!(built.template.parameters.is_empty());
        let (_, deployment) = built
            .template
            .resources_of_type("Custom::CDKBucketDeployment")
            .next()
            .unwrap();
        assert_eq!(
            deployment.property("/SourceObjectKeys/0"),
            Some(&serde_json::json!(staged.object_key))
        );

        let loaded = CloudAssembly::load(out.path()).unwrap();
        assert_eq!(loaded.manifest, built.manifest);
        assert_eq!(loaded.template, built.template);
        assert_eq!(loaded.stack_name(), "InfraStack");
    }

    #[test]
    fn test_build_without_assets() {
        let out = tempdir().unwrap();
        let built = CloudAssembly::build(&stack(), None, out.path()).unwrap();
        assert!(built.frontend_asset().is_none());
        assert_eq!(built.template.parameters.len(), 1);
    }

    #[test]
    fn test_build_missing_asset_dir() {
        let out = tempdir().unwrap();
        let result = CloudAssembly::build(&stack(), Some(out.path().join("missing").as_path()), out.path());
        assert!(matches!(result, Err(CloudError::AssetNotFound(_))));
    }

    #[test]
    fn test_load_missing_manifest() {
        let out = tempdir().unwrap();
        let result = CloudAssembly::load(out.path());
        assert!(matches!(result, Err(CloudError::AssemblyError(_))));
    }

    #[test]
    fn test_load_detects_missing_asset() {
        let assets = tempdir().unwrap();
        fs::write(assets.path().join("index.html"), "x").unwrap();
        let out = tempdir().unwrap();
        let built = CloudAssembly::build(&stack(), Some(assets.path()), out.path()).unwrap();
        let staged = built.frontend_asset().unwrap();
        fs::remove_file(built.asset_path(staged)).unwrap();

        assert!(matches!(
            CloudAssembly::load(out.path()),
            Err(CloudError::AssemblyError(_))
        ));
    }
}
