//! Cloud provider trait definition

use crate::action::{ApplyResult, Plan};
use crate::error::Result;
use crate::state::ProviderState;
use crate::template::{Output, Resource, Template};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Deployment backend for synthesized stacks
///
/// A provider owns the deployed state of one stack: it diffs a desired
/// [`ResourceSet`] against that state, applies the resulting [`Plan`] and
/// tears the stack down as a unit.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Provider name (e.g. "local")
    fn name(&self) -> &str;

    /// Provider name for display
    fn display_name(&self) -> &str;

    /// Check that the provider is configured and has credentials
    async fn check_auth(&self) -> Result<AuthStatus>;

    /// Deployed resources and outputs of the stack
    async fn get_state(&self) -> Result<ProviderState>;

    /// Diff the desired resources against the deployed state
    async fn plan(&self, desired: &ResourceSet) -> Result<Plan>;

    async fn apply(&self, plan: &Plan) -> Result<ApplyResult>;

    /// Delete one resource by logical id
    async fn destroy(&self, resource_id: &str) -> Result<()>;

    /// Delete the whole stack
    async fn destroy_all(&self) -> Result<ApplyResult>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Desired resources of one stack, keyed by logical id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSet {
    pub stack_name: String,

    pub resources: BTreeMap<String, ResourceConfig>,

    pub outputs: BTreeMap<String, Output>,

    /// Values supplied for template parameters
    pub parameters: BTreeMap<String, String>,
}

impl ResourceSet {
    pub fn new(stack_name: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            ..Default::default()
        }
    }

    pub fn from_template(stack_name: impl Into<String>, template: &Template) -> Self {
        let mut set = Self::new(stack_name);
        for (id, resource) in &template.resources {
            set.add(ResourceConfig::new(id.clone(), resource.clone()));
        }
        set.outputs = template.outputs.clone();
        set
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn add(&mut self, resource: ResourceConfig) {
        self.resources.insert(resource.id.clone(), resource);
    }

    pub fn get(&self, id: &str) -> Option<&ResourceConfig> {
        self.resources.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceConfig> {
        self.resources.values()
    }

    pub fn by_type(&self, resource_type: &str) -> Vec<&ResourceConfig> {
        self.resources
            .values()
            .filter(|r| r.resource_type == resource_type)
            .collect()
    }
}

/// One desired resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// CloudFormation type
    pub resource_type: String,

    /// Logical id
    pub id: String,

    pub resource: Resource,
}

impl ResourceConfig {
    pub fn new(id: impl Into<String>, resource: Resource) -> Self {
        Self {
            resource_type: resource.resource_type.clone(),
            id: id.into(),
            resource,
        }
    }

    /// Hash of the resource definition, used to detect updates
    pub fn fingerprint(&self) -> String {
        let body = serde_json::to_vec(&self.resource).unwrap_or_default();
        format!("{:x}", Sha256::digest(&body))
    }

    /// Property value as a specific type
    pub fn get_property<T: serde::de::DeserializeOwned>(&self, pointer: &str) -> Option<T> {
        self.resource
            .property(pointer)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template() -> Template {
        let mut template = Template::default();
        template
            .add_resource("Bucket", Resource::new("AWS::S3::Bucket", json!({ "Tags": [] })))
            .unwrap();
        template
            .add_resource("Vpc", Resource::new("AWS::EC2::VPC", json!({ "CidrBlock": "10.0.0.0/16" })))
            .unwrap();
        template
            .add_output("BucketRef", Output::new(json!({ "Ref": "Bucket" })))
            .unwrap();
        template
    }

    #[test]
    fn test_resource_set_from_template() {
        let set = ResourceSet::from_template("InfraStack", &template())
            .with_parameter("AssetKey", "abc.tar.gz");
        assert_eq!(set.resources.len(), 2);
        assert_eq!(set.by_type("AWS::EC2::VPC").len(), 1);
        assert!(set.outputs.contains_key("BucketRef"));
        assert_eq!(set.parameters["AssetKey"], "abc.tar.gz");

        let vpc = set.get("Vpc").unwrap();
        assert_eq!(
            vpc.get_property::<String>("/CidrBlock").as_deref(),
            Some("10.0.0.0/16")
        );
    }

    #[test]
    fn test_fingerprint_tracks_properties() {
        let a = ResourceConfig::new("Vpc", Resource::new("AWS::EC2::VPC", json!({ "CidrBlock": "10.0.0.0/16" })));
        let b = ResourceConfig::new("Vpc", Resource::new("AWS::EC2::VPC", json!({ "CidrBlock": "10.0.0.0/16" })));
        let c = ResourceConfig::new("Vpc", Resource::new("AWS::EC2::VPC", json!({ "CidrBlock": "10.1.0.0/16" })));
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_auth_status() {
        assert!(AuthStatus::ok("local").authenticated);
        let failed = AuthStatus::failed("no account");
        assert!(!failed.authenticated);
        assert_eq!(failed.error.as_deref(), Some("no account"));
    }
}
