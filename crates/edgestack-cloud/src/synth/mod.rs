//! Resource graph synthesis
//!
//! Turns a [`StackDefinition`] into a CloudFormation [`Template`]. Each
//! submodule emits one slice of the graph and hands the logical ids it
//! created to the next one, so every `Ref`/`Fn::GetAtt` points at a resource
//! that already exists in the template.

mod compute;
mod frontend;
mod load_balancer;
mod network;
mod outputs;

pub use frontend::{
    ALL_VIEWER, AUTO_DELETE_RESOURCE_TYPE, BUCKET_DEPLOYMENT_RESOURCE_TYPE, CACHING_DISABLED,
    CACHING_OPTIMIZED,
};
pub(crate) use network::availability_zones;

use crate::asset::StagedAsset;
use crate::error::{CloudError, Result};
use crate::template::{Resource, Template};
use edgestack_core::StackDefinition;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

/// Maximum length of a CloudFormation logical id
const MAX_LOGICAL_ID_LEN: usize = 255;
const HASH_LEN: usize = 8;

/// Path components that are left out of the readable part of a logical id
const HIDDEN_COMPONENTS: &[&str] = &["Resource", "Default"];

/// Build a logical id from a construct path
///
/// The readable part concatenates the alphanumeric characters of each
/// component (skipping `Resource`/`Default` and consecutive duplicates), and
/// an 8-character hash of the full path keeps ids unique. A single-component
/// path is used as-is.
pub fn logical_id(path: &[&str]) -> String {
    if let [single] = path {
        let candidate = alphanumeric(single);
        if candidate.len() <= MAX_LOGICAL_ID_LEN {
            return candidate;
        }
    }

    let mut human = String::new();
    let mut previous: Option<&str> = None;
    for &component in path {
        if HIDDEN_COMPONENTS.contains(&component) || previous == Some(component) {
            continue;
        }
        human.push_str(&alphanumeric(component));
        previous = Some(component);
    }
    human.truncate(MAX_LOGICAL_ID_LEN - HASH_LEN);

    format!("{}{}", human, path_hash(path))
}

fn alphanumeric(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

fn path_hash(path: &[&str]) -> String {
    let digest = Sha256::digest(path.join("/").as_bytes());
    let hex = format!("{:X}", digest);
    hex[..HASH_LEN].to_string()
}

/// Template under construction plus the definition it is built from
pub(crate) struct StackBuilder<'a> {
    pub stack: &'a StackDefinition,
    pub template: Template,
}

impl<'a> StackBuilder<'a> {
    fn new(stack: &'a StackDefinition) -> Self {
        Self {
            stack,
            template: Template::new(stack.description.clone()),
        }
    }

    /// Add a resource under a construct path and return its logical id
    pub fn add(&mut self, path: &[&str], resource: Resource) -> Result<String> {
        let id = logical_id(path);
        debug!(logical_id = %id, resource_type = %resource.resource_type, "Adding resource");
        self.template.add_resource(id.clone(), resource)?;
        Ok(id)
    }

    /// `Name` tag value in the `Stack/Path` form
    pub fn name_tag(&self, path: &[&str]) -> String {
        let mut tag = self.stack.name.clone();
        for component in path {
            tag.push('/');
            tag.push_str(component);
        }
        tag
    }

    /// Account id literal, or the `AWS::AccountId` pseudo parameter when the
    /// stack is environment-agnostic
    pub fn account(&self) -> Value {
        match self.stack.account() {
            Some(account) => Value::String(account.to_string()),
            None => crate::template::intrinsic::reference(crate::template::intrinsic::ACCOUNT_ID),
        }
    }

    pub fn region(&self) -> &str {
        &self.stack.env.region
    }
}

/// Synthesize the full resource graph
///
/// With a staged asset the bucket deployment points at its object key;
/// without one the key becomes a template parameter.
#[instrument(skip_all, fields(stack = %stack.name))]
pub fn synthesize(stack: &StackDefinition, asset: Option<&StagedAsset>) -> Result<Template> {
    let mut builder = StackBuilder::new(stack);

    let network = network::synth_network(&mut builder)?;
    let cluster = compute::synth_cluster(&mut builder)?;
    let security = load_balancer::synth_security_groups(&mut builder, &network)?;
    let lb = load_balancer::synth_load_balancer(&mut builder, &network, &security)?;
    compute::synth_services(&mut builder, &network, &security, &cluster, &lb)?;
    let frontend = frontend::synth_frontend(&mut builder, &lb, asset)?;
    outputs::synth_outputs(&mut builder, &lb, &frontend)?;

    let template = builder.template;
    verify_references(&template)?;

    info!(
        resources = template.resources.len(),
        outputs = template.outputs.len(),
        "Synthesized template"
    );
    Ok(template)
}

/// Check that every `Ref` and `Fn::GetAtt` targets a resource, parameter or
/// pseudo parameter of the template, and every `DependsOn` a resource
pub fn verify_references(template: &Template) -> Result<()> {
    for (id, resource) in &template.resources {
        for dependency in &resource.depends_on {
            if !template.resources.contains_key(dependency) {
                return Err(CloudError::ResourceNotFound(format!(
                    "{} (DependsOn of {})",
                    dependency, id
                )));
            }
        }
        check_value(template, id, &resource.properties)?;
    }
    for (name, output) in &template.outputs {
        check_value(template, name, &output.value)?;
    }
    Ok(())
}

fn check_value(template: &Template, owner: &str, value: &Value) -> Result<()> {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(target)) = map.get("Ref")
                && map.len() == 1
                && !target.starts_with("AWS::")
                && !template.resources.contains_key(target)
                && !template.parameters.contains_key(target)
            {
                return Err(CloudError::ResourceNotFound(format!(
                    "{} (Ref in {})",
                    target, owner
                )));
            }
            if let Some(Value::Array(args)) = map.get("Fn::GetAtt")
                && let Some(Value::String(target)) = args.first()
                && !template.resources.contains_key(target)
            {
                return Err(CloudError::ResourceNotFound(format!(
                    "{} (Fn::GetAtt in {})",
                    target, owner
                )));
            }
            map.values().try_for_each(|v| check_value(template, owner, v))
        }
        Value::Array(items) => items.iter().try_for_each(|v| check_value(template, owner, v)),
        _ => Ok(()),
    }
}
