//! Local provider
//!
//! Deploys a stack into the state directory instead of a cloud account.
//! Resources get deterministic physical ids and attributes, output
//! expressions are evaluated against them, and the two custom resources have
//! real local effects:
//!
//! - the bucket deployment unpacks the staged asset into
//!   `<state dir>/buckets/<bucket>/` and appends an invalidation record to
//!   `<state dir>/invalidations.jsonl`
//! - the auto-delete resource empties the bucket directory when the stack is
//!   destroyed

mod physical;
mod resolve;

pub use physical::{IdContext, PhysicalResource};
pub use resolve::Resolver;

use crate::action::{Action, ActionType, ApplyResult, Plan};
use crate::asset;
use crate::error::{CloudError, Result};
use crate::provider::{AuthStatus, CloudProvider, ResourceConfig, ResourceSet};
use crate::state::{
    GlobalState, ProviderState, ResourceState, ResourceStatus, StateManager, resource_key,
};
use crate::synth::{AUTO_DELETE_RESOURCE_TYPE, BUCKET_DEPLOYMENT_RESOURCE_TYPE};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use edgestack_core::StackDefinition;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs;
use tokio::io::AsyncWriteExt;

const PROVIDER_NAME: &str = "local";
const BUCKETS_DIR: &str = "buckets";
const INVALIDATIONS_FILE: &str = "invalidations.jsonl";

/// One CDN invalidation issued by a bucket deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidationRecord {
    pub distribution_id: String,
    pub paths: Vec<String>,
    /// Object keys that were deployed
    pub caller_reference: String,
    pub created_at: DateTime<Utc>,
}

enum DeleteOutcome {
    Deleted,
    Retained,
}

pub struct LocalProvider {
    ids: IdContext,
    state: StateManager,
    /// Cloud assembly holding the staged asset archives
    assembly_dir: PathBuf,
}

impl LocalProvider {
    pub fn new(
        ids: IdContext,
        state_dir: impl AsRef<Path>,
        assembly_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            ids,
            state: StateManager::new(state_dir),
            assembly_dir: assembly_dir.as_ref().to_path_buf(),
        }
    }

    /// Provider for a stack with a resolved account
    pub fn for_stack(
        stack: &StackDefinition,
        state_dir: impl AsRef<Path>,
        assembly_dir: impl AsRef<Path>,
    ) -> Result<Self> {
        let account = edgestack_core::require_account(stack)?;
        let ids = IdContext {
            account: account.to_string(),
            region: stack.env.region.clone(),
            stack: stack.name.clone(),
        };
        Ok(Self::new(ids, state_dir, assembly_dir))
    }

    /// Directory standing in for a bucket
    pub fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.state.state_dir().join(BUCKETS_DIR).join(bucket)
    }

    pub fn invalidations_path(&self) -> PathBuf {
        self.state.state_dir().join(INVALIDATIONS_FILE)
    }

    /// Evaluated outputs of the last deployment
    pub async fn outputs(&self) -> Result<BTreeMap<String, String>> {
        let state = self.get_state().await?;
        if state.is_empty() {
            return Err(CloudError::NotDeployed(self.ids.stack.clone()));
        }
        Ok(state.outputs)
    }

    /// All recorded invalidations, oldest first
    pub async fn invalidations(&self) -> Result<Vec<InvalidationRecord>> {
        let path = self.invalidations_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path).await?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(CloudError::from))
            .collect()
    }

    fn resolver<'a>(
        &'a self,
        resources: &'a BTreeMap<String, ResourceState>,
        parameters: &'a BTreeMap<String, String>,
    ) -> Resolver<'a> {
        Resolver {
            account: &self.ids.account,
            region: &self.ids.region,
            stack: &self.ids.stack,
            resources,
            parameters,
        }
    }

    fn apply_resource(&self, global: &mut GlobalState, action: &Action, config: &ResourceConfig) {
        let key = resource_key(&self.ids.stack, &config.id);
        let physical = self
            .ids
            .assign(&config.id, &config.resource_type, &config.resource.properties);

        let status = match action.action_type {
            ActionType::Update => ResourceStatus::UpdateComplete,
            _ => ResourceStatus::CreateComplete,
        };
        let mut state = ResourceState::new(physical.id, &config.resource_type)
            .with_status(status)
            .with_fingerprint(config.fingerprint())
            .retained(config.resource.is_retained());
        state.attributes = physical.attributes;
        if let Some(previous) = global.get_resource(&key) {
            state.created_at = previous.created_at;
        }

        tracing::debug!(logical_id = %config.id, physical_id = %state.id, %status, "Applied resource");
        global.set_resource(key, state);
    }

    /// Copy the deployment's asset archives into the destination bucket
    /// directory and record the invalidation
    async fn run_bucket_deployment(&self, properties: &Value) -> Result<usize> {
        let bucket = properties
            .get("DestinationBucketName")
            .and_then(Value::as_str)
            .ok_or_else(|| CloudError::InvalidConfig("bucket deployment has no destination".to_string()))?;
        let keys: Vec<String> = properties
            .get("SourceObjectKeys")
            .and_then(Value::as_array)
            .map(|keys| keys.iter().filter_map(|k| k.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let prune = properties.get("Prune").and_then(Value::as_bool).unwrap_or(true);
        let exclude: Vec<String> = properties
            .get("Exclude")
            .and_then(Value::as_array)
            .map(|p| p.iter().filter_map(|p| p.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let exclude = asset::compile_patterns(&exclude)?;

        let dest = self.bucket_dir(bucket);
        let mut deployed = Vec::new();
        for key in &keys {
            let archive = self.assembly_dir.join(format!("asset.{}", key));
            if !archive.exists() {
                return Err(CloudError::AssetNotFound(archive));
            }
            deployed.extend(asset::unpack(&archive, &dest)?);
        }

        if prune && dest.exists() {
            let existing = asset::collect_files(&dest, &[])?;
            for stale in existing {
                if !deployed.contains(&stale) && !asset::is_excluded(&stale, &exclude) {
                    fs::remove_file(dest.join(&stale)).await?;
                    tracing::debug!(object = %stale, "Pruned stale object");
                }
            }
        }

        if let Some(distribution_id) = properties.get("DistributionId").and_then(Value::as_str) {
            let paths: Vec<String> = properties
                .get("DistributionPaths")
                .and_then(Value::as_array)
                .map(|p| p.iter().filter_map(|p| p.as_str().map(str::to_string)).collect())
                .unwrap_or_else(|| vec!["/*".to_string()]);
            self.record_invalidation(InvalidationRecord {
                distribution_id: distribution_id.to_string(),
                paths,
                caller_reference: keys.join(","),
                created_at: Utc::now(),
            })
            .await?;
        }

        tracing::info!(bucket, objects = deployed.len(), "Deployed assets");
        Ok(deployed.len())
    }

    async fn record_invalidation(&self, record: InvalidationRecord) -> Result<()> {
        let path = self.invalidations_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        tracing::info!(
            distribution = %record.distribution_id,
            paths = ?record.paths,
            "Created invalidation"
        );
        Ok(())
    }

    /// Remove one resource from the state, running its delete-time effects
    async fn delete_resource(&self, global: &mut GlobalState, logical_id: &str) -> Result<DeleteOutcome> {
        let key = resource_key(&self.ids.stack, logical_id);
        let Some(resource) = global.get_resource(&key).cloned() else {
            return Err(CloudError::ResourceNotFound(logical_id.to_string()));
        };

        if resource.retain {
            global.remove_resource(&key);
            tracing::info!(logical_id, physical_id = %resource.id, "Retained resource");
            return Ok(DeleteOutcome::Retained);
        }

        match resource.resource_type.as_str() {
            AUTO_DELETE_RESOURCE_TYPE => {
                // The bucket name is the Ref of the bucket this resource empties
                if let Some(bucket) = resource.get_attribute::<String>("BucketName") {
                    let dir = self.bucket_dir(&bucket);
                    if dir.exists() {
                        fs::remove_dir_all(&dir).await?;
                        tracing::info!(bucket = %bucket, "Emptied bucket");
                    }
                }
            }
            "AWS::S3::Bucket" => {
                let dir = self.bucket_dir(&resource.id);
                if dir.exists() && !asset::collect_files(&dir, &[])?.is_empty() {
                    return Err(CloudError::InvalidConfig(format!(
                        "bucket {} is not empty",
                        resource.id
                    )));
                }
                if dir.exists() {
                    fs::remove_dir_all(&dir).await?;
                }
            }
            _ => {}
        }

        global.remove_resource(&key);
        tracing::debug!(logical_id, "Deleted resource");
        Ok(DeleteOutcome::Deleted)
    }

    /// Run custom resource effects for the created/updated custom resources
    async fn run_custom_resources(
        &self,
        global: &mut GlobalState,
        plan: &Plan,
        result: &mut ApplyResult,
    ) -> Result<()> {
        let resources = global.stack_state(&self.ids.stack).resources;

        for action in &plan.actions {
            if !matches!(action.action_type, ActionType::Create | ActionType::Update) {
                continue;
            }
            let Some(config) = &action.desired else {
                continue;
            };
            if !config.resource_type.starts_with("Custom::") {
                continue;
            }

            let properties = self
                .resolver(&resources, &plan.parameters)
                .resolve(&config.resource.properties);
            let key = resource_key(&self.ids.stack, &config.id);

            let outcome = match (properties, config.resource_type.as_str()) {
                (Err(e), _) => Err(e),
                (Ok(properties), BUCKET_DEPLOYMENT_RESOURCE_TYPE) => self
                    .run_bucket_deployment(&properties)
                    .await
                    .map(|count| vec![("ObjectCount".to_string(), Value::from(count))]),
                (Ok(properties), AUTO_DELETE_RESOURCE_TYPE) => Ok(vec![(
                    "BucketName".to_string(),
                    properties.get("BucketName").cloned().unwrap_or(Value::Null),
                )]),
                (Ok(_), _) => Ok(Vec::new()),
            };

            match outcome {
                Ok(attributes) => {
                    if let Some(state) = global.resources.get_mut(&key) {
                        for (name, value) in attributes {
                            state.set_attribute(name, value);
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(logical_id = %config.id, error = %e, "Custom resource failed");
                    if let Some(state) = global.resources.get_mut(&key) {
                        state.status = match action.action_type {
                            ActionType::Update => ResourceStatus::UpdateFailed,
                            _ => ResourceStatus::CreateFailed,
                        };
                    }
                    result.add_failure(config.id.clone(), e.to_string());
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CloudProvider for LocalProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn display_name(&self) -> &str {
        "Local simulation"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        let valid = self.ids.account.len() == 12 && self.ids.account.chars().all(|c| c.is_ascii_digit());
        if valid {
            Ok(AuthStatus::ok(format!(
                "aws://{}/{}",
                self.ids.account, self.ids.region
            )))
        } else {
            Ok(AuthStatus::failed(format!(
                "invalid account id: {}",
                self.ids.account
            )))
        }
    }

    async fn get_state(&self) -> Result<ProviderState> {
        let global = self.state.load().await?;
        Ok(global.stack_state(&self.ids.stack))
    }

    async fn plan(&self, desired: &ResourceSet) -> Result<Plan> {
        let current = self.get_state().await?;

        let mut actions = Vec::new();
        for config in desired.iter() {
            // Presence decides the action; deployed properties are never diffed
            let action = match current.get(&config.id) {
                None => Action::create(config.clone()),
                Some(_) if config.resource_type == BUCKET_DEPLOYMENT_RESOURCE_TYPE => {
                    Action::update(config.clone(), "assets are redeployed on every deployment")
                }
                Some(state)
                    if matches!(
                        state.status,
                        ResourceStatus::CreateFailed | ResourceStatus::UpdateFailed
                    ) =>
                {
                    Action::update(config.clone(), "previous attempt failed")
                }
                Some(_) => Action::no_op(config.clone()),
            };
            actions.push(action);
        }
        for (id, state) in current.iter() {
            if desired.get(id).is_none() {
                actions.push(Action::delete(id.clone(), state.resource_type.clone()));
            }
        }

        let plan = Plan::new(desired.stack_name.clone(), actions)
            .with_outputs(desired.outputs.clone())
            .with_parameters(desired.parameters.clone());
        tracing::info!(stack = %plan.stack_name, summary = %plan.summary(), "Planned deployment");
        Ok(plan)
    }

    async fn apply(&self, plan: &Plan) -> Result<ApplyResult> {
        let started = Instant::now();
        let lock = self.state.acquire_lock().await?;
        let mut global = self.state.load().await?;
        let mut result = ApplyResult::new();

        for action in &plan.actions {
            match (action.action_type, &action.desired) {
                (ActionType::Create | ActionType::Update, Some(config)) => {
                    self.apply_resource(&mut global, action, config);
                    result.add_success(action.id.clone(), action.description.clone());
                }
                (ActionType::Delete, _) => match self.delete_resource(&mut global, &action.id).await {
                    Ok(DeleteOutcome::Retained) => result.add_retained(action.id.clone()),
                    Ok(DeleteOutcome::Deleted) => {
                        result.add_success(action.id.clone(), action.description.clone())
                    }
                    Err(e) => result.add_failure(action.id.clone(), e.to_string()),
                },
                _ => {}
            }
        }

        self.run_custom_resources(&mut global, plan, &mut result).await?;

        let resources = global.stack_state(&self.ids.stack).resources;
        let resolver = self.resolver(&resources, &plan.parameters);
        let mut outputs = BTreeMap::new();
        for (name, output) in &plan.outputs {
            match resolver.resolve_string(&output.value) {
                Ok(value) => {
                    outputs.insert(name.clone(), value);
                }
                Err(e) => result.add_failure(format!("Output {}", name), e.to_string()),
            }
        }
        global.set_outputs(&self.ids.stack, outputs);

        self.state.save(&global).await?;
        lock.release().await?;

        result.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            duration_ms = result.duration_ms,
            "Applied plan"
        );
        Ok(result)
    }

    async fn destroy(&self, resource_id: &str) -> Result<()> {
        let lock = self.state.acquire_lock().await?;
        let mut global = self.state.load().await?;
        self.delete_resource(&mut global, resource_id).await?;
        self.state.save(&global).await?;
        lock.release().await?;
        Ok(())
    }

    async fn destroy_all(&self) -> Result<ApplyResult> {
        let started = Instant::now();
        let lock = self.state.acquire_lock().await?;
        let mut global = self.state.load().await?;
        let current = global.stack_state(&self.ids.stack);
        if current.is_empty() {
            lock.release().await?;
            return Err(CloudError::NotDeployed(self.ids.stack.clone()));
        }

        // Custom resources first so the bucket is emptied before it is removed
        let mut order: Vec<(&String, &ResourceState)> = current.iter().collect();
        order.reverse();
        order.sort_by_key(|(_, state)| !state.resource_type.starts_with("Custom::"));

        let mut result = ApplyResult::new();
        for (id, _) in order {
            match self.delete_resource(&mut global, id).await {
                Ok(DeleteOutcome::Deleted) => result.add_success(id.clone(), format!("Deleted {}", id)),
                Ok(DeleteOutcome::Retained) => result.add_retained(id.clone()),
                Err(e) => result.add_failure(id.clone(), e.to_string()),
            }
        }

        if result.is_success() {
            global.remove_stack(&self.ids.stack);
        }
        self.state.save(&global).await?;
        lock.release().await?;

        result.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            deleted = result.succeeded.len(),
            retained = result.retained.len(),
            failed = result.failed.len(),
            "Destroyed stack"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests;
