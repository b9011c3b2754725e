//! Deployed stack state
//!
//! Tracks deployed resources in `<state dir>/state.json` (by default
//! `.edgestack/state.json` under the project root). Every save keeps the
//! previous file as `state.json.backup`, and `lock.json` guards against two
//! deployments running at once.

use crate::error::{CloudError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
pub const STATE_DIR: &str = ".edgestack";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";
/// A lock older than this is considered abandoned
const STALE_LOCK_HOURS: i64 = 1;

/// All deployed stacks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalState {
    pub version: u32,

    pub updated_at: DateTime<Utc>,

    /// Resources keyed by `<stack>/<logical id>`
    pub resources: BTreeMap<String, ResourceState>,

    /// Evaluated outputs per stack
    #[serde(default)]
    pub outputs: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }
}

/// Key of a resource in [`GlobalState::resources`]
pub fn resource_key(stack: &str, logical_id: &str) -> String {
    format!("{}/{}", stack, logical_id)
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resources and outputs of one stack, keyed by logical id
    pub fn stack_state(&self, stack: &str) -> ProviderState {
        let prefix = format!("{}/", stack);
        let resources = self
            .resources
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(&prefix).map(|id| (id.to_string(), v.clone())))
            .collect();
        ProviderState {
            resources,
            outputs: self.outputs.get(stack).cloned().unwrap_or_default(),
        }
    }

    pub fn set_resource(&mut self, key: String, state: ResourceState) {
        self.resources.insert(key, state);
        self.updated_at = Utc::now();
    }

    pub fn remove_resource(&mut self, key: &str) -> Option<ResourceState> {
        let result = self.resources.remove(key);
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }

    pub fn get_resource(&self, key: &str) -> Option<&ResourceState> {
        self.resources.get(key)
    }

    pub fn set_outputs(&mut self, stack: &str, outputs: BTreeMap<String, String>) {
        self.outputs.insert(stack.to_string(), outputs);
        self.updated_at = Utc::now();
    }

    /// Forget everything about a stack
    pub fn remove_stack(&mut self, stack: &str) {
        let prefix = format!("{}/", stack);
        self.resources.retain(|k, _| !k.starts_with(&prefix));
        self.outputs.remove(stack);
        self.updated_at = Utc::now();
    }
}

/// State of one stack
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderState {
    /// Resources keyed by logical id
    pub resources: BTreeMap<String, ResourceState>,

    pub outputs: BTreeMap<String, String>,
}

impl ProviderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: String, state: ResourceState) {
        self.resources.insert(id, state);
    }

    pub fn get(&self, id: &str) -> Option<&ResourceState> {
        self.resources.get(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<ResourceState> {
        self.resources.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ResourceState)> {
        self.resources.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// State of a single deployed resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    /// Physical id
    pub id: String,

    pub resource_type: String,

    pub status: ResourceStatus,

    /// Attributes readable through `Fn::GetAtt`
    pub attributes: BTreeMap<String, serde_json::Value>,

    /// Hash of the definition that was applied
    #[serde(default)]
    pub fingerprint: String,

    /// Kept when the stack is destroyed
    #[serde(default)]
    pub retain: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            status: ResourceStatus::CreateInProgress,
            attributes: BTreeMap::new(),
            fingerprint: String::new(),
            retain: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }

    pub fn retained(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.attributes.insert(key.into(), value);
        self.updated_at = Utc::now();
    }

    pub fn get_attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Status of a resource, named after CloudFormation resource statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatus {
    CreateInProgress,
    CreateComplete,
    CreateFailed,
    UpdateComplete,
    UpdateFailed,
    DeleteComplete,
    /// Left in place by a `Retain` policy
    DeleteSkipped,
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::CreateInProgress => write!(f, "CREATE_IN_PROGRESS"),
            ResourceStatus::CreateComplete => write!(f, "CREATE_COMPLETE"),
            ResourceStatus::CreateFailed => write!(f, "CREATE_FAILED"),
            ResourceStatus::UpdateComplete => write!(f, "UPDATE_COMPLETE"),
            ResourceStatus::UpdateFailed => write!(f, "UPDATE_FAILED"),
            ResourceStatus::DeleteComplete => write!(f, "DELETE_COMPLETE"),
            ResourceStatus::DeleteSkipped => write!(f, "DELETE_SKIPPED"),
        }
    }
}

/// Reads and writes the state file
pub struct StateManager {
    state_dir: PathBuf,
}

impl StateManager {
    /// Manager rooted at an explicit state directory
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
        }
    }

    /// Manager for `<project_root>/.edgestack`
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        Self::new(project_root.as_ref().join(STATE_DIR))
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn state_path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir.join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir.join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        if !self.state_dir.exists() {
            fs::create_dir_all(&self.state_dir).await?;
            tracing::debug!("Created state directory: {}", self.state_dir.display());
        }
        Ok(())
    }

    pub async fn load(&self) -> Result<GlobalState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(GlobalState::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: GlobalState = serde_json::from_str(&content).map_err(|e| {
            CloudError::StateError(format!("{} is corrupted: {}", path.display(), e))
        })?;

        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!("Loaded state with {} resources", state.resources.len());
        Ok(state)
    }

    pub async fn save(&self, state: &GlobalState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Created state backup");
        }

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&path, content).await?;

        tracing::debug!("Saved state with {} resources", state.resources.len());
        Ok(())
    }

    /// Acquire the advisory lock for exclusive access
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            match serde_json::from_str::<LockInfo>(&content) {
                Ok(lock_info) => {
                    let age = Utc::now().signed_duration_since(lock_info.acquired_at);
                    if age.num_hours() < STALE_LOCK_HOURS {
                        return Err(CloudError::LockError(format!(
                            "State is locked by {} since {}",
                            lock_info.holder, lock_info.acquired_at
                        )));
                    }
                    tracing::warn!("Removing stale lock from {}", lock_info.holder);
                }
                Err(e) => tracing::warn!("Replacing unreadable lock file: {}", e),
            }
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn sample_state() -> GlobalState {
        let mut state = GlobalState::new();
        state.set_resource(
            resource_key("InfraStack", "FrontendBucketAB12CD34"),
            ResourceState::new("infrastack-frontendbucket-abc", "AWS::S3::Bucket")
                .with_status(ResourceStatus::CreateComplete)
                .with_attribute("Arn", serde_json::json!("arn:aws:s3:::infrastack-frontendbucket-abc")),
        );
        state.set_resource(
            resource_key("OtherStack", "Vpc"),
            ResourceState::new("vpc-1", "AWS::EC2::VPC"),
        );
        state.set_outputs(
            "InfraStack",
            BTreeMap::from([("CloudFrontURL".to_string(), "https://d1.cloudfront.net".to_string())]),
        );
        state
    }

    #[tokio::test]
    async fn test_state_save_load() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::for_project(temp_dir.path());

        manager.save(&sample_state()).await.unwrap();
        assert!(temp_dir.path().join(".edgestack/state.json").exists());

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.resources.len(), 2);
        let bucket = loaded
            .get_resource("InfraStack/FrontendBucketAB12CD34")
            .unwrap();
        assert_eq!(bucket.status, ResourceStatus::CreateComplete);
        assert_eq!(
            bucket.get_attribute::<String>("Arn").as_deref(),
            Some("arn:aws:s3:::infrastack-frontendbucket-abc")
        );
    }

    #[tokio::test]
    async fn test_save_keeps_backup() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        manager.save(&GlobalState::new()).await.unwrap();
        manager.save(&sample_state()).await.unwrap();
        assert!(temp_dir.path().join("state.json.backup").exists());
    }

    #[tokio::test]
    async fn test_empty_state() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let state = manager.load().await.unwrap();
        assert!(state.resources.is_empty());
    }

    #[tokio::test]
    async fn test_corrupted_state() {
        let temp_dir = tempdir().unwrap();
        std::fs::write(temp_dir.path().join("state.json"), "{ not json").unwrap();
        let manager = StateManager::new(temp_dir.path());

        assert!(matches!(
            manager.load().await,
            Err(CloudError::StateError(_))
        ));
    }

    #[test]
    fn test_stack_state_and_remove_stack() {
        let mut state = sample_state();
        let infra = state.stack_state("InfraStack");
        assert_eq!(infra.resources.len(), 1);
        assert!(infra.get("FrontendBucketAB12CD34").is_some());
        assert_eq!(infra.outputs["CloudFrontURL"], "https://d1.cloudfront.net");

        state.remove_stack("InfraStack");
        assert!(state.stack_state("InfraStack").is_empty());
        assert!(state.stack_state("InfraStack").outputs.is_empty());
        assert_eq!(state.stack_state("OtherStack").resources.len(), 1);
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let lock = manager.acquire_lock().await.unwrap();
        assert!(matches!(
            manager.acquire_lock().await,
            Err(CloudError::LockError(_))
        ));

        lock.release().await.unwrap();
        let again = manager.acquire_lock().await.unwrap();
        drop(again);
        assert!(!temp_dir.path().join("lock.json").exists());
    }

    #[tokio::test]
    async fn test_stale_lock_is_replaced() {
        let temp_dir = tempdir().unwrap();
        let stale = LockInfo {
            holder: "old-host".to_string(),
            acquired_at: Utc::now() - Duration::hours(2),
        };
        std::fs::write(
            temp_dir.path().join("lock.json"),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

        let manager = StateManager::new(temp_dir.path());
        assert!(manager.acquire_lock().await.is_ok());
    }
}
