//! edgestack Cloud
//!
//! Turns a loaded stack definition into a CloudFormation template, packages
//! the frontend assets into a cloud assembly and deploys the result through a
//! [`CloudProvider`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 edgestack CLI                    │
//! │        (synth / deploy / outputs / destroy)      │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                edgestack-cloud                   │
//! │  ┌──────────────┐  ┌──────────────┐             │
//! │  │    synth     │  │    asset     │             │
//! │  │ (resources)  │  │  (tar.gz)    │             │
//! │  └──────┬───────┘  └──────┬───────┘             │
//! │         └────────┬────────┘                     │
//! │          ┌───────▼────────┐                     │
//! │          │ CloudAssembly  │                     │
//! │          └───────┬────────┘                     │
//! │  ┌───────────────▼──────────────────────────┐   │
//! │  │          Provider Abstraction             │   │
//! │  │  trait CloudProvider { ... }              │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐                               │
//! │  │  State Mgmt  │                               │
//! │  └──────────────┘                               │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────┐
//! │     local     │
//! │   provider    │
//! └───────────────┘
//! ```

pub mod action;
pub mod assembly;
pub mod asset;
pub mod error;
pub mod local;
pub mod provider;
pub mod state;
pub mod synth;
pub mod template;

// Re-exports
pub use action::{Action, ActionType, ApplyResult, Plan, PlanSummary};
pub use assembly::{AssemblyManifest, CloudAssembly};
pub use asset::StagedAsset;
pub use error::{CloudError, Result};
pub use local::{InvalidationRecord, LocalProvider};
pub use provider::{AuthStatus, CloudProvider, ResourceConfig, ResourceSet};
pub use state::{
    GlobalState, ProviderState, ResourceState, ResourceStatus, StateLock, StateManager,
};
pub use synth::{logical_id, synthesize, verify_references};
pub use template::{DeletionPolicy, Output, Resource, Template};
