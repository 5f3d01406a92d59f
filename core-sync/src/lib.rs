//! # Sync Module
//!
//! Reconciles a tenant's remote photo storage with the asset registry.
//!
//! ## Overview
//!
//! A run lists the tenant's objects, classifies every key against the
//! registry (new / unchanged / updated / conflict / removed), processes the
//! changed objects on a bounded pool and writes the outcome in one batch.
//! Conflicts are settled later by an operator-chosen strategy.
//!
//! ## Components
//!
//! - **Sync Engine** (`engine`): listing, live-photo pairing and the
//!   listing-only classification barrier
//! - **Change Set** (`change_set`): work units, final classification and the
//!   run report
//! - **Processor** (`processor`): fetch, digest, artifacts and manifest
//!   derivation for one object
//! - **Orchestrator** (`orchestrator`): bounded, timed fan-out of units,
//!   in-process or through `isolation`
//! - **Process Isolation** (`isolation`): the `photo-sync-worker` protocol
//! - **Conflict Resolver** (`conflict_resolver`): prefer-remote,
//!   prefer-local and manual-merge strategies
//! - **Sync Coordinator** (`coordinator`): the entry point wiring it all
//!   together

pub mod artifacts;
pub mod change_set;
pub mod conflict_resolver;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod isolation;
pub mod orchestrator;
pub mod processor;

pub use artifacts::{
    ArtifactCommand, ArtifactGenerator, ArtifactOutput, CommandArtifactGenerator, GeneratorSpec,
    NoopArtifactGenerator,
};
pub use change_set::{ChangeKind, ChangedAsset, ProcessingFailure, SyncReport, WorkUnit};
pub use conflict_resolver::{
    ConflictResolver, ResolutionReport, ResolutionStrategy, ResolvedAsset,
};
pub use coordinator::SyncCoordinator;
pub use engine::{SyncEngine, SyncPlan};
pub use error::{Result, SyncError};
pub use isolation::{run_worker_stdio, ProcessIsolation, WorkerRequest, WorkerResponse};
pub use orchestrator::{Orchestrator, UnitOutcome};
pub use processor::{content_digest, derive_manifest, manifest_from_output, AssetProcessor};
