//! Deploy/fetch reconciliation for declarative service resources.
//!
//! Every integration provides a [`ResourceSchema`] and a [`RemoteClient`];
//! the same engine then handles:
//! - loading single and compound resource files
//! - rejecting identifiers declared more than once
//! - diffing against the remote collection and labelling dry runs
//! - batched remote mutations with per-item failure reporting
//! - writing fetched state back to disk

pub mod batching;
pub mod client;
pub mod duplicates;
pub mod engine;
pub mod error;
pub mod fs;
pub mod loader;
pub mod memory;
pub mod report;
pub mod resource;
pub mod result;
pub mod service;
pub mod status;

pub use batching::{BatchReport, BatchSettings, Batcher, UnitOutcome};
pub use client::{RemoteClient, RemoteResult};
pub use duplicates::{filter_duplicates, DuplicateGroup};
pub use engine::{ReconcileOptions, ReconciliationEngine};
pub use error::{AuthoringError, RemoteError, Result};
pub use fs::{FileSystem, LocalFileSystem};
pub use loader::{discover, LoadOutcome, ResourceLoader};
pub use memory::{CallCounts, MemoryClient, MemoryFileSystem, RemoteOp};
pub use report::{render_table, rows, to_json, ReportRow};
pub use resource::{DocumentSchema, FileFormat, ResourceItem, ResourceSchema, REMOTE_PATH};
pub use result::{AuthorResult, FileSummary, Operation};
pub use service::AuthoringService;
pub use status::{Action, Severity, Status};
