pub mod authoring;
pub mod error;
pub mod settings;
pub mod telemetry;

pub use authoring::{
    AuthorResult, AuthoringError, AuthoringService, BatchSettings, DocumentSchema,
    ReconcileOptions, ReconciliationEngine, RemoteClient, RemoteError, ResourceItem,
    ResourceSchema, Severity, Status,
};
pub use error::{DeckhandError, Result, SettingsError};
pub use settings::{load_settings, EngineSettings};
