//! Per-integration pipeline: initialize the client, load files, reconcile.

use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use super::batching::BatchSettings;
use super::client::RemoteClient;
use super::engine::{ReconcileOptions, ReconciliationEngine};
use super::error::{AuthoringError, Result};
use super::fs::{FileSystem, LocalFileSystem};
use super::loader::{self, ResourceLoader};
use super::resource::ResourceSchema;
use super::result::AuthorResult;

/// Bundles everything needed to deploy or fetch one integration.
pub struct AuthoringService<S, C, F = LocalFileSystem> {
    schema: S,
    client: C,
    fs: F,
    batch: BatchSettings,
}

impl<S, C> AuthoringService<S, C, LocalFileSystem>
where
    S: ResourceSchema,
    C: RemoteClient<S::Payload>,
{
    /// Creates a service working on the local disk.
    pub fn local(schema: S, client: C, batch: BatchSettings) -> Self {
        Self::new(schema, client, LocalFileSystem, batch)
    }
}

impl<S, C, F> AuthoringService<S, C, F>
where
    S: ResourceSchema,
    C: RemoteClient<S::Payload>,
    F: FileSystem,
{
    pub fn new(schema: S, client: C, fs: F, batch: BatchSettings) -> Self {
        Self {
            schema,
            client,
            fs,
            batch,
        }
    }

    pub fn schema(&self) -> &S {
        &self.schema
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn file_system(&self) -> &F {
        &self.fs
    }

    pub fn engine(&self) -> ReconciliationEngine<'_, S, C> {
        ReconciliationEngine::new(&self.schema, &self.client, self.batch)
    }

    /// Finds this integration's files under `dir`.
    pub fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        loader::discover(dir, self.schema.file_extension())
    }

    /// Deploys the resources declared in `paths`.
    ///
    /// A client that cannot be initialized aborts the run. Files that fail to
    /// load are reported as failed items next to the deploy outcome.
    pub async fn deploy_files(
        &self,
        paths: &[PathBuf],
        environment_id: &str,
        project_id: &str,
        options: ReconcileOptions,
        cancel: &CancellationToken,
    ) -> Result<AuthorResult<S::Payload>> {
        log::info!(
            "Deploying {} {} file(s) to environment {}",
            paths.len(),
            self.schema.service(),
            environment_id
        );
        self.client
            .initialize(environment_id, project_id, cancel)
            .await
            .map_err(AuthoringError::Initialize)?;

        let outcome = ResourceLoader::new(&self.schema, &self.fs)
            .load(paths)
            .await;
        let mut result = self.engine().deploy(outcome.loaded, options, cancel).await?;
        result.merge_failed(outcome.failed);
        Ok(result)
    }

    /// Fetches the remote collection into the files at `paths`, creating
    /// new files under `target_dir`.
    pub async fn fetch_files(
        &self,
        target_dir: &Path,
        paths: &[PathBuf],
        environment_id: &str,
        project_id: &str,
        options: ReconcileOptions,
        cancel: &CancellationToken,
    ) -> Result<AuthorResult<S::Payload>> {
        log::info!(
            "Fetching {} resources from environment {} into {}",
            self.schema.service(),
            environment_id,
            target_dir.display()
        );
        self.client
            .initialize(environment_id, project_id, cancel)
            .await
            .map_err(AuthoringError::Initialize)?;

        let outcome = ResourceLoader::new(&self.schema, &self.fs)
            .load(paths)
            .await;
        let mut result = self
            .engine()
            .fetch(target_dir, outcome.loaded, options, &self.fs, cancel)
            .await?;
        result.merge_failed(outcome.failed);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authoring::error::RemoteError;
    use crate::authoring::memory::{MemoryClient, MemoryFileSystem, RemoteOp};
    use crate::authoring::resource::{DocumentSchema, ResourceItem};
    use serde_json::json;
    use tempfile::TempDir;

    type Client = MemoryClient<serde_json::Value>;

    fn service(client: Client) -> AuthoringService<DocumentSchema, Client> {
        AuthoringService::local(
            DocumentSchema::new("leaderboards", "Leaderboard", "lb"),
            client,
            BatchSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_deploy_files_merges_load_failures() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("good.lb"), "daily:\n  sortOrder: asc\n").unwrap();
        std::fs::write(dir.path().join("bad.lb"), "- not\n- a mapping\n").unwrap();

        let service = service(MemoryClient::new());
        let paths = service.discover(dir.path()).unwrap();
        assert_eq!(paths.len(), 2);

        let result = service
            .deploy_files(
                &paths,
                "production",
                "project-1",
                ReconcileOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.created.len(), 1);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].name, "bad.lb");
        assert_eq!(result.exit_code(), 1);
        assert_eq!(
            service.client().binding(),
            Some(("production".to_string(), "project-1".to_string()))
        );
    }

    #[tokio::test]
    async fn test_initialize_failure_aborts_before_listing() {
        let client = MemoryClient::new();
        client.fail_all(RemoteOp::Initialize, RemoteError::new("unknown environment"));
        let service = service(client);

        let err = service
            .deploy_files(
                &[],
                "nowhere",
                "project-1",
                ReconcileOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AuthoringError::Initialize(_)));
        assert_eq!(service.client().calls().list, 0);
    }

    #[tokio::test]
    async fn test_fetch_files_creates_missing_resources() {
        let dir = TempDir::new().unwrap();
        let client = MemoryClient::with_items(vec![ResourceItem::remote(
            "weekly",
            "weekly",
            json!({"resetDay": "monday"}),
        )]);
        let service = service(client);

        let result = service
            .fetch_files(
                dir.path(),
                &[],
                "production",
                "project-1",
                ReconcileOptions::default().reconcile(true),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.created.len(), 1);
        let text = std::fs::read_to_string(dir.path().join("weekly.lb")).unwrap();
        assert_eq!(text, "weekly:\n  resetDay: monday\n");
    }

    #[tokio::test]
    async fn test_fetch_files_writes_through_its_file_system() {
        let client = MemoryClient::with_items(vec![ResourceItem::remote(
            "weekly",
            "weekly",
            json!({"resetDay": "monday"}),
        )]);
        let service = AuthoringService::new(
            DocumentSchema::new("leaderboards", "Leaderboard", "lb"),
            client,
            MemoryFileSystem::new(),
            BatchSettings::default(),
        );

        let result = service
            .fetch_files(
                Path::new("cfg"),
                &[],
                "production",
                "project-1",
                ReconcileOptions::default().reconcile(true),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.created.len(), 1);
        assert_eq!(
            service.file_system().read("cfg/weekly.lb").as_deref(),
            Some("weekly:\n  resetDay: monday\n")
        );
    }
}
