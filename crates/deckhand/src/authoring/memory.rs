//! In-memory remote adapter.
//!
//! Keeps the remote collection in process memory. Useful for local previews
//! and as the adapter driven by the engine tests: it records every call,
//! can be told to fail specific operations, and tracks how many mutating
//! calls were in flight at once. [`MemoryFileSystem`] is the matching
//! stand-in for the disk.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{LockResult, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::client::{RemoteClient, RemoteResult};
use super::error::{AuthoringError, RemoteError, Result};
use super::fs::FileSystem;
use super::resource::{ResourceItem, REMOTE_PATH};
use super::status::Status;

/// Remote operations that can be targeted by failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    Initialize,
    List,
    Get,
    Create,
    Update,
    Delete,
}

/// Number of calls received per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub initialize: usize,
    pub list: usize,
    pub get: usize,
    pub create: usize,
    pub update: usize,
    pub delete: usize,
}

impl CallCounts {
    /// Create, update and delete calls combined.
    pub fn mutations(&self) -> usize {
        self.create + self.update + self.delete
    }
}

struct MemoryState<P> {
    items: Vec<ResourceItem<P>>,
    failures: HashMap<(RemoteOp, String), RemoteError>,
    calls: CallCounts,
    binding: Option<(String, String)>,
    next_ref: u64,
}

/// [`RemoteClient`] over an ordered in-memory collection.
pub struct MemoryClient<P> {
    state: Mutex<MemoryState<P>>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Key used to fail an operation regardless of the item.
const ANY_ID: &str = "*";

impl<P: Clone> MemoryClient<P> {
    pub fn new() -> Self {
        Self::with_items(Vec::new())
    }

    /// Seeds the remote collection. Items keep their ids and payloads and
    /// receive a server handle if they have none.
    pub fn with_items(items: Vec<ResourceItem<P>>) -> Self {
        let client = Self {
            state: Mutex::new(MemoryState {
                items: Vec::new(),
                failures: HashMap::new(),
                calls: CallCounts::default(),
                binding: None,
                next_ref: 1,
            }),
            latency: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        };
        {
            let mut state = client.lock();
            for item in items {
                let stored = store(&mut *state, item);
                state.items.push(stored);
            }
        }
        client
    }

    /// Makes every mutating call take `latency` to complete.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fails `op` for the item with identifier `id`.
    pub fn fail_on(&self, op: RemoteOp, id: impl Into<String>, error: RemoteError) {
        self.lock().failures.insert((op, id.into()), error);
    }

    /// Fails every call of `op`.
    pub fn fail_all(&self, op: RemoteOp, error: RemoteError) {
        self.fail_on(op, ANY_ID, error);
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Current remote collection, in insertion order.
    pub fn items(&self) -> Vec<ResourceItem<P>> {
        self.lock().items.clone()
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    /// Environment and project passed to the last successful initialize.
    pub fn binding(&self) -> Option<(String, String)> {
        self.lock().binding.clone()
    }

    /// Highest number of mutating calls observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState<P>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Memory client lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Counts the call and returns the injected failure, if any.
    fn enter(&self, op: RemoteOp, id: &str) -> RemoteResult<()> {
        let mut state = self.lock();
        let calls = &mut state.calls;
        match op {
            RemoteOp::Initialize => calls.initialize += 1,
            RemoteOp::List => calls.list += 1,
            RemoteOp::Get => calls.get += 1,
            RemoteOp::Create => calls.create += 1,
            RemoteOp::Update => calls.update += 1,
            RemoteOp::Delete => calls.delete += 1,
        }

        let injected = state
            .failures
            .get(&(op, id.to_string()))
            .or_else(|| state.failures.get(&(op, ANY_ID.to_string())))
            .cloned();
        match injected {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn mutate<T>(
        &self,
        op: RemoteOp,
        id: &str,
        apply: impl FnOnce(&mut MemoryState<P>) -> RemoteResult<T>,
    ) -> RemoteResult<T> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let result = self.enter(op, id).and_then(|_| {
            let mut state = self.lock();
            apply(&mut state)
        });
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl<P: Clone> Default for MemoryClient<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalizes an item for storage: remote origin, fresh status and a server
/// handle.
fn store<P>(state: &mut MemoryState<P>, mut item: ResourceItem<P>) -> ResourceItem<P> {
    item.path = REMOTE_PATH.into();
    item.status = Status::pending();
    if item.remote_ref.is_none() {
        item.remote_ref = Some(format!("ref-{}", state.next_ref));
        state.next_ref += 1;
    }
    item
}

fn not_found(id: &str) -> RemoteError {
    RemoteError::with_status(format!("resource '{}' not found", id), 404)
}

#[async_trait]
impl<P> RemoteClient<P> for MemoryClient<P>
where
    P: Clone + Send + Sync + 'static,
{
    async fn initialize(
        &self,
        environment_id: &str,
        project_id: &str,
        _cancel: &CancellationToken,
    ) -> RemoteResult<()> {
        self.enter(RemoteOp::Initialize, ANY_ID)?;
        self.lock().binding = Some((environment_id.to_string(), project_id.to_string()));
        Ok(())
    }

    async fn list(&self) -> RemoteResult<Vec<ResourceItem<P>>> {
        self.enter(RemoteOp::List, ANY_ID)?;
        Ok(self.items())
    }

    async fn get(&self, id: &str) -> RemoteResult<ResourceItem<P>> {
        self.enter(RemoteOp::Get, id)?;
        self.lock()
            .items
            .iter()
            .find(|item| item.id == id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    async fn create(&self, item: &ResourceItem<P>) -> RemoteResult<()> {
        self.mutate(RemoteOp::Create, &item.id, |state| {
            if state.items.iter().any(|existing| existing.id == item.id) {
                return Err(RemoteError::with_status(
                    format!("resource '{}' already exists", item.id),
                    409,
                ));
            }
            let stored = store(state, item.clone());
            state.items.push(stored);
            Ok(())
        })
        .await
    }

    async fn update(&self, item: &ResourceItem<P>) -> RemoteResult<()> {
        self.mutate(RemoteOp::Update, &item.id, |state| {
            let index = locate(state, item)?;
            state.items[index].content = item.content.clone();
            state.items[index].name = item.name.clone();
            Ok(())
        })
        .await
    }

    async fn delete(&self, item: &ResourceItem<P>) -> RemoteResult<()> {
        self.mutate(RemoteOp::Delete, &item.id, |state| {
            let index = locate(state, item)?;
            state.items.remove(index);
            Ok(())
        })
        .await
    }
}

/// Finds the stored copy of `item`. A handle carried by the caller must
/// match the stored one.
fn locate<P>(state: &MemoryState<P>, item: &ResourceItem<P>) -> RemoteResult<usize> {
    let index = state
        .items
        .iter()
        .position(|existing| existing.id == item.id)
        .ok_or_else(|| not_found(&item.id))?;

    if let Some(handle) = &item.remote_ref {
        if state.items[index].remote_ref.as_deref() != Some(handle.as_str()) {
            return Err(RemoteError::with_status(
                format!("stale handle '{}' for resource '{}'", handle, item.id),
                409,
            ));
        }
    }
    Ok(index)
}

/// [`FileSystem`] over an in-memory map of path to text.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: Mutex<HashMap<PathBuf, String>>,
    failing: Mutex<HashSet<PathBuf>>,
    writes: AtomicUsize,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a file without counting it as a write.
    pub fn insert(&self, path: impl Into<PathBuf>, text: impl Into<String>) {
        recover(self.files.lock()).insert(path.into(), text.into());
    }

    pub fn read(&self, path: impl AsRef<Path>) -> Option<String> {
        recover(self.files.lock()).get(path.as_ref()).cloned()
    }

    /// Makes every access to `path` fail.
    pub fn fail_path(&self, path: impl Into<PathBuf>) {
        recover(self.failing.lock()).insert(path.into());
    }

    /// Number of successful writes and deletes.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check(&self, path: &Path) -> std::io::Result<()> {
        if recover(self.failing.lock()).contains(path) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "access denied",
            ));
        }
        Ok(())
    }
}

fn recover<T>(result: LockResult<MutexGuard<'_, T>>) -> MutexGuard<'_, T> {
    result.unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl FileSystem for MemoryFileSystem {
    async fn read_all_text(&self, path: &Path) -> Result<String> {
        let missing = || std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        self.check(path)
            .and_then(|_| self.read(path).ok_or_else(missing))
            .map_err(|e| AuthoringError::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })
    }

    async fn write_all_text(&self, path: &Path, text: &str) -> Result<()> {
        self.check(path).map_err(|e| AuthoringError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        recover(self.files.lock()).insert(path.to_path_buf(), text.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let removed = self.check(path).and_then(|_| {
            recover(self.files.lock())
                .remove(path)
                .map(|_| ())
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"))
        });
        removed.map_err(|e| AuthoringError::DeleteFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
