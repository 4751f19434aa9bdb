//! The reconciliation engine: diffs local declarations against the remote
//! collection and converges one onto the other.

use futures_util::future::join_all;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};

use super::batching::{BatchSettings, Batcher, UnitOutcome};
use super::client::{RemoteClient, RemoteResult};
use super::duplicates::{filter_duplicates, DuplicateGroup};
use super::error::Result;
use super::fs::FileSystem;
use super::resource::{ResourceItem, ResourceSchema};
use super::result::{AuthorResult, Operation};
use super::status::{Action, Status};

/// Switches for one deploy or fetch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Compute and label the plan without changing anything.
    pub dry_run: bool,
    /// Also act on entries that exist only on the other side.
    pub reconcile: bool,
}

impl ReconcileOptions {
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn reconcile(mut self, reconcile: bool) -> Self {
        self.reconcile = reconcile;
        self
    }
}

/// How a local item relates to the remote snapshot.
enum Pairing<P> {
    LocalOnly(ResourceItem<P>),
    Both {
        local: ResourceItem<P>,
        remote: ResourceItem<P>,
        same: bool,
    },
    RemoteOnly(ResourceItem<P>),
}

/// A pending change to one file during fetch.
enum FileChange {
    Write { path: PathBuf, text: String },
    Delete { path: PathBuf },
}

/// Reconciles one integration's resources.
///
/// Each call computes the complete diff before any remote mutation starts
/// and keeps no state once it returns.
pub struct ReconciliationEngine<'a, S, C> {
    schema: &'a S,
    client: &'a C,
    batcher: Batcher,
}

impl<'a, S, C> ReconciliationEngine<'a, S, C>
where
    S: ResourceSchema,
    C: RemoteClient<S::Payload>,
{
    pub fn new(schema: &'a S, client: &'a C, batch: BatchSettings) -> Self {
        Self {
            schema,
            client,
            batcher: Batcher::new(batch),
        }
    }

    /// Lists the remote collection and deploys `local` against it.
    ///
    /// Only a failing remote listing is returned as an error; everything
    /// that concerns a single resource ends up in the result.
    pub async fn deploy(
        &self,
        local: Vec<ResourceItem<S::Payload>>,
        options: ReconcileOptions,
        cancel: &CancellationToken,
    ) -> Result<AuthorResult<S::Payload>> {
        let remote = self.client.list().await?;
        Ok(self.deploy_snapshot(local, remote, options, cancel).await)
    }

    /// Deploys `local` against an already fetched remote snapshot.
    pub async fn deploy_snapshot(
        &self,
        local: Vec<ResourceItem<S::Payload>>,
        remote: Vec<ResourceItem<S::Payload>>,
        options: ReconcileOptions,
        cancel: &CancellationToken,
    ) -> AuthorResult<S::Payload> {
        let span = info_span!(
            "deploy",
            service = %self.schema.service(),
            dry_run = options.dry_run,
            reconcile = options.reconcile
        );
        self.run_deploy(local, remote, options, cancel)
            .instrument(span)
            .await
    }

    /// Lists the remote collection and fetches it into `target_dir`.
    pub async fn fetch<F: FileSystem>(
        &self,
        target_dir: &Path,
        local: Vec<ResourceItem<S::Payload>>,
        options: ReconcileOptions,
        fs: &F,
        cancel: &CancellationToken,
    ) -> Result<AuthorResult<S::Payload>> {
        let remote = self.client.list().await?;
        Ok(self
            .fetch_snapshot(target_dir, local, remote, options, fs, cancel)
            .await)
    }

    /// Brings local files in line with a remote snapshot.
    ///
    /// Entries that differ are rewritten with the remote payload, local-only
    /// entries are removed from their file and remote-only entries are
    /// written to `<target_dir>/<name>.<ext>` when `reconcile` is set.
    pub async fn fetch_snapshot<F: FileSystem>(
        &self,
        target_dir: &Path,
        local: Vec<ResourceItem<S::Payload>>,
        remote: Vec<ResourceItem<S::Payload>>,
        options: ReconcileOptions,
        fs: &F,
        cancel: &CancellationToken,
    ) -> AuthorResult<S::Payload> {
        let span = info_span!(
            "fetch",
            service = %self.schema.service(),
            target = %target_dir.display(),
            dry_run = options.dry_run,
            reconcile = options.reconcile
        );
        self.run_fetch(target_dir, local, remote, options, fs, cancel)
            .instrument(span)
            .await
    }

    async fn run_deploy(
        &self,
        local: Vec<ResourceItem<S::Payload>>,
        remote: Vec<ResourceItem<S::Payload>>,
        options: ReconcileOptions,
        cancel: &CancellationToken,
    ) -> AuthorResult<S::Payload> {
        let mut failed = Vec::new();
        let (local, unloaded): (Vec<_>, Vec<_>) =
            local.into_iter().partition(|item| item.content.is_some());
        failed.extend(unloaded);

        let (unique, groups) = filter_duplicates(local);
        failed.extend(reject_duplicates(groups));

        let mut changes = Vec::new();
        let mut unchanged = Vec::new();
        for pairing in self.pair(unique, remote) {
            match pairing {
                Pairing::LocalOnly(item) => changes.push((Action::Create, item)),
                Pairing::Both {
                    local, same: false, ..
                } => changes.push((Action::Update, local)),
                Pairing::Both { local, .. } => unchanged.push(local),
                Pairing::RemoteOnly(item) if options.reconcile => {
                    changes.push((Action::Delete, item))
                }
                Pairing::RemoteOnly(item) => {
                    log::debug!("Ignoring remote-only {} '{}'", self.schema.type_name(), item.id)
                }
            }
        }

        log::info!(
            "Deploy plan for {}: {} change(s), {} unchanged, {} rejected",
            self.schema.service(),
            changes.len(),
            unchanged.len(),
            failed.len()
        );

        for item in &mut unchanged {
            item.status = if options.dry_run {
                Status::dry_run(Action::Unchanged)
            } else {
                Status::up_to_date()
            };
        }

        if options.dry_run {
            for (action, item) in &mut changes {
                item.status = Status::dry_run(*action);
            }
        } else {
            self.apply_remote(&mut changes, cancel).await;
        }

        let mut result = AuthorResult::new(Operation::Deploy, options.dry_run);
        for (action, item) in changes {
            if item.status.is_error() {
                failed.push(item);
                continue;
            }
            match action {
                Action::Create => result.created.push(item),
                Action::Update => result.updated.push(item),
                Action::Delete => result.deleted.push(item),
                Action::Unchanged => result.unchanged.push(item),
            }
        }
        result.unchanged.extend(unchanged);
        result.failed = failed;
        result
    }

    /// Runs every change through the batcher. Each unit writes only the
    /// status of its own item.
    async fn apply_remote(
        &self,
        changes: &mut [(Action, ResourceItem<S::Payload>)],
        cancel: &CancellationToken,
    ) {
        let units = changes
            .iter_mut()
            .map(|(action, item)| self.deploy_one(*action, item));
        let report = self.batcher.run(units, cancel).await;

        for (index, reason) in report.failures() {
            log::debug!("Unit {} did not complete: {}", index, reason);
        }

        for (outcome, (_, item)) in report.into_outcomes().into_iter().zip(changes.iter_mut()) {
            match outcome {
                UnitOutcome::Panicked(message) => {
                    item.status =
                        Status::failed_to_deploy(format!("unexpected panic: {}", message))
                }
                UnitOutcome::Cancelled => item.status = Status::cancelled(),
                UnitOutcome::Completed(()) | UnitOutcome::Failed(_) => {}
            }
        }
    }

    async fn deploy_one(
        &self,
        action: Action,
        item: &mut ResourceItem<S::Payload>,
    ) -> RemoteResult<()> {
        let outcome = match action {
            Action::Create => self.client.create(item).await,
            Action::Update => self.client.update(item).await,
            Action::Delete => self.client.delete(item).await,
            Action::Unchanged => Ok(()),
        };

        match &outcome {
            Ok(()) => item.status = Status::deployed(action),
            Err(e) => {
                log::warn!(
                    "Failed to {} {}: {}",
                    action.to_string().to_lowercase(),
                    item,
                    e
                );
                item.status = Status::failed_to_deploy(e.to_string());
            }
        }
        outcome
    }

    async fn run_fetch<F: FileSystem>(
        &self,
        target_dir: &Path,
        local: Vec<ResourceItem<S::Payload>>,
        remote: Vec<ResourceItem<S::Payload>>,
        options: ReconcileOptions,
        fs: &F,
        cancel: &CancellationToken,
    ) -> AuthorResult<S::Payload> {
        let mut failed = Vec::new();
        let (local, unloaded): (Vec<_>, Vec<_>) =
            local.into_iter().partition(|item| item.content.is_some());
        failed.extend(unloaded);

        // Entry order inside each file, so rewritten files keep their layout.
        let order: HashMap<(PathBuf, String), usize> = local
            .iter()
            .enumerate()
            .map(|(i, item)| ((item.path.clone(), item.name.clone()), i))
            .collect();

        let (unique, groups) = filter_duplicates(local);
        let rejected = reject_duplicates(groups);

        let mut plan = Vec::new();
        for pairing in self.pair(unique, remote) {
            match pairing {
                Pairing::LocalOnly(item) => plan.push((Action::Delete, item)),
                Pairing::Both {
                    mut local,
                    remote,
                    same,
                } => {
                    if same {
                        plan.push((Action::Unchanged, local));
                    } else {
                        local.content = remote.content;
                        plan.push((Action::Update, local));
                    }
                }
                Pairing::RemoteOnly(mut item) if options.reconcile => {
                    if !is_plain_file_stem(&item.name) {
                        log::warn!("Refusing to write remote entry '{}' to disk", item.name);
                        item.status = Status::failed_to_fetch(format!(
                            "'{}' cannot be used as a file name",
                            item.name
                        ));
                        failed.push(item);
                        continue;
                    }
                    item.path = target_dir.join(format!(
                        "{}.{}",
                        item.name,
                        self.schema.file_extension()
                    ));
                    plan.push((Action::Create, item));
                }
                Pairing::RemoteOnly(item) => {
                    log::debug!("Ignoring remote-only {} '{}'", self.schema.type_name(), item.id)
                }
            }
        }

        failed.extend(reject_name_collisions(&mut plan, &rejected));

        if options.dry_run {
            for (action, item) in &mut plan {
                item.status = Status::dry_run(*action);
            }
        } else {
            self.write_files(&mut plan, &rejected, &order, fs, cancel)
                .await;
        }

        failed.extend(rejected);
        let mut result = AuthorResult::new(Operation::Fetch, options.dry_run);
        for (action, item) in plan {
            if item.status.is_error() {
                failed.push(item);
                continue;
            }
            result.fetched.push(item.clone());
            match action {
                Action::Create => result.created.push(item),
                Action::Update => result.updated.push(item),
                Action::Delete => result.deleted.push(item),
                Action::Unchanged => result.unchanged.push(item),
            }
        }
        result.failed = failed;
        result
    }

    /// Rewrites every file touched by the plan and records the outcome on
    /// each entry of those files.
    async fn write_files<F: FileSystem>(
        &self,
        plan: &mut [(Action, ResourceItem<S::Payload>)],
        rejected: &[ResourceItem<S::Payload>],
        order: &HashMap<(PathBuf, String), usize>,
        fs: &F,
        cancel: &CancellationToken,
    ) {
        let mut dirty: Vec<PathBuf> = Vec::new();
        for (action, item) in plan.iter() {
            if *action != Action::Unchanged && !dirty.contains(&item.path) {
                dirty.push(item.path.clone());
            }
        }

        if cancel.is_cancelled() {
            log::info!("Fetch cancelled before writing {} file(s)", dirty.len());
            for (action, item) in plan.iter_mut() {
                item.status = if *action == Action::Unchanged {
                    Status::up_to_date()
                } else {
                    Status::cancelled()
                };
            }
            return;
        }

        let mut errors: HashMap<PathBuf, String> = HashMap::new();
        let mut file_changes = Vec::with_capacity(dirty.len());
        for path in &dirty {
            match self.render_file(path, plan, rejected, order) {
                Ok(change) => file_changes.push(change),
                Err(e) => {
                    errors.insert(path.clone(), e.to_string());
                }
            }
        }

        let (mut written, mut removed) = (0usize, 0usize);
        let results = join_all(file_changes.iter().map(|change| async move {
            match change {
                FileChange::Write { path, text } => {
                    (path, fs.write_all_text(path, text).await)
                }
                FileChange::Delete { path } => (path, fs.delete(path).await),
            }
        }))
        .await;
        for (change, (path, outcome)) in file_changes.iter().zip(results) {
            match outcome {
                Ok(()) => match change {
                    FileChange::Write { .. } => written += 1,
                    FileChange::Delete { .. } => removed += 1,
                },
                Err(e) => {
                    log::warn!("Failed to update {}: {}", path.display(), e);
                    errors.insert(path.clone(), e.to_string());
                }
            }
        }
        log::info!("Fetch wrote {} file(s) and deleted {} file(s)", written, removed);

        for (action, item) in plan.iter_mut() {
            item.status = match errors.get(&item.path) {
                Some(message) => Status::failed_to_fetch(message.clone()),
                None if *action == Action::Unchanged => Status::up_to_date(),
                None => Status::fetched(*action),
            };
        }
    }

    /// Computes the new content of `path`, or its deletion when no entry
    /// remains. Entries rejected as duplicates are kept as they were.
    fn render_file(
        &self,
        path: &Path,
        plan: &[(Action, ResourceItem<S::Payload>)],
        rejected: &[ResourceItem<S::Payload>],
        order: &HashMap<(PathBuf, String), usize>,
    ) -> Result<FileChange> {
        let kept = plan
            .iter()
            .filter(|(action, _)| *action != Action::Delete)
            .map(|(_, item)| item)
            .chain(rejected.iter());

        let mut entries: Vec<(usize, &str, &S::Payload)> = kept
            .filter(|item| item.path == path)
            .filter_map(|item| {
                let rank = order
                    .get(&(item.path.clone(), item.name.clone()))
                    .copied()
                    .unwrap_or(usize::MAX);
                item.content().map(|content| (rank, item.name.as_str(), content))
            })
            .collect();

        if entries.is_empty() {
            return Ok(FileChange::Delete {
                path: path.to_path_buf(),
            });
        }

        entries.sort_by_key(|(rank, _, _)| *rank);
        let entries: Vec<(&str, &S::Payload)> = entries
            .into_iter()
            .map(|(_, name, content)| (name, content))
            .collect();
        Ok(FileChange::Write {
            path: path.to_path_buf(),
            text: self.schema.serialize(&entries)?,
        })
    }

    /// Matches local items with remote items by identifier. Pairings follow
    /// local order, followed by remote-only items in listing order.
    fn pair(
        &self,
        local: Vec<ResourceItem<S::Payload>>,
        remote: Vec<ResourceItem<S::Payload>>,
    ) -> Vec<Pairing<S::Payload>> {
        let mut slots: Vec<Option<ResourceItem<S::Payload>>> =
            remote.into_iter().map(Some).collect();
        let mut index: HashMap<String, usize> = HashMap::new();
        for (i, item) in slots.iter().enumerate() {
            if let Some(item) = item {
                index.entry(item.id.clone()).or_insert(i);
            }
        }

        let mut pairings = Vec::with_capacity(local.len() + slots.len());
        for mut item in local {
            let matched = index.get(&item.id).and_then(|&i| slots[i].take());
            match matched {
                None => pairings.push(Pairing::LocalOnly(item)),
                Some(remote) => {
                    if remote.remote_ref.is_some() {
                        item.remote_ref = remote.remote_ref.clone();
                    }
                    let same = match (&item.content, &remote.content) {
                        (Some(l), Some(r)) => self.schema.content_eq(l, r),
                        _ => false,
                    };
                    pairings.push(Pairing::Both {
                        local: item,
                        remote,
                        same,
                    });
                }
            }
        }
        pairings.extend(slots.into_iter().flatten().map(Pairing::RemoteOnly));
        pairings
    }
}

/// Turns every member of every group into a failed item carrying the short
/// duplicate message.
fn reject_duplicates<P>(groups: Vec<DuplicateGroup<P>>) -> Vec<ResourceItem<P>> {
    let mut rejected = Vec::new();
    for group in groups {
        log::warn!("{}", group.long_message());
        let messages: Vec<String> = (0..group.items.len())
            .map(|i| group.short_message(i))
            .collect();
        for (mut item, message) in group.items.into_iter().zip(messages) {
            item.status = Status::duplicate(message);
            rejected.push(item);
        }
    }
    rejected
}

/// True when `name` can become a file name directly under the target
/// directory.
fn is_plain_file_stem(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(|c: char| c == '/' || c == '\\' || c == '\0')
}

/// Pulls remote-only creations out of the plan when their entry name is
/// already taken in the file they would be written to. Writing them would
/// overwrite one mapping key with another.
fn reject_name_collisions<P>(
    plan: &mut Vec<(Action, ResourceItem<P>)>,
    rejected: &[ResourceItem<P>],
) -> Vec<ResourceItem<P>> {
    let mut taken: HashMap<(PathBuf, String), usize> = HashMap::new();
    let kept = plan
        .iter()
        .filter(|(action, _)| *action != Action::Delete)
        .map(|(_, item)| item)
        .chain(rejected.iter());
    for item in kept {
        *taken
            .entry((item.path.clone(), item.name.clone()))
            .or_default() += 1;
    }

    let (colliding, remaining): (Vec<_>, Vec<_>) =
        std::mem::take(plan).into_iter().partition(|(action, item)| {
            *action == Action::Create
                && taken
                    .get(&(item.path.clone(), item.name.clone()))
                    .is_some_and(|count| *count > 1)
        });
    *plan = remaining;

    colliding
        .into_iter()
        .map(|(_, mut item)| {
            log::warn!(
                "Remote {} shares the entry name '{}' in '{}'",
                item.id,
                item.name,
                item.path.display()
            );
            item.status = Status::failed_to_fetch(format!(
                "entry '{}' already exists in '{}'",
                item.name,
                item.path.display()
            ));
            item
        })
        .collect()
}
