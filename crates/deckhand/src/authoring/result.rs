//! Outcome of one deploy or fetch run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use super::resource::ResourceItem;
use super::status::{Severity, Status};

/// The kind of run a result describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Deploy,
    Fetch,
}

impl Operation {
    pub fn verb(&self) -> &'static str {
        match self {
            Operation::Deploy => "deploy",
            Operation::Fetch => "fetch",
        }
    }

    pub fn past_tense(&self) -> &'static str {
        match self {
            Operation::Deploy => "deployed",
            Operation::Fetch => "fetched",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// Partitioned items of a finished run.
///
/// For a deploy, `created`, `updated`, `deleted`, `unchanged` and `failed`
/// are pairwise disjoint. `fetched` is only filled by a fetch and lists every
/// reconciled entry, changed or not. Lists keep the order in which the diff
/// produced the items.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorResult<P> {
    pub operation: Operation,
    pub dry_run: bool,
    pub created: Vec<ResourceItem<P>>,
    pub updated: Vec<ResourceItem<P>>,
    pub deleted: Vec<ResourceItem<P>>,
    pub unchanged: Vec<ResourceItem<P>>,
    pub fetched: Vec<ResourceItem<P>>,
    pub failed: Vec<ResourceItem<P>>,
    pub completed_at: DateTime<Utc>,
}

/// Per-file roll-up of a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub path: PathBuf,
    pub succeeded: usize,
    pub failed: usize,
    pub status: Status,
}

impl<P> AuthorResult<P> {
    pub fn new(operation: Operation, dry_run: bool) -> Self {
        Self {
            operation,
            dry_run,
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
            unchanged: Vec::new(),
            fetched: Vec::new(),
            failed: Vec::new(),
            completed_at: Utc::now(),
        }
    }

    /// Appends items that failed before reconciliation, e.g. unreadable files.
    pub fn merge_failed(&mut self, items: impl IntoIterator<Item = ResourceItem<P>>) {
        self.failed.extend(items);
    }

    /// Items that reached their intended state (or would, in a dry run).
    pub fn authored(&self) -> Box<dyn Iterator<Item = &ResourceItem<P>> + '_> {
        match self.operation {
            Operation::Fetch => Box::new(self.fetched.iter()),
            Operation::Deploy => Box::new(
                self.created
                    .iter()
                    .chain(&self.updated)
                    .chain(&self.deleted)
                    .chain(&self.unchanged),
            ),
        }
    }

    /// Every item of the result once: authored first, then failed.
    pub fn items(&self) -> impl Iterator<Item = &ResourceItem<P>> + '_ {
        self.authored().chain(&self.failed)
    }

    /// True when nothing was created, updated, deleted or failed.
    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
            && self.updated.is_empty()
            && self.deleted.is_empty()
            && self.failed.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.items()
            .any(|item| item.status.severity == Severity::Error)
    }

    /// Process exit status: non-zero when any item failed.
    pub fn exit_code(&self) -> i32 {
        if self.has_errors() {
            1
        } else {
            0
        }
    }

    /// Rolls items up per origin file. Remote-only items are not files and
    /// are left out.
    pub fn file_summaries(&self) -> Vec<FileSummary> {
        let mut counts: BTreeMap<PathBuf, (usize, usize)> = BTreeMap::new();
        for item in self.items().filter(|item| !item.is_remote()) {
            let entry = counts.entry(item.path.clone()).or_default();
            if item.status.is_error() {
                entry.1 += 1;
            } else {
                entry.0 += 1;
            }
        }

        counts
            .into_iter()
            .map(|(path, (succeeded, failed))| {
                let total = succeeded + failed;
                let status = if failed == 0 {
                    Status::new(
                        capitalize(self.operation.past_tense()),
                        format!("{} resource(s)", total),
                        Severity::None,
                    )
                } else if succeeded == 0 {
                    Status::new(
                        format!("Failed to {}", self.operation),
                        format!("{} resource(s) failed", failed),
                        Severity::Error,
                    )
                } else {
                    Status::partial(format!("{} of {} resource(s) failed", failed, total))
                };
                FileSummary {
                    path,
                    succeeded,
                    failed,
                    status,
                }
            })
            .collect()
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn write_section<P>(
    f: &mut fmt::Formatter<'_>,
    written: &mut bool,
    header: &str,
    items: &[&ResourceItem<P>],
) -> fmt::Result {
    if items.is_empty() {
        return Ok(());
    }
    if *written {
        writeln!(f)?;
    }
    writeln!(f, "{}:", header)?;
    for item in items {
        match item.status.severity {
            Severity::None | Severity::Info => writeln!(f, "    {}", item)?,
            _ => writeln!(
                f,
                "    {} - Status: {} - {}",
                item, item.status.message, item.status.detail
            )?,
        }
    }
    *written = true;
    Ok(())
}

impl<P> fmt::Display for AuthorResult<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.operation;
        let mut written = false;

        if self.dry_run {
            writeln!(
                f,
                "This is a dry run. The result below is the expected result for this operation."
            )?;
            written = true;
        }

        let authored: Vec<_> = self.authored().collect();
        if authored.is_empty() {
            writeln!(f, "No content {}", op.past_tense())?;
            written = true;
        } else if self.dry_run {
            write_section(f, &mut written, &format!("Will {} the following", op), &authored)?;
        } else {
            let header = format!("Successfully {} the following", op.past_tense());
            write_section(f, &mut written, &header, &authored)?;
        }

        let sections: [(&str, &str, &Vec<ResourceItem<P>>); 3] = [
            ("Updated", "Will update", &self.updated),
            ("Deleted", "Will delete", &self.deleted),
            ("Created", "Will create", &self.created),
        ];

        let failed: Vec<_> = self.failed.iter().collect();
        let failed_header = if self.dry_run {
            format!("Will fail to {}", op)
        } else {
            format!("Failed to {}", op)
        };
        write_section(f, &mut written, &failed_header, &failed)?;

        for (header, dry_header, items) in sections {
            let items: Vec<_> = items.iter().collect();
            let header = if self.dry_run { dry_header } else { header };
            write_section(f, &mut written, header, &items)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authoring::status::Action;

    fn item(id: &str, path: &str, status: Status) -> ResourceItem<u32> {
        let mut item = ResourceItem::local(id, id, path, 0);
        item.status = status;
        item
    }

    #[test]
    fn test_empty_result() {
        let result: AuthorResult<u32> = AuthorResult::new(Operation::Deploy, false);
        assert!(result.is_empty());
        assert_eq!(result.exit_code(), 0);
        assert_eq!(result.to_string(), "No content deployed\n");
    }

    #[test]
    fn test_exit_code_reflects_failures() {
        let mut result = AuthorResult::new(Operation::Deploy, false);
        result
            .created
            .push(item("a", "a.lb", Status::deployed(Action::Create)));
        assert_eq!(result.exit_code(), 0);

        result.merge_failed(vec![item("b", "b.lb", Status::failed_to_load("gone"))]);
        assert!(result.has_errors());
        assert_eq!(result.exit_code(), 1);
    }

    #[test]
    fn test_display_sections() {
        let mut result = AuthorResult::new(Operation::Deploy, false);
        result
            .created
            .push(item("a", "a.lb", Status::deployed(Action::Create)));
        result
            .failed
            .push(item("b", "b.lb", Status::failed_to_deploy("server error")));

        let text = result.to_string();
        assert!(text.starts_with("Successfully deployed the following:\n    a in 'a.lb'\n"));
        assert!(text.contains(
            "Failed to deploy:\n    b in 'b.lb' - Status: Failed to deploy - server error\n"
        ));
        assert!(text.contains("Created:\n    a in 'a.lb'\n"));
        assert!(!text.contains("Updated:"));
    }

    #[test]
    fn test_dry_run_display() {
        let mut result = AuthorResult::new(Operation::Fetch, true);
        let created = item("a", "a.lb", Status::dry_run(Action::Create));
        result.fetched.push(created.clone());
        result.created.push(created);

        let text = result.to_string();
        assert!(text.starts_with("This is a dry run."));
        assert!(text.contains("Will fetch the following:"));
        assert!(text.contains("Will create:\n    a in 'a.lb'\n"));
        assert_eq!(result.exit_code(), 0);
    }

    #[test]
    fn test_file_summaries_roll_up_compound_files() {
        let mut result = AuthorResult::new(Operation::Deploy, false);
        result
            .created
            .push(item("a", "mixed.lb", Status::deployed(Action::Create)));
        result
            .failed
            .push(item("b", "mixed.lb", Status::failed_to_deploy("boom")));
        result
            .unchanged
            .push(item("c", "clean.lb", Status::up_to_date()));
        result
            .failed
            .push(item("d", "broken.lb", Status::failed_to_deploy("boom")));
        result.deleted.push({
            let mut remote = ResourceItem::remote("e", "e", 0);
            remote.status = Status::deployed(Action::Delete);
            remote
        });

        let summaries = result.file_summaries();
        let paths: Vec<_> = summaries.iter().map(|s| s.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("broken.lb"),
                PathBuf::from("clean.lb"),
                PathBuf::from("mixed.lb")
            ]
        );
        assert_eq!(summaries[0].status.severity, Severity::Error);
        assert_eq!(summaries[1].status.severity, Severity::None);
        assert_eq!(summaries[1].status.message, "Deployed");
        assert_eq!(summaries[2].status.severity, Severity::Warning);
        assert_eq!(summaries[2].succeeded, 1);
        assert_eq!(summaries[2].failed, 1);
    }

    #[test]
    fn test_serializes_camel_case() {
        let mut result = AuthorResult::new(Operation::Deploy, true);
        result
            .created
            .push(item("a", "a.lb", Status::dry_run(Action::Create)));

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["operation"], "deploy");
        assert_eq!(value["dryRun"], true);
        assert_eq!(value["created"][0]["id"], "a");
        assert_eq!(value["created"][0]["status"]["severity"], "Info");
        assert!(value["completedAt"].is_string());
    }
}
