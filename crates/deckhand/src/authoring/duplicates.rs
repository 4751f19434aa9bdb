//! Detection of resources sharing an identifier.

use std::collections::HashMap;

use super::resource::ResourceItem;

/// Items that share one identifier.
#[derive(Debug, Clone)]
pub struct DuplicateGroup<P> {
    pub id: String,
    pub items: Vec<ResourceItem<P>>,
}

impl<P> DuplicateGroup<P> {
    /// Paths of every member of the group, in input order.
    pub fn paths(&self) -> Vec<String> {
        self.items
            .iter()
            .map(|item| item.path.display().to_string())
            .collect()
    }

    /// Short message shown next to the member at `index`: names the other
    /// paths it conflicts with.
    pub fn short_message(&self, index: usize) -> String {
        let others: Vec<String> = self
            .items
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, item)| format!("'{}'", item.path.display()))
            .collect();
        format!(
            "Identifier '{}' is also defined in {}",
            self.id,
            others.join(", ")
        )
    }

    /// Long explanatory message for top-level error reporting.
    pub fn long_message(&self) -> String {
        let paths: Vec<String> = self
            .paths()
            .into_iter()
            .map(|p| format!("'{}'", p))
            .collect();
        format!(
            "Multiple resources with the identifier '{}' were found in {}. \
             Only one resource per identifier can be deployed; none of them \
             were processed. Rename or remove the extra definitions and try again.",
            self.id,
            paths.join(", ")
        )
    }
}

/// Splits `items` into the accepted set and the duplicate groups.
///
/// Any identifier shared by more than one item forms a group; every member of
/// a group is rejected. Accepted items and group members keep their input
/// order, and groups are ordered by the first appearance of their identifier.
pub fn filter_duplicates<P>(
    items: Vec<ResourceItem<P>>,
) -> (Vec<ResourceItem<P>>, Vec<DuplicateGroup<P>>) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for item in &items {
        *counts.entry(item.id.clone()).or_default() += 1;
    }

    let mut unique = Vec::with_capacity(items.len());
    let mut groups: Vec<DuplicateGroup<P>> = Vec::new();
    let mut group_index: HashMap<String, usize> = HashMap::new();

    for item in items {
        if counts.get(&item.id).copied().unwrap_or(0) <= 1 {
            unique.push(item);
            continue;
        }
        match group_index.get(&item.id) {
            Some(&i) => groups[i].items.push(item),
            None => {
                group_index.insert(item.id.clone(), groups.len());
                groups.push(DuplicateGroup {
                    id: item.id.clone(),
                    items: vec![item],
                });
            }
        }
    }

    if !groups.is_empty() {
        log::debug!(
            "Rejected {} duplicate identifier group(s): {}",
            groups.len(),
            groups
                .iter()
                .map(|g| g.id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    (unique, groups)
}
