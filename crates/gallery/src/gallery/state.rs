//! Ordered entry collection of one open gallery.
//!
//! Entries are always held sorted by `sort_order`. Every settled state
//! satisfies:
//!
//! 1. `sort_order` values are exactly `0..n-1`
//! 2. exactly one entry is primary, or none when the gallery is empty
//! 3. entry IDs are unique
//!
//! [`GalleryState::violations`] reports any of these that do not hold.

use std::collections::{BTreeMap, HashSet};

use opsdesk_core::{Entry, EntryId, GalleryImage, ImageId, ImagePatch};
use serde::Serialize;

/// A broken collection invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// The entry at `position` does not carry `sort_order == position`.
    SortOrder {
        id: EntryId,
        position: usize,
        sort_order: i32,
    },
    /// Two entries share an ID.
    DuplicateId { id: EntryId },
    /// The number of primary entries is wrong for the collection size.
    PrimaryCount { expected: usize, found: usize },
}

/// Entries and in-flight bookkeeping of an open gallery.
#[derive(Debug, Clone, Default)]
pub struct GalleryState {
    entries: Vec<Entry>,
    /// Collection-level operations in flight.
    collection_ops: usize,
}

/// Result of normalizing a fetched collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    /// Canonical entries, sorted and renumbered.
    pub entries: Vec<Entry>,
    /// Updates that bring the store in line with `entries`.
    pub repairs: Vec<(ImageId, ImagePatch)>,
}

impl GalleryState {
    /// Create a state holding already-canonical entries.
    #[must_use]
    pub fn new(mut entries: Vec<Entry>) -> Self {
        entries.sort_by_key(|entry| entry.sort_order);
        Self {
            entries,
            collection_ops: 0,
        }
    }

    // =========================================================================
    // Read projections
    // =========================================================================

    /// Entries in display order.
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at a display position.
    #[must_use]
    pub fn entry_at(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    #[must_use]
    pub fn get(&self, id: &EntryId) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.id == *id)
    }

    #[must_use]
    pub fn position(&self, id: &EntryId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == *id)
    }

    /// The current primary entry.
    #[must_use]
    pub fn primary(&self) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.is_primary)
    }

    /// Whether any entry has an operation in flight.
    #[must_use]
    pub fn is_any_busy(&self) -> bool {
        self.entries.iter().any(|entry| !entry.is_idle())
    }

    /// The busy gate: any entry busy or any collection-level operation in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.collection_ops > 0 || self.is_any_busy()
    }

    /// Sort order for the next appended entry (current max + 1).
    #[must_use]
    pub fn next_sort_order(&self) -> i32 {
        self.entries
            .iter()
            .map(|entry| entry.sort_order)
            .max()
            .map_or(0, |max| max.saturating_add(1))
    }

    /// Check the collection invariants.
    #[must_use]
    pub fn violations(&self) -> Vec<Violation> {
        let mut violations = Vec::new();

        for (position, entry) in self.entries.iter().enumerate() {
            if usize::try_from(entry.sort_order).ok() != Some(position) {
                violations.push(Violation::SortOrder {
                    id: entry.id,
                    position,
                    sort_order: entry.sort_order,
                });
            }
        }

        let mut seen = HashSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.id) {
                violations.push(Violation::DuplicateId { id: entry.id });
            }
        }

        let expected = usize::from(!self.entries.is_empty());
        let found = self.entries.iter().filter(|entry| entry.is_primary).count();
        if found != expected {
            violations.push(Violation::PrimaryCount { expected, found });
        }

        violations
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    pub(crate) fn get_mut(&mut self, id: &EntryId) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|entry| entry.id == *id)
    }

    pub(crate) fn entries_mut(&mut self) -> &mut Vec<Entry> {
        &mut self.entries
    }

    /// Swap a placeholder for its persisted record, keeping its position.
    pub(crate) fn settle(&mut self, placeholder: &EntryId, persisted: Entry) {
        match self.get_mut(placeholder) {
            Some(entry) => *entry = persisted,
            None => {
                self.entries.push(persisted);
                self.entries.sort_by_key(|entry| entry.sort_order);
            }
        }
    }

    pub(crate) fn remove(&mut self, id: &EntryId) -> Option<Entry> {
        let position = self.position(id)?;
        Some(self.entries.remove(position))
    }

    /// Reassign `sort_order = position` to every entry.
    pub(crate) fn renumber(&mut self) {
        renumber(&mut self.entries);
    }

    /// Replace all entries, keeping in-flight bookkeeping.
    pub(crate) fn replace_all(&mut self, entries: Vec<Entry>) {
        self.entries = entries;
        self.entries.sort_by_key(|entry| entry.sort_order);
    }

    /// Canonicalize the local entries without consulting the store.
    pub(crate) fn normalize_in_place(&mut self) {
        canonicalize(&mut self.entries);
    }

    pub(crate) const fn begin_collection_op(&mut self) {
        self.collection_ops += 1;
    }

    pub(crate) const fn end_collection_op(&mut self) {
        self.collection_ops = self.collection_ops.saturating_sub(1);
    }
}

/// Turn a fetched record list into canonical entries plus repair updates.
///
/// Records are ordered by `(sort_order, id)`, duplicates dropped, positions
/// renumbered, and the first primary kept (or the first entry promoted).
#[must_use]
pub fn normalize(images: Vec<GalleryImage>) -> Normalized {
    let fetched: Vec<Entry> = images.into_iter().map(Entry::from).collect();
    let mut entries = fetched.clone();
    canonicalize(&mut entries);

    let repairs = changes(&fetched, &entries);
    Normalized { entries, repairs }
}

/// Store updates needed to turn `before` into `after`.
///
/// Compares `sort_order` and `is_primary` of entries present in both lists;
/// placeholders are skipped. One merged patch per image, ordered by ID.
#[must_use]
pub fn changes(before: &[Entry], after: &[Entry]) -> Vec<(ImageId, ImagePatch)> {
    let mut patches: BTreeMap<ImageId, ImagePatch> = BTreeMap::new();

    for new in after {
        let Some(id) = new.id.persisted() else {
            continue;
        };
        // First occurrence wins, matching canonicalize's dedupe.
        let Some(old) = before.iter().find(|old| old.id == new.id) else {
            continue;
        };

        if old.sort_order != new.sort_order {
            patches
                .entry(id)
                .or_default()
                .merge(ImagePatch::sort_order(new.sort_order));
        }
        if old.is_primary != new.is_primary {
            patches
                .entry(id)
                .or_default()
                .merge(ImagePatch::primary(new.is_primary));
        }
    }

    patches.into_iter().collect()
}

fn canonicalize(entries: &mut Vec<Entry>) {
    entries.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.id.cmp(&b.id)));

    let mut seen = HashSet::new();
    entries.retain(|entry| seen.insert(entry.id));

    renumber(entries);

    let mut has_primary = false;
    for entry in entries.iter_mut() {
        if entry.is_primary {
            entry.is_primary = !has_primary;
            has_primary = true;
        }
    }
    if !has_primary && let Some(first) = entries.first_mut() {
        first.is_primary = true;
    }
}

fn renumber(entries: &mut [Entry]) {
    for (position, entry) in entries.iter_mut().enumerate() {
        entry.sort_order = i32::try_from(position).unwrap_or(i32::MAX);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use opsdesk_core::{EntryStatus, Owner, ProductId};

    use super::*;

    pub(crate) fn image(id: i64, sort_order: i32, is_primary: bool) -> GalleryImage {
        GalleryImage {
            id: ImageId::new(id),
            owner: Owner::product(ProductId::new(1)),
            image_url: format!("https://cdn.example.com/{id}.png"),
            sort_order,
            is_primary,
            alt_text: None,
        }
    }

    pub(crate) fn state(images: &[(i64, bool)]) -> GalleryState {
        GalleryState::new(
            images
                .iter()
                .enumerate()
                .map(|(position, &(id, is_primary))| {
                    Entry::from(image(
                        id,
                        i32::try_from(position).unwrap_or_default(),
                        is_primary,
                    ))
                })
                .collect(),
        )
    }

    fn ids(entries: &[Entry]) -> Vec<i64> {
        entries
            .iter()
            .filter_map(|entry| entry.id.persisted())
            .map(|id| id.as_i64())
            .collect()
    }

    #[test]
    fn test_canonical_state_has_no_violations() {
        let state = state(&[(1, true), (2, false), (3, false)]);
        assert!(state.violations().is_empty());
        assert!(GalleryState::default().violations().is_empty());
    }

    #[test]
    fn test_violations_detected() {
        let mut state = state(&[(1, true), (2, true)]);
        state.entries_mut()[1].sort_order = 5;

        let violations = state.violations();
        assert!(violations.contains(&Violation::PrimaryCount {
            expected: 1,
            found: 2
        }));
        assert!(violations.iter().any(|v| matches!(
            v,
            Violation::SortOrder {
                position: 1,
                sort_order: 5,
                ..
            }
        )));
    }

    #[test]
    fn test_normalize_sorts_renumbers_and_repairs() {
        let normalized = normalize(vec![
            image(3, 7, false),
            image(1, 2, false),
            image(2, 2, true),
        ]);

        assert_eq!(ids(&normalized.entries), vec![1, 2, 3]);
        assert_eq!(
            normalized
                .entries
                .iter()
                .map(|e| e.sort_order)
                .collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(normalized.entries[1].is_primary);
        assert_eq!(
            normalized.repairs,
            vec![
                (ImageId::new(1), ImagePatch::sort_order(0)),
                (ImageId::new(2), ImagePatch::sort_order(1)),
                (ImageId::new(3), ImagePatch::sort_order(2)),
            ]
        );
    }

    #[test]
    fn test_normalize_promotes_when_no_primary() {
        let normalized = normalize(vec![image(4, 1, false), image(5, 0, false)]);
        assert_eq!(ids(&normalized.entries), vec![5, 4]);
        assert!(normalized.entries[0].is_primary);
        assert_eq!(
            normalized.repairs,
            vec![(ImageId::new(5), ImagePatch::primary(true))]
        );
    }

    #[test]
    fn test_normalize_keeps_first_primary_only() {
        let normalized = normalize(vec![image(1, 0, true), image(2, 1, true)]);
        assert!(normalized.entries[0].is_primary);
        assert!(!normalized.entries[1].is_primary);
        assert_eq!(
            normalized.repairs,
            vec![(ImageId::new(2), ImagePatch::primary(false))]
        );
    }

    #[test]
    fn test_normalize_drops_duplicates() {
        let normalized = normalize(vec![image(1, 0, true), image(1, 1, false)]);
        assert_eq!(normalized.entries.len(), 1);
        assert!(normalized.entries[0].is_primary);
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize(Vec::new()), Normalized::default());
    }

    #[test]
    fn test_changes_merges_fields_per_image() {
        let before = state(&[(1, true), (2, false)]);
        let mut after = before.clone();
        after.entries_mut().reverse();
        after.renumber();
        for entry in after.entries_mut() {
            entry.is_primary = entry.id == EntryId::Persisted(ImageId::new(2));
        }

        let patches = changes(before.entries(), after.entries());
        assert_eq!(patches.len(), 2);
        assert_eq!(
            patches[1],
            (
                ImageId::new(2),
                ImagePatch {
                    sort_order: Some(0),
                    is_primary: Some(true),
                    ..ImagePatch::default()
                }
            )
        );
    }

    #[test]
    fn test_busy_gate() {
        let mut state = state(&[(1, true)]);
        assert!(!state.is_busy());

        state.begin_collection_op();
        assert!(state.is_busy());
        assert!(!state.is_any_busy());
        state.end_collection_op();
        assert!(!state.is_busy());

        state.entries_mut()[0].status = EntryStatus::Deleting;
        assert!(state.is_any_busy());
        assert!(state.is_busy());
    }

    #[test]
    fn test_next_sort_order() {
        assert_eq!(GalleryState::default().next_sort_order(), 0);
        assert_eq!(state(&[(1, true), (2, false)]).next_sort_order(), 2);
    }

    #[test]
    fn test_normalize_in_place_keeps_status() {
        let mut state = state(&[(1, true), (2, false), (3, false)]);
        state.remove(&EntryId::Persisted(ImageId::new(1)));
        state.entries_mut()[0].status = EntryStatus::Updating;

        state.normalize_in_place();

        assert!(state.violations().is_empty());
        assert_eq!(state.entries()[0].status, EntryStatus::Updating);
    }
}
