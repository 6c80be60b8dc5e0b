//! Epoch-scoped local identifier allocation.

use std::collections::HashMap;

/// First local id handed out within an epoch.
pub const LOCAL_ID_BASE: u32 = 1;

/// Immutable bijection between compact local ids and canonical feed ids,
/// valid only within the epoch that built it.
///
/// Ids are assigned in encounter order, not canonical-id order, keeping
/// allocation O(1) per record. The same canonical id may map to a different
/// local id after the next refresh.
#[derive(Debug, Default)]
pub struct LocalIdTable {
    /// `by_local[i]` holds the canonical id for local id `LOCAL_ID_BASE + i`.
    by_local: Vec<String>,
    by_canonical: HashMap<String, u32>,
}

impl LocalIdTable {
    /// Assign local ids to `canonical_ids` in encounter order, starting at
    /// [`LOCAL_ID_BASE`]. A repeated canonical id keeps its first assignment.
    pub fn allocate<'a>(canonical_ids: impl IntoIterator<Item = &'a str>) -> Self {
        let mut table = Self::default();
        for canonical in canonical_ids {
            if table.by_canonical.contains_key(canonical) {
                continue;
            }
            let local = LOCAL_ID_BASE + table.by_local.len() as u32;
            table.by_canonical.insert(canonical.to_string(), local);
            table.by_local.push(canonical.to_string());
        }
        table
    }

    /// Canonical id behind `local`, if it was allocated in this epoch.
    pub fn canonical_of(&self, local: u32) -> Option<&str> {
        local
            .checked_sub(LOCAL_ID_BASE)
            .and_then(|idx| self.by_local.get(idx as usize))
            .map(String::as_str)
    }

    /// Local id assigned to `canonical`, if present in this epoch.
    pub fn local_of(&self, canonical: &str) -> Option<u32> {
        self.by_canonical.get(canonical).copied()
    }

    pub fn len(&self) -> usize {
        self.by_local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_local.is_empty()
    }

    /// Iterate `(local, canonical)` pairs in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.by_local
            .iter()
            .enumerate()
            .map(|(idx, canonical)| (LOCAL_ID_BASE + idx as u32, canonical.as_str()))
    }
}
