// ============================================================================
// Result set diffing
// ============================================================================
//
// Only records touched by a commit are classified; everything else keeps its
// relative order and its index shifts follow from the reported inserts and
// deletes. Each touched record yields at most one instruction:
//
//   absent  -> present                          Insert  (new path)
//   present -> absent                           Delete  (old path)
//   present -> present, other section or rank   Move    (old -> new path)
//   present -> present, document changed       Update  (old path)
//
// "Rank" is the position among records present both before and after.
//
// ============================================================================

use super::results::ResultsSnapshot;
use crate::core::{IndexPath, ObjectId};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionChange {
    Insert(usize),
    Delete(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectChange {
    Insert { id: ObjectId, at: IndexPath },
    Delete { id: ObjectId, at: IndexPath },
    Update { id: ObjectId, at: IndexPath },
    Move { id: ObjectId, from: IndexPath, to: IndexPath },
}

impl ObjectChange {
    pub fn id(&self) -> ObjectId {
        match self {
            ObjectChange::Insert { id, .. }
            | ObjectChange::Delete { id, .. }
            | ObjectChange::Update { id, .. }
            | ObjectChange::Move { id, .. } => *id,
        }
    }
}

/// Everything one commit changed in a live result set.
///
/// Order: section deletes, section inserts, then object deletes, inserts,
/// updates and moves, each group sorted by index path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeBatch {
    /// Store version the batch brings the results to
    pub version: u64,
    pub section_changes: Vec<SectionChange>,
    pub changes: Vec<ObjectChange>,
}

impl ChangeBatch {
    pub fn is_empty(&self) -> bool {
        self.section_changes.is_empty() && self.changes.is_empty()
    }

    pub fn inserts(&self) -> impl Iterator<Item = &ObjectChange> {
        self.changes
            .iter()
            .filter(|c| matches!(c, ObjectChange::Insert { .. }))
    }

    pub fn deletes(&self) -> impl Iterator<Item = &ObjectChange> {
        self.changes
            .iter()
            .filter(|c| matches!(c, ObjectChange::Delete { .. }))
    }

    pub fn updates(&self) -> impl Iterator<Item = &ObjectChange> {
        self.changes
            .iter()
            .filter(|c| matches!(c, ObjectChange::Update { .. }))
    }

    pub fn moves(&self) -> impl Iterator<Item = &ObjectChange> {
        self.changes
            .iter()
            .filter(|c| matches!(c, ObjectChange::Move { .. }))
    }
}

fn survivor_ranks(
    results: &ResultsSnapshot,
    other: &ResultsSnapshot,
) -> HashMap<ObjectId, usize> {
    results
        .records()
        .filter(|record| other.contains(record.id()))
        .enumerate()
        .map(|(rank, record)| (record.id(), rank))
        .collect()
}

pub fn diff(
    old: &ResultsSnapshot,
    new: &ResultsSnapshot,
    touched: &[ObjectId],
    version: u64,
) -> ChangeBatch {
    let mut section_deletes: Vec<usize> = old
        .section_keys()
        .enumerate()
        .filter(|(_, key)| new.section_index(key).is_none())
        .map(|(index, _)| index)
        .collect();
    let mut section_inserts: Vec<usize> = new
        .section_keys()
        .enumerate()
        .filter(|(_, key)| old.section_index(key).is_none())
        .map(|(index, _)| index)
        .collect();
    section_deletes.sort_unstable();
    section_inserts.sort_unstable();

    let old_ranks = survivor_ranks(old, new);
    let new_ranks = survivor_ranks(new, old);

    let mut deletes = Vec::new();
    let mut inserts = Vec::new();
    let mut updates = Vec::new();
    let mut moves = Vec::new();
    let mut seen = HashSet::new();

    for &id in touched {
        if !seen.insert(id) {
            continue;
        }

        match (old.index_path_of(id), new.index_path_of(id)) {
            (None, None) => {}
            (None, Some(at)) => inserts.push(ObjectChange::Insert { id, at }),
            (Some(at), None) => deletes.push(ObjectChange::Delete { id, at }),
            (Some(from), Some(to)) => {
                let moved_section = old.section_key(from.section) != new.section_key(to.section);
                let moved_rank = old_ranks.get(&id) != new_ranks.get(&id);

                if moved_section || moved_rank {
                    moves.push(ObjectChange::Move { id, from, to });
                } else {
                    let changed = match (old.object_at(from), new.object_at(to)) {
                        (Some(before), Some(after)) => !before.same_content(after),
                        _ => false,
                    };
                    if changed {
                        updates.push(ObjectChange::Update { id, at: from });
                    }
                }
            }
        }
    }

    let path = |change: &ObjectChange| match change {
        ObjectChange::Insert { at, .. }
        | ObjectChange::Delete { at, .. }
        | ObjectChange::Update { at, .. } => *at,
        ObjectChange::Move { to, .. } => *to,
    };
    for group in [&mut deletes, &mut inserts, &mut updates, &mut moves] {
        group.sort_by_key(path);
    }

    let section_changes = section_deletes
        .into_iter()
        .map(SectionChange::Delete)
        .chain(section_inserts.into_iter().map(SectionChange::Insert))
        .collect();

    ChangeBatch {
        version,
        section_changes,
        changes: deletes
            .into_iter()
            .chain(inserts)
            .chain(updates)
            .chain(moves)
            .collect(),
    }
}
