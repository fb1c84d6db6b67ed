//! Keyed children reconciliation
//!
//! Two cursors walk the old and new keyed lists. On a key mismatch a single
//! step of lookahead on each side classifies the edit:
//!
//! ```text
//! old: x  x'        new: y  y'
//! swap              x == y' && x' == y
//! insert y          x == y'
//! remove x          x' == y
//! remove x, ins y   x' == y'
//! otherwise         stop; drain the rest as removals and appends
//! ```
//!
//! A key that is both removed and inserted in one pass becomes a move, so the
//! live subtree is reused instead of rebuilt. This is linear and deliberately
//! not a minimal edit script.

use super::Differ;
use crate::error::{VdomError, VdomResult};
use crate::node::Node;
use crate::patch::{Insert, InsertSource, MovedSubtree, Patch, PatchKind, Reorder};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Inserted,
    Removed,
    Moved,
}

#[derive(Debug, Clone, Copy)]
enum InsertSlot {
    Positional(usize),
    End(usize),
}

struct Entry {
    state: EntryState,
    node: Node,
    /// Old-tree index of a removal
    index: usize,
    /// Position of the `Remove` patch in the local list
    remove_patch: Option<usize>,
    /// Where the insert for this key was recorded
    insert_slot: Option<InsertSlot>,
}

#[derive(Default)]
struct KeyedPass {
    local: Vec<Patch>,
    changes: HashMap<String, Entry>,
    inserts: Vec<Insert>,
    end_inserts: Vec<Insert>,
}

impl KeyedPass {
    fn insert_at(&mut self, slot: InsertSlot) -> Option<&mut Insert> {
        match slot {
            InsertSlot::Positional(i) => self.inserts.get_mut(i),
            InsertSlot::End(i) => self.end_inserts.get_mut(i),
        }
    }

    fn push_insert(&mut self, insert: Insert) -> InsertSlot {
        if insert.position.is_some() {
            self.inserts.push(insert);
            InsertSlot::Positional(self.inserts.len() - 1)
        } else {
            self.end_inserts.push(insert);
            InsertSlot::End(self.end_inserts.len() - 1)
        }
    }
}

impl Differ<'_> {
    pub(super) fn diff_keyed_kids(
        &self,
        xs: &[(String, Node)],
        ys: &[(String, Node)],
        patches: &mut Vec<Patch>,
        root_index: usize,
    ) -> VdomResult<()> {
        let mut pass = KeyedPass::default();
        let mut x_index = 0;
        let mut y_index = 0;
        let mut index = root_index;

        while x_index < xs.len() && y_index < ys.len() {
            let (x_key, x_node) = &xs[x_index];
            let (y_key, y_node) = &ys[y_index];

            if x_key == y_key {
                index += 1;
                self.diff_help(x_node, y_node, &mut pass.local, index)?;
                index += x_node.descendants();
                x_index += 1;
                y_index += 1;
                continue;
            }

            let x_next = xs.get(x_index + 1);
            let y_next = ys.get(y_index + 1);
            let old_match = x_next.is_some_and(|(key, _)| key == y_key);
            let new_match = y_next.is_some_and(|(key, _)| key == x_key);

            match (x_next, y_next) {
                (Some((_, x_next_node)), Some((_, y_next_node))) if old_match && new_match => {
                    tracing::trace!(x_key = %x_key, y_key = %y_key, "keyed swap");
                    index += 1;
                    self.diff_help(x_node, y_next_node, &mut pass.local, index)?;
                    self.insert_node(&mut pass, y_key, y_node, Some(y_index))?;
                    index += x_node.descendants();

                    index += 1;
                    self.remove_node(&mut pass, y_key, x_next_node, index)?;
                    index += x_next_node.descendants();

                    x_index += 2;
                    y_index += 2;
                }
                (_, Some((_, y_next_node))) if new_match => {
                    tracing::trace!(key = %y_key, "keyed insert");
                    index += 1;
                    self.insert_node(&mut pass, y_key, y_node, Some(y_index))?;
                    self.diff_help(x_node, y_next_node, &mut pass.local, index)?;
                    index += x_node.descendants();

                    x_index += 1;
                    y_index += 2;
                }
                (Some((_, x_next_node)), _) if old_match => {
                    tracing::trace!(key = %x_key, "keyed remove");
                    index += 1;
                    self.remove_node(&mut pass, x_key, x_node, index)?;
                    index += x_node.descendants();

                    index += 1;
                    self.diff_help(x_next_node, y_node, &mut pass.local, index)?;
                    index += x_next_node.descendants();

                    x_index += 2;
                    y_index += 1;
                }
                (Some((x_next_key, x_next_node)), Some((y_next_key, y_next_node)))
                    if x_next_key == y_next_key =>
                {
                    tracing::trace!(x_key = %x_key, y_key = %y_key, "keyed replace");
                    index += 1;
                    self.remove_node(&mut pass, x_key, x_node, index)?;
                    self.insert_node(&mut pass, y_key, y_node, Some(y_index))?;
                    index += x_node.descendants();

                    index += 1;
                    self.diff_help(x_next_node, y_next_node, &mut pass.local, index)?;
                    index += x_next_node.descendants();

                    x_index += 2;
                    y_index += 2;
                }
                _ => {
                    tracing::trace!(x_index, y_index, "lookahead failed, draining");
                    break;
                }
            }
        }

        while x_index < xs.len() {
            index += 1;
            let (key, node) = &xs[x_index];
            self.remove_node(&mut pass, key, node, index)?;
            index += node.descendants();
            x_index += 1;
        }

        while y_index < ys.len() {
            let (key, node) = &ys[y_index];
            self.insert_node(&mut pass, key, node, None)?;
            y_index += 1;
        }

        if !pass.local.is_empty() || !pass.inserts.is_empty() || !pass.end_inserts.is_empty() {
            patches.push(Patch::new(
                root_index,
                PatchKind::Reorder(Reorder {
                    patches: pass.local,
                    inserts: pass.inserts,
                    end_inserts: pass.end_inserts,
                }),
            ));
        }
        Ok(())
    }

    fn insert_node(
        &self,
        pass: &mut KeyedPass,
        key: &str,
        node: &Node,
        position: Option<usize>,
    ) -> VdomResult<()> {
        let mut key = key.to_string();
        loop {
            let Some(entry) = pass.changes.get_mut(&key) else {
                let slot = pass.push_insert(Insert {
                    position,
                    key: key.clone(),
                    source: InsertSource::Render(node.clone()),
                });
                pass.changes.insert(
                    key,
                    Entry {
                        state: EntryState::Inserted,
                        node: node.clone(),
                        index: 0,
                        remove_patch: None,
                        insert_slot: Some(slot),
                    },
                );
                return Ok(());
            };

            if entry.state == EntryState::Removed {
                entry.state = EntryState::Moved;
                let old = entry.node.clone();
                let old_index = entry.index;
                let remove_patch = entry.remove_patch;
                pass.push_insert(Insert {
                    position,
                    key: key.clone(),
                    source: InsertSource::Move,
                });

                let mut sub = Vec::new();
                self.diff_help(&old, node, &mut sub, old_index)?;
                let patch = remove_patch
                    .and_then(|i| pass.local.get_mut(i))
                    .ok_or_else(|| VdomError::integrity(format!("removal of {key} not recorded")))?;
                patch.kind = PatchKind::Remove(Some(MovedSubtree { key, patches: sub }));
                return Ok(());
            }

            tracing::warn!(key = %key, "duplicate key inserted in keyed children");
            key.push_str(self.duplicate_key_suffix);
        }
    }

    fn remove_node(
        &self,
        pass: &mut KeyedPass,
        key: &str,
        node: &Node,
        index: usize,
    ) -> VdomResult<()> {
        let mut key = key.to_string();
        loop {
            let Some(entry) = pass.changes.get_mut(&key) else {
                pass.local.push(Patch::new(index, PatchKind::Remove(None)));
                pass.changes.insert(
                    key,
                    Entry {
                        state: EntryState::Removed,
                        node: node.clone(),
                        index,
                        remove_patch: Some(pass.local.len() - 1),
                        insert_slot: None,
                    },
                );
                return Ok(());
            };

            if entry.state == EntryState::Inserted {
                entry.state = EntryState::Moved;
                let new = entry.node.clone();
                let slot = entry.insert_slot;

                let mut sub = Vec::new();
                self.diff_help(node, &new, &mut sub, index)?;
                pass.local.push(Patch::new(
                    index,
                    PatchKind::Remove(Some(MovedSubtree {
                        key: key.clone(),
                        patches: sub,
                    })),
                ));
                let insert = slot
                    .and_then(|slot| pass.insert_at(slot))
                    .ok_or_else(|| VdomError::integrity(format!("insert of {key} not recorded")))?;
                insert.source = InsertSource::Move;
                return Ok(());
            }

            tracing::warn!(key = %key, "duplicate key removed from keyed children");
            key.push_str(self.duplicate_key_suffix);
        }
    }
}
