// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/duckdb-behavioral)

//! Shared structure store: a reference-counted DAG of accepted events.
//!
//! Partial matches that share a prefix share the entries for that prefix. An
//! entry is keyed by `(pattern name, event id)`: the same event accepted by
//! the same node is stored once, no matter how many partial matches contain
//! it. Each entry holds one edge per distinct predecessor, and a [`NodeRef`]
//! names one entry *and* one of its edges, which identifies exactly one
//! history back to the first accepted event.
//!
//! # Reference counting
//!
//! An edge is held by every computation state whose `previous_entry` is that
//! edge, and by every successor edge that points at it. The entry count is
//! the sum of its edge counts. When an edge reaches zero it is removed and its
//! predecessor released in turn; when an entry reaches zero it is freed and
//! its event unlocked. Release walks the chain iteratively, so long chains
//! cannot overflow the stack.
//!
//! Events live in a separate table with their own lock count. The runtime
//! registers each incoming event with one lock, which it drops once the event
//! is processed; events no entry took are therefore dropped immediately.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::common::event::EventId;
use crate::error::BufferError;
use crate::nfa::output::Match;

/// Ordered `pattern name -> event ids` view of one partial match.
pub type EventPath = Vec<(Arc<str>, Vec<EventId>)>;

/// Handle on one edge of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    /// Entry slot.
    pub entry: u32,
    /// Edge slot inside the entry.
    pub edge: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Edge {
    predecessor: Option<NodeRef>,
    ref_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SharedEntry {
    page: Arc<str>,
    event: EventId,
    edges: Vec<Option<Edge>>,
    ref_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Lockable<E> {
    element: E,
    locks: u32,
}

/// Arena-backed shared buffer for one key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedBuffer<E> {
    entries: Vec<Option<SharedEntry>>,
    free: Vec<u32>,
    index: HashMap<(Arc<str>, EventId), u32>,
    events: HashMap<EventId, Lockable<E>>,
    next_sequence: u64,
}

impl<E> Default for SharedBuffer<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> SharedBuffer<E> {
    /// Empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            events: HashMap::new(),
            next_sequence: 0,
        }
    }

    /// Stores `event` with one lock held by the caller.
    pub fn register_event(&mut self, event: E, timestamp: i64) -> EventId {
        let id = EventId::new(timestamp, self.next_sequence);
        self.next_sequence += 1;
        self.events.insert(
            id,
            Lockable {
                element: event,
                locks: 1,
            },
        );
        id
    }

    /// Drops the caller's lock on an event; the event is removed once no
    /// entry refers to it.
    pub fn release_event(&mut self, id: EventId) -> Result<(), BufferError> {
        let stored = self.events.get_mut(&id).ok_or(BufferError::MissingEvent(id))?;
        stored.locks = stored.locks.saturating_sub(1);
        if stored.locks == 0 {
            self.events.remove(&id);
        }
        Ok(())
    }

    /// Borrow a stored event.
    pub fn event(&self, id: EventId) -> Option<&E> {
        self.events.get(&id).map(|stored| &stored.element)
    }

    /// Records that `page` accepted `event` after `previous`.
    ///
    /// Returns a reference already counted once for the caller. An identical
    /// `(page, event, previous)` triple reuses the existing edge.
    pub fn put(
        &mut self,
        page: &Arc<str>,
        event: EventId,
        previous: Option<NodeRef>,
    ) -> Result<NodeRef, BufferError> {
        if !self.events.contains_key(&event) {
            return Err(BufferError::MissingEvent(event));
        }
        if let Some(prev) = previous {
            self.edge(prev)?;
        }

        let key = (Arc::clone(page), event);
        let entry_id = match self.index.get(&key) {
            Some(id) => *id,
            None => {
                let id = self.allocate(SharedEntry {
                    page: Arc::clone(page),
                    event,
                    edges: Vec::new(),
                    ref_count: 0,
                });
                self.index.insert(key, id);
                self.lock_event(event)?;
                id
            }
        };

        let entry = self.entry_mut(entry_id)?;
        entry.ref_count += 1;
        let existing = entry
            .edges
            .iter()
            .position(|slot| matches!(slot, Some(edge) if edge.predecessor == previous));
        if let Some(pos) = existing {
            if let Some(edge) = entry.edges[pos].as_mut() {
                edge.ref_count += 1;
            }
            return Ok(NodeRef {
                entry: entry_id,
                edge: pos as u32,
            });
        }

        entry.edges.push(Some(Edge {
            predecessor: previous,
            ref_count: 1,
        }));
        let node = NodeRef {
            entry: entry_id,
            edge: (entry.edges.len() - 1) as u32,
        };
        if let Some(prev) = previous {
            self.retain(prev)?;
        }
        Ok(node)
    }

    /// Adds one holder to `node`.
    pub fn retain(&mut self, node: NodeRef) -> Result<(), BufferError> {
        let entry = self.entry_mut(node.entry)?;
        let edge = entry
            .edges
            .get_mut(node.edge as usize)
            .and_then(Option::as_mut)
            .ok_or(BufferError::DanglingReference {
                entry: node.entry,
                edge: node.edge,
            })?;
        edge.ref_count += 1;
        entry.ref_count += 1;
        Ok(())
    }

    /// Drops one holder of `node`, reclaiming every edge and entry that is no
    /// longer referenced.
    pub fn release(&mut self, node: NodeRef) -> Result<(), BufferError> {
        let mut next = Some(node);
        while let Some(node) = next.take() {
            let dangling = BufferError::DanglingReference {
                entry: node.entry,
                edge: node.edge,
            };
            let entry = self.entry_mut(node.entry)?;
            let slot = entry
                .edges
                .get_mut(node.edge as usize)
                .ok_or_else(|| dangling.clone())?;
            let edge = slot.as_mut().ok_or(dangling)?;
            edge.ref_count = edge.ref_count.saturating_sub(1);
            if edge.ref_count == 0 {
                next = edge.predecessor;
                *slot = None;
            }
            entry.ref_count = entry.ref_count.saturating_sub(1);
            if entry.ref_count == 0 {
                self.free_entry(node.entry)?;
            }
        }
        Ok(())
    }

    /// Walks from `node` back to the first accepted event and groups the
    /// event ids by pattern name, in the order the names first occur. Never
    /// mutates the buffer.
    pub fn extract(&self, node: NodeRef) -> Result<EventPath, BufferError> {
        let mut chain = Vec::new();
        let mut current = Some(node);
        while let Some(node) = current {
            let entry = self.entry(node.entry)?;
            let edge = self.edge(node)?;
            chain.push((&entry.page, entry.event));
            current = edge.predecessor;
        }
        chain.reverse();

        let mut path: EventPath = Vec::new();
        for (page, event) in chain {
            match path.iter_mut().find(|(name, _)| name == page) {
                Some((_, ids)) => ids.push(event),
                None => path.push((Arc::clone(page), vec![event])),
            }
        }
        Ok(path)
    }

    /// Clones the events of `path` into a [`Match`].
    pub fn materialize(&self, path: &EventPath) -> Result<Match<E>, BufferError>
    where
        E: Clone,
    {
        let mut groups = Vec::with_capacity(path.len());
        for (name, ids) in path {
            let events = ids
                .iter()
                .map(|id| self.event(*id).cloned().ok_or(BufferError::MissingEvent(*id)))
                .collect::<Result<Vec<_>, _>>()?;
            groups.push((Arc::clone(name), events));
        }
        Ok(Match::new(groups))
    }

    /// Compaction pass.
    ///
    /// `release` reclaims eagerly, so this normally finds nothing. It drops
    /// unreferenced edges and entries, unlocked events older than
    /// `low_watermark`, and trailing free slots. Returns the number of items
    /// removed.
    pub fn prune(&mut self, low_watermark: i64) -> usize {
        let mut removed = 0;
        let mut orphaned = Vec::new();
        for slot in 0..self.entries.len() {
            let Some(entry) = self.entries[slot].as_mut() else {
                continue;
            };
            for edge in &mut entry.edges {
                if matches!(edge, Some(e) if e.ref_count == 0) {
                    orphaned.extend(edge.take().and_then(|e| e.predecessor));
                    removed += 1;
                }
            }
            if entry.ref_count == 0 && self.free_entry(slot as u32).is_ok() {
                removed += 1;
            }
        }
        for node in orphaned {
            if self.release(node).is_ok() {
                removed += 1;
            }
        }

        let before = self.events.len();
        self.events
            .retain(|id, stored| stored.locks > 0 || id.timestamp >= low_watermark);
        removed += before - self.events.len();

        while matches!(self.entries.last(), Some(None)) {
            self.entries.pop();
        }
        let len = self.entries.len() as u32;
        self.free.retain(|slot| *slot < len);
        removed
    }

    /// Number of live entries.
    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    /// Number of stored events.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// True when no entry and no event is stored.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty() && self.events.is_empty()
    }

    /// Reference count of the entry behind `node`.
    pub fn ref_count(&self, node: NodeRef) -> Option<u32> {
        self.entries
            .get(node.entry as usize)
            .and_then(Option::as_ref)
            .map(|entry| entry.ref_count)
    }

    /// Reference count of the edge behind `node`.
    pub fn edge_ref_count(&self, node: NodeRef) -> Option<u32> {
        self.edge(node).ok().map(|edge| edge.ref_count)
    }

    /// Whether `node` points at a live edge.
    pub fn contains(&self, node: NodeRef) -> bool {
        self.edge(node).is_ok()
    }

    /// Checks the counting invariant against the complete list of external
    /// holders (one item per computation state holding a reference).
    #[cfg(test)]
    pub(crate) fn verify(&self, holders: &[NodeRef]) -> Result<(), String> {
        let mut expected: HashMap<NodeRef, u32> = HashMap::new();
        for holder in holders {
            *expected.entry(*holder).or_default() += 1;
        }
        for entry in self.entries.iter().flatten() {
            for edge in entry.edges.iter().flatten() {
                if let Some(prev) = edge.predecessor {
                    *expected.entry(prev).or_default() += 1;
                }
            }
        }
        for (slot, entry) in self.entries.iter().enumerate() {
            let Some(entry) = entry else { continue };
            let mut sum = 0;
            for (pos, edge) in entry.edges.iter().enumerate() {
                let Some(edge) = edge else { continue };
                let node = NodeRef {
                    entry: slot as u32,
                    edge: pos as u32,
                };
                let want = expected.remove(&node).unwrap_or(0);
                if edge.ref_count != want {
                    return Err(format!("edge {node:?}: count {} != holders {want}", edge.ref_count));
                }
                if edge.ref_count == 0 {
                    return Err(format!("edge {node:?} is unreferenced but alive"));
                }
                sum += edge.ref_count;
            }
            if sum != entry.ref_count {
                return Err(format!("entry {slot}: count {} != edge sum {sum}", entry.ref_count));
            }
            if !self.events.contains_key(&entry.event) {
                return Err(format!("entry {slot}: event {} missing", entry.event));
            }
        }
        if let Some((node, _)) = expected.into_iter().find(|(_, n)| *n > 0) {
            return Err(format!("holder of freed node {node:?}"));
        }
        Ok(())
    }

    fn allocate(&mut self, entry: SharedEntry) -> u32 {
        if let Some(slot) = self.free.pop() {
            self.entries[slot as usize] = Some(entry);
            slot
        } else {
            self.entries.push(Some(entry));
            (self.entries.len() - 1) as u32
        }
    }

    fn free_entry(&mut self, slot: u32) -> Result<(), BufferError> {
        let entry = self
            .entries
            .get_mut(slot as usize)
            .and_then(Option::take)
            .ok_or(BufferError::DanglingReference {
                entry: slot,
                edge: 0,
            })?;
        self.index.remove(&(entry.page, entry.event));
        self.free.push(slot);
        self.release_event(entry.event)
    }

    fn lock_event(&mut self, id: EventId) -> Result<(), BufferError> {
        let stored = self.events.get_mut(&id).ok_or(BufferError::MissingEvent(id))?;
        stored.locks += 1;
        Ok(())
    }

    fn entry(&self, slot: u32) -> Result<&SharedEntry, BufferError> {
        self.entries
            .get(slot as usize)
            .and_then(Option::as_ref)
            .ok_or(BufferError::DanglingReference {
                entry: slot,
                edge: 0,
            })
    }

    fn entry_mut(&mut self, slot: u32) -> Result<&mut SharedEntry, BufferError> {
        self.entries
            .get_mut(slot as usize)
            .and_then(Option::as_mut)
            .ok_or(BufferError::DanglingReference {
                entry: slot,
                edge: 0,
            })
    }

    fn edge(&self, node: NodeRef) -> Result<&Edge, BufferError> {
        self.entry(node.entry)?
            .edges
            .get(node.edge as usize)
            .and_then(Option::as_ref)
            .ok_or(BufferError::DanglingReference {
                entry: node.entry,
                edge: node.edge,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(name: &str) -> Arc<str> {
        Arc::from(name)
    }

    #[test]
    fn test_register_and_release_event() {
        let mut buffer = SharedBuffer::new();
        let id = buffer.register_event("x", 5);
        assert_eq!(buffer.event(id), Some(&"x"));
        assert_eq!(id, EventId::new(5, 0));
        buffer.release_event(id).unwrap();
        assert!(buffer.event(id).is_none());
        assert!(buffer.is_empty());
        assert_eq!(buffer.release_event(id), Err(BufferError::MissingEvent(id)));
    }

    #[test]
    fn test_put_links_chain_and_extracts_in_order() {
        let mut buffer = SharedBuffer::new();
        let (a, b) = (page("a"), page("b"));
        let e1 = buffer.register_event(1, 1);
        let e2 = buffer.register_event(2, 2);
        let e3 = buffer.register_event(3, 3);
        let n1 = buffer.put(&a, e1, None).unwrap();
        let n2 = buffer.put(&b, e2, Some(n1)).unwrap();
        let n3 = buffer.put(&a, e3, Some(n2)).unwrap();
        buffer.release(n1).unwrap();
        buffer.release(n2).unwrap();

        let path = buffer.extract(n3).unwrap();
        assert_eq!(path, vec![(a, vec![e1, e3]), (b, vec![e2])]);
        assert_eq!(buffer.entry_count(), 3);
        buffer.verify(&[n3]).unwrap();
    }

    #[test]
    fn test_extract_is_idempotent() {
        let mut buffer = SharedBuffer::new();
        let a = page("a");
        let e1 = buffer.register_event(1, 1);
        let e2 = buffer.register_event(2, 2);
        let n1 = buffer.put(&a, e1, None).unwrap();
        let n2 = buffer.put(&a, e2, Some(n1)).unwrap();
        let first = buffer.extract(n2).unwrap();
        let counts = (buffer.ref_count(n1), buffer.ref_count(n2));
        assert_eq!(buffer.extract(n2).unwrap(), first);
        assert_eq!((buffer.ref_count(n1), buffer.ref_count(n2)), counts);
    }

    #[test]
    fn test_identical_put_shares_edge() {
        let mut buffer = SharedBuffer::new();
        let a = page("a");
        let e1 = buffer.register_event(1, 1);
        let first = buffer.put(&a, e1, None).unwrap();
        let second = buffer.put(&a, e1, None).unwrap();
        assert_eq!(first, second);
        assert_eq!(buffer.entry_count(), 1);
        assert_eq!(buffer.edge_ref_count(first), Some(2));
    }

    #[test]
    fn test_shared_prefix_stored_once() {
        let mut buffer = SharedBuffer::new();
        let (a, b) = (page("a"), page("b"));
        let e1 = buffer.register_event(1, 1);
        let e2 = buffer.register_event(2, 2);
        let e3 = buffer.register_event(3, 3);
        let root = buffer.put(&a, e1, None).unwrap();
        let left = buffer.put(&b, e2, Some(root)).unwrap();
        let right = buffer.put(&b, e3, Some(root)).unwrap();
        buffer.release(root).unwrap();

        assert_eq!(buffer.entry_count(), 3);
        assert_eq!(buffer.ref_count(root), Some(2));
        buffer.verify(&[left, right]).unwrap();

        buffer.release(left).unwrap();
        assert!(buffer.contains(root));
        buffer.release(right).unwrap();
        assert_eq!(buffer.entry_count(), 0);
    }

    #[test]
    fn test_entry_with_two_predecessors() {
        let mut buffer = SharedBuffer::new();
        let (a, b) = (page("a"), page("b"));
        let e1 = buffer.register_event(1, 1);
        let e2 = buffer.register_event(2, 2);
        let e3 = buffer.register_event(3, 3);
        let p1 = buffer.put(&a, e1, None).unwrap();
        let p2 = buffer.put(&a, e2, None).unwrap();
        let via1 = buffer.put(&b, e3, Some(p1)).unwrap();
        let via2 = buffer.put(&b, e3, Some(p2)).unwrap();
        assert_eq!(via1.entry, via2.entry);
        assert_ne!(via1.edge, via2.edge);
        buffer.release(p1).unwrap();
        buffer.release(p2).unwrap();

        assert_eq!(buffer.extract(via1).unwrap(), vec![(a.clone(), vec![e1]), (b.clone(), vec![e3])]);
        assert_eq!(buffer.extract(via2).unwrap(), vec![(a, vec![e2]), (b, vec![e3])]);

        buffer.release(via1).unwrap();
        assert!(!buffer.contains(p1));
        assert!(buffer.contains(p2));
        buffer.release(via2).unwrap();
        assert_eq!(buffer.entry_count(), 0);
    }

    #[test]
    fn test_release_cascades_and_unlocks_events() {
        let mut buffer = SharedBuffer::new();
        let a = page("a");
        let mut prev = None;
        let mut ids = Vec::new();
        for ts in 0..1_000 {
            let id = buffer.register_event(ts, ts);
            let node = buffer.put(&a, id, prev).unwrap();
            if let Some(p) = prev {
                buffer.release(p).unwrap();
            }
            buffer.release_event(id).unwrap();
            ids.push(id);
            prev = Some(node);
        }
        assert_eq!(buffer.entry_count(), 1_000);
        assert_eq!(buffer.event_count(), 1_000);
        buffer.release(prev.unwrap()).unwrap();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_dangling_reference() {
        let mut buffer = SharedBuffer::new();
        let a = page("a");
        let e1 = buffer.register_event(1, 1);
        let node = buffer.put(&a, e1, None).unwrap();
        buffer.release(node).unwrap();
        assert_eq!(
            buffer.release(node),
            Err(BufferError::DanglingReference { entry: 0, edge: 0 })
        );
        assert!(buffer.extract(node).is_err());
    }

    #[test]
    fn test_materialize() {
        let mut buffer = SharedBuffer::new();
        let (a, b) = (page("a"), page("b"));
        let e1 = buffer.register_event("x", 1);
        let e2 = buffer.register_event("y", 2);
        let n1 = buffer.put(&a, e1, None).unwrap();
        let n2 = buffer.put(&b, e2, Some(n1)).unwrap();
        let m = buffer.materialize(&buffer.extract(n2).unwrap()).unwrap();
        assert_eq!(m.get("a"), Some(&["x"][..]));
        assert_eq!(m.get("b"), Some(&["y"][..]));
    }

    #[test]
    fn test_prune_drops_unlocked_old_events_only() {
        let mut buffer: SharedBuffer<i32> = SharedBuffer::new();
        let a = page("a");
        let e1 = buffer.register_event(1, 1);
        let node = buffer.put(&a, e1, None).unwrap();
        buffer.release_event(e1).unwrap();
        assert_eq!(buffer.prune(100), 0);
        assert_eq!(buffer.event_count(), 1);
        buffer.release(node).unwrap();
        assert_eq!(buffer.prune(100), 0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_freed_slots_are_reused() {
        let mut buffer = SharedBuffer::new();
        let a = page("a");
        let e1 = buffer.register_event(1, 1);
        let first = buffer.put(&a, e1, None).unwrap();
        buffer.release(first).unwrap();
        let e2 = buffer.register_event(2, 2);
        let second = buffer.put(&a, e2, None).unwrap();
        assert_eq!(second.entry, first.entry);
        assert_eq!(buffer.extract(second).unwrap(), vec![(a, vec![e2])]);
    }
}
