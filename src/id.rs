//! Integer identities for graph records
//!
//! Every record the engine owns is addressed by a small integer id. Other
//! components only ever hold these ids, never references into the tables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Identity of a node in the graph store
    NodeId, "node"
);
define_id!(
    /// Identity of an edge in the graph store
    EdgeId, "edge"
);
define_id!(
    /// Identity of a source file record
    FileId, "file"
);
define_id!(
    /// Identity of a recorded source location
    LocationId, "loc"
);

/// Any element an ingestion event can hand back to the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementId {
    Node(NodeId),
    Edge(EdgeId),
    File(FileId),
    Location(LocationId),
}

impl ElementId {
    pub fn as_node(self) -> Option<NodeId> {
        match self {
            ElementId::Node(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_edge(self) -> Option<EdgeId> {
        match self {
            ElementId::Edge(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_file(self) -> Option<FileId> {
        match self {
            ElementId::File(id) => Some(id),
            _ => None,
        }
    }
}

impl From<NodeId> for ElementId {
    fn from(id: NodeId) -> Self {
        ElementId::Node(id)
    }
}

impl From<EdgeId> for ElementId {
    fn from(id: EdgeId) -> Self {
        ElementId::Edge(id)
    }
}

impl From<FileId> for ElementId {
    fn from(id: FileId) -> Self {
        ElementId::File(id)
    }
}

impl From<LocationId> for ElementId {
    fn from(id: LocationId) -> Self {
        ElementId::Location(id)
    }
}

/// Hands out ids starting at 1, always reusing the lowest released id first.
///
/// Lowest-first reuse means that discarding a file's records and replaying
/// the same events assigns exactly the same ids again.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: u64,
    free: BTreeSet<u64>,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self { next: 1, free: BTreeSet::new() }
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> u64 {
        if let Some(id) = self.free.pop_first() {
            return id;
        }
        let id = self.next;
        self.next += 1;
        id
    }

    pub fn release(&mut self, id: u64) {
        if id == 0 || id >= self.next {
            return;
        }
        if id + 1 == self.next {
            // shrink the high-water mark through any trailing free ids
            self.next -= 1;
            while self.next > 1 && self.free.remove(&(self.next - 1)) {
                self.next -= 1;
            }
        } else {
            self.free.insert(id);
        }
    }

    /// Number of ids currently handed out.
    pub fn in_use(&self) -> usize {
        (self.next - 1) as usize - self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocates_sequentially() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.allocate(), 1);
        assert_eq!(ids.allocate(), 2);
        assert_eq!(ids.allocate(), 3);
        assert_eq!(ids.in_use(), 3);
    }

    #[test]
    fn test_reuses_lowest_released_first() {
        let mut ids = IdAllocator::new();
        for _ in 0..5 {
            ids.allocate();
        }
        ids.release(4);
        ids.release(2);
        assert_eq!(ids.allocate(), 2);
        assert_eq!(ids.allocate(), 4);
        assert_eq!(ids.allocate(), 6);
    }

    #[test]
    fn test_release_all_restarts_at_one() {
        let mut ids = IdAllocator::new();
        for _ in 0..3 {
            ids.allocate();
        }
        ids.release(1);
        ids.release(3);
        ids.release(2);
        assert_eq!(ids.in_use(), 0);
        assert_eq!(ids.allocate(), 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(NodeId(7).to_string(), "node#7");
        assert_eq!(ElementId::Edge(EdgeId(2)).as_edge(), Some(EdgeId(2)));
        assert_eq!(ElementId::Edge(EdgeId(2)).as_node(), None);
    }
}
