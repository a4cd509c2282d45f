//! `ShallowIndex`: an in-memory prefix tree of discovered names.
//!
//! Each path segment is stored as at most two nodes: a branching fragment
//! of at most `threshold` characters, then the rest of the name as one leaf
//! fragment. Branching siblings therefore never share a prefix of
//! `threshold` characters or more, and tree depth is bounded by twice the
//! path depth, whatever the name lengths.
//!
//! Nodes live in sharded arenas and are addressed by [`NodeId`]. A walker
//! worker allocates into its own shard; it only touches another shard's
//! lock to link a new child under a directory node allocated elsewhere.
//! Once created, a node's fragment and parent never change; only its edge
//! maps and terminal flag grow.

use fnv::FnvHashMap;
use parking_lot::RwLock;
use tracing::trace;

use crate::pattern::{Pattern, SEPARATOR};

/// Stable address of a node: arena shard plus slot inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    shard: u32,
    slot:  u32,
}

impl NodeId {
    fn new(shard: usize, slot: usize) -> Self {
        Self {
            shard: shard as u32,
            slot:  slot as u32,
        }
    }
}

/// How a node hangs off its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    /// Branching fragment opening a new path segment.
    Segment,
    /// Rest of the same segment, kept whole.
    Continuation,
}

#[derive(Debug)]
struct RadixNode {
    fragment:      Box<str>,
    parent:        Option<(NodeId, Edge)>,
    terminal:      bool,
    children:      FnvHashMap<Box<str>, NodeId>,
    continuations: FnvHashMap<Box<str>, NodeId>,
}

impl RadixNode {
    fn new(fragment: &str, parent: Option<(NodeId, Edge)>) -> Self {
        Self {
            fragment: fragment.into(),
            parent,
            terminal: false,
            children: FnvHashMap::default(),
            continuations: FnvHashMap::default(),
        }
    }

    fn edges(&self, edge: Edge) -> &FnvHashMap<Box<str>, NodeId> {
        match edge {
            Edge::Segment => &self.children,
            Edge::Continuation => &self.continuations,
        }
    }

    fn edges_mut(&mut self, edge: Edge) -> &mut FnvHashMap<Box<str>, NodeId> {
        match edge {
            Edge::Segment => &mut self.children,
            Edge::Continuation => &mut self.continuations,
        }
    }
}

pub struct ShallowIndex {
    shards:    Box<[RwLock<Vec<RadixNode>>]>,
    threshold: usize,
}

impl ShallowIndex {
    /// Default maximum fragment width.
    pub const DEFAULT_THRESHOLD: usize = 8;

    /// Create an index with `shards` arenas (at least one) and fragments of
    /// at most `threshold` characters (at least one).
    pub fn new(shards: usize, threshold: usize) -> Self {
        let shards: Box<[RwLock<Vec<RadixNode>>]> = (0..shards.max(1))
            .map(|_| RwLock::new(Vec::new()))
            .collect();
        shards[0].write().push(RadixNode::new("", None));
        Self {
            shards,
            threshold: threshold.max(1),
        }
    }

    /// The default anchor every [`insert`](Self::insert) starts from.
    pub fn root(&self) -> NodeId {
        NodeId::new(0, 0)
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Start a new, detached tree. Paths below it are reported relative to
    /// the anchor by [`path_of`](Self::path_of).
    pub fn new_anchor(&self) -> NodeId {
        let mut arena = self.shards[0].write();
        arena.push(RadixNode::new("", None));
        NodeId::new(0, arena.len() - 1)
    }

    /// Add a path below the default root. Returns `true` when the path was
    /// not present before; inserting it again is a no-op.
    pub fn insert<S: AsRef<str>>(&self, segments: &[S]) -> bool {
        self.insert_under(0, self.root(), segments).1
    }

    /// Add a path below `anchor`, allocating new nodes in `shard`.
    pub fn insert_under<S: AsRef<str>>(
        &self,
        shard: usize,
        anchor: NodeId,
        segments: &[S],
    ) -> (NodeId, bool) {
        let mut node = anchor;
        for segment in segments {
            node = self.descend_segment(shard, node, segment.as_ref());
        }
        (node, self.mark_terminal(node))
    }

    /// Add one discovered name below the directory node `parent`.
    pub fn insert_child(&self, shard: usize, parent: NodeId, name: &str) -> NodeId {
        let node = self.descend_segment(shard, parent, name);
        self.mark_terminal(node);
        node
    }

    /// Node for an already inserted path, if any.
    pub fn find<S: AsRef<str>>(&self, segments: &[S]) -> Option<NodeId> {
        let mut node = self.root();
        for segment in segments {
            node = self.find_segment(node, segment.as_ref())?;
        }
        Some(node)
    }

    /// Whether `segments` or one of its ancestors was inserted as a full
    /// path.
    pub fn covers<S: AsRef<str>>(&self, segments: &[S]) -> bool {
        let mut node = self.root();
        for segment in segments {
            match self.find_segment(node, segment.as_ref()) {
                Some(next) if self.is_terminal(next) => return true,
                Some(next) => node = next,
                None => return false,
            }
        }
        false
    }

    pub fn is_terminal(&self, node: NodeId) -> bool {
        self.shards[node.shard as usize].read()[node.slot as usize].terminal
    }

    /// The `/`-joined path from the node's anchor down to `node`.
    pub fn path_of(&self, node: NodeId) -> String {
        let mut pieces = Vec::new();
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            let arena = self.shards[id.shard as usize].read();
            let n = &arena[id.slot as usize];
            match n.parent {
                Some((parent, edge)) => {
                    pieces.push((n.fragment.clone(), edge));
                    cursor = Some(parent);
                }
                None => cursor = None,
            }
        }

        let mut path = String::new();
        for (i, (fragment, edge)) in pieces.iter().rev().enumerate() {
            if i > 0 && *edge == Edge::Segment {
                path.push(SEPARATOR);
            }
            path.push_str(fragment);
        }
        path
    }

    /// Could anything below the directory at `node` match `pattern`?
    ///
    /// Never answers `false` for a subtree that holds a match. Patterns
    /// matched against base names (everything unanchored, fuzzy included)
    /// always descend. Anchored patterns are pruned by their fixed depth and
    /// by their literal prefix.
    pub fn should_descend(&self, node: NodeId, pattern: &Pattern) -> bool {
        if !pattern.is_anchored() {
            return true;
        }

        let dir = self.path_of(node);
        let depth = if dir.is_empty() {
            0
        } else {
            dir.split(SEPARATOR).count()
        };
        if pattern.anchor_depth().is_some_and(|max| depth >= max) {
            trace!(dir = %dir, "pruned: below anchored depth");
            return false;
        }

        let Some(prefix) = pattern.literal_prefix() else {
            return true;
        };
        let mut dir = if pattern.case_sensitive() {
            dir
        } else {
            dir.to_lowercase()
        };
        if !dir.is_empty() {
            dir.push(SEPARATOR);
        }
        let keep = dir.starts_with(prefix) || prefix.starts_with(dir.as_str());
        if !keep {
            trace!(dir = %dir, prefix, "pruned: literal prefix diverges");
        }
        keep
    }

    /// Number of nodes across all shards.
    pub fn node_count(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    /// Branching head of at most `threshold` characters, and the rest.
    fn split<'a>(&self, segment: &'a str) -> (&'a str, Option<&'a str>) {
        let cut = segment
            .char_indices()
            .nth(self.threshold)
            .map_or(segment.len(), |(i, _)| i);
        let (head, tail) = segment.split_at(cut);
        (head, (!tail.is_empty()).then_some(tail))
    }

    fn descend_segment(&self, shard: usize, from: NodeId, segment: &str) -> NodeId {
        let (head, tail) = self.split(segment);
        let node = self.attach(shard, from, Edge::Segment, head);
        match tail {
            Some(tail) => self.attach(shard, node, Edge::Continuation, tail),
            None => node,
        }
    }

    fn find_segment(&self, from: NodeId, segment: &str) -> Option<NodeId> {
        let (head, tail) = self.split(segment);
        let node = self.lookup(from, Edge::Segment, head)?;
        match tail {
            Some(tail) => self.lookup(node, Edge::Continuation, tail),
            None => Some(node),
        }
    }

    fn lookup(&self, parent: NodeId, edge: Edge, chunk: &str) -> Option<NodeId> {
        let arena = self.shards[parent.shard as usize].read();
        arena[parent.slot as usize].edges(edge).get(chunk).copied()
    }

    /// Find or create the `chunk` edge below `parent`.
    ///
    /// Shard locks are always taken in ascending shard order, so two
    /// workers linking across each other's shards cannot deadlock.
    fn attach(&self, shard: usize, parent: NodeId, edge: Edge, chunk: &str) -> NodeId {
        if let Some(id) = self.lookup(parent, edge, chunk) {
            return id;
        }

        let shard = shard % self.shards.len();
        let ps = parent.shard as usize;
        let slot = parent.slot as usize;
        let node = RadixNode::new(chunk, Some((parent, edge)));

        if ps == shard {
            let mut arena = self.shards[ps].write();
            if let Some(&id) = arena[slot].edges(edge).get(chunk) {
                return id;
            }
            let id = NodeId::new(shard, arena.len());
            arena.push(node);
            arena[slot].edges_mut(edge).insert(chunk.into(), id);
            return id;
        }

        let (mut parents, mut own) = if ps < shard {
            let p = self.shards[ps].write();
            (p, self.shards[shard].write())
        } else {
            let o = self.shards[shard].write();
            (self.shards[ps].write(), o)
        };
        if let Some(&id) = parents[slot].edges(edge).get(chunk) {
            return id;
        }
        let id = NodeId::new(shard, own.len());
        own.push(node);
        parents[slot].edges_mut(edge).insert(chunk.into(), id);
        id
    }

    fn mark_terminal(&self, node: NodeId) -> bool {
        let mut arena = self.shards[node.shard as usize].write();
        let n = &mut arena[node.slot as usize];
        !std::mem::replace(&mut n.terminal, true)
    }

    /// `(nodes, segments)` on the way from the node's anchor down to it.
    #[cfg(test)]
    fn depth_of(&self, node: NodeId) -> (usize, usize) {
        let (mut nodes, mut segments) = (0, 0);
        let mut cursor = node;
        loop {
            let parent = self.shards[cursor.shard as usize].read()[cursor.slot as usize].parent;
            let Some((parent, edge)) = parent else {
                return (nodes, segments);
            };
            nodes += 1;
            if edge == Edge::Segment {
                segments += 1;
            }
            cursor = parent;
        }
    }

    /// Panics if a branching fragment is empty or wider than the threshold,
    /// two branching siblings share a prefix of `threshold` characters, a
    /// leaf fragment continues further, or a node sits deeper than two per
    /// path segment.
    #[cfg(test)]
    fn assert_shallow(&self) {
        for (shard_no, shard) in self.shards.iter().enumerate() {
            let arena = shard.read();
            let ids: Vec<NodeId> = (0..arena.len()).map(|slot| NodeId::new(shard_no, slot)).collect();
            for node in arena.iter() {
                let keys: Vec<&str> = node.children.keys().map(|k| &**k).collect();
                for key in &keys {
                    let width = key.chars().count();
                    assert!(width > 0 && width <= self.threshold, "{key:?}");
                }
                for (i, a) in keys.iter().enumerate() {
                    for b in &keys[i + 1..] {
                        let shared = a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count();
                        assert!(shared < self.threshold, "{a:?} / {b:?}");
                    }
                }
                assert!(node.continuations.keys().all(|k| !k.is_empty()));
                if matches!(node.parent, Some((_, Edge::Continuation))) {
                    assert!(node.continuations.is_empty(), "{:?}", node.fragment);
                }
            }
            drop(arena);
            for id in ids {
                let (nodes, segments) = self.depth_of(id);
                assert!(nodes <= 2 * segments, "{nodes} nodes for {segments} segments");
            }
        }
    }
}
