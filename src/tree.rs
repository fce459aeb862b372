//! Focused process trees.
//!
//! A tree for one target holds the ancestor chain from the topmost ancestor
//! down to the target, then every descendant of the target. Records carry only
//! their own parent id, so the ancestor chain is found by walking parent ids
//! upwards and the descendants through the snapshot's children index.
//!
//! Nodes live in an arena; parent back-references are arena indices.

use ahash::AHashSet as HashSet;
use tracing::debug;

use crate::error::{Error, Result};
use crate::process::{ProcessRecord, ProcessSource, Snapshot};

/// Index of a node inside its [`ProcessTree`].
pub type NodeId = usize;

#[derive(Debug, Clone)]
pub struct ProcessNode {
    pub record: ProcessRecord,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Distance from the rendered root.
    pub depth: usize,
    pub is_target: bool,
}

#[derive(Debug, Clone)]
pub struct ProcessTree {
    nodes: Vec<ProcessNode>,
    root: NodeId,
    target: NodeId,
}

impl ProcessTree {
    fn with_root(record: ProcessRecord, is_target: bool) -> Self {
        Self {
            nodes: vec![ProcessNode {
                record,
                parent: None,
                children: Vec::new(),
                depth: 0,
                is_target,
            }],
            root: 0,
            target: 0,
        }
    }

    fn attach(&mut self, parent: NodeId, record: ProcessRecord, is_target: bool) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(ProcessNode {
            record,
            parent: Some(parent),
            children: Vec::new(),
            depth: 0,
            is_target,
        });
        self.nodes[parent].children.push(id);
        if is_target {
            self.target = id;
        }
        id
    }

    /// Sets every depth from the root down, once the topology is final.
    fn normalize_depths(&mut self) {
        let mut stack = vec![(self.root, 0)];
        while let Some((id, depth)) = stack.pop() {
            self.nodes[id].depth = depth;
            stack.extend(self.nodes[id].children.iter().map(|&c| (c, depth + 1)));
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn node(&self, id: NodeId) -> &ProcessNode {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids in pre-order: parent before children, children in attachment order.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.nodes[id].children.iter().rev());
        }
        out
    }

    /// Pids in pre-order.
    pub fn pids(&self) -> Vec<u32> {
        self.preorder()
            .into_iter()
            .map(|id| self.nodes[id].record.pid)
            .collect()
    }

    /// Path from the root to `id`, both included.
    pub fn ancestry(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = vec![id];
        let mut current = id;
        while let Some(parent) = self.nodes[current].parent {
            path.push(parent);
            current = parent;
        }
        path.reverse();
        path
    }

    /// True when a sibling after `id` is still to be printed.
    pub fn has_later_sibling(&self, id: NodeId) -> bool {
        match self.nodes[id].parent {
            Some(parent) => self.nodes[parent]
                .children
                .last()
                .is_some_and(|&last| last != id),
            None => false,
        }
    }
}

/// Result of walking parent ids upwards from the target.
enum Ascent {
    /// Ancestor records, topmost first. Empty when the target has none.
    Chain(Vec<ProcessRecord>),
    /// A pid came around twice.
    Cycle(u32),
    /// An ancestor (or a parent id) could not be read.
    Unresolved(u32),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum OnRevisit {
    Abort,
    Skip,
}

/// Builds trees from one snapshot. Pids missing from the snapshot are looked
/// up again through `source`.
pub struct TreeBuilder<'a> {
    snapshot: &'a Snapshot,
    source: &'a dyn ProcessSource,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(snapshot: &'a Snapshot, source: &'a dyn ProcessSource) -> Self {
        Self { snapshot, source }
    }

    /// Snapshot record, else a fresh read.
    pub fn lookup(&self, pid: u32) -> Option<ProcessRecord> {
        if let Some(record) = self.snapshot.get(pid) {
            return Some(record.clone());
        }
        self.source.get_process(pid).ok()
    }

    pub fn exists(&self, pid: u32) -> bool {
        self.snapshot.contains(pid) || self.source.get_process(pid).is_ok()
    }

    /// Builds the tree for `target`.
    ///
    /// Falls back to a tree rooted at the target when its ancestry cannot be
    /// read completely or contains a cycle. Only a missing target is an error.
    pub fn build(&self, target: u32) -> Result<ProcessTree> {
        let target_record = self.lookup(target).ok_or(Error::TargetNotFound(target))?;

        match self.ascend(&target_record) {
            Ascent::Chain(chain) if !chain.is_empty() => {
                match self.build_full(chain, target_record.clone()) {
                    Ok(tree) => return Ok(tree),
                    Err(pid) => debug!("pid {} revisited below target {}", pid, target),
                }
            }
            Ascent::Chain(_) => debug!("No ancestors above pid {}", target),
            Ascent::Cycle(pid) => debug!("Parent cycle through pid {} above {}", pid, target),
            Ascent::Unresolved(pid) => debug!("Ancestor {} of pid {} unreadable", pid, target),
        }

        Ok(self.build_minimal(target_record))
    }

    /// Pids used to decide whether a target is already covered by an earlier
    /// tree: the target, its parent and all its descendants.
    pub fn membership(&self, target: u32) -> HashSet<u32> {
        let mut members: HashSet<u32> = self.snapshot.descendants(target).into_iter().collect();
        members.insert(target);
        if let Some(ppid) = self.lookup(target).and_then(|r| r.parent_id) {
            members.insert(ppid);
        }
        members
    }

    fn ascend(&self, target: &ProcessRecord) -> Ascent {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(target.pid);
        let mut current = target.clone();

        while current.pid > 1 {
            let ppid = match current.parent_id {
                Some(ppid) => ppid,
                None => return Ascent::Unresolved(current.pid),
            };
            if ppid == current.pid {
                break;
            }
            if ppid <= 1 {
                if ppid == 1 {
                    match self.lookup(1) {
                        Some(init) => chain.push(init),
                        None => return Ascent::Unresolved(1),
                    }
                }
                break;
            }
            if !seen.insert(ppid) {
                return Ascent::Cycle(ppid);
            }
            let parent = match self.lookup(ppid) {
                Some(parent) => parent,
                None => return Ascent::Unresolved(ppid),
            };
            chain.push(parent.clone());
            current = parent;
        }

        chain.reverse();
        Ascent::Chain(chain)
    }

    /// Chain of single-child ancestors, the target below it, then the
    /// descendants. `Err` carries a pid met twice.
    fn build_full(
        &self,
        chain: Vec<ProcessRecord>,
        target: ProcessRecord,
    ) -> std::result::Result<ProcessTree, u32> {
        let mut visited = HashSet::new();
        let mut ancestors = chain.into_iter().filter(|r| r.pid != target.pid);

        let top = match ancestors.next() {
            Some(top) => top,
            None => return Err(target.pid),
        };
        visited.insert(top.pid);
        let mut tree = ProcessTree::with_root(top, false);
        let mut current = tree.root();

        for record in ancestors {
            if !visited.insert(record.pid) {
                return Err(record.pid);
            }
            current = tree.attach(current, record, false);
        }

        if !visited.insert(target.pid) {
            return Err(target.pid);
        }
        let target_id = tree.attach(current, target, true);
        self.descend(&mut tree, target_id, &mut visited, OnRevisit::Abort)?;

        tree.normalize_depths();
        Ok(tree)
    }

    /// The target as root with its descendants.
    fn build_minimal(&self, target: ProcessRecord) -> ProcessTree {
        let mut visited = HashSet::new();
        visited.insert(target.pid);
        let mut tree = ProcessTree::with_root(target, true);
        let root = tree.root();
        // Revisits are skipped here, so the descent cannot fail.
        let _ = self.descend(&mut tree, root, &mut visited, OnRevisit::Skip);
        tree.normalize_depths();
        tree
    }

    /// Attaches every descendant of `from`, each pid at most once across the
    /// whole build.
    fn descend(
        &self,
        tree: &mut ProcessTree,
        from: NodeId,
        visited: &mut HashSet<u32>,
        on_revisit: OnRevisit,
    ) -> std::result::Result<(), u32> {
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            let pid = tree.node(id).record.pid;
            for &child in self.snapshot.children_of(pid) {
                if !visited.insert(child) {
                    if on_revisit == OnRevisit::Abort {
                        return Err(child);
                    }
                    continue;
                }
                if let Some(record) = self.snapshot.get(child) {
                    let child_id = tree.attach(id, record.clone(), false);
                    stack.push(child_id);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata::SnapshotFile;

    fn rec(pid: u32, ppid: u32) -> ProcessRecord {
        ProcessRecord::new(pid, Some(ppid), format!("proc{pid}"))
    }

    fn build(records: Vec<ProcessRecord>, target: u32) -> Result<ProcessTree> {
        let snapshot = Snapshot::new(records);
        let source = SnapshotFile::default();
        TreeBuilder::new(&snapshot, &source).build(target)
    }

    #[test]
    fn test_chain_from_init_to_target() {
        let tree = build(
            vec![rec(1, 0), rec(10, 1), rec(20, 10), rec(30, 20), rec(31, 20)],
            30,
        )
        .unwrap();

        assert_eq!(tree.pids(), vec![1, 10, 20, 30]);
        let target = tree.node(tree.target());
        assert_eq!(target.record.pid, 30);
        assert!(target.is_target);
        assert_eq!(target.depth, 3);
        // Siblings of the target are not part of the focused tree.
        assert!(!tree.pids().contains(&31));
    }

    #[test]
    fn test_descendants_attached() {
        let tree = build(
            vec![rec(1, 0), rec(10, 1), rec(20, 10), rec(21, 10), rec(22, 21)],
            10,
        )
        .unwrap();
        assert_eq!(tree.pids(), vec![1, 10, 20, 21, 22]);
        let depths: Vec<usize> = tree
            .preorder()
            .into_iter()
            .map(|id| tree.node(id).depth)
            .collect();
        assert_eq!(depths, vec![0, 1, 2, 2, 3]);
    }

    #[test]
    fn test_target_is_init() {
        let tree = build(vec![rec(1, 0), rec(2, 1)], 1).unwrap();
        assert_eq!(tree.root(), tree.target());
        assert_eq!(tree.pids(), vec![1, 2]);
    }

    #[test]
    fn test_missing_target() {
        let err = build(vec![rec(1, 0)], 99).unwrap_err();
        assert!(matches!(err, Error::TargetNotFound(99)));
    }

    #[test]
    fn test_unreadable_ancestor_gives_minimal_tree() {
        // 20's parent 15 is not in the snapshot.
        let tree = build(vec![rec(1, 0), rec(20, 15), rec(21, 20)], 20).unwrap();
        assert_eq!(tree.root(), tree.target());
        assert_eq!(tree.pids(), vec![20, 21]);
    }

    #[test]
    fn test_ancestry_cycle_gives_minimal_tree() {
        // 5 -> 6 -> 7 -> 5
        let tree = build(vec![rec(5, 7), rec(6, 5), rec(7, 6)], 5).unwrap();
        assert_eq!(tree.node(tree.root()).record.pid, 5);
        assert_eq!(tree.pids(), vec![5, 6, 7]);
    }

    #[test]
    fn test_self_parent_stops_ascent() {
        let tree = build(vec![rec(40, 40), rec(41, 40)], 41).unwrap();
        assert_eq!(tree.pids(), vec![40, 41]);
        assert_eq!(tree.node(tree.target()).record.pid, 41);
    }

    #[test]
    fn test_container_root_without_init() {
        // Parent id 0 ends the chain without pid 1.
        let tree = build(vec![rec(2, 0), rec(300, 2), rec(301, 300)], 301).unwrap();
        assert_eq!(tree.pids(), vec![2, 300, 301]);
    }

    #[test]
    fn test_membership() {
        let snapshot = Snapshot::new(vec![rec(1, 0), rec(10, 1), rec(11, 10), rec(12, 11)]);
        let source = SnapshotFile::default();
        let builder = TreeBuilder::new(&snapshot, &source);

        let mut members: Vec<u32> = builder.membership(10).into_iter().collect();
        members.sort_unstable();
        assert_eq!(members, vec![1, 10, 11, 12]);
    }

    #[test]
    fn test_fresh_lookup_for_pid_missing_from_snapshot() {
        let snapshot = Snapshot::new(vec![rec(1, 0)]);
        let source = SnapshotFile::from_parts(vec![rec(77, 1)], Vec::new());
        let tree = TreeBuilder::new(&snapshot, &source).build(77).unwrap();
        assert_eq!(tree.pids(), vec![1, 77]);
    }

    #[test]
    fn test_has_later_sibling_and_ancestry() {
        let tree = build(vec![rec(1, 0), rec(10, 1), rec(20, 10), rec(21, 10)], 10).unwrap();
        let order = tree.preorder();
        let (n20, n21) = (order[2], order[3]);
        assert!(tree.has_later_sibling(n20));
        assert!(!tree.has_later_sibling(n21));
        assert!(!tree.has_later_sibling(tree.root()));

        let path: Vec<u32> = tree
            .ancestry(n21)
            .into_iter()
            .map(|id| tree.node(id).record.pid)
            .collect();
        assert_eq!(path, vec![1, 10, 21]);
    }
}
