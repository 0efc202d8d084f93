//! Control-flow graph queries: dominance and natural loops.
//!
//! The CFG is mirrored into a `petgraph` graph so dominators come from
//! `petgraph::algo::dominators::simple_fast` (Cooper, Harvey & Kennedy).
//! Unreachable blocks have no dominators and are never part of a loop.

use std::collections::{BTreeSet, HashMap};

use petgraph::algo::dominators::{self, Dominators};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Walker};

use crate::module::{BlockId, Function};

/// Snapshot of a function's control-flow edges.
#[derive(Debug, Clone)]
pub struct ControlFlow {
    graph: DiGraph<BlockId, ()>,
    nodes: Vec<NodeIndex>,
}

impl ControlFlow {
    pub fn new(func: &Function) -> Self {
        let mut graph = DiGraph::with_capacity(func.blocks.len(), func.blocks.len() * 2);
        let nodes: Vec<NodeIndex> = func.block_ids().map(|b| graph.add_node(b)).collect();
        for block in func.block_ids() {
            for succ in func.successors(block) {
                graph.add_edge(nodes[block.index()], nodes[succ.index()], ());
            }
        }
        Self { graph, nodes }
    }

    fn node(&self, block: BlockId) -> NodeIndex {
        self.nodes[block.index()]
    }

    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        let mut succs: Vec<BlockId> = self.graph.neighbors(self.node(block)).map(|n| self.graph[n]).collect();
        succs.sort();
        succs.dedup();
        succs
    }

    pub fn predecessors(&self, block: BlockId) -> Vec<BlockId> {
        let mut preds: Vec<BlockId> = self
            .graph
            .neighbors_directed(self.node(block), petgraph::Direction::Incoming)
            .map(|n| self.graph[n])
            .collect();
        preds.sort();
        preds.dedup();
        preds
    }

    /// Blocks reachable from the entry, in DFS preorder.
    pub fn reachable(&self) -> Vec<BlockId> {
        if self.nodes.is_empty() {
            return Vec::new();
        }
        Dfs::new(&self.graph, self.node(BlockId::ENTRY)).iter(&self.graph).map(|n| self.graph[n]).collect()
    }

    pub fn dominators(&self) -> DominatorTree {
        DominatorTree { doms: dominators::simple_fast(&self.graph, self.node(BlockId::ENTRY)), nodes: self.nodes.clone() }
    }
}

/// Dominance relation rooted at the entry block.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    doms: Dominators<NodeIndex>,
    nodes: Vec<NodeIndex>,
}

impl DominatorTree {
    pub fn new(cfg: &ControlFlow) -> Self {
        cfg.dominators()
    }

    /// True when every path from the entry to `b` passes through `a`.
    /// A block dominates itself; unreachable blocks are dominated by nothing.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let (a, b) = (self.nodes[a.index()], self.nodes[b.index()]);
        self.doms.dominators(b).is_some_and(|mut it| it.any(|d| d == a))
    }

    pub fn immediate_dominator(&self, block: BlockId) -> Option<BlockId> {
        let node = self.doms.immediate_dominator(self.nodes[block.index()])?;
        Some(BlockId(node.index() as u32))
    }
}

/// A natural loop: a header plus every block that reaches one of its back edges
/// without passing through the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loop {
    pub header: BlockId,
    pub blocks: BTreeSet<BlockId>,
}

impl Loop {
    pub fn contains(&self, block: BlockId) -> bool {
        self.blocks.contains(&block)
    }

    /// Predecessors of the header that lie inside the loop.
    pub fn latches(&self, cfg: &ControlFlow) -> Vec<BlockId> {
        cfg.predecessors(self.header).into_iter().filter(|&p| self.contains(p)).collect()
    }

    /// The single latch, if there is exactly one.
    pub fn latch(&self, cfg: &ControlFlow) -> Option<BlockId> {
        match self.latches(cfg).as_slice() {
            [latch] => Some(*latch),
            _ => None,
        }
    }

    /// The unique out-of-loop predecessor of the header whose only successor is
    /// the header.
    pub fn preheader(&self, cfg: &ControlFlow) -> Option<BlockId> {
        match cfg.predecessors(self.header).into_iter().filter(|&p| !self.contains(p)).collect::<Vec<_>>().as_slice() {
            [pred] if cfg.successors(*pred) == [self.header] => Some(*pred),
            _ => None,
        }
    }
}

/// Every natural loop of a function.
#[derive(Debug, Clone, Default)]
pub struct LoopForest {
    loops: Vec<Loop>,
}

impl LoopForest {
    pub fn new(cfg: &ControlFlow, dom: &DominatorTree) -> Self {
        let mut bodies: HashMap<BlockId, BTreeSet<BlockId>> = HashMap::new();

        for tail in cfg.reachable() {
            for header in cfg.successors(tail) {
                if !dom.dominates(header, tail) {
                    continue;
                }
                let body = bodies.entry(header).or_insert_with(|| BTreeSet::from([header]));
                let mut worklist = vec![tail];
                while let Some(block) = worklist.pop() {
                    if body.insert(block) {
                        worklist.extend(cfg.predecessors(block).into_iter().filter(|&p| dom.dominates(header, p)));
                    }
                }
            }
        }

        let mut loops: Vec<Loop> = bodies.into_iter().map(|(header, blocks)| Loop { header, blocks }).collect();
        // Nested loops have strictly fewer blocks than the loops containing them.
        loops.sort_by_key(|l| (l.blocks.len(), l.header));
        Self { loops }
    }

    pub fn of(func: &Function) -> Self {
        let cfg = ControlFlow::new(func);
        let dom = cfg.dominators();
        Self::new(&cfg, &dom)
    }

    /// Loops ordered so that every loop comes before the loops enclosing it.
    pub fn innermost_first(&self) -> impl Iterator<Item = &Loop> {
        self.loops.iter()
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// The innermost loop containing `block`.
    pub fn loop_of(&self, block: BlockId) -> Option<&Loop> {
        self.loops.iter().find(|l| l.contains(block))
    }

    pub fn depth(&self, block: BlockId) -> usize {
        self.loops.iter().filter(|l| l.contains(block)).count()
    }
}
