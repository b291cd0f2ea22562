// BSD 2-Clause License
//
// Copyright (c) 2021, 2022 Alasdair Armstrong
//
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are
// met:
//
// 1. Redistributions of source code must retain the above copyright
// notice, this list of conditions and the following disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright
// notice, this list of conditions and the following disclaimer in the
// documentation and/or other materials provided with the distribution.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS
// "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT
// LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR
// A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT
// HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT
// LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE,
// DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY
// THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT
// (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
// OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! Cutpoint-based decomposition of a function's control-flow graph into
//! a finite, covering set of acyclic paths.
//!
//! Every path starts at a cutpoint. The function entry is always a
//! cutpoint; further cutpoints are created on demand, whenever extending
//! a path would revisit one of its own blocks. A path ends either at a
//! block with no successors (and then its final block's instructions,
//! including the return, belong to the path) or at the next cutpoint
//! (whose instructions belong to the paths that start there instead).
//!
//! Enumeration over a finite graph always terminates: each cutpoint
//! promotion strictly shrinks the set of blocks a path can be extended
//! through, and acyclic extensions of a finite graph are finite.

use std::collections::{HashSet, VecDeque};

use petgraph::graph::{Graph, NodeIndex};
use petgraph::visit::Dfs;
use petgraph::Directed;

use crate::expr::ExprRef;
use crate::if_logging;
use crate::ir::{BlockId, Function};
use crate::log;

/// The control-flow graph of one function. Successor order is the
/// declared order of the terminator's targets.
pub struct Cfg {
    graph: Graph<BlockId, (), Directed>,
    nodes: Vec<NodeIndex>,
}

impl Cfg {
    pub fn new(function: &Function) -> Self {
        let mut graph = Graph::new();
        let nodes: Vec<NodeIndex> =
            (0..function.blocks.len()).map(|i| graph.add_node(BlockId(i))).collect();
        for (i, from) in nodes.iter().enumerate() {
            // petgraph iterates neighbors in reverse insertion order, so
            // insert edges reversed to preserve the declared order.
            for succ in function.successors(BlockId(i)).iter().rev() {
                graph.add_edge(*from, nodes[succ.0], ());
            }
        }
        Cfg { graph, nodes }
    }

    pub fn successors(&self, id: BlockId) -> Vec<BlockId> {
        self.graph.neighbors(self.nodes[id.0]).map(|n| self.graph[n]).collect()
    }

    /// All blocks reachable from `id`, including `id` itself.
    pub fn reachable_from(&self, id: BlockId) -> HashSet<BlockId> {
        let mut reachable = HashSet::new();
        let mut dfs = Dfs::new(&self.graph, self.nodes[id.0]);
        while let Some(node) = dfs.next(&self.graph) {
            reachable.insert(self.graph[node]);
        }
        reachable
    }
}

/// One maximal acyclic walk from a cutpoint to a terminal block or the
/// next cutpoint. The interpreter attaches the accumulated path
/// condition and the end-of-path value of every variable after replay;
/// the path is read-only from then on.
#[derive(Clone, Debug)]
pub struct Path {
    blocks: Vec<BlockId>,
    executes_final_block: bool,
    repr: String,
    constraints: Vec<ExprRef>,
    symbolic_values: Vec<(String, ExprRef)>,
}

impl Path {
    fn new() -> Self {
        Path {
            blocks: Vec::new(),
            executes_final_block: false,
            repr: String::new(),
            constraints: Vec::new(),
            symbolic_values: Vec::new(),
        }
    }

    fn add_block(&mut self, function: &Function, id: BlockId) {
        self.blocks.push(id);
        if !self.repr.is_empty() {
            self.repr.push_str(" -> ");
        }
        self.repr.push_str(&function.block(id).name);
    }

    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    pub fn first(&self) -> BlockId {
        *self.blocks.first().expect("paths are never empty")
    }

    pub fn last(&self) -> BlockId {
        *self.blocks.last().expect("paths are never empty")
    }

    pub fn contains_block(&self, id: BlockId) -> bool {
        self.blocks.contains(&id)
    }

    /// Whether the final block's instructions execute as part of this
    /// path. True exactly when the path ends at a block with no
    /// successors; false when it ends at a cutpoint.
    pub fn executes_final_block(&self) -> bool {
        self.executes_final_block
    }

    pub fn repr(&self) -> &str {
        &self.repr
    }

    pub fn constraints(&self) -> &[ExprRef] {
        &self.constraints
    }

    /// Variable name to end-of-path value, sorted by name.
    pub fn symbolic_values(&self) -> &[(String, ExprRef)] {
        &self.symbolic_values
    }

    pub(crate) fn attach_results(
        &mut self,
        constraints: Vec<ExprRef>,
        mut symbolic_values: Vec<(String, ExprRef)>,
    ) {
        symbolic_values.sort_by(|(a, _), (b, _)| a.cmp(b));
        self.constraints = constraints;
        self.symbolic_values = symbolic_values;
    }
}

/// Decompose `function` into its covering path set. Deterministic for a
/// fixed block and successor order.
pub fn find_paths(function: &Function) -> Vec<Path> {
    let cfg = Cfg::new(function);
    let mut results = Vec::new();
    let mut worklist: VecDeque<Path> = VecDeque::new();
    let mut cutpoints: HashSet<BlockId> = HashSet::new();

    let mut start = Path::new();
    start.add_block(function, function.entry);
    worklist.push_back(start);
    cutpoints.insert(function.entry);

    while let Some(current) = worklist.pop_front() {
        let last = current.last();
        let successors = cfg.successors(last);

        if successors.is_empty() {
            let mut finished = current;
            finished.executes_final_block = true;
            results.push(finished);
            continue;
        }

        let mut extensions = Vec::new();
        for succ in successors {
            let mut extended = current.clone();

            if cutpoints.contains(&succ) {
                // The path ends at the cutpoint; the successor's own
                // instructions belong to the paths starting there.
                extended.add_block(function, succ);
                results.push(extended);
                continue;
            }

            if extended.contains_block(succ) {
                // Extending would close a cycle, so the current block
                // becomes a cutpoint and this path ends here. Any other
                // in-progress path parked at the same block must also
                // end here, or it would later be carried through a
                // cutpoint.
                cutpoints.insert(last);
                log!(log::PATHS, &format!("cutpoint at {}", function.block(last).name));

                extensions.clear();
                results.push(extended);

                let mut kept = VecDeque::new();
                while let Some(other) = worklist.pop_front() {
                    if other.last() == last {
                        results.push(other);
                    } else {
                        kept.push_back(other);
                    }
                }
                worklist = kept;

                let mut fresh = Path::new();
                fresh.add_block(function, last);
                extensions.push(fresh);
                break;
            }

            extended.add_block(function, succ);
            extensions.push(extended);
        }

        worklist.extend(extensions);
    }

    if_logging!(log::PATHS, {
        for path in &results {
            log!(log::PATHS, &format!("path [{}]", path.repr()));
        }
    });

    results
}
