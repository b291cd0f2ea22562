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

//! Cairn decomposes a function's control-flow graph into a finite,
//! covering set of acyclic paths and symbolically executes each path
//! independently. Each path yields a path condition and a parallel
//! assignment giving the end-of-path value of every local variable,
//! which downstream tooling turns back into branching code.
//!
//! The crate is a library with three external collaborators it
//! deliberately does not contain: the front-end that produces the
//! program representation consumed by [ir], the solver behind the
//! [solver::Oracle] trait, and the decision-diagram synthesizer that
//! parses the records produced by [output].
//!
//! The pieces fit together as follows. [path::find_paths] walks the
//! control-flow graph, promoting blocks to cutpoints wherever a path
//! would otherwise revisit one of its own blocks, and returns the
//! resulting acyclic path list. [executor::Executor] replays each path
//! against a fresh [state::ExecutionState], building [expr] expressions
//! for every computed value, consulting the [memory] model for loads,
//! stores, and address arithmetic, and recording branch decisions as
//! path constraints. [output] renders the finished paths (and any
//! per-path failures) as the JSON records of the downstream contract.
//!
//! Evaluation is strictly sequential: one path at a time, each against
//! private state that is dropped before the next path begins. Errors
//! raised while replaying a path fail that path alone; the evaluation
//! reports every enumerated path as either a result or an explicit
//! failure.

pub mod error;
pub mod executor;
pub mod expr;
pub mod ir;
pub mod log;
pub mod memory;
pub mod output;
pub mod path;
pub mod solver;
pub mod state;

#[cfg(test)]
mod test_util;
