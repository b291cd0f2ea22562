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

//! The per-function evaluation driver. For each enumerated path it
//! builds a fresh [ExecutionState], re-binds globals and constants,
//! makes the arguments and stack locals symbolic, replays the path's
//! blocks, and finally reads back every local's contents as its
//! parallel-assignment expression.
//!
//! Paths are strictly sequential: each is evaluated to completion, and
//! its state (memory objects included) is dropped, before the next path
//! starts, so base addresses handed out for one path can be reused by
//! the next without colliding.
//!
//! A failing path fails alone. Every enumerated path still appears in
//! the evaluation as either an evaluated path or an explicit failure
//! outcome; only a return-variable disagreement aborts the whole
//! function.

mod step;

use std::time::Duration;

use crate::error::ExecError;
use crate::expr::{ExprBuilder, ExprRef};
use crate::ir::{BlockId, Function, Instr, Module, TyId};
use crate::log;
use crate::memory::ObjectState;
use crate::path::{find_paths, Path};
use crate::solver::Oracle;
use crate::state::{AllocaBinding, ExecutionState};

pub const DEFAULT_SOLVER_TIMEOUT: Duration = Duration::from_secs(10);

/// Polled between instructions, so a caller can cancel a long-running
/// evaluation on its own deadline. Cancellation fails the path in
/// flight with [ExecError::Cancelled]; the path's private memory is
/// released by dropping its state as usual.
pub trait Watchdog {
    fn should_stop(&self) -> bool;
}

/// The watchdog that never stops anything.
#[derive(Copy, Clone, Debug, Default)]
pub struct LazyWatchdog;

impl Watchdog for LazyWatchdog {
    fn should_stop(&self) -> bool {
        false
    }
}

/// Everything shared by all paths of one function's evaluation: the
/// immutable module tables and the function under evaluation. Built
/// once per function and passed by reference into each path's replay;
/// per-path state lives in [ExecutionState], and there is no
/// process-wide mutable state to rebuild between paths.
pub struct EvaluationContext<'ir> {
    pub module: &'ir Module,
    pub function: &'ir Function,
}

/// The outcome of one enumerated path. Every path appears as exactly
/// one outcome; failures are never silently dropped.
pub enum PathOutcome {
    Evaluated(Path),
    Failed { path: Path, error: ExecError },
}

impl PathOutcome {
    pub fn path(&self) -> &Path {
        match self {
            PathOutcome::Evaluated(path) => path,
            PathOutcome::Failed { path, .. } => path,
        }
    }
}

/// Everything evaluating one function produced.
pub struct FunctionEvaluation {
    pub function: String,
    /// Every variable the paths mention, with its element type:
    /// `argN` for arguments, `varN` for stack locals.
    pub var_types: Vec<(String, TyId)>,
    pub outcomes: Vec<PathOutcome>,
    /// The variable backing the return value. Each path that executes a
    /// return must name the same one.
    pub return_variable: Option<String>,
}

pub struct Executor<W = LazyWatchdog> {
    pub solver_timeout: Duration,
    pub watchdog: W,
}

impl Executor {
    pub fn new() -> Self {
        Executor { solver_timeout: DEFAULT_SOLVER_TIMEOUT, watchdog: LazyWatchdog }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Watchdog> Executor<W> {
    pub fn with_watchdog(solver_timeout: Duration, watchdog: W) -> Self {
        Executor { solver_timeout, watchdog }
    }

    /// Enumerate `function` into paths and evaluate every one of them.
    /// Only [ExecError::InconsistentReturnVariable] is returned as an
    /// error; path-level failures become failure outcomes instead.
    pub fn run_function(
        &self,
        module: &Module,
        function: &Function,
        oracle: &mut dyn Oracle,
    ) -> Result<FunctionEvaluation, ExecError> {
        let ctx = EvaluationContext { module, function };
        let paths = find_paths(function);
        let mut outcomes = Vec::with_capacity(paths.len());
        let mut return_variable: Option<String> = None;

        for mut path in paths {
            if self.watchdog.should_stop() {
                outcomes.push(PathOutcome::Failed { path, error: ExecError::Cancelled });
                continue;
            }
            match self.run_path(&ctx, &mut path, oracle) {
                Ok(ret_var) => {
                    if let Some(var) = ret_var {
                        match &return_variable {
                            Some(first) if *first != var => {
                                return Err(ExecError::InconsistentReturnVariable {
                                    first: first.clone(),
                                    second: var,
                                });
                            }
                            Some(_) => (),
                            None => return_variable = Some(var),
                        }
                    }
                    outcomes.push(PathOutcome::Evaluated(path));
                }
                Err(error) => {
                    log!(log::VERBOSE, &format!("path [{}] failed: {}", path.repr(), error));
                    outcomes.push(PathOutcome::Failed { path, error });
                }
            }
        }

        Ok(FunctionEvaluation {
            function: function.name.clone(),
            var_types: variable_types(function),
            outcomes,
            return_variable,
        })
    }

    /// Replay one path against a fresh state, attaching the accumulated
    /// path condition and every local's final value to the path. Returns
    /// the name of the variable backing the return value, if the path
    /// executed a return with one.
    fn run_path(
        &self,
        ctx: &EvaluationContext,
        path: &mut Path,
        oracle: &mut dyn Oracle,
    ) -> Result<Option<String>, ExecError> {
        let mut state = ExecutionState::new(ctx.function);
        self.bind_globals(ctx, &mut state);
        self.bind_arguments(ctx, &mut state);
        self.execute_allocas(ctx, &mut state);

        let blocks: Vec<BlockId> = path.blocks().to_vec();
        let mut ret_var = None;
        for (i, block) in blocks.iter().enumerate() {
            if i + 1 == blocks.len() && !path.executes_final_block() {
                // The final block is a cutpoint: its instructions belong
                // to the paths that start there.
                break;
            }
            let next = blocks.get(i + 1).copied();
            if let Some(var) = self.run_block(ctx, &mut state, oracle, *block, next)? {
                ret_var = Some(var)
            }
        }

        let constraints = state.constraints().to_vec();
        let values = final_values(ctx, &mut state);
        path.attach_results(constraints, values);
        Ok(ret_var)
    }

    fn run_block(
        &self,
        ctx: &EvaluationContext,
        state: &mut ExecutionState,
        oracle: &mut dyn Oracle,
        block: BlockId,
        next: Option<BlockId>,
    ) -> Result<Option<String>, ExecError> {
        for idx in ctx.function.block_range(block) {
            if self.watchdog.should_stop() {
                return Err(ExecError::Cancelled);
            }
            state.prev_pc = state.pc;
            state.pc = (block, idx);
            state.steps += 1;
            match step::execute(ctx, state, oracle, self.solver_timeout, idx, next)? {
                step::Flow::Continue => (),
                step::Flow::Return(var) => return Ok(var),
            }
        }
        Ok(None)
    }

    /// Globals are re-established for every path, since the previous
    /// path's objects were dropped with its state. Initialized globals
    /// get concrete contents; the rest are symbolic, backed by an array
    /// named after the global.
    fn bind_globals(&self, ctx: &EvaluationContext, state: &mut ExecutionState) {
        for global in &ctx.module.globals {
            let size = ctx.module.types.store_size(global.ty);
            let object =
                state.allocator.allocate(size, global.align, false, true, global.name.clone());
            let mut contents = match &global.init {
                Some(bytes) => {
                    debug_assert_eq!(bytes.len() as u64, size);
                    ObjectState::concrete(&mut state.builder, bytes)
                }
                None => {
                    let array = state.fresh_array(&global.name, size);
                    ObjectState::symbolic(&mut state.builder, &array)
                }
            };
            if global.read_only {
                contents.set_read_only()
            }
            state.global_bases.push(object.base);
            state.space.bind(object, contents);
        }
    }

    /// Each argument gets a fresh symbolic backing object named `argN`,
    /// and its cell holds the full-width read of that object.
    fn bind_arguments(&self, ctx: &EvaluationContext, state: &mut ExecutionState) {
        for (i, ty) in ctx.function.args.iter().enumerate() {
            let name = format!("arg{}", i);
            let size = ctx.module.types.store_size(*ty);
            let object = state.allocator.allocate(size, 8, false, false, name.clone());
            let array = state.fresh_array(&name, size);
            let contents = ObjectState::symbolic(&mut state.builder, &array);
            let value = contents.read(&mut state.builder, 0, ctx.module.types.width_of(*ty));
            state.space.bind(object, contents);
            state.bind(ctx.function.arg_cell(i), value);
        }
    }

    /// Every alloca in the function executes up front, before any block
    /// is replayed, producing a symbolic object named `varN`. Block
    /// replay assumes all locals already exist, because a path starting
    /// at a mid-function cutpoint can touch locals whose alloca lives in
    /// a block the path never visits.
    fn execute_allocas(&self, ctx: &EvaluationContext, state: &mut ExecutionState) {
        let mut count = 0;
        for (idx, instr) in ctx.function.instrs.iter().enumerate() {
            if let Instr::Alloca { ty, align } = instr {
                let name = format!("var{}", count);
                count += 1;
                let size = ctx.module.types.store_size(*ty);
                let object = state.allocator.allocate(size, *align, true, false, name.clone());
                let array = state.fresh_array(&name, size);
                let contents = ObjectState::symbolic(&mut state.builder, &array);
                let base = state.space.bind(object, contents);
                let ptr = state.builder.constant(base, ctx.module.target.ptr_width);
                state.bind(ctx.function.result_cell(idx), ptr);
                state.allocas.push(AllocaBinding { name, base, ty: *ty });
            }
        }
    }
}

/// Argument and local names with their element types, in binding order.
fn variable_types(function: &Function) -> Vec<(String, TyId)> {
    let mut vars: Vec<(String, TyId)> =
        function.args.iter().enumerate().map(|(i, ty)| (format!("arg{}", i), *ty)).collect();
    let mut count = 0;
    for instr in &function.instrs {
        if let Instr::Alloca { ty, .. } = instr {
            vars.push((format!("var{}", count), *ty));
            count += 1;
        }
    }
    vars
}

/// The end-of-path value of every stack local: the full declared width
/// of its backing object, read under the final memory contents.
fn final_values(ctx: &EvaluationContext, state: &mut ExecutionState) -> Vec<(String, ExprRef)> {
    let mut values = Vec::with_capacity(state.allocas.len());
    for alloca in &state.allocas {
        let width = ctx.module.types.width_of(alloca.ty);
        let binding = state
            .space
            .resolve_one(alloca.base)
            .expect("alloca objects stay live for the whole path");
        let value = binding.state.read(&mut state.builder, 0, width);
        values.push((alloca.name.clone(), value));
    }
    values
}

/// Replace `expr` with a concrete constant when the path condition
/// proves it has exactly one feasible value, via a get-value query
/// followed by a must-be-true confirmation. If uniqueness cannot be
/// proven the original expression is returned unchanged, which makes
/// the operation idempotent.
pub fn to_unique(
    builder: &mut ExprBuilder,
    oracle: &mut dyn Oracle,
    constraints: &[ExprRef],
    expr: &ExprRef,
    timeout: Duration,
) -> Result<ExprRef, ExecError> {
    if expr.is_const() {
        return Ok(expr.clone());
    }
    let value = match oracle.get_value(constraints, expr, timeout)? {
        Some(value) => value,
        None => return Ok(expr.clone()),
    };
    let candidate = builder.constant(value, expr.width());
    let unique = builder.eq(candidate.clone(), expr.clone());
    if oracle.must_be_true(constraints, &unique, timeout)? {
        Ok(candidate)
    } else {
        Ok(expr.clone())
    }
}
