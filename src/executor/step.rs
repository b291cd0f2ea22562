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

//! Semantics of the individual instructions. Replay never forks: a
//! branch inspects the path's recorded successor and appends the
//! matching condition (or its negation) to the path condition instead
//! of exploring both arms.

use std::time::Duration;

use crate::error::ExecError;
use crate::expr::{ExprRef, Width};
use crate::ir::{BlockId, CastOp, ConstDef, ConstId, Instr, Operand, Ty};
use crate::memory::{self, Address};
use crate::output::print_expr;
use crate::solver::Oracle;
use crate::state::ExecutionState;

use super::{to_unique, EvaluationContext};

pub(crate) enum Flow {
    Continue,
    /// A return executed, naming the variable that backs the returned
    /// value (or nothing for a void return).
    Return(Option<String>),
}

pub(crate) fn execute(
    ctx: &EvaluationContext,
    state: &mut ExecutionState,
    oracle: &mut dyn Oracle,
    timeout: Duration,
    idx: usize,
    next: Option<BlockId>,
) -> Result<Flow, ExecError> {
    match &ctx.function.instrs[idx] {
        Instr::Binary { op, lhs, rhs } => {
            let lhs = eval(ctx, state, *lhs)?;
            let rhs = eval(ctx, state, *rhs)?;
            let value = state.builder.binary(*op, lhs, rhs);
            state.bind(ctx.function.result_cell(idx), value);
        }

        Instr::Cast { op, value, to } => {
            let value = eval(ctx, state, *value)?;
            let width = ctx.module.types.width_of(*to);
            let cast = match op {
                CastOp::Trunc => state.builder.extract(value, 0, width),
                CastOp::SExt => state.builder.sext(value, width),
                // Pointer/integer conversions are zero extensions or
                // truncations to the destination width.
                CastOp::ZExt | CastOp::IntToPtr | CastOp::PtrToInt => {
                    state.builder.zext(value, width)
                }
                CastOp::BitCast => value,
            };
            state.bind(ctx.function.result_cell(idx), cast);
        }

        // Allocas were all executed before block replay started.
        Instr::Alloca { .. } => (),

        Instr::Load { addr, ty } => {
            let addr = eval(ctx, state, *addr)?;
            let width = ctx.module.types.width_of(*ty);
            let width_bytes = u64::from(width + 7) / 8;
            let (base, offset) = resolve_address(state, oracle, timeout, &addr, width_bytes)?;
            let binding = state.space.resolve_one(base)?;
            let value = binding.state.read(&mut state.builder, offset, width);
            state.bind(ctx.function.result_cell(idx), value);
        }

        Instr::Store { value, addr } => {
            let value = eval(ctx, state, *value)?;
            let addr = eval(ctx, state, *addr)?;
            let width_bytes = u64::from(value.width() + 7) / 8;
            let (base, offset) = resolve_address(state, oracle, timeout, &addr, width_bytes)?;
            let binding = state.space.resolve_one(base)?;
            if binding.state.read_only() {
                return Err(ExecError::ReadOnlyViolation(binding.object.name.clone()));
            }
            binding.state.write(&mut state.builder, offset, &value);
        }

        Instr::Gep { base, pointee, indices } => {
            let ptr_width = ctx.module.target.ptr_width;
            let mut addr = eval(ctx, state, *base)?;
            let mut ty = *pointee;
            for (i, index) in indices.iter().enumerate() {
                let index = eval(ctx, state, *index)?;
                if i == 0 {
                    // The leading index strides over the pointee itself.
                    let stride = ctx.module.types.store_size(ty);
                    addr = scaled_add(state, addr, index, stride, ptr_width);
                } else if let Ty::Struct { .. } = ctx.module.types.get(ty) {
                    let field = index.const_value().ok_or_else(|| {
                        ExecError::UnsupportedInstruction(
                            "symbolic struct field index in address computation".to_string(),
                        )
                    })?;
                    let offset = state
                        .builder
                        .constant(ctx.module.types.field_offset(ty, field), ptr_width);
                    addr = state.builder.add(addr, offset);
                    ty = ctx.module.types.field_ty(ty, field);
                } else {
                    let (elem, stride) =
                        ctx.module.types.sequential_element(ty).ok_or_else(|| {
                            ExecError::UnsupportedInstruction(
                                "address computation indexes into a scalar".to_string(),
                            )
                        })?;
                    addr = scaled_add(state, addr, index, stride, ptr_width);
                    ty = elem;
                }
            }
            state.bind(ctx.function.result_cell(idx), addr);
        }

        Instr::ExtractValue { agg, agg_ty, indices } => {
            let agg = eval(ctx, state, *agg)?;
            let (offset, leaf) = ctx.module.types.member_offset(*agg_ty, indices);
            let width = ctx.module.types.width_of(leaf);
            let value = state.builder.extract(agg, 8 * offset as Width, width);
            state.bind(ctx.function.result_cell(idx), value);
        }

        Instr::InsertValue { agg, value, agg_ty, indices } => {
            let agg = eval(ctx, state, *agg)?;
            let value = eval(ctx, state, *value)?;
            let (offset, _) = ctx.module.types.member_offset(*agg_ty, indices);
            let bit = 8 * offset as Width;
            let total = agg.width();
            debug_assert!(bit + value.width() <= total);

            let mut result = value;
            if bit > 0 {
                let low = state.builder.extract(agg.clone(), 0, bit);
                result = state.builder.concat(result, low);
            }
            let high_offset = result.width();
            if high_offset < total {
                let high = state.builder.extract(agg, high_offset, total - high_offset);
                result = state.builder.concat(high, result);
            }
            state.bind(ctx.function.result_cell(idx), result);
        }

        Instr::Select { cond, tval, fval } => {
            let cond = eval(ctx, state, *cond)?;
            let tval = eval(ctx, state, *tval)?;
            let fval = eval(ctx, state, *fval)?;
            let value = state.builder.select(cond, tval, fval);
            state.bind(ctx.function.result_cell(idx), value);
        }

        Instr::Br { cond: None, .. } => (),

        Instr::Br { cond: Some(cond), then_dest, else_dest } => {
            let next = next.ok_or_else(|| {
                ExecError::Enumeration("conditional branch ends a path".to_string())
            })?;
            let cond = eval(ctx, state, *cond)?;
            debug_assert_eq!(cond.width(), 1);
            match else_dest {
                // Both arms agree, so the branch reveals nothing.
                Some(else_dest) if then_dest == else_dest => (),
                _ => {
                    let constraint = if next == *then_dest {
                        cond
                    } else {
                        state.builder.is_zero(cond)
                    };
                    push_constraint(state, constraint);
                }
            }
        }

        Instr::Switch { value, default, cases } => {
            let next = next
                .ok_or_else(|| ExecError::Enumeration("switch ends a path".to_string()))?;
            let value = eval(ctx, state, *value)?;

            // Disjunction of the cases that jump to the recorded
            // successor, and the none-matched conjunction for the
            // default.
            let mut taken: Option<ExprRef> = None;
            let mut no_case: Option<ExprRef> = None;
            for (case, dest) in cases {
                let case = eval_const(ctx, state, *case)?;
                let test = state.builder.eq(value.clone(), case);
                if *dest == next {
                    taken = Some(match taken {
                        None => test.clone(),
                        Some(acc) => state.builder.or(acc, test.clone()),
                    })
                }
                let missed = state.builder.is_zero(test);
                no_case = Some(match no_case {
                    None => missed,
                    Some(acc) => state.builder.and(acc, missed),
                })
            }

            let constraint = match (taken, next == *default) {
                // A case block that doubles as the default can be
                // reached either way.
                (Some(taken), true) => match no_case {
                    Some(no_case) => Some(state.builder.or(taken, no_case)),
                    None => Some(taken),
                },
                (Some(taken), false) => Some(taken),
                (None, true) => no_case,
                (None, false) => {
                    return Err(ExecError::Enumeration(format!(
                        "switch cannot reach block {}",
                        ctx.function.block(next).name
                    )))
                }
            };
            if let Some(constraint) = constraint {
                push_constraint(state, constraint)
            }
        }

        Instr::Ret { value } => {
            let var = match value {
                None => None,
                Some(value) => Some(return_variable(ctx, state, oracle, timeout, *value)?),
            };
            return Ok(Flow::Return(var));
        }

        Instr::Unsupported(class) => {
            return Err(ExecError::UnsupportedInstruction(class.describe().to_string()));
        }
    }
    Ok(Flow::Continue)
}

fn eval(
    ctx: &EvaluationContext,
    state: &mut ExecutionState,
    operand: Operand,
) -> Result<ExprRef, ExecError> {
    match operand {
        Operand::Arg(i) => state.local(ctx.function.arg_cell(i)),
        Operand::Result(i) => state.local(ctx.function.result_cell(i)),
        Operand::Const(id) => eval_const(ctx, state, id),
    }
}

fn eval_const(
    ctx: &EvaluationContext,
    state: &mut ExecutionState,
    id: ConstId,
) -> Result<ExprRef, ExecError> {
    match &ctx.module.constants[id.0] {
        ConstDef::Int { value, width } => Ok(state.builder.constant(*value, *width)),
        // A global's address is concrete once its object exists for
        // this path.
        ConstDef::Global(global) => {
            Ok(state.builder.constant(state.global_bases[global.0], ctx.module.target.ptr_width))
        }
    }
}

/// Trivially true branch conditions carry no information and would only
/// clutter the printed path condition.
fn push_constraint(state: &mut ExecutionState, constraint: ExprRef) {
    if !constraint.is_true() {
        state.push_constraint(constraint)
    }
}

/// `addr + sext(index) * stride`, folding away when everything is
/// concrete. Symbolic indices stay as contribution terms for the solver.
fn scaled_add(
    state: &mut ExecutionState,
    addr: ExprRef,
    index: ExprRef,
    stride: u64,
    ptr_width: Width,
) -> ExprRef {
    let index = state.builder.sext(index, ptr_width);
    let stride = state.builder.constant(stride, ptr_width);
    let term = state.builder.mul(index, stride);
    state.builder.add(addr, term)
}

/// Concretize a pointer through the oracle and find the single live
/// object containing it, bounds-checking the access. The engine does
/// not fork over multiple candidate objects: an address that fails to
/// concretize to exactly one is a per-path failure.
fn resolve_address(
    state: &mut ExecutionState,
    oracle: &mut dyn Oracle,
    timeout: Duration,
    addr: &ExprRef,
    width_bytes: u64,
) -> Result<(Address, u64), ExecError> {
    let constraints = state.constraints().to_vec();
    let unique = to_unique(&mut state.builder, oracle, &constraints, addr, timeout)?;
    let concrete = match unique.const_value() {
        Some(concrete) => concrete,
        None => {
            return Err(ExecError::ResolutionFailure(format!(
                "address {} has no unique value under the path condition",
                print_expr(&unique)
            )))
        }
    };
    let binding = state.space.resolve_one(concrete)?;
    let offset = concrete - binding.object.base;
    memory::bounds_check(
        &mut state.builder,
        oracle,
        &constraints,
        &binding.object,
        offset,
        width_bytes,
        timeout,
    )?;
    Ok((binding.object.base, offset))
}

/// The variable named by a return instruction: the returned value must
/// originate from a load, and the loaded object's name is the
/// function's return variable.
fn return_variable(
    ctx: &EvaluationContext,
    state: &mut ExecutionState,
    oracle: &mut dyn Oracle,
    timeout: Duration,
    value: Operand,
) -> Result<String, ExecError> {
    let load = match value {
        Operand::Result(i) => i,
        _ => {
            return Err(ExecError::UnsupportedInstruction(
                "return value does not originate from a load".to_string(),
            ))
        }
    };
    let addr = match &ctx.function.instrs[load] {
        Instr::Load { addr, .. } => *addr,
        _ => {
            return Err(ExecError::UnsupportedInstruction(
                "return value does not originate from a load".to_string(),
            ))
        }
    };
    let addr = eval(ctx, state, addr)?;
    let constraints = state.constraints().to_vec();
    let unique = to_unique(&mut state.builder, oracle, &constraints, &addr, timeout)?;
    let concrete = unique.const_value().ok_or_else(|| {
        ExecError::ResolutionFailure(
            "return variable address has no unique value under the path condition".to_string(),
        )
    })?;
    let binding = state.space.resolve_one(concrete)?;
    Ok(binding.object.name.clone())
}
