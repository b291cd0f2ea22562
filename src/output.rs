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

//! The per-path records handed to the downstream diagram synthesizer,
//! and the expression printer whose exact output it parses.
//!
//! The printed forms are a wire contract, not a debugging aid: binary
//! expressions render as `(<left> <op> <right>)` with unsigned operator
//! variants carrying a `u` prefix, an equality against a width-1 zero
//! renders as a negation, composite byte reads collapse to the name of
//! the variable they read, and names beginning with `%` have the sigil
//! replaced by `var`.

use std::fmt::Write;

use serde::Serialize;

use crate::executor::{FunctionEvaluation, PathOutcome};
use crate::expr::{BinOp, ExprKind, ExprRef};
use crate::ir::Function;
use crate::path::Path;

#[derive(Clone, Debug, Serialize)]
pub struct Assignment {
    pub variable: String,
    pub expression: String,
}

/// One successfully evaluated path.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PathRecord {
    pub start_cutpoint: String,
    /// The cutpoint the path stops at, or `"end"` when the path
    /// executes the function's final return.
    pub target_cutpoint: String,
    pub condition: String,
    pub parallel_assignments: Vec<Assignment>,
}

/// A path whose evaluation failed, reported instead of being silently
/// dropped.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FailureRecord {
    pub path: String,
    pub error: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum PathResult {
    Evaluated(PathRecord),
    Failed(FailureRecord),
}

/// Positional instruction identifiers keep their number but swap the
/// `%` sigil for `var`, since `%` is not parseable downstream.
fn escape(name: &str) -> String {
    match name.strip_prefix('%') {
        Some(rest) => format!("var{}", rest),
        None => name.to_string(),
    }
}

fn op_token(op: BinOp) -> &'static str {
    use BinOp::*;
    match op {
        Add => "+",
        Sub => "-",
        Mul => "*",
        SDiv => "/",
        UDiv => "u/",
        SRem => "%",
        URem => "u%",
        And => "&",
        Or => "|",
        Xor => "^",
        Shl => "<<",
        AShr => ">>",
        LShr => "u>>",
        Eq => "==",
        Ne => "!=",
        Slt => "<",
        Sle => "<=",
        Sgt => ">",
        Sge => ">=",
        Ult => "u<",
        Ule => "u<=",
        Ugt => "u>",
        Uge => "u>=",
    }
}

pub fn print_expr(expr: &ExprRef) -> String {
    let mut out = String::new();
    print_into(&mut out, expr);
    out
}

fn print_into(out: &mut String, expr: &ExprRef) {
    match expr.kind() {
        ExprKind::Const(value) => {
            if expr.width() == 1 {
                out.push_str(if *value == 0 { "false" } else { "true" })
            } else {
                write!(out, "{}", value).unwrap()
            }
        }
        ExprKind::Read { array, .. } => out.push_str(&escape(&array.name)),
        // A multi-byte composite read renders as the variable it reads;
        // the most significant operand bottoms out in the byte that
        // names it.
        ExprKind::Concat(hi, _) => print_into(out, hi),
        ExprKind::Extract { expr, .. } => print_into(out, expr),
        ExprKind::ZExt(expr) | ExprKind::SExt(expr) => print_into(out, expr),
        ExprKind::Select { cond, tval, fval } => {
            out.push('(');
            print_into(out, cond);
            out.push_str(" ? ");
            print_into(out, tval);
            out.push_str(" : ");
            print_into(out, fval);
            out.push(')');
        }
        ExprKind::Binary { op: BinOp::Eq, lhs, rhs } if lhs.is_false() => {
            out.push('!');
            print_into(out, rhs);
        }
        ExprKind::Binary { op, lhs, rhs } => {
            out.push('(');
            print_into(out, lhs);
            out.push(' ');
            out.push_str(op_token(*op));
            out.push(' ');
            print_into(out, rhs);
            out.push(')');
        }
    }
}

/// The path condition as one boolean expression: `"true"` when the path
/// recorded no constraints, otherwise the left-associated conjunction
/// of the recorded constraints in order.
pub fn print_condition(constraints: &[ExprRef]) -> String {
    match constraints.split_first() {
        None => "true".to_string(),
        Some((first, rest)) => {
            let mut out = print_expr(first);
            for constraint in rest {
                out = format!("({} & {})", out, print_expr(constraint));
            }
            out
        }
    }
}

pub fn path_record(function: &Function, path: &Path) -> PathRecord {
    let target_cutpoint = if path.executes_final_block() {
        "end".to_string()
    } else {
        escape(&function.block(path.last()).name)
    };
    PathRecord {
        start_cutpoint: escape(&function.block(path.first()).name),
        target_cutpoint,
        condition: print_condition(path.constraints()),
        parallel_assignments: path
            .symbolic_values()
            .iter()
            .map(|(variable, expr)| Assignment {
                variable: escape(variable),
                expression: print_expr(expr),
            })
            .collect(),
    }
}

/// One result per enumerated path, in enumeration order.
pub fn evaluation_records(function: &Function, eval: &FunctionEvaluation) -> Vec<PathResult> {
    eval.outcomes
        .iter()
        .map(|outcome| match outcome {
            PathOutcome::Evaluated(path) => PathResult::Evaluated(path_record(function, path)),
            PathOutcome::Failed { path, error } => PathResult::Failed(FailureRecord {
                path: path.repr().to_string(),
                error: error.to_string(),
            }),
        })
        .collect()
}

pub fn to_json(records: &[PathResult]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{ArrayRef, ExprBuilder};

    fn word(builder: &mut ExprBuilder, name: &str) -> ExprRef {
        let array = ArrayRef::new(name.to_string(), 4);
        let mut value = builder.read(&array, 0);
        for i in 1..4 {
            let byte = builder.read(&array, i);
            value = builder.concat(byte, value);
        }
        value
    }

    #[test]
    fn constants_print_unsigned_decimal() {
        let mut builder = ExprBuilder::new();
        let minus_one = builder.constant(0xffff_ffff, 32);
        assert_eq!(print_expr(&minus_one), "4294967295");
        assert_eq!(print_expr(&builder.bool_const(true)), "true");
        assert_eq!(print_expr(&builder.bool_const(false)), "false");
    }

    #[test]
    fn binary_expressions_parenthesize() {
        let mut builder = ExprBuilder::new();
        let x = word(&mut builder, "arg0");
        let one = builder.constant(1, 32);
        let sum = builder.add(x.clone(), one.clone());
        assert_eq!(print_expr(&sum), "(arg0 + 1)");

        let cmp = builder.binary(BinOp::Sgt, sum, one);
        assert_eq!(print_expr(&cmp), "((arg0 + 1) > 1)");
    }

    #[test]
    fn unsigned_operators_carry_a_prefix() {
        let mut builder = ExprBuilder::new();
        let x = word(&mut builder, "arg0");
        let y = word(&mut builder, "arg1");
        for (op, expected) in [
            (BinOp::UDiv, "(arg0 u/ arg1)"),
            (BinOp::URem, "(arg0 u% arg1)"),
            (BinOp::Ult, "(arg0 u< arg1)"),
            (BinOp::Ule, "(arg0 u<= arg1)"),
            (BinOp::Ugt, "(arg0 u> arg1)"),
            (BinOp::Uge, "(arg0 u>= arg1)"),
            (BinOp::LShr, "(arg0 u>> arg1)"),
            (BinOp::SDiv, "(arg0 / arg1)"),
            (BinOp::SRem, "(arg0 % arg1)"),
            (BinOp::AShr, "(arg0 >> arg1)"),
        ] {
            let expr = builder.binary(op, x.clone(), y.clone());
            assert_eq!(print_expr(&expr), expected);
        }
    }

    #[test]
    fn zero_equality_prints_as_negation() {
        let mut builder = ExprBuilder::new();
        let x = word(&mut builder, "arg0");
        let zero = builder.constant(0, 32);
        let positive = builder.binary(BinOp::Sgt, x.clone(), zero);
        let negated = builder.is_zero(positive);
        assert_eq!(print_expr(&negated), "!(arg0 > 0)");

        // Not-equal is built as a negated equality, so it prints the
        // same way.
        let one = builder.constant(1, 32);
        let ne = builder.binary(BinOp::Ne, x, one);
        assert_eq!(print_expr(&ne), "!(1 == arg0)");
    }

    #[test]
    fn composite_reads_collapse_to_the_variable_name() {
        let mut builder = ExprBuilder::new();
        let x = word(&mut builder, "var0");
        assert_eq!(print_expr(&x), "var0");

        let narrowed = builder.extract(x.clone(), 0, 8);
        assert_eq!(print_expr(&narrowed), "var0");
        let widened = builder.sext(x, 64);
        assert_eq!(print_expr(&widened), "var0");
    }

    #[test]
    fn percent_names_are_escaped() {
        let mut builder = ExprBuilder::new();
        let x = word(&mut builder, "%3");
        assert_eq!(print_expr(&x), "var3");
    }

    #[test]
    fn select_prints_ternary() {
        let mut builder = ExprBuilder::new();
        let x = word(&mut builder, "arg0");
        let zero = builder.constant(0, 32);
        let cond = builder.binary(BinOp::Slt, x.clone(), zero.clone());
        let select = builder.select(cond, zero, x);
        assert_eq!(print_expr(&select), "((arg0 < 0) ? 0 : arg0)");
    }

    #[test]
    fn conditions_conjoin_left_associated() {
        let mut builder = ExprBuilder::new();
        assert_eq!(print_condition(&[]), "true");

        let x = word(&mut builder, "arg0");
        let zero = builder.constant(0, 32);
        let ten = builder.constant(10, 32);
        let a = builder.binary(BinOp::Sgt, x.clone(), zero);
        let b = builder.binary(BinOp::Slt, x, ten);
        assert_eq!(print_condition(&[a.clone()]), "(arg0 > 0)");
        assert_eq!(print_condition(&[a, b]), "((arg0 > 0) & (arg0 < 10))");
    }

    #[test]
    fn records_serialize_with_kebab_case_keys() {
        let record = PathRecord {
            start_cutpoint: "entry".to_string(),
            target_cutpoint: "end".to_string(),
            condition: "true".to_string(),
            parallel_assignments: vec![Assignment {
                variable: "var0".to_string(),
                expression: "5".to_string(),
            }],
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["start-cutpoint"], "entry");
        assert_eq!(json["target-cutpoint"], "end");
        assert_eq!(json["condition"], "true");
        assert_eq!(json["parallel-assignments"][0]["variable"], "var0");
        assert_eq!(json["parallel-assignments"][0]["expression"], "5");

        let failure = PathResult::Failed(FailureRecord {
            path: "entry -> exit".to_string(),
            error: "unsupported instruction: function call".to_string(),
        });
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["path"], "entry -> exit");
        assert!(json.get("start-cutpoint").is_none());
    }
}
