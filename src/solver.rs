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

//! The interface to the decision procedure the engine consults for
//! memory resolution, bounds checking, and value uniquing. The engine
//! only ever asks two questions: whether an expression is necessarily
//! true under the accumulated path condition, and whether the oracle can
//! name a satisfying value for an expression. Every call is synchronous
//! and carries its own timeout; implementations report an exhausted
//! budget as [ExecError::SolverTimeout], which the engine treats as
//! fatal for the path whose fact it needed.

use std::time::Duration;

use crate::error::ExecError;
use crate::expr::ExprRef;

pub trait Oracle {
    /// Is `expr` (a width-1 bitvector) true in every model of
    /// `constraints`?
    fn must_be_true(
        &mut self,
        constraints: &[ExprRef],
        expr: &ExprRef,
        timeout: Duration,
    ) -> Result<bool, ExecError>;

    /// A value for `expr` in some model of `constraints`, if the oracle
    /// can produce one. `Ok(None)` is always a legal answer for an
    /// incomplete implementation.
    fn get_value(
        &mut self,
        constraints: &[ExprRef],
        expr: &ExprRef,
        timeout: Duration,
    ) -> Result<Option<u64>, ExecError>;
}

/// An oracle that decides only what constant folding already decided:
/// constants answer for themselves and everything else is unknown. It
/// never times out and never inspects the constraints. Sufficient for
/// fully concrete address and bounds reasoning; deployments wanting
/// facts about genuinely symbolic expressions plug in an SMT-backed
/// implementation instead.
#[derive(Copy, Clone, Debug, Default)]
pub struct FoldOracle;

impl Oracle for FoldOracle {
    fn must_be_true(
        &mut self,
        _constraints: &[ExprRef],
        expr: &ExprRef,
        _timeout: Duration,
    ) -> Result<bool, ExecError> {
        Ok(expr.is_true())
    }

    fn get_value(
        &mut self,
        _constraints: &[ExprRef],
        expr: &ExprRef,
        _timeout: Duration,
    ) -> Result<Option<u64>, ExecError> {
        Ok(expr.const_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ExprBuilder;

    #[test]
    fn fold_oracle_answers_constants() {
        let mut b = ExprBuilder::new();
        let mut oracle = FoldOracle;
        let t = b.bool_const(true);
        let timeout = Duration::from_millis(100);
        assert!(oracle.must_be_true(&[], &t, timeout).unwrap());
        assert_eq!(oracle.get_value(&[], &t, timeout).unwrap(), Some(1));

        let x = b.constant(42, 32);
        let y = b.constant(41, 32);
        let cmp = b.binary(crate::expr::BinOp::Ugt, x, y);
        assert!(oracle.must_be_true(&[], &cmp, timeout).unwrap());
    }

    #[test]
    fn fold_oracle_is_agnostic_about_symbolic_terms() {
        let mut b = ExprBuilder::new();
        let mut oracle = FoldOracle;
        let array = crate::expr::ArrayRef::new("arg0".to_string(), 1);
        let sym = b.read(&array, 0);
        let zero = b.constant(0, 8);
        let test = b.eq(sym.clone(), zero);
        let timeout = Duration::from_millis(100);
        assert!(!oracle.must_be_true(&[], &test, timeout).unwrap());
        assert_eq!(oracle.get_value(&[], &sym, timeout).unwrap(), None);
    }
}
