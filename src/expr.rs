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

//! Immutable bitvector expressions, built through [ExprBuilder] which
//! hash-conses every node: two structurally identical expressions are the
//! same allocation, so structural equality is pointer equality.
//!
//! All values are fixed-width bitvectors. Booleans are width-1
//! bitvectors. Constants carry at most 64 bits; wider values only ever
//! arise as concatenations of narrower expressions. Every non-constant
//! expression bottoms out in byte [ExprKind::Read]s of named symbolic
//! arrays, one array per symbolic memory object.
//!
//! The smart constructors fold constants with wrapping two's-complement
//! semantics at the node width. Division and remainder by a constant
//! zero are not folded and simply build the node, leaving the question
//! to the solver.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// Bit width of an expression.
pub type Width = u32;

fn mask(width: Width) -> u64 {
    debug_assert!(0 < width && width <= 64);
    if width == 64 {
        !0u64
    } else {
        (1u64 << width) - 1
    }
}

fn to_signed(value: u64, width: Width) -> i64 {
    let shift = 64 - width;
    ((value << shift) as i64) >> shift
}

/// A named symbolic array backing the byte contents of one memory
/// object. Arrays are compared by identity, never by name: the executor
/// guarantees names are unique within a path, but two paths may both
/// have a `var0`.
#[derive(Debug)]
pub struct Array {
    pub name: String,
    pub size: u64,
}

#[derive(Clone, Debug)]
pub struct ArrayRef(Arc<Array>);

impl ArrayRef {
    pub fn new(name: String, size: u64) -> Self {
        ArrayRef(Arc::new(Array { name, size }))
    }
}

impl Deref for ArrayRef {
    type Target = Array;

    fn deref(&self) -> &Array {
        &self.0
    }
}

impl PartialEq for ArrayRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ArrayRef {}

impl Hash for ArrayRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(Arc::as_ptr(&self.0) as usize)
    }
}

/// A shared, interned expression node. Equality and hashing are by
/// pointer, which coincides with structural equality for nodes built by
/// the same [ExprBuilder].
#[derive(Clone, Debug)]
pub struct ExprRef(Arc<Expr>);

impl Deref for ExprRef {
    type Target = Expr;

    fn deref(&self) -> &Expr {
        &self.0
    }
}

impl PartialEq for ExprRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ExprRef {}

impl Hash for ExprRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(Arc::as_ptr(&self.0) as usize)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        use BinOp::*;
        matches!(self, Eq | Ne | Ult | Ule | Ugt | Uge | Slt | Sle | Sgt | Sge)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExprKind {
    Const(u64),
    /// Width-8 read of one byte of a symbolic array.
    Read { array: ArrayRef, offset: u64 },
    /// `hi` occupies the most significant bits.
    Concat(ExprRef, ExprRef),
    /// Bit slice starting at `offset`; the slice width is the node width.
    Extract { expr: ExprRef, offset: Width },
    ZExt(ExprRef),
    SExt(ExprRef),
    Select { cond: ExprRef, tval: ExprRef, fval: ExprRef },
    Binary { op: BinOp, lhs: ExprRef, rhs: ExprRef },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Expr {
    width: Width,
    kind: ExprKind,
}

impl Expr {
    pub fn width(&self) -> Width {
        self.width
    }

    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    pub fn const_value(&self) -> Option<u64> {
        match self.kind {
            ExprKind::Const(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self.kind, ExprKind::Const(_))
    }

    pub fn is_true(&self) -> bool {
        self.width == 1 && self.const_value() == Some(1)
    }

    pub fn is_false(&self) -> bool {
        self.width == 1 && self.const_value() == Some(0)
    }

    pub fn is_zero(&self) -> bool {
        self.const_value() == Some(0)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            ExprKind::Const(v) => write!(f, "(_ bv{} {})", v, self.width),
            ExprKind::Read { array, offset } => write!(f, "{}[{}]", array.name, offset),
            kind => write!(f, "{:?}", kind),
        }
    }
}

fn fold_binary(op: BinOp, a: u64, b: u64, width: Width) -> Option<u64> {
    use BinOp::*;
    let m = mask(width);
    let sa = to_signed(a, width);
    let sb = to_signed(b, width);
    let bool_const = |b: bool| if b { 1 } else { 0 };
    Some(match op {
        Add => a.wrapping_add(b) & m,
        Sub => a.wrapping_sub(b) & m,
        Mul => a.wrapping_mul(b) & m,
        UDiv => {
            if b == 0 {
                return None;
            }
            a / b
        }
        SDiv => {
            if b == 0 {
                return None;
            }
            (sa.wrapping_div(sb) as u64) & m
        }
        URem => {
            if b == 0 {
                return None;
            }
            a % b
        }
        SRem => {
            if b == 0 {
                return None;
            }
            (sa.wrapping_rem(sb) as u64) & m
        }
        And => a & b,
        Or => a | b,
        Xor => a ^ b,
        Shl => {
            if b >= u64::from(width) {
                0
            } else {
                (a << b) & m
            }
        }
        LShr => {
            if b >= u64::from(width) {
                0
            } else {
                a >> b
            }
        }
        AShr => {
            if b >= u64::from(width) {
                if sa < 0 {
                    m
                } else {
                    0
                }
            } else {
                ((sa >> b) as u64) & m
            }
        }
        Eq => bool_const(a == b),
        Ne => bool_const(a != b),
        Ult => bool_const(a < b),
        Ule => bool_const(a <= b),
        Ugt => bool_const(a > b),
        Uge => bool_const(a >= b),
        Slt => bool_const(sa < sb),
        Sle => bool_const(sa <= sb),
        Sgt => bool_const(sa > sb),
        Sge => bool_const(sa >= sb),
    })
}

/// Owns the hash-consing table. One builder exists per path evaluation,
/// so nodes (and the arrays they read) are released with the path.
pub struct ExprBuilder {
    interned: HashMap<Expr, ExprRef, ahash::RandomState>,
}

impl ExprBuilder {
    pub fn new() -> Self {
        ExprBuilder { interned: HashMap::default() }
    }

    fn intern(&mut self, expr: Expr) -> ExprRef {
        if let Some(cached) = self.interned.get(&expr) {
            return cached.clone();
        }
        let fresh = ExprRef(Arc::new(expr.clone()));
        self.interned.insert(expr, fresh.clone());
        fresh
    }

    pub fn constant(&mut self, value: u64, width: Width) -> ExprRef {
        self.intern(Expr { width, kind: ExprKind::Const(value & mask(width)) })
    }

    pub fn bool_const(&mut self, value: bool) -> ExprRef {
        self.constant(u64::from(value), 1)
    }

    pub fn read(&mut self, array: &ArrayRef, offset: u64) -> ExprRef {
        debug_assert!(offset < array.size);
        self.intern(Expr { width: 8, kind: ExprKind::Read { array: array.clone(), offset } })
    }

    pub fn binary(&mut self, op: BinOp, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        debug_assert_eq!(lhs.width(), rhs.width());

        // The not-equal form all other code builds is !(lhs == rhs), so
        // the printer's negation rule applies to it.
        if op == BinOp::Ne {
            let eq = self.binary(BinOp::Eq, lhs, rhs);
            return self.is_zero(eq);
        }

        let width = if op.is_comparison() { 1 } else { lhs.width() };

        if let (Some(a), Some(b)) = (lhs.const_value(), rhs.const_value()) {
            if let Some(folded) = fold_binary(op, a, b, lhs.width()) {
                return self.constant(folded, width);
            }
        }

        if op == BinOp::Eq {
            if lhs == rhs {
                return self.bool_const(true);
            }
            // Keep constants on the left so zero-equality reads as a
            // negation when printed.
            if rhs.is_const() && !lhs.is_const() {
                return self.intern(Expr { width, kind: ExprKind::Binary { op, lhs: rhs, rhs: lhs } });
            }
        }

        self.intern(Expr { width, kind: ExprKind::Binary { op, lhs, rhs } })
    }

    /// `expr == 0` at the width of `expr`. For width-1 operands this is
    /// boolean negation.
    pub fn is_zero(&mut self, expr: ExprRef) -> ExprRef {
        let zero = self.constant(0, expr.width());
        self.binary(BinOp::Eq, zero, expr)
    }

    pub fn eq(&mut self, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        self.binary(BinOp::Eq, lhs, rhs)
    }

    pub fn and(&mut self, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        self.binary(BinOp::And, lhs, rhs)
    }

    pub fn or(&mut self, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        self.binary(BinOp::Or, lhs, rhs)
    }

    pub fn add(&mut self, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        self.binary(BinOp::Add, lhs, rhs)
    }

    pub fn sub(&mut self, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        self.binary(BinOp::Sub, lhs, rhs)
    }

    pub fn mul(&mut self, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        self.binary(BinOp::Mul, lhs, rhs)
    }

    pub fn extract(&mut self, expr: ExprRef, offset: Width, width: Width) -> ExprRef {
        debug_assert!(offset + width <= expr.width());

        if offset == 0 && width == expr.width() {
            return expr;
        }

        if let Some(v) = expr.const_value() {
            return self.constant(v >> offset, width);
        }

        match expr.kind() {
            // Narrow into whichever side of a concat the slice lies in.
            ExprKind::Concat(hi, lo) => {
                if offset + width <= lo.width() {
                    return self.extract(lo.clone(), offset, width);
                }
                if offset >= lo.width() {
                    let hi = hi.clone();
                    let shifted = offset - lo.width();
                    return self.extract(hi, shifted, width);
                }
            }
            ExprKind::Extract { expr: inner, offset: inner_offset } => {
                // Inner expressions of extract nodes are never extracts
                // themselves, so this recursion terminates.
                let inner = inner.clone();
                let total = inner_offset + offset;
                return self.extract(inner, total, width);
            }
            _ => (),
        }

        self.extract_node(expr, offset, width)
    }

    fn extract_node(&mut self, expr: ExprRef, offset: Width, width: Width) -> ExprRef {
        if offset == 0 && width == expr.width() {
            return expr;
        }
        self.intern(Expr { width, kind: ExprKind::Extract { expr, offset } })
    }

    pub fn concat(&mut self, hi: ExprRef, lo: ExprRef) -> ExprRef {
        let width = hi.width() + lo.width();

        if width <= 64 {
            if let (Some(h), Some(l)) = (hi.const_value(), lo.const_value()) {
                return self.constant((h << lo.width()) | l, width);
            }
        }

        // Adjacent slices of the same source fuse back into one slice,
        // so a value written byte-by-byte reads back as itself.
        if let (
            ExprKind::Extract { expr: hi_src, offset: hi_offset },
            ExprKind::Extract { expr: lo_src, offset: lo_offset },
        ) = (hi.kind(), lo.kind())
        {
            if hi_src == lo_src && *hi_offset == lo_offset + lo.width() {
                let src = lo_src.clone();
                return self.extract(src, *lo_offset, width);
            }
        }

        self.intern(Expr { width, kind: ExprKind::Concat(hi, lo) })
    }

    /// Zero extension. Narrowing requests truncate instead, matching how
    /// the cast instructions use this for pointer/integer conversions.
    pub fn zext(&mut self, expr: ExprRef, width: Width) -> ExprRef {
        if width == expr.width() {
            return expr;
        }
        if width < expr.width() {
            return self.extract(expr, 0, width);
        }
        if let Some(v) = expr.const_value() {
            return self.constant(v, width);
        }
        self.intern(Expr { width, kind: ExprKind::ZExt(expr) })
    }

    pub fn sext(&mut self, expr: ExprRef, width: Width) -> ExprRef {
        if width == expr.width() {
            return expr;
        }
        if width < expr.width() {
            return self.extract(expr, 0, width);
        }
        if let Some(v) = expr.const_value() {
            let extended = to_signed(v, expr.width()) as u64;
            return self.constant(extended, width);
        }
        self.intern(Expr { width, kind: ExprKind::SExt(expr) })
    }

    pub fn select(&mut self, cond: ExprRef, tval: ExprRef, fval: ExprRef) -> ExprRef {
        debug_assert_eq!(cond.width(), 1);
        debug_assert_eq!(tval.width(), fval.width());
        if cond.is_true() {
            return tval;
        }
        if cond.is_false() {
            return fval;
        }
        if tval == fval {
            return tval;
        }
        let width = tval.width();
        self.intern(Expr { width, kind: ExprKind::Select { cond, tval, fval } })
    }
}

impl Default for ExprBuilder {
    fn default() -> Self {
        Self::new()
    }
}
