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

//! This module defines the program representation the engine consumes: a
//! simple goto/conditional-branch IR of basic blocks over typed
//! instructions, together with a type/layout table and a target
//! description. The representation is produced by an external front-end
//! and is immutable once built; the engine holds indices into it and
//! never mutates or frees it.
//!
//! Every instruction has an implicit destination register (its own index
//! in the function's flat instruction array), and operands refer either
//! to another instruction's result, to a function argument, or to an
//! entry in the module's constant table. Instruction indexing therefore
//! mirrors the interpreter's locals array: argument cells first, one
//! cell per instruction after.

use std::ops::Range;

use crate::expr::{BinOp, Width};

/// Pointer width and byte order of the compilation target, fixed when
/// the module is built and never changed afterwards.
#[derive(Copy, Clone, Debug)]
pub struct Target {
    pub ptr_width: Width,
    pub big_endian: bool,
}

impl Target {
    pub fn little_endian(ptr_width: Width) -> Self {
        Target { ptr_width, big_endian: false }
    }

    pub fn ptr_bytes(&self) -> u64 {
        u64::from(self.ptr_width) / 8
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TyId(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConstId(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct GlobalId(pub usize);

/// Types as the front-end's layout oracle describes them. Struct layout
/// (field offsets and total size, padding included) is supplied by the
/// front-end, not recomputed here.
#[derive(Clone, Debug)]
pub enum Ty {
    Int(Width),
    Ptr(TyId),
    Array { elem: TyId, len: u64 },
    Struct { fields: Vec<TyId>, offsets: Vec<u64>, size: u64 },
}

pub struct TypeTable {
    types: Vec<Ty>,
    ptr_width: Width,
}

impl TypeTable {
    pub fn new(target: &Target) -> Self {
        TypeTable { types: Vec::new(), ptr_width: target.ptr_width }
    }

    pub fn add(&mut self, ty: Ty) -> TyId {
        self.types.push(ty);
        TyId(self.types.len() - 1)
    }

    pub fn get(&self, id: TyId) -> &Ty {
        &self.types[id.0]
    }

    /// Width in bits of a value of this type, used for loads and for
    /// reading a variable's full contents at the end of a path.
    pub fn width_of(&self, id: TyId) -> Width {
        match self.get(id) {
            Ty::Int(width) => *width,
            Ty::Ptr(_) => self.ptr_width,
            Ty::Array { .. } | Ty::Struct { .. } => 8 * self.store_size(id) as Width,
        }
    }

    /// Size in bytes a stored value of this type occupies.
    pub fn store_size(&self, id: TyId) -> u64 {
        match self.get(id) {
            Ty::Int(width) => u64::from(width + 7) / 8,
            Ty::Ptr(_) => u64::from(self.ptr_width) / 8,
            Ty::Array { elem, len } => self.store_size(*elem) * len,
            Ty::Struct { size, .. } => *size,
        }
    }

    pub fn field_ty(&self, id: TyId, field: u64) -> TyId {
        match self.get(id) {
            Ty::Struct { fields, .. } => fields[field as usize],
            Ty::Array { elem, .. } => *elem,
            _ => panic!("field access on non-aggregate type"),
        }
    }

    pub fn field_offset(&self, id: TyId, field: u64) -> u64 {
        match self.get(id) {
            Ty::Struct { offsets, .. } => offsets[field as usize],
            Ty::Array { elem, .. } => self.store_size(*elem) * field,
            _ => panic!("field offset on non-aggregate type"),
        }
    }

    /// For types indexable by a possibly-symbolic position (arrays, and
    /// pointers for the leading index of an address computation), the
    /// element type and its byte stride. Structs are not sequential:
    /// their indices are constants resolved through [Self::field_offset].
    pub fn sequential_element(&self, id: TyId) -> Option<(TyId, u64)> {
        match self.get(id) {
            Ty::Array { elem, .. } => Some((*elem, self.store_size(*elem))),
            Ty::Ptr(pointee) => Some((*pointee, self.store_size(*pointee))),
            _ => None,
        }
    }

    /// Byte offset and leaf type of an aggregate member reached by a
    /// constant index path, for insert/extract operations.
    pub fn member_offset(&self, id: TyId, indices: &[u64]) -> (u64, TyId) {
        let mut offset = 0;
        let mut ty = id;
        for &index in indices {
            offset += self.field_offset(ty, index);
            ty = self.field_ty(ty, index);
        }
        (offset, ty)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    /// A function argument cell.
    Arg(usize),
    /// The result of the instruction at this index.
    Result(usize),
    /// An entry in the module constant table.
    Const(ConstId),
}

#[derive(Clone, Debug)]
pub enum ConstDef {
    Int { value: u64, width: Width },
    /// The address of a global, concrete only once the global's object
    /// has been allocated for the current path.
    Global(GlobalId),
}

#[derive(Clone, Debug)]
pub struct GlobalVar {
    pub name: String,
    pub ty: TyId,
    pub align: u64,
    pub read_only: bool,
    /// Concrete initializer bytes. Globals without an initializer get
    /// fully symbolic contents.
    pub init: Option<Vec<u8>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CastOp {
    Trunc,
    ZExt,
    SExt,
    IntToPtr,
    PtrToInt,
    BitCast,
}

/// Instruction classes the interpreter refuses to execute. They are
/// representable so that front-ends can hand over whole functions; paths
/// that reach one fail with a typed error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnsupportedClass {
    Call,
    Phi,
    Float,
    Vector,
    IndirectBr,
    Unreachable,
    Atomic,
    VaArg,
}

impl UnsupportedClass {
    pub fn describe(self) -> &'static str {
        use UnsupportedClass::*;
        match self {
            Call => "function call",
            Phi => "phi node",
            Float => "floating point operation",
            Vector => "vector operation",
            IndirectBr => "indirect branch",
            Unreachable => "unreachable",
            Atomic => "atomic operation",
            VaArg => "variadic argument access",
        }
    }
}

#[derive(Clone, Debug)]
pub enum Instr {
    /// Arithmetic, bitwise, and comparison operations; comparisons
    /// produce width-1 results.
    Binary { op: BinOp, lhs: Operand, rhs: Operand },
    Cast { op: CastOp, value: Operand, to: TyId },
    Alloca { ty: TyId, align: u64 },
    Load { addr: Operand, ty: TyId },
    Store { value: Operand, addr: Operand },
    /// Address computation over a pointer to `pointee`. Struct indices
    /// must be constants; sequential indices may be symbolic.
    Gep { base: Operand, pointee: TyId, indices: Vec<Operand> },
    ExtractValue { agg: Operand, agg_ty: TyId, indices: Vec<u64> },
    InsertValue { agg: Operand, value: Operand, agg_ty: TyId, indices: Vec<u64> },
    Select { cond: Operand, tval: Operand, fval: Operand },
    Br { cond: Option<Operand>, then_dest: BlockId, else_dest: Option<BlockId> },
    Switch { value: Operand, default: BlockId, cases: Vec<(ConstId, BlockId)> },
    Ret { value: Option<Operand> },
    Unsupported(UnsupportedClass),
}

impl Instr {
    pub fn is_terminator(&self) -> bool {
        matches!(self, Instr::Br { .. } | Instr::Switch { .. } | Instr::Ret { .. })
    }
}

/// A basic block: a name (used for path traces and cutpoint
/// identifiers) and a contiguous range of the function's instruction
/// array, whose last element is the block's terminator.
#[derive(Clone, Debug)]
pub struct BasicBlock {
    pub name: String,
    pub instrs: Range<usize>,
}

pub struct Function {
    pub name: String,
    pub args: Vec<TyId>,
    pub blocks: Vec<BasicBlock>,
    pub instrs: Vec<Instr>,
    pub entry: BlockId,
}

impl Function {
    pub fn num_cells(&self) -> usize {
        self.args.len() + self.instrs.len()
    }

    pub fn arg_cell(&self, index: usize) -> usize {
        index
    }

    pub fn result_cell(&self, instr: usize) -> usize {
        self.args.len() + instr
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0]
    }

    pub fn block_range(&self, id: BlockId) -> Range<usize> {
        self.block(id).instrs.clone()
    }

    pub fn block_named(&self, name: &str) -> Option<BlockId> {
        self.blocks.iter().position(|block| block.name == name).map(BlockId)
    }

    pub fn terminator(&self, id: BlockId) -> Option<&Instr> {
        let range = self.block_range(id);
        if range.is_empty() {
            None
        } else {
            Some(&self.instrs[range.end - 1])
        }
    }

    /// Successor blocks in the block's declared order: branch targets in
    /// then/else order, a switch's default followed by its cases. This
    /// order determines path discovery order.
    pub fn successors(&self, id: BlockId) -> Vec<BlockId> {
        match self.terminator(id) {
            Some(Instr::Br { cond: None, then_dest, .. }) => vec![*then_dest],
            Some(Instr::Br { cond: Some(_), then_dest, else_dest, .. }) => {
                let mut succs = vec![*then_dest];
                if let Some(else_dest) = else_dest {
                    succs.push(*else_dest);
                }
                succs
            }
            Some(Instr::Switch { default, cases, .. }) => {
                let mut succs = vec![*default];
                succs.extend(cases.iter().map(|(_, dest)| *dest));
                succs
            }
            _ => Vec::new(),
        }
    }
}

pub struct Module {
    pub target: Target,
    pub types: TypeTable,
    pub constants: Vec<ConstDef>,
    pub globals: Vec<GlobalVar>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn function_named(&self, name: &str) -> Option<usize> {
        self.functions.iter().position(|function| function.name == name)
    }
}
