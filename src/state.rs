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

//! The interpreter state for one path: the locals of the single stack
//! frame, the live allocations, and the path condition accumulated so
//! far. A state is created fresh for each path and dropped, together
//! with all its memory objects and expressions, before the next path
//! starts.

use std::collections::HashSet;

use crate::error::ExecError;
use crate::expr::{ArrayRef, ExprBuilder, ExprRef};
use crate::ir::{BlockId, Function, TyId};
use crate::memory::{Address, AddressSpace, MemoryAllocator};

/// A position in the function: the current block and the index of the
/// instruction in the function's flat instruction array.
pub type Pc = (BlockId, usize);

/// One stack local, remembered so the end of the path can read back the
/// variable's final contents as its parallel-assignment expression.
pub struct AllocaBinding {
    pub name: String,
    pub base: Address,
    /// The allocated element type, whose full width is read back.
    pub ty: TyId,
}

pub struct ExecutionState {
    pub pc: Pc,
    pub prev_pc: Pc,
    /// Argument cells first, then one cell per instruction. A cell is
    /// `None` until the path computes it.
    locals: Vec<Option<ExprRef>>,
    num_args: usize,
    pub allocas: Vec<AllocaBinding>,
    /// The path condition, appended to and never reordered.
    constraints: Vec<ExprRef>,
    pub allocator: MemoryAllocator,
    pub space: AddressSpace,
    pub builder: ExprBuilder,
    /// Base address of each global for this path, indexed by global id.
    pub global_bases: Vec<Address>,
    array_names: HashSet<String, ahash::RandomState>,
    pub steps: u64,
}

impl ExecutionState {
    pub fn new(function: &Function) -> Self {
        ExecutionState {
            pc: (function.entry, 0),
            prev_pc: (function.entry, 0),
            locals: vec![None; function.num_cells()],
            num_args: function.args.len(),
            allocas: Vec::new(),
            constraints: Vec::new(),
            allocator: MemoryAllocator::new(),
            space: AddressSpace::new(),
            builder: ExprBuilder::new(),
            global_bases: Vec::new(),
            array_names: HashSet::default(),
            steps: 0,
        }
    }

    pub fn bind(&mut self, cell: usize, value: ExprRef) {
        self.locals[cell] = Some(value)
    }

    /// The value in a locals cell. Referencing a result the path never
    /// computed is a per-path error, not a panic: it happens when a
    /// value crosses a cutpoint boundary outside memory.
    pub fn local(&self, cell: usize) -> Result<ExprRef, ExecError> {
        self.locals[cell]
            .clone()
            .ok_or_else(|| ExecError::UnboundLocal(cell.saturating_sub(self.num_args)))
    }

    pub fn push_constraint(&mut self, constraint: ExprRef) {
        self.constraints.push(constraint)
    }

    pub fn constraints(&self) -> &[ExprRef] {
        &self.constraints
    }

    /// A backing array for a symbolic object, with its name uniquified
    /// within this path. Array identity, not the name, is what equality
    /// uses; the name only has to be unambiguous in printed output.
    pub fn fresh_array(&mut self, name: &str, size: u64) -> ArrayRef {
        if self.array_names.insert(name.to_string()) {
            return ArrayRef::new(name.to_string(), size);
        }
        let mut suffix = 1;
        loop {
            let candidate = format!("{}.{}", name, suffix);
            if self.array_names.insert(candidate.clone()) {
                return ArrayRef::new(candidate, size);
            }
            suffix += 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;

    #[test]
    fn unbound_cells_are_errors() {
        let (module, id) = straight_line_program();
        let function = &module.functions[id];
        let state = ExecutionState::new(function);
        assert!(matches!(state.local(0), Err(ExecError::UnboundLocal(0))));
    }

    #[test]
    fn array_names_are_uniquified() {
        let (module, id) = straight_line_program();
        let function = &module.functions[id];
        let mut state = ExecutionState::new(function);
        let a = state.fresh_array("var0", 4);
        let b = state.fresh_array("var0", 4);
        assert_eq!(a.name, "var0");
        assert_eq!(b.name, "var0.1");
        assert_ne!(a, b);
    }
}
