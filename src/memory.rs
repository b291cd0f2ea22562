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

//! The symbolic memory model. Every allocation has a concrete base
//! address and a concrete size, while its contents are byte-granular
//! symbolic expressions. An [AddressSpace] maps live objects to their
//! contents, ordered by base address, and resolves concrete addresses to
//! the single object containing them. An address must resolve to exactly
//! one object; the engine does not fork over multiple candidates.
//!
//! Bounds checks are phrased as inequalities and put to the solver
//! oracle under the current path condition rather than decided locally,
//! so the answer stays consistent with whatever facts the path has
//! already committed to.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::ExecError;
use crate::expr::{ArrayRef, BinOp, ExprBuilder, ExprRef, Width};
use crate::log;
use crate::solver::Oracle;

/// Addresses are concrete 64-bit values even when the bytes they point
/// at are symbolic.
pub type Address = u64;

const FALLBACK_ALIGN: u64 = 8;

/// One allocation: a global, an argument's backing store, or a stack
/// local. The base address and size are always concrete; symbolic-size
/// allocation is unsupported.
#[derive(Clone, Debug)]
pub struct MemoryObject {
    pub id: usize,
    pub base: Address,
    pub size: u64,
    pub align: u64,
    pub is_local: bool,
    pub is_global: bool,
    pub name: String,
}

/// Hands out non-overlapping, aligned, concrete base addresses. One
/// allocator exists per path, so addresses repeat across paths but never
/// within one.
pub struct MemoryAllocator {
    next: Address,
    count: usize,
}

impl MemoryAllocator {
    pub fn new() -> Self {
        MemoryAllocator { next: 0x10000, count: 0 }
    }

    /// Alignment must be a power of two; other requests are coerced to
    /// the fallback alignment with a diagnostic rather than refused.
    pub fn allocate(
        &mut self,
        size: u64,
        align: u64,
        is_local: bool,
        is_global: bool,
        name: String,
    ) -> MemoryObject {
        let align = if align.is_power_of_two() {
            align
        } else {
            log!(
                log::MEMORY,
                &format!("alignment {} for {} is not a power of two, using {}", align, name, FALLBACK_ALIGN)
            );
            FALLBACK_ALIGN
        };
        let base = (self.next + (align - 1)) & !(align - 1);
        // Leave a gap so one-past-the-end addresses stay outside every
        // object.
        self.next = base + size + 1;
        let id = self.count;
        self.count += 1;
        log!(log::MEMORY, &format!("allocate {} at {:#x} size {}", name, base, size));
        MemoryObject { id, base, size, align, is_local, is_global, name }
    }
}

impl Default for MemoryAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// The symbolic byte contents of one object. Created when the object is
/// bound into an address space; immutable once flagged read-only.
pub struct ObjectState {
    bytes: Vec<ExprRef>,
    read_only: bool,
}

impl ObjectState {
    /// Fully symbolic contents, one byte read per cell of the backing
    /// array.
    pub fn symbolic(builder: &mut ExprBuilder, array: &ArrayRef) -> Self {
        let bytes = (0..array.size).map(|i| builder.read(array, i)).collect();
        ObjectState { bytes, read_only: false }
    }

    /// Fully concrete contents from initializer bytes.
    pub fn concrete(builder: &mut ExprBuilder, init: &[u8]) -> Self {
        let bytes = init.iter().map(|b| builder.constant(u64::from(*b), 8)).collect();
        ObjectState { bytes, read_only: false }
    }

    pub fn set_read_only(&mut self) {
        self.read_only = true
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Assemble `width` bits starting at byte `offset`, little endian:
    /// higher bytes occupy more significant bits. Widths that are not a
    /// byte multiple take the low bits of their final byte.
    pub fn read(&self, builder: &mut ExprBuilder, offset: u64, width: Width) -> ExprRef {
        debug_assert!(width > 0);
        debug_assert!(offset + u64::from(width + 7) / 8 <= self.size());
        let full_bytes = u64::from(width / 8);
        let rem = width % 8;

        let mut value: Option<ExprRef> = None;
        for i in 0..full_bytes {
            let byte = self.bytes[(offset + i) as usize].clone();
            value = Some(match value {
                None => byte,
                Some(low) => builder.concat(byte, low),
            })
        }
        if rem > 0 {
            let byte = self.bytes[(offset + full_bytes) as usize].clone();
            let part = builder.extract(byte, 0, rem);
            value = Some(match value {
                None => part,
                Some(low) => builder.concat(part, low),
            })
        }
        value.expect("zero-width read")
    }

    /// Scatter `value` into the bytes starting at `offset`. The caller
    /// has already bounds-checked the access and rejected read-only
    /// states.
    pub fn write(&mut self, builder: &mut ExprBuilder, offset: u64, value: &ExprRef) {
        debug_assert!(!self.read_only);
        debug_assert!(offset + u64::from(value.width() + 7) / 8 <= self.size());
        let width = value.width();
        let mut bit = 0;
        let mut index = offset as usize;
        while bit < width {
            let take = (width - bit).min(8);
            let mut byte = builder.extract(value.clone(), bit, take);
            if take < 8 {
                byte = builder.zext(byte, 8)
            }
            self.bytes[index] = byte;
            bit += take;
            index += 1;
        }
    }
}

/// An object together with its contents.
pub struct Binding {
    pub object: MemoryObject,
    pub state: ObjectState,
}

/// Maps every live object to its contents, ordered by base address.
pub struct AddressSpace {
    bindings: BTreeMap<Address, Binding>,
}

impl AddressSpace {
    pub fn new() -> Self {
        AddressSpace { bindings: BTreeMap::new() }
    }

    pub fn bind(&mut self, object: MemoryObject, state: ObjectState) -> Address {
        debug_assert_eq!(object.size, state.size());
        let base = object.base;
        self.bindings.insert(base, Binding { object, state });
        base
    }

    /// The single live object whose range contains `addr`. Addresses
    /// outside every object are a resolution failure, not a panic: the
    /// interpreter surfaces them as a per-path error.
    pub fn resolve_one(&mut self, addr: Address) -> Result<&mut Binding, ExecError> {
        match self.bindings.range_mut(..=addr).next_back() {
            Some((_, binding)) if addr < binding.object.base + binding.object.size => Ok(binding),
            _ => Err(ExecError::ResolutionFailure(format!(
                "no live object contains address {:#x}",
                addr
            ))),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.values()
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

/// Check that `width_bytes` bytes at `offset` lie inside `object` in
/// every model of the path condition. A solver timeout here is fatal to
/// the path, since the engine cannot proceed without this fact.
pub fn bounds_check(
    builder: &mut ExprBuilder,
    oracle: &mut dyn Oracle,
    constraints: &[ExprRef],
    object: &MemoryObject,
    offset: u64,
    width_bytes: u64,
    timeout: Duration,
) -> Result<(), ExecError> {
    let end = builder.constant(offset.saturating_add(width_bytes), 64);
    let size = builder.constant(object.size, 64);
    let in_bounds = builder.binary(BinOp::Ule, end, size);
    if oracle.must_be_true(constraints, &in_bounds, timeout)? {
        Ok(())
    } else {
        Err(ExecError::BoundsViolation { object: object.name.clone(), width_bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::FoldOracle;

    fn symbolic_object(
        builder: &mut ExprBuilder,
        allocator: &mut MemoryAllocator,
        name: &str,
        size: u64,
    ) -> (MemoryObject, ObjectState) {
        let object = allocator.allocate(size, 8, true, false, name.to_string());
        let array = ArrayRef::new(name.to_string(), size);
        let state = ObjectState::symbolic(builder, &array);
        (object, state)
    }

    #[test]
    fn allocations_do_not_overlap() {
        let mut allocator = MemoryAllocator::new();
        let a = allocator.allocate(16, 8, true, false, "a".to_string());
        let b = allocator.allocate(4, 8, true, false, "b".to_string());
        assert!(a.base + a.size < b.base);
        assert_eq!(b.base % 8, 0);
    }

    #[test]
    fn bad_alignment_is_coerced() {
        let mut allocator = MemoryAllocator::new();
        let object = allocator.allocate(8, 3, true, false, "odd".to_string());
        assert_eq!(object.align, 8);
        assert_eq!(object.base % 8, 0);
    }

    #[test]
    fn write_then_read_roundtrips() {
        let mut builder = ExprBuilder::new();
        let mut allocator = MemoryAllocator::new();
        let (_, mut state) = symbolic_object(&mut builder, &mut allocator, "var0", 16);

        let input = ArrayRef::new("arg0".to_string(), 4);
        let mut value = builder.read(&input, 0);
        for i in 1..4 {
            let byte = builder.read(&input, i);
            value = builder.concat(byte, value);
        }

        state.write(&mut builder, 2, &value);
        let back = state.read(&mut builder, 2, 32);
        assert_eq!(back, value);
    }

    #[test]
    fn narrow_write_leaves_neighbours_intact() {
        let mut builder = ExprBuilder::new();
        let mut allocator = MemoryAllocator::new();
        let (_, mut state) = symbolic_object(&mut builder, &mut allocator, "var0", 4);

        let before = state.read(&mut builder, 0, 32);
        let byte = builder.constant(0xab, 8);
        state.write(&mut builder, 3, &byte);

        let low = state.read(&mut builder, 0, 24);
        let expected_low = builder.extract(before, 0, 24);
        assert_eq!(low, expected_low);
        let high = state.read(&mut builder, 3, 8);
        assert_eq!(high.const_value(), Some(0xab));
    }

    #[test]
    fn sub_byte_values_roundtrip() {
        let mut builder = ExprBuilder::new();
        let mut allocator = MemoryAllocator::new();
        let (_, mut state) = symbolic_object(&mut builder, &mut allocator, "var0", 1);

        let bit = builder.constant(1, 1);
        state.write(&mut builder, 0, &bit);
        let back = state.read(&mut builder, 0, 1);
        assert!(back.is_true());
    }

    #[test]
    fn resolution_finds_the_containing_object() {
        let mut builder = ExprBuilder::new();
        let mut allocator = MemoryAllocator::new();
        let mut space = AddressSpace::new();

        let (a, a_state) = symbolic_object(&mut builder, &mut allocator, "a", 8);
        let (b, b_state) = symbolic_object(&mut builder, &mut allocator, "b", 8);
        let a_base = space.bind(a, a_state);
        let b_base = space.bind(b, b_state);

        assert_eq!(space.resolve_one(a_base + 7).unwrap().object.name, "a");
        assert_eq!(space.resolve_one(b_base).unwrap().object.name, "b");

        // One past the end of an object resolves to nothing.
        let miss = space.resolve_one(a_base + 8);
        assert!(matches!(miss, Err(ExecError::ResolutionFailure(_))));
        let miss = space.resolve_one(0);
        assert!(matches!(miss, Err(ExecError::ResolutionFailure(_))));
    }

    #[test]
    fn bounds_check_accepts_and_rejects() {
        let mut builder = ExprBuilder::new();
        let mut allocator = MemoryAllocator::new();
        let mut oracle = FoldOracle;
        let object = allocator.allocate(8, 8, true, false, "var0".to_string());
        let timeout = Duration::from_millis(100);

        assert!(bounds_check(&mut builder, &mut oracle, &[], &object, 4, 4, timeout).is_ok());
        let err = bounds_check(&mut builder, &mut oracle, &[], &object, 5, 4, timeout);
        assert!(matches!(err, Err(ExecError::BoundsViolation { width_bytes: 4, .. })));
    }
}
