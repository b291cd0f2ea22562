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

//! Builders for constructing small modules and functions in tests,
//! standing in for the external IR front-end. Instructions can be pushed
//! into blocks in any order; finishing a function flattens them into the
//! contiguous per-block layout the engine expects, remapping result
//! operands as it goes.

use crate::expr::{BinOp, Width};
use crate::ir::*;

pub struct ModuleBuilder {
    target: Target,
    types: TypeTable,
    constants: Vec<ConstDef>,
    globals: Vec<GlobalVar>,
    functions: Vec<Function>,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        let target = Target::little_endian(64);
        ModuleBuilder {
            target,
            types: TypeTable::new(&target),
            constants: Vec::new(),
            globals: Vec::new(),
            functions: Vec::new(),
        }
    }

    pub fn int_ty(&mut self, width: Width) -> TyId {
        self.types.add(Ty::Int(width))
    }

    pub fn ptr_ty(&mut self, pointee: TyId) -> TyId {
        self.types.add(Ty::Ptr(pointee))
    }

    pub fn array_ty(&mut self, elem: TyId, len: u64) -> TyId {
        self.types.add(Ty::Array { elem, len })
    }

    pub fn struct_ty(&mut self, fields: Vec<TyId>, offsets: Vec<u64>, size: u64) -> TyId {
        self.types.add(Ty::Struct { fields, offsets, size })
    }

    pub fn const_int_id(&mut self, value: u64, width: Width) -> ConstId {
        self.constants.push(ConstDef::Int { value, width });
        ConstId(self.constants.len() - 1)
    }

    pub fn const_int(&mut self, value: u64, width: Width) -> Operand {
        Operand::Const(self.const_int_id(value, width))
    }

    pub fn global(&mut self, name: &str, ty: TyId, read_only: bool, init: Option<Vec<u8>>) -> GlobalId {
        self.globals.push(GlobalVar { name: name.to_string(), ty, align: 8, read_only, init });
        GlobalId(self.globals.len() - 1)
    }

    pub fn const_global(&mut self, global: GlobalId) -> Operand {
        self.constants.push(ConstDef::Global(global));
        Operand::Const(ConstId(self.constants.len() - 1))
    }

    pub fn finish(self) -> Module {
        Module {
            target: self.target,
            types: self.types,
            constants: self.constants,
            globals: self.globals,
            functions: self.functions,
        }
    }
}

pub struct FunctionBuilder {
    name: String,
    args: Vec<TyId>,
    blocks: Vec<(String, Vec<usize>)>,
    instrs: Vec<Instr>,
}

impl FunctionBuilder {
    pub fn new(name: &str, args: Vec<TyId>) -> Self {
        FunctionBuilder { name: name.to_string(), args, blocks: Vec::new(), instrs: Vec::new() }
    }

    /// Declare a block. The first declared block is the entry.
    pub fn block(&mut self, name: &str) -> BlockId {
        self.blocks.push((name.to_string(), Vec::new()));
        BlockId(self.blocks.len() - 1)
    }

    /// Append an instruction to `block`, returning an operand naming its
    /// result.
    pub fn push(&mut self, block: BlockId, instr: Instr) -> Operand {
        let id = self.instrs.len();
        self.instrs.push(instr);
        self.blocks[block.0].1.push(id);
        Operand::Result(id)
    }

    pub fn finish(self, module: &mut ModuleBuilder) -> usize {
        let mut order = vec![0; self.instrs.len()];
        let mut flat = Vec::new();
        let mut blocks = Vec::new();
        let mut next = 0;
        for (name, ids) in &self.blocks {
            let start = next;
            for &id in ids {
                order[id] = next;
                flat.push(id);
                next += 1;
            }
            blocks.push(BasicBlock { name: name.clone(), instrs: start..next });
        }
        let mut instrs: Vec<Instr> = flat.iter().map(|&id| self.instrs[id].clone()).collect();
        for instr in instrs.iter_mut() {
            remap_instr(instr, &order)
        }
        module.functions.push(Function {
            name: self.name,
            args: self.args,
            blocks,
            instrs,
            entry: BlockId(0),
        });
        module.functions.len() - 1
    }
}

fn remap(op: &mut Operand, order: &[usize]) {
    if let Operand::Result(i) = op {
        *i = order[*i]
    }
}

fn remap_instr(instr: &mut Instr, order: &[usize]) {
    match instr {
        Instr::Binary { lhs, rhs, .. } => {
            remap(lhs, order);
            remap(rhs, order)
        }
        Instr::Cast { value, .. } => remap(value, order),
        Instr::Alloca { .. } => (),
        Instr::Load { addr, .. } => remap(addr, order),
        Instr::Store { value, addr } => {
            remap(value, order);
            remap(addr, order)
        }
        Instr::Gep { base, indices, .. } => {
            remap(base, order);
            for index in indices {
                remap(index, order)
            }
        }
        Instr::ExtractValue { agg, .. } => remap(agg, order),
        Instr::InsertValue { agg, value, .. } => {
            remap(agg, order);
            remap(value, order)
        }
        Instr::Select { cond, tval, fval } => {
            remap(cond, order);
            remap(tval, order);
            remap(fval, order)
        }
        Instr::Br { cond, .. } => {
            if let Some(cond) = cond {
                remap(cond, order)
            }
        }
        Instr::Switch { value, .. } => remap(value, order),
        Instr::Ret { value } => {
            if let Some(value) = value {
                remap(value, order)
            }
        }
        Instr::Unsupported(_) => (),
    }
}

pub fn arg(index: usize) -> Operand {
    Operand::Arg(index)
}

pub fn alloca(ty: TyId) -> Instr {
    Instr::Alloca { ty, align: 8 }
}

pub fn load(addr: Operand, ty: TyId) -> Instr {
    Instr::Load { addr, ty }
}

pub fn store(value: Operand, addr: Operand) -> Instr {
    Instr::Store { value, addr }
}

pub fn binary(op: BinOp, lhs: Operand, rhs: Operand) -> Instr {
    Instr::Binary { op, lhs, rhs }
}

pub fn gep(base: Operand, pointee: TyId, indices: Vec<Operand>) -> Instr {
    Instr::Gep { base, pointee, indices }
}

pub fn br(dest: BlockId) -> Instr {
    Instr::Br { cond: None, then_dest: dest, else_dest: None }
}

pub fn br_cond(cond: Operand, then_dest: BlockId, else_dest: BlockId) -> Instr {
    Instr::Br { cond: Some(cond), then_dest, else_dest: Some(else_dest) }
}

pub fn switch(value: Operand, default: BlockId, cases: Vec<(ConstId, BlockId)>) -> Instr {
    Instr::Switch { value, default, cases }
}

pub fn ret(value: Operand) -> Instr {
    Instr::Ret { value: Some(value) }
}

pub fn ret_void() -> Instr {
    Instr::Ret { value: None }
}

pub fn unsupported(class: UnsupportedClass) -> Instr {
    Instr::Unsupported(class)
}

/// `var0 = 5; return var0;` in a single block.
pub fn straight_line_program() -> (Module, usize) {
    let mut module = ModuleBuilder::new();
    let i32 = module.int_ty(32);
    let five = module.const_int(5, 32);

    let mut f = FunctionBuilder::new("straight", vec![]);
    let entry = f.block("entry");
    let var = f.push(entry, alloca(i32));
    f.push(entry, store(five, var));
    let result = f.push(entry, load(var, i32));
    f.push(entry, ret(result));

    let id = f.finish(&mut module);
    (module.finish(), id)
}

/// `if (arg0 > 0) var0 = 1; else var0 = -1; return var0;`
pub fn branch_program() -> (Module, usize) {
    let mut module = ModuleBuilder::new();
    let i32 = module.int_ty(32);
    let zero = module.const_int(0, 32);
    let one = module.const_int(1, 32);
    let minus_one = module.const_int(0xffff_ffff, 32);

    let mut f = FunctionBuilder::new("sign", vec![i32]);
    let entry = f.block("entry");
    let then_block = f.block("if.then");
    let else_block = f.block("if.else");
    let end = f.block("if.end");

    let var = f.push(entry, alloca(i32));
    let cond = f.push(entry, binary(BinOp::Sgt, arg(0), zero));
    f.push(entry, br_cond(cond, then_block, else_block));
    f.push(then_block, store(one, var));
    f.push(then_block, br(end));
    f.push(else_block, store(minus_one, var));
    f.push(else_block, br(end));
    let result = f.push(end, load(var, i32));
    f.push(end, ret(result));

    let id = f.finish(&mut module);
    (module.finish(), id)
}

/// `var0 = 0; do { var0 = var0 + 1; } while (var0 < arg0); return var0;`
pub fn loop_program() -> (Module, usize) {
    let mut module = ModuleBuilder::new();
    let i32 = module.int_ty(32);
    let zero = module.const_int(0, 32);
    let one = module.const_int(1, 32);

    let mut f = FunctionBuilder::new("count", vec![i32]);
    let entry = f.block("entry");
    let header = f.block("loop");
    let exit = f.block("exit");

    let var = f.push(entry, alloca(i32));
    f.push(entry, store(zero, var));
    f.push(entry, br(header));
    let current = f.push(header, load(var, i32));
    let next = f.push(header, binary(BinOp::Add, current, one));
    f.push(header, store(next, var));
    let cond = f.push(header, binary(BinOp::Slt, next, arg(0)));
    f.push(header, br_cond(cond, header, exit));
    let result = f.push(exit, load(var, i32));
    f.push(exit, ret(result));

    let id = f.finish(&mut module);
    (module.finish(), id)
}
