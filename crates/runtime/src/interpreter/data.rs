// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

// the three address spaces an instruction can touch:
//
// - LLOAD/LSTORE: machine locals, `globals[mlp + offset]`
// - GLOAD/GSTORE: absolute globals, `globals[address]`
// - SLOAD/SSTORE: frame slots, `stack[fp + offset]`
// - LOAD_STATIC: the read-only program image
//
// every access either succeeds or fails with a named out-of-range
// error, there is no silent out-of-bounds read or write.

use fluxvm_types::{StackWord, VmError};

use crate::{context::MachineContext, interpreter::InterpretControl};

pub fn lload(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    let offset = ctx.operand()? as usize;
    let value = ctx.global_load(ctx.mlp as usize + offset)?;
    ctx.push(value)?;
    Ok(InterpretControl::MoveOn(2))
}

pub fn lstore(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    let offset = ctx.operand()? as usize;
    let value = ctx.pop()?;
    ctx.global_store(ctx.mlp as usize + offset, value)?;
    Ok(InterpretControl::MoveOn(2))
}

pub fn gload(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    let address = ctx.operand()? as usize;
    let value = ctx.global_load(address)?;
    ctx.push(value)?;
    Ok(InterpretControl::MoveOn(2))
}

pub fn gstore(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    let address = ctx.operand()? as usize;
    let value = ctx.pop()?;
    ctx.global_store(address, value)?;
    Ok(InterpretControl::MoveOn(2))
}

pub fn sload(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    let offset = ctx.operand()? as usize;
    let address = ctx.frame_slot(offset)?;
    let value = ctx.memory[address];
    ctx.push(value)?;
    Ok(InterpretControl::MoveOn(2))
}

pub fn sstore(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    let offset = ctx.operand()? as usize;
    let value = ctx.pop()?;
    let address = ctx.frame_slot(offset)?;
    ctx.memory[address] = value;
    Ok(InterpretControl::MoveOn(2))
}

pub fn load_static(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    let address = ctx.pop_index()?;
    let word = ctx.image.word(address)?;
    ctx.push(word as StackWord)?;
    Ok(InterpretControl::MoveOn(1))
}
