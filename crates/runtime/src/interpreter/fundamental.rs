// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

use fluxvm_types::{StackWord, VmError};

use crate::{context::MachineContext, interpreter::InterpretControl};

pub fn pop(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    ctx.pop()?;
    Ok(InterpretControl::MoveOn(1))
}

pub fn push(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    // the immediate is one program word, zero-extended
    let immediate = ctx.operand()? as StackWord;
    ctx.push(immediate)?;
    Ok(InterpretControl::MoveOn(2))
}

pub fn dup(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    let value = ctx.peek()?;
    ctx.push(value)?;
    Ok(InterpretControl::MoveOn(1))
}

pub fn swap(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    let a = ctx.pop()?;
    let b = ctx.pop()?;
    ctx.push(a)?;
    ctx.push(b)?;
    Ok(InterpretControl::MoveOn(1))
}
