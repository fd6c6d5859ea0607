// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

// every branch pops `target`, then `lhs`, then `rhs`, and jumps when
// the comparison on StackWords holds. push order is therefore
// rhs, lhs, target.

use fluxvm_types::{StackWord, VmError};

use crate::{context::MachineContext, interpreter::InterpretControl};

fn branch(
    ctx: &mut MachineContext,
    condition: impl FnOnce(StackWord, StackWord) -> bool,
) -> Result<InterpretControl, VmError> {
    let target = ctx.pop_code_address()?;
    let lhs = ctx.pop()?;
    let rhs = ctx.pop()?;
    if condition(lhs, rhs) {
        Ok(InterpretControl::Jump(target))
    } else {
        Ok(InterpretControl::MoveOn(1))
    }
}

pub fn brlt(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    branch(ctx, |lhs, rhs| lhs < rhs)
}

pub fn brlte(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    branch(ctx, |lhs, rhs| lhs <= rhs)
}

pub fn brgt(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    branch(ctx, |lhs, rhs| lhs > rhs)
}

pub fn brgte(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    branch(ctx, |lhs, rhs| lhs >= rhs)
}

pub fn breq(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    branch(ctx, |lhs, rhs| lhs == rhs)
}
