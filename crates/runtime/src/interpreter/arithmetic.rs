// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

// binary operators pop `a` (the top) then `b`; the result is `b op a`,
// i.e. the top of stack is the right-hand side. ADD/SUB/MUL wrap
// modulo 2^32; DIV/MOD by zero surface InvalidOp carrying the opcode
// word. the logical group (AND/OR/XOR/NOT) works on non-zeroness and
// pushes 0 or 1.

use fluxvm_types::{opcode::Opcode, StackWord, VmError};

use crate::{context::MachineContext, interpreter::InterpretControl};

fn binary(
    ctx: &mut MachineContext,
    op: impl FnOnce(StackWord, StackWord) -> Result<StackWord, VmError>,
) -> Result<InterpretControl, VmError> {
    let a = ctx.pop()?;
    let b = ctx.pop()?;
    ctx.push(op(b, a)?)?;
    Ok(InterpretControl::MoveOn(1))
}

fn unary(
    ctx: &mut MachineContext,
    op: impl FnOnce(StackWord) -> StackWord,
) -> Result<InterpretControl, VmError> {
    let a = ctx.pop()?;
    ctx.push(op(a))?;
    Ok(InterpretControl::MoveOn(1))
}

pub fn add(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    binary(ctx, |lhs, rhs| Ok(lhs.wrapping_add(rhs)))
}

pub fn sub(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    binary(ctx, |lhs, rhs| Ok(lhs.wrapping_sub(rhs)))
}

pub fn mul(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    binary(ctx, |lhs, rhs| Ok(lhs.wrapping_mul(rhs)))
}

pub fn div(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    binary(ctx, |lhs, rhs| {
        if rhs == 0 {
            Err(VmError::InvalidOp(Opcode::div.as_word()))
        } else {
            Ok(lhs / rhs)
        }
    })
}

pub fn mod_(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    binary(ctx, |lhs, rhs| {
        if rhs == 0 {
            Err(VmError::InvalidOp(Opcode::mod_.as_word()))
        } else {
            Ok(lhs % rhs)
        }
    })
}

pub fn band(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    binary(ctx, |lhs, rhs| Ok(lhs & rhs))
}

pub fn bor(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    binary(ctx, |lhs, rhs| Ok(lhs | rhs))
}

pub fn bxor(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    binary(ctx, |lhs, rhs| Ok(lhs ^ rhs))
}

pub fn bnot(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    unary(ctx, |value| !value)
}

pub fn and(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    binary(ctx, |lhs, rhs| Ok((lhs != 0 && rhs != 0) as StackWord))
}

pub fn or(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    binary(ctx, |lhs, rhs| Ok((lhs != 0 || rhs != 0) as StackWord))
}

pub fn xor(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    binary(ctx, |lhs, rhs| Ok(((lhs != 0) ^ (rhs != 0)) as StackWord))
}

pub fn not(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    unary(ctx, |value| (value == 0) as StackWord)
}
