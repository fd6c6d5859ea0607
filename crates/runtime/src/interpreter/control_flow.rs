// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

// the calling convention, identical for CALL and CALL_SHARED:
//
// the caller pushes `arg0 .. argN-1`, then `arg_count`, then
// `func_index`. the instruction pops the index and the count, inserts
// the frame header below the arguments and jumps to the entry point.
// CALL resolves the index through the current machine's type function
// table, CALL_SHARED through the program-wide shared function table;
// `mlp` is inherited either way.
//
// RET copies the top `count` values, removes the frame down through
// the header, restores fp/mlp and resumes at the saved return PC.

use fluxvm_types::VmError;

use crate::{context::MachineContext, interpreter::InterpretControl};

pub fn jump(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    let target = ctx.pop_code_address()?;
    Ok(InterpretControl::Jump(target))
}

pub fn exit(_ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    Ok(InterpretControl::End)
}

pub fn call(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    let function_index = ctx.pop_index()?;
    let arg_count = ctx.pop_index()?;

    let instance = ctx.image.instance(ctx.machine_index)?;
    let entry_pc = ctx.image.function_entry(instance.type_id, function_index)?;

    ctx.create_frame(arg_count, ctx.pc + 1)?;
    Ok(InterpretControl::Jump(entry_pc))
}

pub fn call_shared(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    let function_index = ctx.pop_index()?;
    let arg_count = ctx.pop_index()?;

    let entry_pc = ctx.image.shared_function_entry(function_index)?;

    ctx.create_frame(arg_count, ctx.pc + 1)?;
    Ok(InterpretControl::Jump(entry_pc))
}

pub fn ret(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    let result_count = ctx.operand()? as usize;
    let return_pc = ctx.remove_frame(result_count)?;
    Ok(InterpretControl::Jump(return_pc))
}
