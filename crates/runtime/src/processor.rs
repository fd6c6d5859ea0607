// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

use fluxvm_types::{
    opcode::{Opcode, MAX_OPCODE_NUMBER},
    VmError,
};

use crate::{
    context::MachineContext,
    interpreter::{arithmetic, comparison, control_flow, data, fundamental},
    interpreter::{InterpretControl, InterpretFunc},
};

fn invalid(ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
    Err(VmError::InvalidOp(ctx.image.word(ctx.pc)?))
}

/// the instruction dispatch table.
///
/// stateless; one `Processor` serves any number of programs.
pub struct Processor {
    handlers: Vec<InterpretFunc>,
}

impl Default for Processor {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor {
    pub fn new() -> Processor {
        let mut handlers: Vec<InterpretFunc> = vec![invalid; MAX_OPCODE_NUMBER];

        // fundamental
        handlers[Opcode::pop as usize] = fundamental::pop;
        handlers[Opcode::push as usize] = fundamental::push;
        handlers[Opcode::dup as usize] = fundamental::dup;
        handlers[Opcode::swap as usize] = fundamental::swap;

        // comparison branches
        handlers[Opcode::brlt as usize] = comparison::brlt;
        handlers[Opcode::brlte as usize] = comparison::brlte;
        handlers[Opcode::brgt as usize] = comparison::brgt;
        handlers[Opcode::brgte as usize] = comparison::brgte;
        handlers[Opcode::breq as usize] = comparison::breq;

        // logical
        handlers[Opcode::and as usize] = arithmetic::and;
        handlers[Opcode::or as usize] = arithmetic::or;
        handlers[Opcode::xor as usize] = arithmetic::xor;
        handlers[Opcode::not as usize] = arithmetic::not;

        // bitwise
        handlers[Opcode::band as usize] = arithmetic::band;
        handlers[Opcode::bor as usize] = arithmetic::bor;
        handlers[Opcode::bxor as usize] = arithmetic::bxor;
        handlers[Opcode::bnot as usize] = arithmetic::bnot;

        // arithmetic
        handlers[Opcode::mul as usize] = arithmetic::mul;
        handlers[Opcode::div as usize] = arithmetic::div;
        handlers[Opcode::mod_ as usize] = arithmetic::mod_;
        handlers[Opcode::add as usize] = arithmetic::add;
        handlers[Opcode::sub as usize] = arithmetic::sub;

        // data movement
        handlers[Opcode::lload as usize] = data::lload;
        handlers[Opcode::lstore as usize] = data::lstore;
        handlers[Opcode::gload as usize] = data::gload;
        handlers[Opcode::gstore as usize] = data::gstore;
        handlers[Opcode::sload as usize] = data::sload;
        handlers[Opcode::sstore as usize] = data::sstore;
        handlers[Opcode::load_static as usize] = data::load_static;

        // control flow
        handlers[Opcode::jump as usize] = control_flow::jump;
        handlers[Opcode::exit as usize] = control_flow::exit;
        handlers[Opcode::call as usize] = control_flow::call;
        handlers[Opcode::call_shared as usize] = control_flow::call_shared;
        handlers[Opcode::ret as usize] = control_flow::ret;

        Self { handlers }
    }

    fn step(&self, ctx: &mut MachineContext) -> Result<InterpretControl, VmError> {
        let opcode_word = ctx.image.word(ctx.pc)?;
        if opcode_word as usize >= MAX_OPCODE_NUMBER {
            return Err(VmError::InvalidOp(opcode_word));
        }
        self.handlers[opcode_word as usize](ctx)
    }

    /// executes instructions until EXIT.
    ///
    /// any error aborts the run and leaves the stack in an undefined
    /// state; the host discards the result and the VM is ready for
    /// the next run.
    pub fn run(&self, ctx: &mut MachineContext) -> Result<(), VmError> {
        loop {
            if ctx.fuel == 0 {
                return Err(VmError::InstructionBudgetExceeded);
            }
            ctx.fuel -= 1;

            match self.step(ctx)? {
                InterpretControl::MoveOn(increment) => {
                    ctx.pc += increment;
                }
                InterpretControl::Jump(target) => {
                    ctx.pc = target;
                }
                InterpretControl::End => return Ok(()),
            }
        }
    }
}
