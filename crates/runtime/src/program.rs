// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

use fluxvm_image::program_image::ProgramImage;
use fluxvm_types::{
    ProgramWord, StackWord, VmError, DEFAULT_INSTRUCTION_BUDGET, MIN_STACK,
};

use crate::{context::MachineContext, processor::Processor};

/// a loaded program: the borrowed read-only image plus the mutable
/// runtime memory slice.
///
/// created by the host at load time, destroyed on reload. globals
/// persist across runs, the stack is reset at every host invocation.
pub struct Program<'a> {
    image: ProgramImage<'a>,
    memory: &'a mut [StackWord],
    globals_size: usize,
    instruction_budget: usize,
}

impl<'a> Program<'a> {
    pub fn new(
        image_words: &'a [ProgramWord],
        memory: &'a mut [StackWord],
    ) -> Result<Program<'a>, VmError> {
        let image = ProgramImage::load(image_words)?;
        let globals_size = image.globals_size();

        if memory.len() < globals_size {
            return Err(VmError::GlobalsBufferTooSmall);
        }
        if memory.len() - globals_size < MIN_STACK {
            return Err(VmError::MemoryBufferTooSmall);
        }

        Ok(Program {
            image,
            memory,
            globals_size,
            instruction_budget: DEFAULT_INSTRUCTION_BUDGET,
        })
    }

    pub fn with_instruction_budget(mut self, instruction_budget: usize) -> Program<'a> {
        self.instruction_budget = instruction_budget;
        self
    }

    pub fn image(&self) -> ProgramImage<'a> {
        self.image
    }

    pub fn instance_count(&self) -> usize {
        self.image.instance_count()
    }

    /// invokes a type function of one machine.
    ///
    /// values the entry function leaves above its arguments are the
    /// result vector, bottom of stack first.
    pub fn call(
        &mut self,
        processor: &Processor,
        machine_index: usize,
        function_index: u16,
        args: &[StackWord],
    ) -> Result<Vec<StackWord>, VmError> {
        let instance = self.image.instance(machine_index)?;
        let entry_pc = self
            .image
            .function_entry(instance.type_id, function_index as usize)?;
        self.invoke(processor, machine_index, instance.globals_base, entry_pc, args)
    }

    /// invokes a shared function from the host.
    ///
    /// executes as if machine 0 were the caller: shared routing code
    /// keeps its tables in machine-0 locals. a program with no
    /// instances cannot take host-initiated shared calls.
    pub fn call_shared(
        &mut self,
        processor: &Processor,
        shared_index: u16,
        args: &[StackWord],
    ) -> Result<Vec<StackWord>, VmError> {
        let instance = self.image.instance(0)?;
        let entry_pc = self.image.shared_function_entry(shared_index as usize)?;
        self.invoke(processor, 0, instance.globals_base, entry_pc, args)
    }

    fn invoke(
        &mut self,
        processor: &Processor,
        machine_index: usize,
        globals_base: usize,
        entry_pc: usize,
        args: &[StackWord],
    ) -> Result<Vec<StackWord>, VmError> {
        let mut ctx = MachineContext {
            image: self.image,
            memory: &mut *self.memory,
            globals_size: self.globals_size,
            pc: entry_pc,
            sp: self.globals_size,
            fp: self.globals_size as StackWord,
            mlp: globals_base as StackWord,
            machine_index,
            depth: 0,
            fuel: self.instruction_budget,
        };

        for arg in args {
            ctx.push(*arg)?;
        }
        // return PC 0 is a sentinel: the entry frame exits via EXIT
        ctx.create_frame(args.len(), 0)?;

        processor.run(&mut ctx)?;

        let result_start = ctx.fp as usize + args.len();
        if ctx.sp <= result_start {
            return Ok(Vec::new());
        }
        Ok(ctx.memory[result_start..ctx.sp].to_vec())
    }
}
