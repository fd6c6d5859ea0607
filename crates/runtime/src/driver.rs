// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

// the render-loop contract:
//
// `init` once at program load, then per frame and per machine a tight
// sequence of `start_frame(tick)` followed by `get_color(i)` for
// i = 0 .. LED_COUNT-1. machines run serially; a failing machine
// spoils only its own frame, the driver carries on.

use log::warn;

use fluxvm_types::{
    ProgramWord, StackWord, VmError, FUNC_INDEX_GET_COLOR, FUNC_INDEX_INIT,
    FUNC_INDEX_START_FRAME,
};

use crate::{processor::Processor, program::Program};

/// the LED output sink, a single-method capability.
///
/// consumes one `(r, g, b)` triple per pixel per frame.
pub trait PixelSink {
    fn set_pixel(&mut self, machine_index: usize, led_index: u16, color: (u8, u8, u8));
}

pub struct HostDriver<'a> {
    processor: Processor,
    program: Program<'a>,
}

impl<'a> HostDriver<'a> {
    pub fn new(
        image_words: &'a [ProgramWord],
        memory: &'a mut [StackWord],
    ) -> Result<HostDriver<'a>, VmError> {
        Ok(HostDriver {
            processor: Processor::new(),
            program: Program::new(image_words, memory)?,
        })
    }

    pub fn with_instruction_budget(mut self, instruction_budget: usize) -> HostDriver<'a> {
        self.program = self.program.with_instruction_budget(instruction_budget);
        self
    }

    pub fn instance_count(&self) -> usize {
        self.program.instance_count()
    }

    pub fn shared_function_count(&self) -> usize {
        self.program.image().shared_function_count()
    }

    /// function 0, no arguments, the stack must be empty on EXIT
    pub fn init(&mut self, machine_index: usize) -> Result<(), VmError> {
        let values = self
            .program
            .call(&self.processor, machine_index, FUNC_INDEX_INIT, &[])?;
        if !values.is_empty() {
            return Err(VmError::ResultCountMismatch {
                expected: 0,
                actual: values.len(),
            });
        }
        Ok(())
    }

    pub fn init_all(&mut self) -> Result<(), VmError> {
        for machine_index in 0..self.instance_count() {
            self.init(machine_index)?;
        }
        Ok(())
    }

    /// function 1, one argument (the tick), no return value
    pub fn start_frame(&mut self, machine_index: usize, tick: u32) -> Result<(), VmError> {
        self.program
            .call(&self.processor, machine_index, FUNC_INDEX_START_FRAME, &[tick])?;
        Ok(())
    }

    /// function 2, one argument (the led index); expects exactly
    /// three values on EXIT, top-to-bottom `b`, `g`, `r`, each <= 255
    pub fn get_color(
        &mut self,
        machine_index: usize,
        led_index: u16,
    ) -> Result<(u8, u8, u8), VmError> {
        let values = self.program.call(
            &self.processor,
            machine_index,
            FUNC_INDEX_GET_COLOR,
            &[led_index as StackWord],
        )?;
        if values.len() != 3 {
            return Err(VmError::ResultCountMismatch {
                expected: 3,
                actual: values.len(),
            });
        }

        // the vector is bottom of stack first
        let (r, g, b) = (values[0], values[1], values[2]);
        for component in [r, g, b] {
            if component > 255 {
                return Err(VmError::ColorOutOfRange(component));
            }
        }
        Ok((r as u8, g as u8, b as u8))
    }

    /// arbitrary function invocation on behalf of the wire path;
    /// residual stack values become the result vector
    pub fn call(
        &mut self,
        machine_index: usize,
        function_index: u16,
        args: &[StackWord],
    ) -> Result<Vec<StackWord>, VmError> {
        self.program
            .call(&self.processor, machine_index, function_index, args)
    }

    pub fn call_shared(
        &mut self,
        shared_index: u16,
        args: &[StackWord],
    ) -> Result<Vec<StackWord>, VmError> {
        self.program.call_shared(&self.processor, shared_index, args)
    }

    /// one full render cycle.
    ///
    /// a runtime error marks the machine's frame as failed and the
    /// driver continues with the next machine; the next frame cycle
    /// retries normally.
    pub fn render_frame(&mut self, tick: u32, led_count: u16, sink: &mut dyn PixelSink) {
        for machine_index in 0..self.instance_count() {
            if let Err(error) = self.render_machine(machine_index, tick, led_count, sink) {
                warn!(
                    "machine {} failed at tick {}: {}",
                    machine_index, tick, error
                );
            }
        }
    }

    fn render_machine(
        &mut self,
        machine_index: usize,
        tick: u32,
        led_count: u16,
        sink: &mut dyn PixelSink,
    ) -> Result<(), VmError> {
        self.start_frame(machine_index, tick)?;
        for led_index in 0..led_count {
            let color = self.get_color(machine_index, led_index)?;
            sink.set_pixel(machine_index, led_index, color);
        }
        Ok(())
    }
}
