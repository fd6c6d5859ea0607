// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

// the device side of the wire protocol.
//
// consumes decoded messages between runs of the render loop and
// produces reply messages. the device never retries on behalf of the
// host: it reports the error frame and continues.
//
// two artifacts survive a reboot through the persistence capability:
// the last-loaded program image and the last-received UI state blob.
// the blob is opaque here, the host reads it back block by block.

use log::warn;

use fluxvm_types::{
    ProgramWord, StackWord, VmError, SHARED_FUNC_INDEX_GET_ROUTES,
    SHARED_FUNC_INDEX_INIT_PROGRAM, UI_STATE_BLOCK_SIZE,
};
use fluxvm_wire::Message;

use crate::driver::HostDriver;

const I2C_DEVICES_PER_PAGE: usize = 16;

/// flash persistence, out of scope here and abstracted away
pub trait PersistentStore {
    fn save_program(&mut self, words: &[ProgramWord]);
    fn save_ui_state(&mut self, blob: &[u8]);
}

/// a store for hosts without flash
pub struct NullStore;

impl PersistentStore for NullStore {
    fn save_program(&mut self, _words: &[ProgramWord]) {}
    fn save_ui_state(&mut self, _blob: &[u8]) {}
}

pub struct DeckService<S: PersistentStore> {
    store: S,
    memory_capacity: usize,
    program_words: Vec<ProgramWord>,
    memory: Vec<StackWord>,
    ui_state: Vec<u8>,
    i2c_devices: Vec<u16>,
}

fn error_message(request_id: Option<u16>, error: VmError) -> Message {
    Message::Error {
        request_id,
        error_code: error.error_code(),
        message: error.to_string(),
    }
}

impl<S: PersistentStore> DeckService<S> {
    pub fn new(store: S, memory_capacity: usize) -> DeckService<S> {
        DeckService {
            store,
            memory_capacity,
            program_words: Vec::new(),
            memory: Vec::new(),
            ui_state: Vec::new(),
            i2c_devices: Vec::new(),
        }
    }

    /// boot-time reload of the persisted artifacts
    pub fn restore(
        &mut self,
        program_words: Vec<ProgramWord>,
        ui_state: Vec<u8>,
    ) -> Result<(), VmError> {
        self.activate(program_words)?;
        self.ui_state = ui_state;
        Ok(())
    }

    pub fn has_program(&self) -> bool {
        !self.program_words.is_empty()
    }

    pub fn ui_state(&self) -> &[u8] {
        &self.ui_state
    }

    /// the I2C capture layer reports the currently visible devices
    pub fn set_i2c_devices(&mut self, devices: Vec<u16>) {
        self.i2c_devices = devices;
    }

    /// renders one frame with the currently loaded program
    pub fn render_frame(
        &mut self,
        tick: u32,
        led_count: u16,
        sink: &mut dyn crate::driver::PixelSink,
    ) -> Result<(), VmError> {
        let mut driver = HostDriver::new(&self.program_words, &mut self.memory)?;
        driver.render_frame(tick, led_count, sink);
        Ok(())
    }

    pub fn handle_message(&mut self, message: Message) -> Vec<Message> {
        match message {
            Message::LoadProgram { program, ui_blob } => match self.activate(program) {
                Ok(()) => {
                    self.store.save_program(&self.program_words);
                    self.ui_state = ui_blob;
                    self.store.save_ui_state(&self.ui_state);
                    vec![]
                }
                Err(error) => vec![error_message(None, error)],
            },
            Message::CallRequest {
                request_id,
                machine_index,
                function_index,
                args,
            } => match self.call(machine_index as usize, function_index, &args) {
                Ok(values) => vec![Message::CallReturn { request_id, values }],
                Err(error) => vec![error_message(Some(request_id), error)],
            },
            Message::CallSharedRequest {
                request_id,
                function_index,
                args,
            } => match self.call_shared(function_index, &args) {
                Ok(values) => vec![Message::CallReturn { request_id, values }],
                Err(error) => vec![error_message(Some(request_id), error)],
            },
            Message::ReadUiStateBlock {
                request_id,
                block_number,
            } => vec![self.ui_state_block(request_id, block_number)],
            Message::ReadI2cDevices { request_id, offset } => {
                vec![self.i2c_devices_page(request_id, offset)]
            }
            other => {
                // host-bound traffic has no business arriving here
                warn!("ignoring host-bound message on the device: {:?}", other);
                vec![]
            }
        }
    }

    /// routes one captured I2C event into the program.
    ///
    /// the routing table lives in the program itself, behind the
    /// `get_routes` shared function: a flat list of
    /// `entry_count, (bus, address, target_count,
    /// (machine, function) x target_count) x entry_count`.
    /// every matched target is invoked with
    /// `(bus, address, is_read)` and its results go upstream as a
    /// notification.
    pub fn dispatch_i2c_event(
        &mut self,
        bus_id: u32,
        address: u32,
        is_read: bool,
    ) -> Vec<Message> {
        let routes = match self.call_shared(SHARED_FUNC_INDEX_GET_ROUTES, &[]) {
            Ok(values) => values,
            Err(error) => {
                warn!("get_routes failed: {}", error);
                return vec![error_message(None, error)];
            }
        };

        let mut replies = Vec::new();
        let mut cursor = routes.iter().copied();
        let entry_count = cursor.next().unwrap_or(0);

        for _ in 0..entry_count {
            let (Some(bus), Some(route_address), Some(target_count)) =
                (cursor.next(), cursor.next(), cursor.next())
            else {
                warn!("truncated route table from get_routes");
                break;
            };

            for _ in 0..target_count {
                let (Some(machine_id), Some(function_id)) = (cursor.next(), cursor.next()) else {
                    warn!("truncated route table from get_routes");
                    return replies;
                };
                if bus != bus_id || route_address != address {
                    continue;
                }

                let args = [bus_id, address, is_read as StackWord];
                match self.call(machine_id as usize, function_id as u16, &args) {
                    Ok(values) => replies.push(Message::Notification {
                        machine_index: machine_id as u16,
                        function_index: function_id as u16,
                        values,
                    }),
                    Err(error) => replies.push(error_message(None, error)),
                }
            }
        }

        replies
    }

    /// validates and swaps in a new image.
    ///
    /// the new program runs `init_program` and every machine `init`
    /// against a fresh memory buffer; only then is it committed. a
    /// failing load leaves the previous program and its state live.
    fn activate(&mut self, words: Vec<ProgramWord>) -> Result<(), VmError> {
        let mut memory = vec![0; self.memory_capacity];
        {
            let mut driver = HostDriver::new(&words, &mut memory)?;
            if driver.shared_function_count() > SHARED_FUNC_INDEX_INIT_PROGRAM as usize {
                driver.call_shared(SHARED_FUNC_INDEX_INIT_PROGRAM, &[])?;
            }
            driver.init_all()?;
        }

        self.program_words = words;
        self.memory = memory;
        Ok(())
    }

    fn call(
        &mut self,
        machine_index: usize,
        function_index: u16,
        args: &[StackWord],
    ) -> Result<Vec<StackWord>, VmError> {
        let mut driver = HostDriver::new(&self.program_words, &mut self.memory)?;
        driver.call(machine_index, function_index, args)
    }

    fn call_shared(
        &mut self,
        function_index: u16,
        args: &[StackWord],
    ) -> Result<Vec<StackWord>, VmError> {
        let mut driver = HostDriver::new(&self.program_words, &mut self.memory)?;
        driver.call_shared(function_index, args)
    }

    fn ui_state_block(&self, request_id: u16, block_number: u16) -> Message {
        let total_size = self.ui_state.len() as u32;
        let start = (block_number as usize) * UI_STATE_BLOCK_SIZE;
        let end = (start + UI_STATE_BLOCK_SIZE).min(self.ui_state.len());
        let block = if start < self.ui_state.len() {
            self.ui_state[start..end].to_vec()
        } else {
            Vec::new()
        };

        Message::UiStateBlockReply {
            request_id,
            total_size,
            block_number,
            block,
        }
    }

    fn i2c_devices_page(&self, request_id: u16, offset: u16) -> Message {
        let start = (offset as usize).min(self.i2c_devices.len());
        let end = (start + I2C_DEVICES_PER_PAGE).min(self.i2c_devices.len());

        Message::I2cDevicesReply {
            request_id,
            total_count: self.i2c_devices.len() as u16,
            devices: self.i2c_devices[start..end].to_vec(),
        }
    }
}
