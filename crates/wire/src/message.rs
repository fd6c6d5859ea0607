// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

// message payloads, before framing
//
// the first byte is the tag (an ASCII codepoint), all multi-byte
// integers are little-endian. a StackWord is four bytes, a
// ProgramWord two. every variable-length field is preceded by its
// count, so decoding is a single forward pass.

use fluxvm_types::{ProgramWord, StackWord};

use crate::WireError;

pub const TAG_CALL_REQUEST: u8 = b'R';
pub const TAG_CALL_RETURN: u8 = b'r';
pub const TAG_NOTIFICATION: u8 = b'N';
pub const TAG_ERROR: u8 = b'E';
pub const TAG_LOAD_PROGRAM: u8 = b'L';
pub const TAG_READ_UI_STATE_BLOCK: u8 = b'U';
pub const TAG_UI_STATE_BLOCK_REPLY: u8 = b'u';
pub const TAG_READ_I2C_DEVICES: u8 = b'I';
pub const TAG_I2C_DEVICES_REPLY: u8 = b'i';
pub const TAG_CALL_SHARED_REQUEST: u8 = b'C';

#[derive(Debug, PartialEq, Clone)]
pub enum Message {
    CallRequest {
        request_id: u16,
        machine_index: u16,
        function_index: u16,
        args: Vec<StackWord>,
    },
    CallReturn {
        request_id: u16,
        values: Vec<StackWord>,
    },
    Notification {
        machine_index: u16,
        function_index: u16,
        values: Vec<StackWord>,
    },
    Error {
        /// None for spontaneous errors (framing, parser, loader)
        request_id: Option<u16>,
        error_code: u16,
        message: String,
    },
    LoadProgram {
        program: Vec<ProgramWord>,
        ui_blob: Vec<u8>,
    },
    ReadUiStateBlock {
        request_id: u16,
        block_number: u16,
    },
    UiStateBlockReply {
        request_id: u16,
        total_size: u32,
        block_number: u16,
        block: Vec<u8>,
    },
    ReadI2cDevices {
        request_id: u16,
        offset: u16,
    },
    I2cDevicesReply {
        request_id: u16,
        total_count: u16,
        devices: Vec<u16>,
    },
    CallSharedRequest {
        request_id: u16,
        function_index: u16,
        args: Vec<StackWord>,
    },
}

struct PayloadReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    fn read_u8(&mut self) -> Result<u8, WireError> {
        let byte = *self
            .data
            .get(self.position)
            .ok_or(WireError::UnexpectedEnd)?;
        self.position += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> Result<u16, WireError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, WireError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], WireError> {
        if self.position + count > self.data.len() {
            return Err(WireError::UnexpectedEnd);
        }
        let bytes = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(bytes)
    }

    fn read_stack_words(&mut self, count: usize) -> Result<Vec<StackWord>, WireError> {
        let mut words = Vec::with_capacity(count);
        for _ in 0..count {
            words.push(self.read_u32()?);
        }
        Ok(words)
    }

    fn finish(&self) -> Result<(), WireError> {
        let remaining = self.data.len() - self.position;
        if remaining != 0 {
            return Err(WireError::TrailingBytes(remaining));
        }
        Ok(())
    }
}

fn write_u16(payload: &mut Vec<u8>, value: u16) {
    payload.extend_from_slice(&value.to_le_bytes());
}

fn write_u32(payload: &mut Vec<u8>, value: u32) {
    payload.extend_from_slice(&value.to_le_bytes());
}

fn write_stack_words(payload: &mut Vec<u8>, words: &[StackWord]) {
    for word in words {
        write_u32(payload, *word);
    }
}

impl Message {
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        match self {
            Message::CallRequest {
                request_id,
                machine_index,
                function_index,
                args,
            } => {
                payload.push(TAG_CALL_REQUEST);
                write_u16(&mut payload, *request_id);
                write_u16(&mut payload, *machine_index);
                write_u16(&mut payload, *function_index);
                write_u16(&mut payload, args.len() as u16);
                write_stack_words(&mut payload, args);
            }
            Message::CallReturn { request_id, values } => {
                payload.push(TAG_CALL_RETURN);
                write_u16(&mut payload, *request_id);
                write_u16(&mut payload, values.len() as u16);
                write_stack_words(&mut payload, values);
            }
            Message::Notification {
                machine_index,
                function_index,
                values,
            } => {
                payload.push(TAG_NOTIFICATION);
                write_u16(&mut payload, *machine_index);
                write_u16(&mut payload, *function_index);
                write_u16(&mut payload, values.len() as u16);
                write_stack_words(&mut payload, values);
            }
            Message::Error {
                request_id,
                error_code,
                message,
            } => {
                payload.push(TAG_ERROR);
                payload.push(request_id.is_some() as u8);
                write_u16(&mut payload, request_id.unwrap_or(0));
                write_u16(&mut payload, *error_code);
                write_u16(&mut payload, message.len() as u16);
                payload.extend_from_slice(message.as_bytes());
            }
            Message::LoadProgram { program, ui_blob } => {
                payload.push(TAG_LOAD_PROGRAM);
                write_u16(&mut payload, program.len() as u16);
                for word in program {
                    write_u16(&mut payload, *word);
                }
                write_u32(&mut payload, ui_blob.len() as u32);
                payload.extend_from_slice(ui_blob);
            }
            Message::ReadUiStateBlock {
                request_id,
                block_number,
            } => {
                payload.push(TAG_READ_UI_STATE_BLOCK);
                write_u16(&mut payload, *request_id);
                write_u16(&mut payload, *block_number);
            }
            Message::UiStateBlockReply {
                request_id,
                total_size,
                block_number,
                block,
            } => {
                payload.push(TAG_UI_STATE_BLOCK_REPLY);
                write_u16(&mut payload, *request_id);
                write_u32(&mut payload, *total_size);
                write_u16(&mut payload, *block_number);
                write_u16(&mut payload, block.len() as u16);
                payload.extend_from_slice(block);
            }
            Message::ReadI2cDevices { request_id, offset } => {
                payload.push(TAG_READ_I2C_DEVICES);
                write_u16(&mut payload, *request_id);
                write_u16(&mut payload, *offset);
            }
            Message::I2cDevicesReply {
                request_id,
                total_count,
                devices,
            } => {
                payload.push(TAG_I2C_DEVICES_REPLY);
                write_u16(&mut payload, *request_id);
                write_u16(&mut payload, *total_count);
                write_u16(&mut payload, devices.len() as u16);
                for device in devices {
                    write_u16(&mut payload, *device);
                }
            }
            Message::CallSharedRequest {
                request_id,
                function_index,
                args,
            } => {
                payload.push(TAG_CALL_SHARED_REQUEST);
                write_u16(&mut payload, *request_id);
                write_u16(&mut payload, *function_index);
                write_u16(&mut payload, args.len() as u16);
                write_stack_words(&mut payload, args);
            }
        }
        payload
    }

    pub fn decode(payload: &[u8]) -> Result<Message, WireError> {
        let mut reader = PayloadReader::new(payload);
        let tag = reader.read_u8()?;

        let message = match tag {
            TAG_CALL_REQUEST => {
                let request_id = reader.read_u16()?;
                let machine_index = reader.read_u16()?;
                let function_index = reader.read_u16()?;
                let arg_count = reader.read_u16()? as usize;
                Message::CallRequest {
                    request_id,
                    machine_index,
                    function_index,
                    args: reader.read_stack_words(arg_count)?,
                }
            }
            TAG_CALL_RETURN => {
                let request_id = reader.read_u16()?;
                let value_count = reader.read_u16()? as usize;
                Message::CallReturn {
                    request_id,
                    values: reader.read_stack_words(value_count)?,
                }
            }
            TAG_NOTIFICATION => {
                let machine_index = reader.read_u16()?;
                let function_index = reader.read_u16()?;
                let value_count = reader.read_u16()? as usize;
                Message::Notification {
                    machine_index,
                    function_index,
                    values: reader.read_stack_words(value_count)?,
                }
            }
            TAG_ERROR => {
                let has_request_id = reader.read_u8()? != 0;
                let request_id = reader.read_u16()?;
                let error_code = reader.read_u16()?;
                let message_len = reader.read_u16()? as usize;
                let message_bytes = reader.read_bytes(message_len)?;
                Message::Error {
                    request_id: has_request_id.then_some(request_id),
                    error_code,
                    message: String::from_utf8_lossy(message_bytes).into_owned(),
                }
            }
            TAG_LOAD_PROGRAM => {
                let word_count = reader.read_u16()? as usize;
                let mut program = Vec::with_capacity(word_count);
                for _ in 0..word_count {
                    program.push(reader.read_u16()?);
                }
                let blob_len = reader.read_u32()? as usize;
                Message::LoadProgram {
                    program,
                    ui_blob: reader.read_bytes(blob_len)?.to_vec(),
                }
            }
            TAG_READ_UI_STATE_BLOCK => Message::ReadUiStateBlock {
                request_id: reader.read_u16()?,
                block_number: reader.read_u16()?,
            },
            TAG_UI_STATE_BLOCK_REPLY => {
                let request_id = reader.read_u16()?;
                let total_size = reader.read_u32()?;
                let block_number = reader.read_u16()?;
                let block_len = reader.read_u16()? as usize;
                Message::UiStateBlockReply {
                    request_id,
                    total_size,
                    block_number,
                    block: reader.read_bytes(block_len)?.to_vec(),
                }
            }
            TAG_READ_I2C_DEVICES => Message::ReadI2cDevices {
                request_id: reader.read_u16()?,
                offset: reader.read_u16()?,
            },
            TAG_I2C_DEVICES_REPLY => {
                let request_id = reader.read_u16()?;
                let total_count = reader.read_u16()?;
                let page_count = reader.read_u16()? as usize;
                let mut devices = Vec::with_capacity(page_count);
                for _ in 0..page_count {
                    devices.push(reader.read_u16()?);
                }
                Message::I2cDevicesReply {
                    request_id,
                    total_count,
                    devices,
                }
            }
            TAG_CALL_SHARED_REQUEST => {
                let request_id = reader.read_u16()?;
                let function_index = reader.read_u16()?;
                let arg_count = reader.read_u16()? as usize;
                Message::CallSharedRequest {
                    request_id,
                    function_index,
                    args: reader.read_stack_words(arg_count)?,
                }
            }
            unknown => return Err(WireError::UnknownMessageTag(unknown)),
        };

        reader.finish()?;
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::Message;
    use crate::{frame::encode_frame, FrameAccumulator, WireError};

    fn round_trip(message: Message) {
        let payload = message.encode();
        assert_eq!(Message::decode(&payload), Ok(message));
    }

    #[test]
    fn test_message_round_trips() {
        round_trip(Message::CallRequest {
            request_id: 7,
            machine_index: 1,
            function_index: 2,
            args: vec![0xaabbccdd, 1],
        });
        round_trip(Message::CallReturn {
            request_id: 7,
            values: vec![30],
        });
        round_trip(Message::Notification {
            machine_index: 3,
            function_index: 9,
            values: vec![],
        });
        round_trip(Message::Error {
            request_id: Some(12),
            error_code: 4,
            message: "Invalid operation, opcode: 16.".to_string(),
        });
        round_trip(Message::Error {
            request_id: None,
            error_code: 100,
            message: "parse failure".to_string(),
        });
        round_trip(Message::LoadProgram {
            program: vec![2, 1, 0, 0, 0, 8, 8, 8],
            ui_blob: vec![0, 1, 2, 255],
        });
        round_trip(Message::ReadUiStateBlock {
            request_id: 4,
            block_number: 0,
        });
        round_trip(Message::UiStateBlockReply {
            request_id: 4,
            total_size: 600,
            block_number: 1,
            block: vec![9; 256],
        });
        round_trip(Message::ReadI2cDevices {
            request_id: 5,
            offset: 0,
        });
        round_trip(Message::I2cDevicesReply {
            request_id: 5,
            total_count: 40,
            devices: vec![0x20, 0x21, 0x48],
        });
        round_trip(Message::CallSharedRequest {
            request_id: 8,
            function_index: 2,
            args: vec![0, 0x27, 1, 3],
        });
    }

    #[test]
    fn test_framed_round_trip() {
        // encode, frame with the 0x00 terminator, strip and decode
        let message = Message::CallRequest {
            request_id: 7,
            machine_index: 1,
            function_index: 2,
            args: vec![0xaabbccdd, 1],
        };

        let frame = encode_frame(&message.encode());
        assert_eq!(frame.last(), Some(&0));

        let mut accumulator = FrameAccumulator::new();
        let payloads = accumulator.feed(&frame);
        assert_eq!(payloads.len(), 1);
        let payload = payloads[0].clone().unwrap();
        assert_eq!(Message::decode(&payload), Ok(message));
    }

    #[test]
    fn test_decode_rejects_malformed_payloads() {
        assert_eq!(
            Message::decode(&[b'x']),
            Err(WireError::UnknownMessageTag(b'x'))
        );
        assert_eq!(Message::decode(&[]), Err(WireError::UnexpectedEnd));

        // a CallReturn announcing more values than present
        let mut payload = Message::CallReturn {
            request_id: 1,
            values: vec![1, 2],
        }
        .encode();
        payload.truncate(payload.len() - 4);
        assert_eq!(Message::decode(&payload), Err(WireError::UnexpectedEnd));

        // trailing garbage
        let mut payload = Message::ReadUiStateBlock {
            request_id: 1,
            block_number: 0,
        }
        .encode();
        payload.push(0xee);
        assert_eq!(Message::decode(&payload), Err(WireError::TrailingBytes(1)));
    }
}
