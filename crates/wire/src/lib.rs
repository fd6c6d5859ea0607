// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

//! the framed request/response transport between host and device.
//!
//! frames are COBS byte-stuffed: an encoded frame contains no zero
//! bytes, and a single `0x00` terminates every frame on the wire.
//! the stuffing makes the zero delimiter safe even though message
//! payloads (StackWord arguments in particular) may contain zeros.

use std::fmt::Display;

pub mod frame;
pub mod message;

pub use frame::{cobs_decode, cobs_encode, encode_frame, FrameAccumulator};
pub use message::Message;

#[derive(Debug, PartialEq, Clone)]
pub enum WireError {
    /// the first payload byte is not a known message tag
    UnknownMessageTag(u8),
    /// the payload ended before the announced content
    UnexpectedEnd,
    /// decoding finished with bytes left over
    TrailingBytes(usize),
    /// a COBS group header pointed beyond the frame
    InvalidFrame,
}

impl Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireError::UnknownMessageTag(tag) => {
                write!(f, "Unknown message tag: 0x{:02x}.", tag)
            }
            WireError::UnexpectedEnd => f.write_str("Unexpected end of frame payload."),
            WireError::TrailingBytes(count) => {
                write!(f, "{} trailing bytes after the message payload.", count)
            }
            WireError::InvalidFrame => f.write_str("Malformed COBS frame."),
        }
    }
}

impl std::error::Error for WireError {}
