// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

pub mod bytecode_reader;
pub mod bytecode_writer;
pub mod image_builder;
pub mod layout;
pub mod program_image;

use fluxvm_types::ProgramWord;

// the on-disk/on-wire representation of an image is a little-endian
// ProgramWord stream, two bytes per word.

pub fn words_to_le_bytes(words: &[ProgramWord]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(words.len() * 2);
    for word in words {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    bytes
}

/// returns None when the byte count is odd
pub fn words_from_le_bytes(bytes: &[u8]) -> Option<Vec<ProgramWord>> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let words = bytes
        .chunks_exact(2)
        .map(|pair| ProgramWord::from_le_bytes([pair[0], pair[1]]))
        .collect();
    Some(words)
}
