// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

use std::fmt::Write;

use fluxvm_types::{opcode::Opcode, ProgramWord, VmError};

use crate::program_image::ProgramImage;

/// renders one code range as a listing, e.g.
///
/// ```text
/// 0x0015 PUSH 0x0008
/// 0x0017 JUMP
/// 0x0018 EXIT
/// ```
///
/// an unknown opcode word is rendered as a raw word so a listing of a
/// corrupt image never fails.
pub fn range_to_text(words: &[ProgramWord], start: usize, end: usize) -> String {
    let mut text = String::new();
    let mut pc = start;

    while pc < end && pc < words.len() {
        if !text.is_empty() {
            text.push('\n');
        }
        match Opcode::from_u16(words[pc]) {
            Some(opcode) if opcode.has_operand() => {
                let operand = words.get(pc + 1).copied().unwrap_or(0);
                let _ = write!(text, "{:#06x} {} {:#06x}", pc, opcode.mnemonic(), operand);
                pc += 2;
            }
            Some(opcode) => {
                let _ = write!(text, "{:#06x} {}", pc, opcode.mnemonic());
                pc += 1;
            }
            None => {
                let _ = write!(text, "{:#06x} .word {:#06x}", pc, words[pc]);
                pc += 1;
            }
        }
    }

    text
}

/// a full image dump: header, tables, then every function body.
///
/// body extents are inferred by sorting all entry points; a body runs
/// to the next entry point or the end of the image.
pub fn image_to_text(words: &[ProgramWord]) -> Result<String, VmError> {
    let image = ProgramImage::load(words)?;
    let mut text = String::new();

    let _ = writeln!(text, "instances: {}", image.instance_count());
    let _ = writeln!(text, "globals size: {}", image.globals_size());
    let _ = writeln!(text, "types: {}", image.type_count());
    let _ = writeln!(text, "shared functions: {}", image.shared_function_count());

    let mut entry_points: Vec<(String, usize)> = Vec::new();
    for type_id in 0..image.type_count() {
        let entry = image.type_entry(type_id)?;
        for function_index in 0..entry.function_count {
            let pc = image.function_entry(type_id, function_index)?;
            entry_points.push((format!("type {} func {}", type_id, function_index), pc));
        }
    }
    for index in 0..image.shared_function_count() {
        let pc = image.shared_function_entry(index)?;
        entry_points.push((format!("shared func {}", index), pc));
    }

    let mut boundaries: Vec<usize> = entry_points.iter().map(|(_, pc)| *pc).collect();
    boundaries.sort_unstable();
    boundaries.push(words.len());

    for machine_index in 0..image.instance_count() {
        let instance = image.instance(machine_index)?;
        let _ = writeln!(
            text,
            "machine {}: type {}, globals base {}",
            machine_index, instance.type_id, instance.globals_base
        );
    }

    entry_points.sort_by_key(|(_, pc)| *pc);
    for (label, pc) in &entry_points {
        let end = boundaries
            .iter()
            .copied()
            .find(|boundary| boundary > pc)
            .unwrap_or(words.len());
        let _ = writeln!(text, "\n{} @ {:#06x}", label, pc);
        let _ = writeln!(text, "{}", range_to_text(words, *pc, end));
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use fluxvm_types::opcode::Opcode;
    use pretty_assertions::assert_eq;

    use super::range_to_text;
    use crate::bytecode_writer::BytecodeWriter;

    #[test]
    fn test_listing() {
        let words = BytecodeWriter::new()
            .write_opcode_with(Opcode::push, 8)
            .write_opcode(Opcode::jump)
            .write_opcode(Opcode::exit)
            .to_words();

        assert_eq!(
            range_to_text(&words, 0, words.len()),
            "0x0000 PUSH 0x0008\n0x0002 JUMP\n0x0003 EXIT"
        );
    }

    #[test]
    fn test_listing_tolerates_unknown_words() {
        assert_eq!(range_to_text(&[999], 0, 1), "0x0000 .word 0x03e7");
    }
}
