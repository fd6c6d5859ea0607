// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

// the program image binary layout (word offsets):
//
//              |--------------------------------------|
//          0   | VERSION                        (= 2) |
//          1   | INSTANCE_COUNT                       |
//          2   | GLOBALS_SIZE        (StackWord cells)|
//          3   | SHARED_FUNCTION_COUNT                |
//          4   | TYPE_COUNT                           |
//          5   | INSTANCE_TABLE_OFFSET                |
//          6   | TYPE_TABLE_OFFSET                    |
//          7   | SHARED_FUNCTION_TABLE_OFFSET         |
//              |--------------------------------------|
// instance --> | TYPE_ID 0     | GLOBALS_BASE 0       | <-- 2 words per entry
//    table     | TYPE_ID 1     | GLOBALS_BASE 1       |
//              | ...                                  |
//              |--------------------------------------|
//     type --> | FUNC_COUNT 0  | FUNC_TABLE_OFFSET 0  | <-- 2 words per entry
//    table     | FUNC_COUNT 1  | FUNC_TABLE_OFFSET 1  |
//              | ...                                  |
//              |--------------------------------------|
//     func --> | BODY_OFFSET 0 | BODY_OFFSET 1 | ...  | <-- dense, absolute
//   tables     | ...                                  |
//              |--------------------------------------|
//   shared --> | BODY_OFFSET 0 | BODY_OFFSET 1 | ...  |
//    table     |--------------------------------------|
//              | static data and function bodies      |
//              |--------------------------------------|
//
// all static data, per-type and shared alike, lives in the single
// shared static region; static addresses are global within the image.

use fluxvm_types::{
    ProgramWord, VmError, HEADER_GLOBALS_SIZE, HEADER_INSTANCE_COUNT, HEADER_INSTANCE_TABLE_OFFSET,
    HEADER_SHARED_FUNCTION_COUNT, HEADER_SHARED_FUNCTION_TABLE_OFFSET, HEADER_SIZE,
    HEADER_TYPE_COUNT, HEADER_TYPE_TABLE_OFFSET, HEADER_VERSION, PROGRAM_VERSION,
};

/// a read-only view over a loaded program image.
///
/// the view borrows the word buffer, loading allocates nothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgramImage<'a> {
    words: &'a [ProgramWord],
}

/// one instance table entry, a zero-allocation view
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceEntry {
    pub type_id: usize,
    pub globals_base: usize,
}

/// one type table entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypeEntry {
    pub function_count: usize,
    pub function_table_offset: usize,
}

impl<'a> ProgramImage<'a> {
    /// validates the header and every descriptor table.
    ///
    /// after `load` succeeds, all table lookups can only fail for
    /// out-of-range indices, never for a malformed image.
    pub fn load(words: &'a [ProgramWord]) -> Result<Self, VmError> {
        if words.len() < HEADER_SIZE {
            return Err(VmError::OutOfBoundsStaticRead(words.len()));
        }

        let version = words[HEADER_VERSION];
        if version != PROGRAM_VERSION {
            return Err(VmError::InvalidProgramVersion(version));
        }

        let image = Self { words };

        let globals_size = image.globals_size();
        let type_count = image.type_count();

        // every table offset must reference a location inside the image
        // and every function entry must point into the image as well.

        for type_id in 0..type_count {
            let entry = image.type_entry(type_id)?;
            for function_index in 0..entry.function_count {
                image.function_entry(type_id, function_index)?;
            }
        }

        for machine_index in 0..image.instance_count() {
            let entry = image.instance(machine_index)?;
            if entry.type_id >= type_count {
                let offset = image.instance_table_offset() + machine_index * 2;
                return Err(VmError::OutOfBoundsStaticRead(offset));
            }
            if entry.globals_base > globals_size {
                return Err(VmError::GlobalsBufferTooSmall);
            }
        }

        for index in 0..image.shared_function_count() {
            image.shared_function_entry(index)?;
        }

        Ok(image)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// one program word, bounds-checked
    pub fn word(&self, address: usize) -> Result<ProgramWord, VmError> {
        self.words
            .get(address)
            .copied()
            .ok_or(VmError::OutOfBoundsStaticRead(address))
    }

    pub fn instance_count(&self) -> usize {
        self.words[HEADER_INSTANCE_COUNT] as usize
    }

    pub fn globals_size(&self) -> usize {
        self.words[HEADER_GLOBALS_SIZE] as usize
    }

    pub fn shared_function_count(&self) -> usize {
        self.words[HEADER_SHARED_FUNCTION_COUNT] as usize
    }

    pub fn type_count(&self) -> usize {
        self.words[HEADER_TYPE_COUNT] as usize
    }

    pub fn instance_table_offset(&self) -> usize {
        self.words[HEADER_INSTANCE_TABLE_OFFSET] as usize
    }

    pub fn type_table_offset(&self) -> usize {
        self.words[HEADER_TYPE_TABLE_OFFSET] as usize
    }

    pub fn shared_function_table_offset(&self) -> usize {
        self.words[HEADER_SHARED_FUNCTION_TABLE_OFFSET] as usize
    }

    pub fn instance(&self, machine_index: usize) -> Result<InstanceEntry, VmError> {
        if machine_index >= self.instance_count() {
            return Err(VmError::MachineIndexOutOfRange(machine_index));
        }
        let offset = self.instance_table_offset() + machine_index * 2;
        Ok(InstanceEntry {
            type_id: self.word(offset)? as usize,
            globals_base: self.word(offset + 1)? as usize,
        })
    }

    pub fn type_entry(&self, type_id: usize) -> Result<TypeEntry, VmError> {
        if type_id >= self.type_count() {
            return Err(VmError::OutOfBoundsStaticRead(
                self.type_table_offset() + type_id * 2,
            ));
        }
        let offset = self.type_table_offset() + type_id * 2;
        Ok(TypeEntry {
            function_count: self.word(offset)? as usize,
            function_table_offset: self.word(offset + 1)? as usize,
        })
    }

    /// the absolute entry point of a type function
    pub fn function_entry(&self, type_id: usize, function_index: usize) -> Result<usize, VmError> {
        let entry = self.type_entry(type_id)?;
        if function_index >= entry.function_count {
            return Err(VmError::OutOfBoundsStaticRead(
                entry.function_table_offset + function_index,
            ));
        }
        let pc = self.word(entry.function_table_offset + function_index)? as usize;
        if pc >= self.words.len() {
            return Err(VmError::OutOfBoundsStaticRead(pc));
        }
        Ok(pc)
    }

    /// the absolute entry point of a shared function
    pub fn shared_function_entry(&self, index: usize) -> Result<usize, VmError> {
        if index >= self.shared_function_count() {
            return Err(VmError::SharedFunctionIndexOutOfRange(index));
        }
        let pc = self.word(self.shared_function_table_offset() + index)? as usize;
        if pc >= self.words.len() {
            return Err(VmError::OutOfBoundsStaticRead(pc));
        }
        Ok(pc)
    }
}

#[cfg(test)]
mod tests {
    use fluxvm_types::VmError;
    use pretty_assertions::assert_eq;

    use super::ProgramImage;

    // a hand-assembled image: one type with one function (EXIT at
    // offset 13), one instance, no shared functions.
    fn tiny_image() -> Vec<u16> {
        vec![
            2,  // version
            1,  // instance count
            4,  // globals size
            0,  // shared function count
            1,  // type count
            8,  // instance table offset
            10, // type table offset
            13, // shared function table offset (empty table)
            // instance table
            0, 0, // type 0, globals base 0
            // type table
            1, 12, // one function, table at 12
            // function table
            13, // body offset
            // body
            26, // EXIT
        ]
    }

    #[test]
    fn test_load_and_lookup() {
        let words = tiny_image();
        let image = ProgramImage::load(&words).unwrap();

        assert_eq!(image.instance_count(), 1);
        assert_eq!(image.globals_size(), 4);
        assert_eq!(image.type_count(), 1);

        let instance = image.instance(0).unwrap();
        assert_eq!(instance.type_id, 0);
        assert_eq!(instance.globals_base, 0);

        let entry = image.type_entry(0).unwrap();
        assert_eq!(entry.function_count, 1);
        assert_eq!(image.function_entry(0, 0).unwrap(), 13);

        assert_eq!(
            image.instance(1),
            Err(VmError::MachineIndexOutOfRange(1))
        );
        assert_eq!(
            image.shared_function_entry(0),
            Err(VmError::SharedFunctionIndexOutOfRange(0))
        );
    }

    #[test]
    fn test_reject_unknown_version() {
        let mut words = tiny_image();
        words[0] = 3;
        assert_eq!(
            ProgramImage::load(&words),
            Err(VmError::InvalidProgramVersion(3))
        );
    }

    #[test]
    fn test_reject_dangling_function_entry() {
        let mut words = tiny_image();
        words[12] = 100; // function body offset outside the image
        assert_eq!(
            ProgramImage::load(&words),
            Err(VmError::OutOfBoundsStaticRead(100))
        );
    }

    #[test]
    fn test_reject_truncated_image() {
        let words = tiny_image();
        assert_eq!(
            ProgramImage::load(&words[0..6]),
            Err(VmError::OutOfBoundsStaticRead(6))
        );
    }
}
