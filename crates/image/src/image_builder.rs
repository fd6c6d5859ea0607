// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

use fluxvm_types::{
    ProgramWord, HEADER_SIZE, PROGRAM_VERSION,
};

use crate::layout::ImageLayout;

/// assembles a complete program image from resolved parts.
///
/// the final emission path of the assembler, and a convenient way for
/// tests to construct images without assembly source.
#[derive(Debug, Default)]
pub struct ImageBuilder {
    pub globals_size: ProgramWord,
    /// `(type_id, globals_base)` per machine, source order preserved
    pub instances: Vec<(ProgramWord, ProgramWord)>,
    /// fully resolved bodies, indexed `[type_id][function_index]`
    pub type_function_bodies: Vec<Vec<Vec<ProgramWord>>>,
    pub shared_function_bodies: Vec<Vec<ProgramWord>>,
    pub static_blocks: Vec<Vec<ProgramWord>>,
}

impl ImageBuilder {
    /// the placement this builder's parts will get.
    ///
    /// deterministic in the part sizes, so callers may compute it
    /// before the bodies are resolved (body sizes are fixed by the
    /// instruction widths alone).
    pub fn layout(
        instance_count: usize,
        function_body_sizes: &[Vec<usize>],
        shared_function_body_sizes: &[usize],
        static_block_sizes: &[usize],
    ) -> ImageLayout {
        ImageLayout::compute(
            instance_count,
            function_body_sizes,
            shared_function_body_sizes,
            static_block_sizes,
        )
    }

    pub fn build(&self) -> Vec<ProgramWord> {
        let function_body_sizes: Vec<Vec<usize>> = self
            .type_function_bodies
            .iter()
            .map(|bodies| bodies.iter().map(|body| body.len()).collect())
            .collect();
        let shared_function_body_sizes: Vec<usize> = self
            .shared_function_bodies
            .iter()
            .map(|body| body.len())
            .collect();
        let static_block_sizes: Vec<usize> =
            self.static_blocks.iter().map(|block| block.len()).collect();

        let layout = ImageLayout::compute(
            self.instances.len(),
            &function_body_sizes,
            &shared_function_body_sizes,
            &static_block_sizes,
        );

        let mut words: Vec<ProgramWord> = Vec::with_capacity(layout.total_size);

        // header
        words.push(PROGRAM_VERSION);
        words.push(self.instances.len() as ProgramWord);
        words.push(self.globals_size);
        words.push(self.shared_function_bodies.len() as ProgramWord);
        words.push(self.type_function_bodies.len() as ProgramWord);
        words.push(layout.instance_table_offset as ProgramWord);
        words.push(layout.type_table_offset as ProgramWord);
        words.push(layout.shared_function_table_offset as ProgramWord);
        debug_assert_eq!(words.len(), HEADER_SIZE);

        // instance table
        for (type_id, globals_base) in &self.instances {
            words.push(*type_id);
            words.push(*globals_base);
        }

        // type table
        for (type_id, bodies) in self.type_function_bodies.iter().enumerate() {
            words.push(bodies.len() as ProgramWord);
            words.push(layout.function_table_offsets[type_id] as ProgramWord);
        }

        // function tables
        for (type_id, bodies) in self.type_function_bodies.iter().enumerate() {
            for function_index in 0..bodies.len() {
                words.push(layout.function_body_offsets[type_id][function_index] as ProgramWord);
            }
        }

        // shared function table
        for index in 0..self.shared_function_bodies.len() {
            words.push(layout.shared_function_body_offsets[index] as ProgramWord);
        }

        // static region
        for block in &self.static_blocks {
            words.extend_from_slice(block);
        }

        // bodies
        for bodies in &self.type_function_bodies {
            for body in bodies {
                words.extend_from_slice(body);
            }
        }
        for body in &self.shared_function_bodies {
            words.extend_from_slice(body);
        }

        debug_assert_eq!(words.len(), layout.total_size);
        words
    }
}
