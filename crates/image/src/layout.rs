// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

// the assembler needs every absolute offset before it can resolve
// label references, so placement is computed from sizes alone, in a
// fixed order:
//
//   header | instance table | type table | function tables
//   | shared function table | static region | type bodies
//   | shared function bodies
//
// readers never depend on this order, they follow the header offsets.

use fluxvm_types::HEADER_SIZE;

#[derive(Debug, PartialEq)]
pub struct ImageLayout {
    pub instance_table_offset: usize,
    pub type_table_offset: usize,
    /// one function table per type
    pub function_table_offsets: Vec<usize>,
    pub shared_function_table_offset: usize,
    pub static_offset: usize,
    /// one offset per static block, in emission order
    pub static_block_offsets: Vec<usize>,
    /// absolute body offsets, indexed `[type_id][function_index]`
    pub function_body_offsets: Vec<Vec<usize>>,
    pub shared_function_body_offsets: Vec<usize>,
    pub total_size: usize,
}

impl ImageLayout {
    pub fn compute(
        instance_count: usize,
        function_body_sizes: &[Vec<usize>],
        shared_function_body_sizes: &[usize],
        static_block_sizes: &[usize],
    ) -> ImageLayout {
        let type_count = function_body_sizes.len();

        let instance_table_offset = HEADER_SIZE;
        let type_table_offset = instance_table_offset + instance_count * 2;

        let mut cursor = type_table_offset + type_count * 2;

        let mut function_table_offsets = Vec::with_capacity(type_count);
        for bodies in function_body_sizes {
            function_table_offsets.push(cursor);
            cursor += bodies.len();
        }

        let shared_function_table_offset = cursor;
        cursor += shared_function_body_sizes.len();

        let static_offset = cursor;
        let mut static_block_offsets = Vec::with_capacity(static_block_sizes.len());
        for size in static_block_sizes {
            static_block_offsets.push(cursor);
            cursor += size;
        }

        let mut function_body_offsets = Vec::with_capacity(type_count);
        for bodies in function_body_sizes {
            let mut offsets = Vec::with_capacity(bodies.len());
            for size in bodies {
                offsets.push(cursor);
                cursor += size;
            }
            function_body_offsets.push(offsets);
        }

        let mut shared_function_body_offsets =
            Vec::with_capacity(shared_function_body_sizes.len());
        for size in shared_function_body_sizes {
            shared_function_body_offsets.push(cursor);
            cursor += size;
        }

        ImageLayout {
            instance_table_offset,
            type_table_offset,
            function_table_offsets,
            shared_function_table_offset,
            static_offset,
            static_block_offsets,
            function_body_offsets,
            shared_function_body_offsets,
            total_size: cursor,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::ImageLayout;

    #[test]
    fn test_compute_offsets() {
        // 2 instances, one type with two bodies (3 and 1 words),
        // one shared body (2 words), one static block (4 words)
        let layout = ImageLayout::compute(2, &[vec![3, 1]], &[2], &[4]);

        assert_eq!(layout.instance_table_offset, 8);
        assert_eq!(layout.type_table_offset, 12);
        assert_eq!(layout.function_table_offsets, vec![14]);
        assert_eq!(layout.shared_function_table_offset, 16);
        assert_eq!(layout.static_offset, 17);
        assert_eq!(layout.static_block_offsets, vec![17]);
        assert_eq!(layout.function_body_offsets, vec![vec![21, 24]]);
        assert_eq!(layout.shared_function_body_offsets, vec![25]);
        assert_eq!(layout.total_size, 27);
    }
}
