// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

// the in-memory program graph: a DAG rooted at the machines
// (instances). the graph nodes are plain vectors with stable indices,
// deduplication happens later over their structural content.

use fluxvm_types::{opcode::Opcode, ProgramWord};

#[derive(Debug, Default, PartialEq)]
pub struct ProgramNode {
    pub shared_globals: Vec<SharedGlobalNode>,
    pub shared_functions: Vec<FunctionNode>,
    pub shared_function_decls: Vec<FunctionDeclNode>,
    pub shared_datas: Vec<DataNode>,
    pub machines: Vec<MachineNode>,
}

#[derive(Debug, PartialEq)]
pub struct SharedGlobalNode {
    pub name: String,
    pub index: u32,
    pub line: usize,
}

#[derive(Debug, PartialEq)]
pub struct MachineNode {
    pub name: String,
    /// the size of this machine's locals area in the globals region
    pub locals: u32,
    /// the declared function table size
    pub function_count: u32,
    pub functions: Vec<FunctionNode>,
    pub function_decls: Vec<FunctionDeclNode>,
    pub datas: Vec<DataNode>,
    pub local_names: Vec<(String, u32)>,
    pub line: usize,
}

#[derive(Debug, PartialEq)]
pub struct FunctionNode {
    pub name: String,
    pub index: Option<u32>,
    pub frame_names: Vec<(String, u32)>,
    pub items: Vec<CodeItem>,
    pub line: usize,
}

#[derive(Debug, PartialEq)]
pub struct FunctionDeclNode {
    pub name: String,
    pub index: Option<u32>,
    pub line: usize,
}

#[derive(Debug, PartialEq)]
pub enum CodeItem {
    Label(String),
    Instruction {
        opcode: Opcode,
        operand: Option<OperandNode>,
        line: usize,
    },
}

#[derive(Debug, PartialEq, Clone)]
pub enum OperandNode {
    Number(u32),
    Symbol(String),
}

#[derive(Debug, PartialEq)]
pub struct DataNode {
    pub name: String,
    pub items: Vec<DataItem>,
    pub line: usize,
}

#[derive(Debug, PartialEq)]
pub enum DataItem {
    Label(String),
    Word(ProgramWord),
}

impl DataNode {
    /// the emitted words of this block, labels carry no width
    pub fn words(&self) -> Vec<ProgramWord> {
        self.items
            .iter()
            .filter_map(|item| match item {
                DataItem::Word(word) => Some(*word),
                DataItem::Label(_) => None,
            })
            .collect()
    }

    /// `(label, word offset within the block)` pairs
    pub fn labels(&self) -> Vec<(String, usize)> {
        let mut labels = Vec::new();
        let mut offset = 0;
        for item in &self.items {
            match item {
                DataItem::Label(name) => labels.push((name.clone(), offset)),
                DataItem::Word(_) => offset += 1,
            }
        }
        labels
    }
}
