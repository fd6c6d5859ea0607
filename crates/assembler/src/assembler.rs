// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

// operand expansion
//
// `CALL x`, `CALL_SHARED x`, `JUMP x` and every `BR* x` are sugar:
// the operand is materialized with a PUSH and the bare opcode
// follows, three words in total. `RET` keeps a literal result count.
//
// globals allocation
//
// the named shared globals occupy the low cells of the globals
// region; every machine's locals area is allocated above them in
// source order:
//
//   | machine N locals      |
//   | ...                   |
//   | machine 0 locals      | <-- machine 0 globals_base
//   | shared globals        | <-- 0
//
// type deduplication
//
// a machine's canonical form is its function bodies with label
// operands rewritten to in-function offsets and data operands
// rewritten to (content-interned block, offset) pairs. machines with
// equal canonical forms share one type table entry; instance order is
// preserved either way.

use std::collections::HashMap;

use fluxvm_image::{image_builder::ImageBuilder, layout::ImageLayout};
use fluxvm_parser::{
    ast::{CodeItem, DataNode, FunctionDeclNode, FunctionNode, OperandNode, ProgramNode},
    parse,
};
use fluxvm_types::{opcode::Opcode, AssembleError, ProgramWord};

pub fn assemble(source: &str) -> Result<Vec<ProgramWord>, AssembleError> {
    let program = parse(source)?;
    assemble_program(&program)
}

/// a body word before absolute placement
#[derive(Debug, PartialEq, Eq, Clone)]
enum SymWord {
    Lit(ProgramWord),
    /// a code label, a word offset within the same function body
    CodeTarget(usize),
    /// a static reference: (interned block id, offset within block)
    DataAddr(usize, usize),
}

/// content-interned static data blocks, in first-appearance order
#[derive(Default)]
struct DataPool {
    blocks: Vec<Vec<ProgramWord>>,
}

impl DataPool {
    fn intern(&mut self, words: Vec<ProgramWord>) -> usize {
        match self.blocks.iter().position(|block| *block == words) {
            Some(id) => id,
            None => {
                self.blocks.push(words);
                self.blocks.len() - 1
            }
        }
    }
}

/// the symbols visible while encoding one function body
struct BodyScope<'a> {
    local_names: &'a [(String, u32)],
    shared_globals: &'a HashMap<String, u32>,
    function_indices: &'a HashMap<String, u32>,
    shared_function_indices: &'a HashMap<String, u32>,
    data_symbols: &'a HashMap<String, (usize, usize)>,
}

fn program_word(value: u32, line: usize) -> Result<ProgramWord, AssembleError> {
    ProgramWord::try_from(value).map_err(|_| AssembleError::NumericOutOfRange {
        text: value.to_string(),
        line,
    })
}

fn is_expandable(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::call
            | Opcode::call_shared
            | Opcode::jump
            | Opcode::brlt
            | Opcode::brlte
            | Opcode::brgt
            | Opcode::brgte
            | Opcode::breq
    )
}

fn item_width(
    opcode: Opcode,
    operand: &Option<OperandNode>,
    line: usize,
) -> Result<usize, AssembleError> {
    if is_expandable(opcode) {
        // `CALL x` expands to `PUSH x ; CALL`
        return Ok(if operand.is_some() { 3 } else { 1 });
    }
    if opcode.has_operand() {
        if operand.is_none() {
            return Err(AssembleError::SyntaxError {
                message: format!("{} requires an operand", opcode.mnemonic()),
                line,
            });
        }
        return Ok(2);
    }
    if operand.is_some() {
        return Err(AssembleError::SyntaxError {
            message: format!("{} takes no operand", opcode.mnemonic()),
            line,
        });
    }
    Ok(1)
}

/// assigns function indices: declarations reserve, bodies fill.
///
/// returns the name table and the bodies ordered by index. when
/// `declared_count` is None (the shared function table) the table
/// size is inferred from the highest index.
fn assign_function_indices<'a>(
    functions: &'a [FunctionNode],
    decls: &[FunctionDeclNode],
    declared_count: Option<u32>,
    owner_line: usize,
) -> Result<(HashMap<String, u32>, Vec<&'a FunctionNode>), AssembleError> {
    let mut indices: HashMap<String, u32> = HashMap::new();
    let mut next = 0u32;

    for decl in decls {
        let index = decl.index.unwrap_or(next);
        if indices.insert(decl.name.clone(), index).is_some() {
            return Err(AssembleError::DuplicateBodyForDecl {
                name: decl.name.clone(),
                line: decl.line,
            });
        }
        next = next.max(index + 1);
    }

    let mut placed: HashMap<u32, &FunctionNode> = HashMap::new();
    for function in functions {
        let index = match indices.get(&function.name) {
            Some(reserved) => {
                if function.index.is_some() && function.index != Some(*reserved) {
                    return Err(AssembleError::SyntaxError {
                        message: format!(
                            "function \"{}\" declared with index {} but defined with {}",
                            function.name,
                            reserved,
                            function.index.unwrap_or(0)
                        ),
                        line: function.line,
                    });
                }
                *reserved
            }
            None => {
                let index = function.index.unwrap_or(next);
                indices.insert(function.name.clone(), index);
                index
            }
        };
        next = next.max(index + 1);

        if let Some(count) = declared_count {
            if index >= count {
                return Err(AssembleError::NumericOutOfRange {
                    text: index.to_string(),
                    line: function.line,
                });
            }
        }
        if placed.insert(index, function).is_some() {
            return Err(AssembleError::DuplicateBodyForDecl {
                name: function.name.clone(),
                line: function.line,
            });
        }
    }

    let table_size = declared_count.unwrap_or(next);
    let mut ordered = Vec::with_capacity(table_size as usize);
    for index in 0..table_size {
        match placed.get(&index) {
            Some(function) => ordered.push(*function),
            None => {
                return Err(AssembleError::SyntaxError {
                    message: format!("no body for function index {}", index),
                    line: owner_line,
                })
            }
        }
    }

    Ok((indices, ordered))
}

fn lookup_named(
    names: &[(String, u32)],
    symbol: &str,
) -> Option<u32> {
    names
        .iter()
        .find(|(name, _)| name == symbol)
        .map(|(_, value)| *value)
}

fn encode_body(
    function: &FunctionNode,
    scope: &BodyScope,
) -> Result<Vec<SymWord>, AssembleError> {
    // pass 1: label offsets within this body
    let mut labels: HashMap<&str, usize> = HashMap::new();
    let mut offset = 0;
    for item in &function.items {
        match item {
            CodeItem::Label(name) => {
                if labels.insert(name, offset).is_some() {
                    return Err(AssembleError::SyntaxError {
                        message: format!("duplicate label \"{}\"", name),
                        line: function.line,
                    });
                }
            }
            CodeItem::Instruction {
                opcode,
                operand,
                line,
            } => {
                offset += item_width(*opcode, operand, *line)?;
            }
        }
    }

    // pass 2: emit
    let mut words: Vec<SymWord> = Vec::with_capacity(offset);
    for item in &function.items {
        let CodeItem::Instruction {
            opcode,
            operand,
            line,
        } = item
        else {
            continue;
        };
        let opcode = *opcode;
        let line = *line;

        if is_expandable(opcode) {
            let Some(operand) = operand else {
                words.push(SymWord::Lit(opcode.as_word()));
                continue;
            };
            let target = match (opcode, operand) {
                (_, OperandNode::Number(value)) => SymWord::Lit(program_word(*value, line)?),
                (Opcode::call, OperandNode::Symbol(symbol)) => {
                    let index = scope.function_indices.get(symbol).ok_or_else(|| {
                        AssembleError::UnknownLabel {
                            name: symbol.clone(),
                            line,
                        }
                    })?;
                    SymWord::Lit(program_word(*index, line)?)
                }
                (Opcode::call_shared, OperandNode::Symbol(symbol)) => {
                    let index = scope.shared_function_indices.get(symbol).ok_or_else(|| {
                        AssembleError::UnknownLabel {
                            name: symbol.clone(),
                            line,
                        }
                    })?;
                    SymWord::Lit(program_word(*index, line)?)
                }
                (_, OperandNode::Symbol(symbol)) => {
                    // jump and branch targets are labels in this body
                    let target =
                        labels
                            .get(symbol.as_str())
                            .ok_or_else(|| AssembleError::UnknownLabel {
                                name: symbol.clone(),
                                line,
                            })?;
                    SymWord::CodeTarget(*target)
                }
            };
            words.push(SymWord::Lit(Opcode::push.as_word()));
            words.push(target);
            words.push(SymWord::Lit(opcode.as_word()));
            continue;
        }

        if !opcode.has_operand() {
            words.push(SymWord::Lit(opcode.as_word()));
            continue;
        }

        // item_width already guaranteed the operand's presence
        let Some(operand) = operand else {
            continue;
        };
        let resolved = match (opcode, operand) {
            (Opcode::ret, OperandNode::Number(value)) => SymWord::Lit(program_word(*value, line)?),
            (Opcode::ret, OperandNode::Symbol(_)) => {
                return Err(AssembleError::SyntaxError {
                    message: "RET takes a literal count".to_string(),
                    line,
                })
            }
            (Opcode::lload | Opcode::lstore, OperandNode::Symbol(symbol)) => {
                let index = lookup_named(scope.local_names, symbol).ok_or_else(|| {
                    AssembleError::UndeclaredLocal {
                        name: symbol.clone(),
                        line,
                    }
                })?;
                SymWord::Lit(program_word(index, line)?)
            }
            (Opcode::sload | Opcode::sstore, OperandNode::Symbol(symbol)) => {
                let offset = lookup_named(&function.frame_names, symbol).ok_or_else(|| {
                    AssembleError::UndeclaredFrameSlot {
                        name: symbol.clone(),
                        line,
                    }
                })?;
                SymWord::Lit(program_word(offset, line)?)
            }
            (Opcode::gload | Opcode::gstore, OperandNode::Symbol(symbol)) => {
                let address = scope.shared_globals.get(symbol).ok_or_else(|| {
                    AssembleError::UndeclaredShared {
                        name: symbol.clone(),
                        line,
                    }
                })?;
                SymWord::Lit(program_word(*address, line)?)
            }
            (Opcode::push, OperandNode::Symbol(symbol)) => {
                // a code label, a data block name or a data label
                if let Some(target) = labels.get(symbol.as_str()) {
                    SymWord::CodeTarget(*target)
                } else if let Some((block, offset)) = scope.data_symbols.get(symbol) {
                    SymWord::DataAddr(*block, *offset)
                } else {
                    return Err(AssembleError::UnknownLabel {
                        name: symbol.clone(),
                        line,
                    });
                }
            }
            (_, OperandNode::Number(value)) => SymWord::Lit(program_word(*value, line)?),
            (_, OperandNode::Symbol(symbol)) => {
                return Err(AssembleError::UnknownLabel {
                    name: symbol.clone(),
                    line,
                })
            }
        };
        words.push(SymWord::Lit(opcode.as_word()));
        words.push(resolved);
    }

    Ok(words)
}

/// interns the data blocks of one scope and returns its symbol table:
/// block names map to the block start, data labels to their cell.
fn data_symbols_for(
    pool: &mut DataPool,
    datas: &[&DataNode],
) -> Result<HashMap<String, (usize, usize)>, AssembleError> {
    let mut symbols = HashMap::new();
    for data in datas {
        let block = pool.intern(data.words());
        if symbols.insert(data.name.clone(), (block, 0)).is_some() {
            return Err(AssembleError::SyntaxError {
                message: format!("duplicate data block \"{}\"", data.name),
                line: data.line,
            });
        }
        for (label, offset) in data.labels() {
            if symbols.insert(label.clone(), (block, offset)).is_some() {
                return Err(AssembleError::SyntaxError {
                    message: format!("duplicate data label \"{}\"", label),
                    line: data.line,
                });
            }
        }
    }
    Ok(symbols)
}

pub fn assemble_program(program: &ProgramNode) -> Result<Vec<ProgramWord>, AssembleError> {
    // the named shared globals claim the low globals cells
    let mut shared_globals: HashMap<String, u32> = HashMap::new();
    let mut shared_size = 0u32;
    for global in &program.shared_globals {
        if shared_globals
            .insert(global.name.clone(), global.index)
            .is_some()
        {
            return Err(AssembleError::SyntaxError {
                message: format!("duplicate shared global \"{}\"", global.name),
                line: global.line,
            });
        }
        shared_size = shared_size.max(global.index + 1);
    }

    let (shared_function_indices, shared_ordered) = assign_function_indices(
        &program.shared_functions,
        &program.shared_function_decls,
        None,
        0,
    )?;

    let mut pool = DataPool::default();

    // shared data is visible everywhere; intern it first so block ids
    // are stable regardless of which machine references them
    let shared_data_refs: Vec<&DataNode> =
        program.shared_datas.iter().collect();
    let shared_data_symbols = data_symbols_for(&mut pool, &shared_data_refs)?;

    // shared function bodies; CALL cannot resolve machine function
    // names here, there is no machine scope
    let no_functions: HashMap<String, u32> = HashMap::new();
    let mut shared_bodies: Vec<Vec<SymWord>> = Vec::with_capacity(shared_ordered.len());
    for function in &shared_ordered {
        let scope = BodyScope {
            local_names: &[],
            shared_globals: &shared_globals,
            function_indices: &no_functions,
            shared_function_indices: &shared_function_indices,
            data_symbols: &shared_data_symbols,
        };
        shared_bodies.push(encode_body(function, &scope)?);
    }

    // machines: canonicalize, dedupe, allocate globals
    let mut type_forms: Vec<Vec<Vec<SymWord>>> = Vec::new();
    let mut instances: Vec<(ProgramWord, ProgramWord)> = Vec::new();
    let mut globals_cursor = shared_size;

    for machine in &program.machines {
        let (function_indices, ordered) = assign_function_indices(
            &machine.functions,
            &machine.function_decls,
            Some(machine.function_count),
            machine.line,
        )?;

        // machine data blocks shadow shared ones of the same name
        let mut data_symbols = shared_data_symbols.clone();
        let machine_data_refs: Vec<&DataNode> = machine.datas.iter().collect();
        for (name, location) in data_symbols_for(&mut pool, &machine_data_refs)? {
            data_symbols.insert(name, location);
        }

        let mut bodies: Vec<Vec<SymWord>> = Vec::with_capacity(ordered.len());
        for function in &ordered {
            let scope = BodyScope {
                local_names: &machine.local_names,
                shared_globals: &shared_globals,
                function_indices: &function_indices,
                shared_function_indices: &shared_function_indices,
                data_symbols: &data_symbols,
            };
            bodies.push(encode_body(function, &scope)?);
        }

        let type_id = match type_forms.iter().position(|form| *form == bodies) {
            Some(existing) => existing,
            None => {
                type_forms.push(bodies);
                type_forms.len() - 1
            }
        };

        let globals_base = globals_cursor;
        globals_cursor = globals_cursor.checked_add(machine.locals).ok_or_else(|| {
            AssembleError::NumericOutOfRange {
                text: machine.locals.to_string(),
                line: machine.line,
            }
        })?;

        instances.push((
            program_word(type_id as u32, machine.line)?,
            program_word(globals_base, machine.line)?,
        ));
    }

    let globals_size = program_word(globals_cursor, 0).map_err(|_| {
        AssembleError::NumericOutOfRange {
            text: globals_cursor.to_string(),
            line: 0,
        }
    })?;

    // layout is a pure function of the part sizes
    let function_body_sizes: Vec<Vec<usize>> = type_forms
        .iter()
        .map(|bodies| bodies.iter().map(|body| body.len()).collect())
        .collect();
    let shared_body_sizes: Vec<usize> = shared_bodies.iter().map(|body| body.len()).collect();
    let static_block_sizes: Vec<usize> = pool.blocks.iter().map(|block| block.len()).collect();

    let layout = ImageLayout::compute(
        instances.len(),
        &function_body_sizes,
        &shared_body_sizes,
        &static_block_sizes,
    );
    if layout.total_size > ProgramWord::MAX as usize + 1 {
        return Err(AssembleError::NumericOutOfRange {
            text: layout.total_size.to_string(),
            line: 0,
        });
    }

    let resolve = |body: &[SymWord], body_offset: usize| -> Vec<ProgramWord> {
        body.iter()
            .map(|word| match word {
                SymWord::Lit(value) => *value,
                SymWord::CodeTarget(offset) => (body_offset + offset) as ProgramWord,
                SymWord::DataAddr(block, offset) => {
                    (layout.static_block_offsets[*block] + offset) as ProgramWord
                }
            })
            .collect()
    };

    let type_function_bodies: Vec<Vec<Vec<ProgramWord>>> = type_forms
        .iter()
        .enumerate()
        .map(|(type_id, bodies)| {
            bodies
                .iter()
                .enumerate()
                .map(|(function_index, body)| {
                    resolve(body, layout.function_body_offsets[type_id][function_index])
                })
                .collect()
        })
        .collect();
    let shared_function_bodies: Vec<Vec<ProgramWord>> = shared_bodies
        .iter()
        .enumerate()
        .map(|(index, body)| resolve(body, layout.shared_function_body_offsets[index]))
        .collect();

    let builder = ImageBuilder {
        globals_size,
        instances,
        type_function_bodies,
        shared_function_bodies,
        static_blocks: pool.blocks,
    };
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use fluxvm_image::program_image::ProgramImage;
    use fluxvm_runtime::{Processor, Program};
    use fluxvm_types::AssembleError;
    use pretty_assertions::assert_eq;

    use super::assemble;

    #[test]
    fn test_assemble_minimal_machine() {
        let words = assemble(
            r#"
.machine solo locals 3 functions 1
    .func main index 0
        EXIT
    .end
.end
"#,
        )
        .unwrap();

        let image = ProgramImage::load(&words).unwrap();
        assert_eq!(image.instance_count(), 1);
        assert_eq!(image.type_count(), 1);
        assert_eq!(image.globals_size(), 3);
        assert_eq!(image.shared_function_count(), 0);
        assert_eq!(image.instance(0).unwrap().globals_base, 0);
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let source = r#"
.shared counter 0
.shared_func boot index 0
    PUSH 7
    GSTORE counter
    EXIT
.end
.machine one locals 2 functions 1
    .func main index 0
        GLOAD counter
        EXIT
    .end
.end
"#;
        assert_eq!(assemble(source).unwrap(), assemble(source).unwrap());
    }

    #[test]
    fn test_identical_machines_share_one_type() {
        let words = assemble(
            r#"
.machine first locals 2 functions 1
    .func main index 0
        PUSH 5
        EXIT
    .end
.end
.machine second locals 2 functions 1
    .func main index 0
        PUSH 5
        EXIT
    .end
.end
.machine third locals 2 functions 1
    .func main index 0
        PUSH 6
        EXIT
    .end
.end
"#,
        )
        .unwrap();

        let image = ProgramImage::load(&words).unwrap();
        assert_eq!(image.instance_count(), 3);
        assert_eq!(image.type_count(), 2);

        // instance ordering is preserved and every instance keeps its
        // own globals area
        assert_eq!(image.instance(0).unwrap().type_id, 0);
        assert_eq!(image.instance(1).unwrap().type_id, 0);
        assert_eq!(image.instance(2).unwrap().type_id, 1);
        assert_eq!(image.instance(0).unwrap().globals_base, 0);
        assert_eq!(image.instance(1).unwrap().globals_base, 2);
        assert_eq!(image.instance(2).unwrap().globals_base, 4);
    }

    #[test]
    fn test_machines_with_identical_data_blocks_dedupe() {
        let source_of = |name: &str| {
            format!(
                r#"
.machine {name} locals 0 functions 1
    .data table
        11
        22
    .end
    .func main index 0
        PUSH table
        LOAD_STATIC
        EXIT
    .end
.end
"#
            )
        };
        let source = format!("{}{}", source_of("alpha"), source_of("beta"));
        let words = assemble(&source).unwrap();
        let image = ProgramImage::load(&words).unwrap();
        assert_eq!(image.instance_count(), 2);
        assert_eq!(image.type_count(), 1);
    }

    #[test]
    fn test_call_by_name_and_labels_resolve() {
        let words = assemble(
            r#"
.machine math locals 0 functions 2
    .func_decl helper index 1
    .func main index 0
        PUSH 10
        PUSH 20
        PUSH 2
        CALL helper
        EXIT
    .end
    .func helper
        ADD
        RET 1
    .end
.end
"#,
        )
        .unwrap();

        let mut memory = vec![0u32; 256];
        let processor = Processor::new();
        let mut program = Program::new(&words, &mut memory).unwrap();
        assert_eq!(program.call(&processor, 0, 0, &[]), Ok(vec![30]));
    }

    #[test]
    fn test_branch_labels_drive_a_loop() {
        // sums 1..=n, n is the argument
        let words = assemble(
            r#"
.machine looper locals 2 functions 1
    .local i 0
    .local acc 1
    .func main index 0
        PUSH 0
        LSTORE acc
        PUSH 1
        LSTORE i
    again:
        SLOAD 0         ; n (the right-hand side)
        LLOAD i
        BRLTE body      ; while i <= n
        LLOAD acc
        EXIT
    body:
        LLOAD acc
        LLOAD i
        ADD
        LSTORE acc
        LLOAD i
        PUSH 1
        ADD
        LSTORE i
        JUMP again
    .end
.end
"#,
        )
        .unwrap();

        let mut memory = vec![0u32; 256];
        let processor = Processor::new();
        let mut program = Program::new(&words, &mut memory).unwrap();
        assert_eq!(program.call(&processor, 0, 0, &[4]), Ok(vec![10]));
        assert_eq!(program.call(&processor, 0, 0, &[0]), Ok(vec![0]));
        assert_eq!(program.call(&processor, 0, 0, &[100]), Ok(vec![5050]));
    }

    #[test]
    fn test_static_data_round_trip_through_the_vm() {
        let words = assemble(
            r#"
.shared_data palette
        0x0102
colors:
        0x0a0b
.end
.machine reader locals 0 functions 1
    .func main index 0
        PUSH colors
        LOAD_STATIC
        PUSH palette
        LOAD_STATIC
        EXIT
    .end
.end
"#,
        )
        .unwrap();

        let mut memory = vec![0u32; 256];
        let processor = Processor::new();
        let mut program = Program::new(&words, &mut memory).unwrap();
        assert_eq!(
            program.call(&processor, 0, 0, &[]),
            Ok(vec![0x0a0b, 0x0102])
        );
    }

    #[test]
    fn test_named_locals_frames_and_shared_globals() {
        let words = assemble(
            r#"
.shared offset 0
.shared_func boot index 0
    PUSH 100
    GSTORE offset
    EXIT
.end
.machine adder locals 1 functions 1
    .local acc 0
    .func main index 0
        .frame amount 0
        SLOAD amount
        LSTORE acc
        LLOAD acc
        GLOAD offset
        ADD
        EXIT
    .end
.end
"#,
        )
        .unwrap();

        let mut memory = vec![0u32; 256];
        let processor = Processor::new();
        let mut program = Program::new(&words, &mut memory).unwrap();
        program.call_shared(&processor, 0, &[]).unwrap();
        assert_eq!(program.call(&processor, 0, 0, &[5]), Ok(vec![105]));
    }

    #[test]
    fn test_undeclared_names_are_reported() {
        let base = r#"
.machine demo locals 1 functions 1
    .func main index 0
        {instr}
        EXIT
    .end
.end
"#;
        let undeclared_local = assemble(&base.replace("{instr}", "LLOAD missing"));
        assert_eq!(
            undeclared_local,
            Err(AssembleError::UndeclaredLocal {
                name: "missing".to_string(),
                line: 4
            })
        );

        let undeclared_frame = assemble(&base.replace("{instr}", "SLOAD missing"));
        assert_eq!(
            undeclared_frame,
            Err(AssembleError::UndeclaredFrameSlot {
                name: "missing".to_string(),
                line: 4
            })
        );

        let undeclared_shared = assemble(&base.replace("{instr}", "GSTORE missing"));
        assert!(matches!(
            undeclared_shared,
            Err(AssembleError::UndeclaredShared { .. })
        ));

        let unknown_label = assemble(&base.replace("{instr}", "JUMP missing"));
        assert_eq!(
            unknown_label,
            Err(AssembleError::UnknownLabel {
                name: "missing".to_string(),
                line: 4
            })
        );
    }

    #[test]
    fn test_duplicate_body_for_decl_is_reported() {
        let result = assemble(
            r#"
.machine demo locals 0 functions 1
    .func main index 0
        EXIT
    .end
    .func main index 0
        EXIT
    .end
.end
"#,
        );
        assert_eq!(
            result,
            Err(AssembleError::DuplicateBodyForDecl {
                name: "main".to_string(),
                line: 6
            })
        );
    }

    #[test]
    fn test_function_index_beyond_declared_count() {
        let result = assemble(
            r#"
.machine demo locals 0 functions 1
    .func main index 0
        EXIT
    .end
    .func extra index 5
        EXIT
    .end
.end
"#,
        );
        assert_eq!(
            result,
            Err(AssembleError::NumericOutOfRange {
                text: "5".to_string(),
                line: 6
            })
        );
    }

    #[test]
    fn test_missing_function_body_is_reported() {
        let result = assemble(
            r#"
.machine demo locals 0 functions 2
    .func main index 0
        EXIT
    .end
.end
"#,
        );
        assert!(matches!(result, Err(AssembleError::SyntaxError { .. })));
    }

    #[test]
    fn test_push_immediate_range() {
        let result = assemble(
            r#"
.machine demo locals 0 functions 1
    .func main index 0
        PUSH 65536
        EXIT
    .end
.end
"#,
        );
        assert_eq!(
            result,
            Err(AssembleError::NumericOutOfRange {
                text: "65536".to_string(),
                line: 4
            })
        );
    }
}
