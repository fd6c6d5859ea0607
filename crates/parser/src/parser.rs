// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

// the block structure of a source file:
//
//   .shared <name> <index>          (top, before any .machine)
//   .shared_func <name> [index I]   (top)
//       ... instructions, labels ...
//   .end
//   .shared_func_decl <name> [index I]
//   .shared_data <name>             (top)
//       ... .word lines, bare numbers, labels ...
//   .end
//   .data <name>                    (top or machine)
//   .machine <name> locals <N> functions <M>
//       .local <name> <index>
//       .data <name> ... .end
//       .func <name> [index I]
//           .frame <name> <offset>
//           ... instructions, labels ...
//       .end
//       .func_decl <name> [index I]
//   .end
//
// `.end` always closes the innermost open block. `globals` is a
// deprecated alias for `locals` in the .machine header.

use fluxvm_types::{opcode::Opcode, AssembleError, ProgramWord};

use crate::{
    ast::{
        CodeItem, DataItem, DataNode, FunctionDeclNode, FunctionNode, MachineNode, OperandNode,
        ProgramNode, SharedGlobalNode,
    },
    lexer::{lex_line, Token},
};

#[derive(PartialEq, Clone, Copy)]
enum Scope {
    Top,
    Machine,
}

struct ParserState {
    program: ProgramNode,
    machine: Option<MachineNode>,
    function: Option<(FunctionNode, Scope)>,
    data: Option<(DataNode, Scope)>,
}

fn expect_name(tokens: &[Token], position: usize, line: usize) -> Result<String, AssembleError> {
    match tokens.get(position) {
        Some(Token::Name(name)) => Ok(name.clone()),
        _ => Err(AssembleError::SyntaxError {
            message: "expected a name".to_string(),
            line,
        }),
    }
}

fn expect_number(tokens: &[Token], position: usize, line: usize) -> Result<u32, AssembleError> {
    match tokens.get(position) {
        Some(Token::Number(value)) => Ok(*value),
        _ => Err(AssembleError::SyntaxError {
            message: "expected a number".to_string(),
            line,
        }),
    }
}

fn expect_keyword(
    tokens: &[Token],
    position: usize,
    keywords: &[&str],
    line: usize,
) -> Result<String, AssembleError> {
    let name = expect_name(tokens, position, line)?.to_lowercase();
    if keywords.contains(&name.as_str()) {
        Ok(name)
    } else {
        Err(AssembleError::SyntaxError {
            message: format!("expected one of {:?}, found \"{}\"", keywords, name),
            line,
        })
    }
}

fn expect_len(tokens: &[Token], len: usize, line: usize) -> Result<(), AssembleError> {
    if tokens.len() == len {
        Ok(())
    } else {
        Err(AssembleError::SyntaxError {
            message: "unexpected trailing tokens".to_string(),
            line,
        })
    }
}

/// `[index <I>]` at the tail of .func/.func_decl lines
fn parse_optional_index(
    tokens: &[Token],
    position: usize,
    line: usize,
) -> Result<Option<u32>, AssembleError> {
    if tokens.len() == position {
        return Ok(None);
    }
    expect_keyword(tokens, position, &["index"], line)?;
    let index = expect_number(tokens, position + 1, line)?;
    expect_len(tokens, position + 2, line)?;
    Ok(Some(index))
}

fn data_word(value: u32, line: usize) -> Result<ProgramWord, AssembleError> {
    ProgramWord::try_from(value).map_err(|_| AssembleError::NumericOutOfRange {
        text: value.to_string(),
        line,
    })
}

impl ParserState {
    fn open_block_name(&self) -> Option<String> {
        if let Some((data, _)) = &self.data {
            return Some(data.name.clone());
        }
        if let Some((function, _)) = &self.function {
            return Some(function.name.clone());
        }
        self.machine.as_ref().map(|machine| machine.name.clone())
    }

    fn no_open_function_or_data(&self, line: usize) -> Result<(), AssembleError> {
        if self.function.is_some() || self.data.is_some() {
            return Err(AssembleError::SyntaxError {
                message: "a function or data block is still open".to_string(),
                line,
            });
        }
        Ok(())
    }

    fn directive(
        &mut self,
        keyword: &str,
        tokens: &[Token],
        line: usize,
    ) -> Result<(), AssembleError> {
        match keyword {
            "machine" => {
                self.no_open_function_or_data(line)?;
                if self.machine.is_some() {
                    return Err(AssembleError::SyntaxError {
                        message: "machines cannot nest".to_string(),
                        line,
                    });
                }
                let name = expect_name(tokens, 1, line)?;
                // `globals` is the deprecated spelling of `locals`
                expect_keyword(tokens, 2, &["locals", "globals"], line)?;
                let locals = expect_number(tokens, 3, line)?;
                expect_keyword(tokens, 4, &["functions"], line)?;
                let function_count = expect_number(tokens, 5, line)?;
                expect_len(tokens, 6, line)?;

                self.machine = Some(MachineNode {
                    name,
                    locals,
                    function_count,
                    functions: Vec::new(),
                    function_decls: Vec::new(),
                    datas: Vec::new(),
                    local_names: Vec::new(),
                    line,
                });
            }
            "func" | "shared_func" => {
                self.no_open_function_or_data(line)?;
                let scope = if keyword == "func" {
                    if self.machine.is_none() {
                        return Err(AssembleError::SyntaxError {
                            message: ".func requires an open .machine".to_string(),
                            line,
                        });
                    }
                    Scope::Machine
                } else {
                    if self.machine.is_some() {
                        return Err(AssembleError::SyntaxError {
                            message: ".shared_func cannot appear inside a machine".to_string(),
                            line,
                        });
                    }
                    Scope::Top
                };
                let name = expect_name(tokens, 1, line)?;
                let index = parse_optional_index(tokens, 2, line)?;
                self.function = Some((
                    FunctionNode {
                        name,
                        index,
                        frame_names: Vec::new(),
                        items: Vec::new(),
                        line,
                    },
                    scope,
                ));
            }
            "func_decl" | "shared_func_decl" => {
                self.no_open_function_or_data(line)?;
                let name = expect_name(tokens, 1, line)?;
                let index = parse_optional_index(tokens, 2, line)?;
                let node = FunctionDeclNode { name, index, line };
                if keyword == "func_decl" {
                    match &mut self.machine {
                        Some(machine) => machine.function_decls.push(node),
                        None => {
                            return Err(AssembleError::SyntaxError {
                                message: ".func_decl requires an open .machine".to_string(),
                                line,
                            })
                        }
                    }
                } else {
                    if self.machine.is_some() {
                        return Err(AssembleError::SyntaxError {
                            message: ".shared_func_decl cannot appear inside a machine"
                                .to_string(),
                            line,
                        });
                    }
                    self.program.shared_function_decls.push(node);
                }
            }
            "data" | "shared_data" => {
                self.no_open_function_or_data(line)?;
                let scope = if keyword == "shared_data" {
                    if self.machine.is_some() {
                        return Err(AssembleError::SyntaxError {
                            message: ".shared_data cannot appear inside a machine".to_string(),
                            line,
                        });
                    }
                    Scope::Top
                } else if self.machine.is_some() {
                    Scope::Machine
                } else {
                    Scope::Top
                };
                let name = expect_name(tokens, 1, line)?;
                expect_len(tokens, 2, line)?;
                self.data = Some((
                    DataNode {
                        name,
                        items: Vec::new(),
                        line,
                    },
                    scope,
                ));
            }
            "shared" => {
                self.no_open_function_or_data(line)?;
                if self.machine.is_some() || !self.program.machines.is_empty() {
                    return Err(AssembleError::SharedAfterMachine { line });
                }
                let name = expect_name(tokens, 1, line)?;
                let index = expect_number(tokens, 2, line)?;
                expect_len(tokens, 3, line)?;
                self.program
                    .shared_globals
                    .push(SharedGlobalNode { name, index, line });
            }
            "local" => {
                let name = expect_name(tokens, 1, line)?;
                let index = expect_number(tokens, 2, line)?;
                expect_len(tokens, 3, line)?;
                match &mut self.machine {
                    Some(machine) if self.function.is_none() && self.data.is_none() => {
                        machine.local_names.push((name, index));
                    }
                    _ => {
                        return Err(AssembleError::SyntaxError {
                            message: ".local belongs at machine level".to_string(),
                            line,
                        })
                    }
                }
            }
            "frame" => {
                let name = expect_name(tokens, 1, line)?;
                let offset = expect_number(tokens, 2, line)?;
                expect_len(tokens, 3, line)?;
                match &mut self.function {
                    Some((function, _)) => function.frame_names.push((name, offset)),
                    None => {
                        return Err(AssembleError::SyntaxError {
                            message: ".frame belongs inside a function".to_string(),
                            line,
                        })
                    }
                }
            }
            "word" => {
                let value = expect_number(tokens, 1, line)?;
                expect_len(tokens, 2, line)?;
                match &mut self.data {
                    Some((data, _)) => data.items.push(DataItem::Word(data_word(value, line)?)),
                    None => return Err(AssembleError::DataWordOutsideDataBlock { line }),
                }
            }
            "end" => {
                expect_len(tokens, 1, line)?;
                if let Some((data, scope)) = self.data.take() {
                    match scope {
                        Scope::Machine => match &mut self.machine {
                            Some(machine) => machine.datas.push(data),
                            None => unreachable!("machine-scoped data without a machine"),
                        },
                        Scope::Top => self.program.shared_datas.push(data),
                    }
                } else if let Some((function, scope)) = self.function.take() {
                    match scope {
                        Scope::Machine => match &mut self.machine {
                            Some(machine) => machine.functions.push(function),
                            None => unreachable!("machine-scoped function without a machine"),
                        },
                        Scope::Top => self.program.shared_functions.push(function),
                    }
                } else if let Some(machine) = self.machine.take() {
                    self.program.machines.push(machine);
                } else {
                    return Err(AssembleError::SyntaxError {
                        message: "no open block to close".to_string(),
                        line,
                    });
                }
            }
            unknown => {
                return Err(AssembleError::SyntaxError {
                    message: format!("unknown directive \".{}\"", unknown),
                    line,
                })
            }
        }
        Ok(())
    }

    fn instruction(&mut self, tokens: &[Token], line: usize) -> Result<(), AssembleError> {
        let Some((function, _)) = &mut self.function else {
            return Err(AssembleError::InstructionOutsideFunction { line });
        };

        let Token::Name(mnemonic) = &tokens[0] else {
            unreachable!("instruction lines start with a name token");
        };
        let Some(opcode) = Opcode::from_mnemonic(&mnemonic.to_uppercase()) else {
            return Err(AssembleError::SyntaxError {
                message: format!("unknown mnemonic \"{}\"", mnemonic),
                line,
            });
        };

        let operand = match tokens.get(1) {
            None => None,
            Some(Token::Number(value)) => Some(OperandNode::Number(*value)),
            Some(Token::Name(symbol)) => Some(OperandNode::Symbol(symbol.clone())),
            Some(_) => {
                return Err(AssembleError::SyntaxError {
                    message: "invalid operand".to_string(),
                    line,
                })
            }
        };
        expect_len(tokens, 1 + operand.iter().count(), line)?;

        function.items.push(CodeItem::Instruction {
            opcode,
            operand,
            line,
        });
        Ok(())
    }
}

pub fn parse(source: &str) -> Result<ProgramNode, AssembleError> {
    let mut state = ParserState {
        program: ProgramNode::default(),
        machine: None,
        function: None,
        data: None,
    };

    for (index, line_text) in source.lines().enumerate() {
        let line = index + 1;
        let tokens = lex_line(line_text, line)?;
        if tokens.is_empty() {
            continue;
        }

        match &tokens[0] {
            Token::Directive(keyword) => {
                let keyword = keyword.clone();
                state.directive(&keyword, &tokens, line)?;
            }
            Token::Label(name) => {
                expect_len(&tokens, 1, line)?;
                if let Some((data, _)) = &mut state.data {
                    data.items.push(DataItem::Label(name.clone()));
                } else if let Some((function, _)) = &mut state.function {
                    function.items.push(CodeItem::Label(name.clone()));
                } else {
                    return Err(AssembleError::SyntaxError {
                        message: "a label belongs inside a function or data block".to_string(),
                        line,
                    });
                }
            }
            Token::Name(_) => {
                if state.data.is_some() {
                    // data blocks hold only numbers and labels
                    return Err(AssembleError::SyntaxError {
                        message: "expected a number or label in the data block".to_string(),
                        line,
                    });
                }
                state.instruction(&tokens, line)?;
            }
            Token::Number(value) => match &mut state.data {
                Some((data, _)) => {
                    expect_len(&tokens, 1, line)?;
                    data.items.push(DataItem::Word(data_word(*value, line)?));
                }
                None => return Err(AssembleError::DataWordOutsideDataBlock { line }),
            },
        }
    }

    if let Some(name) = state.open_block_name() {
        return Err(AssembleError::UnclosedBlock { name });
    }

    Ok(state.program)
}

#[cfg(test)]
mod tests {
    use fluxvm_types::{opcode::Opcode, AssembleError};
    use pretty_assertions::assert_eq;

    use super::parse;
    use crate::ast::{CodeItem, DataItem, OperandNode};

    #[test]
    fn test_parse_machine_with_function() {
        let program = parse(
            r#"
.machine demo locals 2 functions 1
    .local counter 0
    .func main index 0
        PUSH 1
        LSTORE counter
    again:
        JUMP again
        EXIT
    .end
.end
"#,
        )
        .unwrap();

        assert_eq!(program.machines.len(), 1);
        let machine = &program.machines[0];
        assert_eq!(machine.name, "demo");
        assert_eq!(machine.locals, 2);
        assert_eq!(machine.function_count, 1);
        assert_eq!(machine.local_names, vec![("counter".to_string(), 0)]);

        let function = &machine.functions[0];
        assert_eq!(function.index, Some(0));
        assert_eq!(
            function.items[0],
            CodeItem::Instruction {
                opcode: Opcode::push,
                operand: Some(OperandNode::Number(1)),
                line: 5
            }
        );
        assert_eq!(
            function.items[1],
            CodeItem::Instruction {
                opcode: Opcode::lstore,
                operand: Some(OperandNode::Symbol("counter".to_string())),
                line: 6
            }
        );
        assert_eq!(function.items[2], CodeItem::Label("again".to_string()));
    }

    #[test]
    fn test_parse_data_blocks_and_shared() {
        let program = parse(
            r#"
.shared base 0

.shared_data palette
    .word 0x0f0f
    255
table:
    7
.end

.machine demo globals 1 functions 1
    .func main index 0
        EXIT
    .end
.end
"#,
        )
        .unwrap();

        assert_eq!(program.shared_globals[0].name, "base");
        let data = &program.shared_datas[0];
        assert_eq!(data.name, "palette");
        assert_eq!(
            data.items,
            vec![
                DataItem::Word(0x0f0f),
                DataItem::Word(255),
                DataItem::Label("table".to_string()),
                DataItem::Word(7),
            ]
        );
        assert_eq!(data.words(), vec![0x0f0f, 255, 7]);
        assert_eq!(data.labels(), vec![("table".to_string(), 2)]);
        // `globals` keyword accepted as the deprecated alias
        assert_eq!(program.machines[0].locals, 1);
    }

    #[test]
    fn test_shared_after_machine_is_rejected() {
        let result = parse(
            r#"
.machine demo locals 0 functions 1
    .func main index 0
        EXIT
    .end
.end
.shared late 0
"#,
        );
        assert_eq!(result, Err(AssembleError::SharedAfterMachine { line: 7 }));
    }

    #[test]
    fn test_instruction_outside_function_is_rejected() {
        assert_eq!(
            parse("PUSH 1"),
            Err(AssembleError::InstructionOutsideFunction { line: 1 })
        );
    }

    #[test]
    fn test_data_word_outside_data_block_is_rejected() {
        assert_eq!(
            parse(".word 5"),
            Err(AssembleError::DataWordOutsideDataBlock { line: 1 })
        );
    }

    #[test]
    fn test_unclosed_block_is_reported() {
        let result = parse(
            r#"
.machine demo locals 0 functions 1
    .func main index 0
        EXIT
"#,
        );
        assert_eq!(
            result,
            Err(AssembleError::UnclosedBlock {
                name: "main".to_string()
            })
        );
    }

    #[test]
    fn test_oversized_data_word_is_rejected() {
        let result = parse(
            r#"
.shared_data big
    .word 65536
.end
"#,
        );
        assert_eq!(
            result,
            Err(AssembleError::NumericOutOfRange {
                text: "65536".to_string(),
                line: 3
            })
        );
    }
}
