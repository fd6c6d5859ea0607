// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

// token types:
//
// - directive: '.' + keyword, e.g. `.machine`, `.func`, `.end`
//   (the keyword is stored lower-cased, without the dot)
// - label: identifier + ':', e.g. `loop:`
// - name: /a-zA-Z_/ + /a-zA-Z0-9_/*, a mnemonic, keyword or symbol
// - number: decimal or 0x-prefixed hex, e.g. `211`, `0x1f`
// - comment: from ';' to the end of the line

use fluxvm_types::AssembleError;

#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Directive(String),
    Label(String),
    Name(String),
    Number(u32),
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

pub fn lex_number(text: &str, line: usize) -> Result<u32, AssembleError> {
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        text.parse::<u32>()
    };
    parsed.map_err(|_| AssembleError::NumericOutOfRange {
        text: text.to_string(),
        line,
    })
}

/// tokenizes one source line; the comment part is discarded
pub fn lex_line(line_text: &str, line: usize) -> Result<Vec<Token>, AssembleError> {
    let code = match line_text.find(';') {
        Some(position) => &line_text[..position],
        None => line_text,
    };

    let mut tokens = Vec::new();
    for word in code.split_whitespace() {
        if let Some(keyword) = word.strip_prefix('.') {
            if !is_identifier(keyword) {
                return Err(AssembleError::SyntaxError {
                    message: format!("invalid directive \"{}\"", word),
                    line,
                });
            }
            tokens.push(Token::Directive(keyword.to_lowercase()));
        } else if let Some(name) = word.strip_suffix(':') {
            if !is_identifier(name) {
                return Err(AssembleError::SyntaxError {
                    message: format!("invalid label \"{}\"", word),
                    line,
                });
            }
            tokens.push(Token::Label(name.to_string()));
        } else if word.starts_with(|ch: char| ch.is_ascii_digit()) {
            tokens.push(Token::Number(lex_number(word, line)?));
        } else if is_identifier(word) {
            tokens.push(Token::Name(word.to_string()));
        } else {
            return Err(AssembleError::SyntaxError {
                message: format!("unexpected token \"{}\"", word),
                line,
            });
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use fluxvm_types::AssembleError;
    use pretty_assertions::assert_eq;

    use super::{lex_line, Token};

    #[test]
    fn test_lex_directive_line() {
        assert_eq!(
            lex_line(".machine pulse locals 5 functions 3", 1).unwrap(),
            vec![
                Token::Directive("machine".to_string()),
                Token::Name("pulse".to_string()),
                Token::Name("locals".to_string()),
                Token::Number(5),
                Token::Name("functions".to_string()),
                Token::Number(3),
            ]
        );
    }

    #[test]
    fn test_lex_numbers_and_comments() {
        assert_eq!(
            lex_line("PUSH 0x1F ; the immediate", 3).unwrap(),
            vec![Token::Name("PUSH".to_string()), Token::Number(0x1f)]
        );
        assert_eq!(lex_line("; only a comment", 4).unwrap(), vec![]);
        assert_eq!(lex_line("", 5).unwrap(), vec![]);
    }

    #[test]
    fn test_lex_label() {
        assert_eq!(
            lex_line("again:", 2).unwrap(),
            vec![Token::Label("again".to_string())]
        );
    }

    #[test]
    fn test_lex_rejects_oversized_numbers() {
        assert_eq!(
            lex_line("PUSH 99999999999", 7),
            Err(AssembleError::NumericOutOfRange {
                text: "99999999999".to_string(),
                line: 7
            })
        );
    }

    #[test]
    fn test_lex_rejects_bad_tokens() {
        assert!(matches!(
            lex_line("PUSH @foo", 2),
            Err(AssembleError::SyntaxError { line: 2, .. })
        ));
        assert!(matches!(
            lex_line(".:", 2),
            Err(AssembleError::SyntaxError { line: 2, .. })
        ));
    }
}
