// tally-core/src/domain/expression/lexer.rs

use crate::domain::expression::ExpressionError;
use crate::domain::expression::ast::CompareOp;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    Identifier(String),
    Compare(CompareOp),
    And,
    Or,
    Not,
    Minus,
    LeftParen,
    RightParen,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

pub fn tokenize(input: &str) -> Result<Vec<Spanned>, ExpressionError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let token = match c {
            '(' => {
                i += 1;
                Token::LeftParen
            }
            ')' => {
                i += 1;
                Token::RightParen
            }
            '-' => {
                i += 1;
                Token::Minus
            }
            '=' | '!' | '<' | '>' => {
                let next = chars.get(i + 1).map(|(_, n)| *n);
                let (op, width) = match (c, next) {
                    ('=', Some('=')) => (CompareOp::Eq, 2),
                    ('!', Some('=')) => (CompareOp::NotEq, 2),
                    ('<', Some('=')) => (CompareOp::LtEq, 2),
                    ('>', Some('=')) => (CompareOp::GtEq, 2),
                    ('<', _) => (CompareOp::Lt, 1),
                    ('>', _) => (CompareOp::Gt, 1),
                    _ => {
                        return Err(ExpressionError::Syntax {
                            offset,
                            message: format!("unexpected character '{}'", c),
                        });
                    }
                };
                i += width;
                Token::Compare(op)
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                    i += 1;
                }
                // exponent part, e.g. 1e-3
                if i < chars.len() && (chars[i].1 == 'e' || chars[i].1 == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j].1 == '-' || chars[j].1 == '+') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].1.is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].1.is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().map(|(_, ch)| ch).collect();
                number_token(&text, offset)?
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().map(|(_, ch)| ch).collect();
                keyword_or_identifier(word)
            }
            other => {
                return Err(ExpressionError::Syntax {
                    offset,
                    message: format!("unexpected character '{}'", other),
                });
            }
        };

        tokens.push(Spanned { token, offset });
    }

    Ok(tokens)
}

fn number_token(text: &str, offset: usize) -> Result<Token, ExpressionError> {
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Token::Integer(i));
    }
    text.parse::<f64>()
        .map(Token::Decimal)
        .map_err(|_| ExpressionError::Syntax {
            offset,
            message: format!("invalid number '{}'", text),
        })
}

fn keyword_or_identifier(word: String) -> Token {
    match word.as_str() {
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "true" | "True" => Token::Boolean(true),
        "false" | "False" => Token::Boolean(false),
        _ => Token::Identifier(word),
    }
}
