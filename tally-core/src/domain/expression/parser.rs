// tally-core/src/domain/expression/parser.rs

// Recursive descent over the token stream. Precedence, loosest first:
//   or  ->  and  ->  not  ->  comparison chain  ->  primary

use crate::domain::expression::ExpressionError;
use crate::domain::expression::ast::{Expr, Literal};
use crate::domain::expression::lexer::{Spanned, Token, tokenize};

pub fn parse(input: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ExpressionError::Syntax {
            offset: 0,
            message: "empty expression".into(),
        });
    }

    let mut parser = Parser {
        tokens,
        position: 0,
        end: input.len(),
    };
    let expr = parser.or_expr()?;

    if let Some(extra) = parser.peek_spanned() {
        return Err(ExpressionError::Syntax {
            offset: extra.offset,
            message: format!("unexpected trailing token {:?}", extra.token),
        });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    position: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position).map(|s| &s.token)
    }

    fn peek_spanned(&self) -> Option<&Spanned> {
        self.tokens.get(self.position)
    }

    fn offset(&self) -> usize {
        self.peek_spanned().map(|s| s.offset).unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).map(|s| s.token.clone());
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn or_expr(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.and_expr()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.not_expr()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, ExpressionError> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let inner = self.not_expr()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ExpressionError> {
        let first = self.primary()?;
        let mut rest = Vec::new();
        while let Some(Token::Compare(op)) = self.peek() {
            let op = *op;
            self.advance();
            rest.push((op, self.primary()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        let offset = self.offset();
        match self.advance() {
            Some(Token::Integer(i)) => Ok(Expr::Literal(Literal::Integer(i))),
            Some(Token::Decimal(d)) => Ok(Expr::Literal(Literal::Decimal(d))),
            Some(Token::Boolean(b)) => Ok(Expr::Literal(Literal::Boolean(b))),
            Some(Token::Identifier(name)) => Ok(Expr::Variable(name)),
            Some(Token::Minus) => match self.advance() {
                Some(Token::Integer(i)) => Ok(Expr::Literal(Literal::Integer(-i))),
                Some(Token::Decimal(d)) => Ok(Expr::Literal(Literal::Decimal(-d))),
                _ => Err(ExpressionError::Syntax {
                    offset,
                    message: "'-' must be followed by a number".into(),
                }),
            },
            Some(Token::LeftParen) => {
                let inner = self.or_expr()?;
                match self.advance() {
                    Some(Token::RightParen) => Ok(inner),
                    _ => Err(ExpressionError::Syntax {
                        offset,
                        message: "unclosed '('".into(),
                    }),
                }
            }
            Some(other) => Err(ExpressionError::Syntax {
                offset,
                message: format!("unexpected token {:?}", other),
            }),
            None => Err(ExpressionError::Syntax {
                offset,
                message: "unexpected end of expression".into(),
            }),
        }
    }
}
