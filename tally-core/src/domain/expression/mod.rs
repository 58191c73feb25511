// tally-core/src/domain/expression/mod.rs

// Restricted test-expression language: numeric/boolean literals, variables,
// comparisons and `and` / `or` / `not`.

pub mod ast;
pub mod interpreter;
pub mod lexer;
pub mod parser;

use miette::Diagnostic;
use thiserror::Error;

pub use ast::Expr;
pub use interpreter::evaluate;
pub use parser::parse;

#[derive(Error, Debug, Clone, PartialEq, Diagnostic)]
pub enum ExpressionError {
    #[error("Syntax error at offset {offset}: {message}")]
    #[diagnostic(code(tally::expression::syntax))]
    Syntax { offset: usize, message: String },

    #[error("Unknown variable '{0}'")]
    #[diagnostic(
        code(tally::expression::unknown_variable),
        help("Only metrics measured for this column (or the table) can be referenced.")
    )]
    UnknownVariable(String),

    #[error("Value of '{0}' is undefined")]
    #[diagnostic(code(tally::expression::undefined))]
    UndefinedValue(String),

    #[error("Type mismatch: {0}")]
    #[diagnostic(code(tally::expression::type_mismatch))]
    TypeMismatch(String),

    #[error("Expression evaluates to {0}, not a boolean")]
    #[diagnostic(code(tally::expression::not_boolean))]
    NotBoolean(&'static str),
}

/// Parses `expression` and returns the variables it references.
pub fn referenced_variables(expression: &str) -> Result<Vec<String>, ExpressionError> {
    parse(expression).map(|expr| expr.variables())
}
