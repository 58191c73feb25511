pub mod error;
pub mod expression;
pub mod scan;

// Re-exports pratiques pour simplifier les imports ailleurs
pub use error::DomainError;
