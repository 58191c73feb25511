// tally-core/src/error.rs

use crate::domain::error::DomainError;
use crate::infrastructure::error::InfrastructureError;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum TallyError {
    // --- DOMAIN (binding, specification, sql metric results) ---
    #[error(transparent)]
    #[diagnostic(transparent)]
    Domain(#[from] DomainError),

    // --- INFRASTRUCTURE (IO, YAML, DuckDB) ---
    #[error(transparent)]
    #[diagnostic(transparent)]
    Infrastructure(#[from] InfrastructureError),
}

// Manual implementation to avoid duplicate enum variant but keep ergonomics
impl From<std::io::Error> for TallyError {
    fn from(err: std::io::Error) -> Self {
        TallyError::Infrastructure(InfrastructureError::Io(err))
    }
}

impl From<duckdb::Error> for TallyError {
    fn from(err: duckdb::Error) -> Self {
        TallyError::Infrastructure(InfrastructureError::from(err))
    }
}
