// tally-core/src/lib.rs

// 1. Mandatory documentation for production code
#![allow(missing_docs)]

// 2. Memory safety
#![deny(unsafe_code)]
// 3. Robustness
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
// 4. Performance
#![warn(clippy::perf)]

// --- MODULES HEXAGONAUX ---

// 1. Ports (Interfaces / Traits)
// SQL dialect and warehouse contracts.
pub mod ports;

// 2. Domain
// Metric registry, scan specification, measurements, test expressions.
// Depends on nothing else in the crate.
pub mod domain;

// 3. Infrastructure (Adapters)
// Scan/warehouse config files, DuckDB, atomic writes.
pub mod infrastructure;

// 4. Application (Use Cases)
// Query building, reduction, evaluation, scan orchestration.
pub mod application;

// --- GESTION DES ERREURS GLOBALE ---
pub mod error;

// --- RE-EXPORTS (FACADE) ---
pub use error::TallyError;
