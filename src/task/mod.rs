//! Task and round lifecycle management.
//!
//! A task is one web artifact. Round one builds it from a brief; each later
//! round revises it under a caller-supplied nonce. Every round moves through
//! `PENDING`, `GENERATING`, `GENERATED`, `PUBLISHING` and `PUBLISHED` before an
//! external checker's verdict marks it `EVALUATED`; dispatcher failures end
//! in `FAILED`. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
