//! Pagewright: brief-to-web-artifact round orchestration.
//!
//! A caller submits a natural-language brief; pagewright hands it to a
//! generation collaborator, publishes the resulting source bundle as a live
//! artifact, and reconciles verdicts reported by an external checker.
//! Later briefs revise the same artifact in numbered rounds.
//!
//! # Architecture
//!
//! Pagewright follows hexagonal architecture principles:
//!
//! - **Domain**: tasks, rounds and their state machine
//! - **Ports**: storage and collaborator contracts
//! - **Adapters**: in-memory and HTTP implementations of the ports
//! - **Services**: the round controller, dedup filter, dispatchers and
//!   evaluation reconciler
//!
//! # Modules
//!
//! - [`task`]: task and round lifecycle
//! - [`http`]: `axum` facade
//! - [`config`]: environment configuration
//! - [`observability`]: logging setup

pub mod config;
pub mod http;
pub mod observability;
pub mod task;
