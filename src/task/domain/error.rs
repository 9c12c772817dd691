//! Error types for task domain validation and round state transitions.

use super::{RoundNumber, RoundState, TaskId};
use thiserror::Error;

/// Errors returned while constructing domain values or mutating a task.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// The caller identity is not a usable email address.
    #[error("invalid identity '{0}', expected an email address")]
    InvalidIdentity(String),

    /// The template kind is malformed or not offered by the catalog.
    #[error("unknown task template '{0}'")]
    InvalidTemplate(String),

    /// The task identifier is malformed.
    #[error("invalid task identifier '{0}'")]
    InvalidTaskId(String),

    /// The nonce is empty or too long.
    #[error("invalid nonce '{0}'")]
    InvalidNonce(String),

    /// The brief is empty after trimming.
    #[error("brief must not be empty")]
    EmptyBrief,

    /// Round numbers start at one.
    #[error("round numbers start at 1, got {0}")]
    ZeroRound(u32),

    /// The requested round number breaks contiguity.
    #[error("task {task_id} cannot open round {requested}: expected round {expected}")]
    InvalidRoundNumber {
        /// Task identifier.
        task_id: TaskId,
        /// Round number the caller asked for.
        requested: RoundNumber,
        /// Round number that would be accepted.
        expected: RoundNumber,
    },

    /// The round already exists and the nonce does not match its request.
    #[error("round {round} of task {task_id} already exists")]
    RoundAlreadyExists {
        /// Task identifier.
        task_id: TaskId,
        /// Existing round number.
        round: RoundNumber,
    },

    /// The nonce was already used with a different brief or checks.
    #[error("nonce already used for a different request on round {round} of task {task_id}")]
    DuplicateNonce {
        /// Task identifier.
        task_id: TaskId,
        /// Round number the nonce is bound to.
        round: RoundNumber,
    },

    /// The round does not exist on the task.
    #[error("task {task_id} has no round {round}")]
    UnknownRound {
        /// Task identifier.
        task_id: TaskId,
        /// Missing round number.
        round: RoundNumber,
    },

    /// The round has not been published yet, so it cannot be evaluated.
    #[error("round {round} of task {task_id} is {state}, not published")]
    RoundNotPublished {
        /// Task identifier.
        task_id: TaskId,
        /// Round number.
        round: RoundNumber,
        /// Current round state.
        state: RoundState,
    },

    /// Compare-and-set failed because the round moved on.
    #[error("round {round} of task {task_id} is {actual}, expected {expected}")]
    StaleState {
        /// Task identifier.
        task_id: TaskId,
        /// Round number.
        round: RoundNumber,
        /// State the caller expected.
        expected: RoundState,
        /// State actually stored.
        actual: RoundState,
    },

    /// The state machine does not permit the transition.
    #[error("invalid transition for round {round} of task {task_id}: {from} -> {to}")]
    InvalidTransition {
        /// Task identifier.
        task_id: TaskId,
        /// Round number.
        round: RoundNumber,
        /// Source state.
        from: RoundState,
        /// Requested target state.
        to: RoundState,
    },

    /// The evaluation correlation token does not match the issued one.
    #[error("correlation token mismatch for round {round} of task {task_id}")]
    CorrelationMismatch {
        /// Task identifier.
        task_id: TaskId,
        /// Round number.
        round: RoundNumber,
    },
}

impl TaskDomainError {
    /// Returns `true` for compare-and-set guard failures that an optimistic
    /// retry may resolve.
    #[must_use]
    pub const fn is_concurrency_guard(&self) -> bool {
        matches!(self, Self::StaleState { .. } | Self::InvalidTransition { .. })
    }

    /// Returns the task the error refers to, when known.
    #[must_use]
    pub const fn task_id(&self) -> Option<&TaskId> {
        match self {
            Self::InvalidRoundNumber { task_id, .. }
            | Self::RoundAlreadyExists { task_id, .. }
            | Self::DuplicateNonce { task_id, .. }
            | Self::UnknownRound { task_id, .. }
            | Self::RoundNotPublished { task_id, .. }
            | Self::StaleState { task_id, .. }
            | Self::InvalidTransition { task_id, .. }
            | Self::CorrelationMismatch { task_id, .. } => Some(task_id),
            _ => None,
        }
    }

    /// Returns the round the error refers to, when known.
    #[must_use]
    pub const fn round(&self) -> Option<RoundNumber> {
        match self {
            Self::InvalidRoundNumber {
                requested: round, ..
            }
            | Self::RoundAlreadyExists { round, .. }
            | Self::DuplicateNonce { round, .. }
            | Self::UnknownRound { round, .. }
            | Self::RoundNotPublished { round, .. }
            | Self::StaleState { round, .. }
            | Self::InvalidTransition { round, .. }
            | Self::CorrelationMismatch { round, .. } => Some(*round),
            _ => None,
        }
    }
}

/// Error returned while parsing round states from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown round state: {0}")]
pub struct ParseRoundStateError(pub String);

/// Error returned while parsing an evaluation verdict.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown verdict: {0}")]
pub struct ParseVerdictError(pub String);
