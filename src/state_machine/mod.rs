// Copyright (c) 2025 - Cowboy AI, Inc.
//! Finite State Machine Abstractions
//!
//! Transitions are pure: `(State, Input) → (State, Output)`. The caller
//! performs the I/O, then feeds the observed fact back in as input, so a
//! state can only advance on something that actually happened.
//!
//! The discovery zone (`crate::discovery`) is the main user: its
//! `AutoPending → AutoResolved` edge fires only once the compute
//! environment's domain has been read back.

use chrono::{DateTime, Utc};

pub type TransitionResult<S> = Result<S, TransitionError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("Invalid transition from {from} on {input}")]
    InvalidTransition { from: String, input: String },

    /// The input was valid for the state but its payload was not
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
}

impl From<TransitionError> for crate::errors::ProvisioningError {
    fn from(err: TransitionError) -> Self {
        crate::errors::ProvisioningError::StateGuardViolation(err.to_string())
    }
}

pub trait StateMachine: Sized + Clone {
    type Input;
    type Output;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)>;

    fn accepts(&self, input: &Self::Input) -> bool {
        self.transition(input).is_ok()
    }

    /// True once no further input can change the state within a run
    fn is_terminal(&self) -> bool {
        false
    }
}

/// One applied transition
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRecord<S, I> {
    pub from: S,
    pub to: S,
    pub input: I,
    pub at: DateTime<Utc>,
}

/// A machine plus the transitions that brought it to its current state
///
/// Rejected inputs leave both the state and the record untouched.
#[derive(Debug, Clone)]
pub struct TrackedMachine<M: StateMachine> {
    state: M,
    record: Vec<TransitionRecord<M, M::Input>>,
}

impl<M: StateMachine> TrackedMachine<M> {
    pub fn new(initial: M) -> Self {
        Self {
            state: initial,
            record: Vec::new(),
        }
    }

    pub fn apply(&mut self, input: M::Input) -> TransitionResult<M::Output> {
        let (to, output) = self.state.transition(&input)?;
        let from = std::mem::replace(&mut self.state, to.clone());
        self.record.push(TransitionRecord {
            from,
            to,
            input,
            at: Utc::now(),
        });
        Ok(output)
    }

    pub fn state(&self) -> &M {
        &self.state
    }

    pub fn record(&self) -> &[TransitionRecord<M, M::Input>] {
        &self.record
    }

    pub fn into_parts(self) -> (M, Vec<TransitionRecord<M, M::Input>>) {
        (self.state, self.record)
    }
}
