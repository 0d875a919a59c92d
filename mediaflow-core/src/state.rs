//! Lifecycle shared by the N:M stages: decoder, filterer and encoder.

use std::fmt;

use crate::error::{Error, Result};

/// Where an N:M stage is in its lifecycle.
///
/// `Ready -> Active -> Draining -> Terminal`. `Draining` is only observable
/// if a flush was interrupted; the stage then stays unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Constructed or reset; nothing buffered.
    Ready,
    /// Accepting input; may hold buffered output.
    Active,
    /// Flush in progress.
    Draining,
    /// Flushed; rejects further input.
    Terminal,
}

impl StageState {
    /// Fail unless input may still be submitted.
    pub fn check_accepting(self, stage: &str, op: &str) -> Result<()> {
        match self {
            StageState::Ready | StageState::Active => Ok(()),
            StageState::Draining => Err(Error::sequence(format!(
                "{}: {} called while a flush is pending",
                stage, op
            ))),
            StageState::Terminal => Err(Error::sequence(format!(
                "{}: {} called after flush",
                stage, op
            ))),
        }
    }

    pub fn is_terminal(self) -> bool {
        self == StageState::Terminal
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageState::Ready => write!(f, "ready"),
            StageState::Active => write!(f, "active"),
            StageState::Draining => write!(f, "draining"),
            StageState::Terminal => write!(f, "terminal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_accepting() {
        assert!(StageState::Ready.check_accepting("decoder", "decode").is_ok());
        assert!(StageState::Active.check_accepting("decoder", "decode").is_ok());
        let err = StageState::Terminal
            .check_accepting("decoder", "flush")
            .unwrap_err();
        assert!(err.is_sequence_violation());
        assert!(err.to_string().contains("after flush"));
        assert!(StageState::Draining
            .check_accepting("encoder", "encode")
            .is_err());
    }
}
