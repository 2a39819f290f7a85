use thiserror::Error;
use xfn_core::XfnError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The function kept asking for new resources past the round cap.
    #[error("function {function} did not settle its requirements within {rounds} rounds")]
    NonConvergence { function: String, rounds: u32 },
    #[error(transparent)]
    Xfn(#[from] XfnError),
}

pub type EngineResult<T> = Result<T, EngineError>;
