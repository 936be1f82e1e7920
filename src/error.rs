use std::error::Error;
use std::fmt::Display;

#[derive(Debug)]
pub enum FitError {
    UnknownTheory(String),
    UnknownBackground(String),
    ShapeMismatch { expected: usize, found: usize },
    SolverFailure(String),
    InvalidConfiguration(String),
    /// Degenerate input (e.g. zero-length data) yields an empty parameter
    /// list rather than a hard failure.
    DegenerateData,
}

impl Display for FitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitError::UnknownTheory(name) => write!(f, "no peak theory registered under '{name}'"),
            FitError::UnknownBackground(name) => {
                write!(f, "no background registered under '{name}'")
            }
            FitError::ShapeMismatch { expected, found } => write!(
                f,
                "data arrays must have matching length, expected {expected} but found {found}"
            ),
            FitError::SolverFailure(msg) => write!(f, "solver failed to converge: {msg}"),
            FitError::InvalidConfiguration(msg) => write!(f, "invalid configuration: {msg}"),
            FitError::DegenerateData => write!(f, "no data to fit"),
        }
    }
}

impl Error for FitError {}
