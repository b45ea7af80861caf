use std::fmt;

use thiserror::Error;

use crate::floating_type_mod::FT;

/** The unknown an implicit per-particle solve was determining when it failed. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveTarget {
    SmoothingLength,
    Adiabat,
}

impl fmt::Display for SolveTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveTarget::SmoothingLength => write!(f, "smoothing length"),
            SolveTarget::Adiabat => write!(f, "adiabat"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SphError {
    /// Malformed construction arguments, raised before any computation starts.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// `iterations == 0` means no bracket enclosing a root could be established.
    #[error(
        "{target} solve for particle {index} did not converge after {iterations} iterations \
         (last estimate {last_estimate}, relative residual {residual})"
    )]
    Convergence {
        target: SolveTarget,
        index: usize,
        last_estimate: FT,
        residual: FT,
        iterations: usize,
    },

    /// A kernel produced a negative or non-finite value.
    #[error("Kernel returned {value} for particle {index} and neighbor {neighbor} (r={r}, h={h})")]
    Domain {
        index: usize,
        neighbor: usize,
        r: FT,
        h: FT,
        value: FT,
    },

    #[error("Parameter file error: {0}")]
    Config(#[from] serde_yaml::Error),
}

pub type SphResult<T> = Result<T, SphError>;

impl SphError {
    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        SphError::InvalidInput(message.into())
    }
}
