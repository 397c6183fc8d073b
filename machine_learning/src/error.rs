use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug, Clone, PartialEq)]
pub enum MlErr {
    ShapeMismatch {
        what: &'static str,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    BackwardBeforeForward,
    InvalidDistribution(String),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MlErr::ShapeMismatch {
                what,
                got,
                expected,
            } => format!("There's a shape mismatch in {what}, got {got:?} and expected {expected:?}"),
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => {
                format!("There's a size mismatch in {what}, got {got} and expected {expected}")
            }
            MlErr::BackwardBeforeForward => {
                "Tried to run a backward pass without a previous forward pass".to_string()
            }
            MlErr::InvalidDistribution(msg) => {
                format!("Failed to build a parameter distribution: {msg}")
            }
        };

        write!(f, "{s}")
    }
}

impl Error for MlErr {}

impl From<rand_distr::NormalError> for MlErr {
    fn from(value: rand_distr::NormalError) -> Self {
        Self::InvalidDistribution(value.to_string())
    }
}

impl From<rand_distr::uniform::Error> for MlErr {
    fn from(value: rand_distr::uniform::Error) -> Self {
        Self::InvalidDistribution(value.to_string())
    }
}
