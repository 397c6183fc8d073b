pub mod arch;
pub mod error;
pub mod initialization;
pub mod optimization;
pub mod tensor;

pub use error::{MlErr, Result};
pub use tensor::{Tensor, Variable};
