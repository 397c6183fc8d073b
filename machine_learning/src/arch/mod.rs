pub mod activations;
pub mod layers;
pub mod loss;
mod network;
mod sequential;

pub use network::{Backward, Network};
pub use sequential::Sequential;
