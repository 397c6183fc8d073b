mod gan_loss;
mod wasserstein;

pub use gan_loss::{Evaluation, GanLossFns};
pub use wasserstein::WassersteinGanLossFns;
