use crate::{MlErr, Result, tensor::Tensor};

/// Defines the strategy for updating model variables based on calculated gradients.
///
/// Stateful optimizers create their per-variable slots the first time `apply_gradients`
/// runs, so a freshly built optimizer holds no state at all.
pub trait Optimizer {
    /// Updates every variable with its gradient.
    ///
    /// # Arguments
    /// * `grads` - One gradient per variable.
    /// * `vars` - The variables to update, in the same order as `grads`.
    ///
    /// # Returns
    /// An error if the amount or the shapes of `grads` and `vars` disagree, in which case
    /// nothing is updated.
    fn apply_gradients(&mut self, grads: &[Tensor], vars: &mut [&mut Tensor]) -> Result<()>;

    /// The amount of `apply_gradients` calls that succeeded so far.
    fn iterations(&self) -> u64;

    /// Whether the optimizer has never been used.
    fn is_pristine(&self) -> bool {
        self.iterations() == 0
    }
}

/// Validates that `grads` and `vars` pair up one to one with equal shapes.
pub(crate) fn check_pairs(grads: &[Tensor], vars: &[&mut Tensor]) -> Result<()> {
    if grads.len() != vars.len() {
        return Err(MlErr::SizeMismatch {
            what: "gradients and variables",
            got: grads.len(),
            expected: vars.len(),
        });
    }

    for (g, v) in grads.iter().zip(vars) {
        if g.shape() != v.shape() {
            return Err(MlErr::ShapeMismatch {
                what: "gradient",
                got: g.shape().to_vec(),
                expected: v.shape().to_vec(),
            });
        }
    }

    Ok(())
}

/// Zeroed slots shaped like `vars`.
pub(crate) fn zeros_like(vars: &[&mut Tensor]) -> Vec<Tensor> {
    vars.iter().map(|v| Tensor::zeros(v.raw_dim())).collect()
}

/// Checks previously created slots still line up with `vars`.
pub(crate) fn check_slots(slots: &[Tensor], vars: &[&mut Tensor]) -> Result<()> {
    if slots.len() != vars.len() {
        return Err(MlErr::SizeMismatch {
            what: "optimizer slots",
            got: vars.len(),
            expected: slots.len(),
        });
    }

    for (s, v) in slots.iter().zip(vars) {
        if s.shape() != v.shape() {
            return Err(MlErr::ShapeMismatch {
                what: "optimizer slot",
                got: v.shape().to_vec(),
                expected: s.shape().to_vec(),
            });
        }
    }

    Ok(())
}
