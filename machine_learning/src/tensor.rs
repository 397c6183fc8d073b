use ndarray::ArrayD;

/// A dense tensor of arbitrary rank.
pub type Tensor = ArrayD<f32>;

/// One named, mutable cell of a network's state.
///
/// Networks expose their variables in a stable order, both the trainable ones
/// (updated by optimizers) and the non-trainable ones (only ever overwritten
/// when loading a snapshot).
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub value: Tensor,
    pub trainable: bool,
}

impl Variable {
    /// Creates a new trainable `Variable`.
    ///
    /// # Arguments
    /// * `name` - A human readable identifier, only used for diagnostics.
    /// * `value` - The initial value.
    ///
    /// # Returns
    /// A new `Variable` instance.
    pub fn new(name: impl Into<String>, value: Tensor) -> Self {
        Self {
            name: name.into(),
            value,
            trainable: true,
        }
    }

    pub fn shape(&self) -> &[usize] {
        self.value.shape()
    }
}
