use ndarray::IxDyn;
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::{Normal, Uniform};

use crate::{MlErr, Result, tensor::Tensor};

/// Generates values for the initial state of a model's parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamGen {
    Const { value: f32 },
    Uniform { low: f32, high: f32 },
    Normal { mean: f32, std_dev: f32 },
    XavierUniform,
    Kaiming,
}

impl ParamGen {
    /// Samples a tensor of the given shape.
    ///
    /// The fan in and fan out are taken from the first and last axes of `shape`.
    ///
    /// # Arguments
    /// * `shape` - The shape of the generated tensor.
    /// * `rng` - A random number generator.
    ///
    /// # Returns
    /// The sampled tensor or an error if the distribution is invalid.
    pub fn sample<R: Rng>(&self, shape: &[usize], rng: &mut R) -> Result<Tensor> {
        let dim = IxDyn(shape);
        let fan_in = shape.first().copied().unwrap_or(1).max(1) as f32;
        let fan_out = shape.last().copied().unwrap_or(1).max(1) as f32;

        let tensor = match *self {
            ParamGen::Const { value } => Tensor::from_elem(dim, value),
            ParamGen::Uniform { low, high } => uniform(dim, low, high, rng)?,
            ParamGen::Normal { mean, std_dev } => normal(dim, mean, std_dev, rng)?,
            ParamGen::XavierUniform => {
                let range = (6. / (fan_in + fan_out)).sqrt();
                uniform(dim, -range, range, rng)?
            }
            ParamGen::Kaiming => normal(dim, 0., (2. / fan_in).sqrt(), rng)?,
        };

        Ok(tensor)
    }
}

fn uniform<R: Rng>(dim: IxDyn, low: f32, high: f32, rng: &mut R) -> Result<Tensor> {
    Ok(Tensor::random_using(dim, Uniform::new(low, high)?, rng))
}

fn normal<R: Rng>(dim: IxDyn, mean: f32, std_dev: f32, rng: &mut R) -> Result<Tensor> {
    if !std_dev.is_finite() || std_dev < 0. {
        return Err(MlErr::InvalidDistribution(format!(
            "standard deviation must be a non-negative number, got {std_dev}"
        )));
    }

    Ok(Tensor::random_using(dim, Normal::new(mean, std_dev)?, rng))
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn constant() {
        let mut rng = StdRng::seed_from_u64(42);
        let tensor = ParamGen::Const { value: 0.5 }
            .sample(&[2, 2], &mut rng)
            .unwrap();
        assert!(tensor.iter().all(|&x| x == 0.5));
    }

    #[test]
    fn xavier_uniform_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(42);
        let tensor = ParamGen::XavierUniform.sample(&[4, 2], &mut rng).unwrap();
        let range = (6f32 / 6.).sqrt();

        assert_eq!(tensor.shape(), &[4, 2]);
        assert!(tensor.iter().all(|x| x.abs() <= range));
    }

    #[test]
    fn seeded_sampling_is_deterministic() {
        let a = ParamGen::Kaiming
            .sample(&[3, 3], &mut StdRng::seed_from_u64(1))
            .unwrap();
        let b = ParamGen::Kaiming
            .sample(&[3, 3], &mut StdRng::seed_from_u64(1))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_range() {
        let mut rng = StdRng::seed_from_u64(42);
        let err = ParamGen::Uniform { low: 1., high: 0. }.sample(&[1], &mut rng);
        assert!(matches!(err, Err(MlErr::InvalidDistribution(_))));
    }

    #[test]
    fn negative_std_dev() {
        let mut rng = StdRng::seed_from_u64(42);
        let err = ParamGen::Normal {
            mean: 0.,
            std_dev: -1.,
        }
        .sample(&[1], &mut rng);
        assert!(matches!(err, Err(MlErr::InvalidDistribution(_))));
    }

    #[test]
    fn kaiming_scales_with_fan_in() {
        let mut rng = StdRng::seed_from_u64(3);
        let tensor = ParamGen::Kaiming.sample(&[800, 1], &mut rng).unwrap();

        let rms = (tensor.iter().map(|x| x * x).sum::<f32>() / tensor.len() as f32).sqrt();
        assert!((rms - 0.05).abs() < 0.01);
    }
}
