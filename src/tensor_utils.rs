//! Helpers over ordered weight collections, the `Vec<Tensor>` form every round value uses.

use machine_learning::{arch::Network, Tensor, Variable};

use crate::{GanErr, Result};

/// Zeroes every tensor of `structure` if any element of any tensor is NaN or infinite.
///
/// # Returns
/// The (possibly zeroed) structure and whether a non-finite value was found.
pub fn zero_all_if_any_non_finite(structure: Vec<Tensor>) -> (Vec<Tensor>, bool) {
    let any_non_finite = structure
        .iter()
        .any(|t| t.iter().any(|x| !x.is_finite()));

    if !any_non_finite {
        return (structure, false);
    }

    let zeroed = structure
        .iter()
        .map(|t| Tensor::zeros(t.raw_dim()))
        .collect();

    (zeroed, true)
}

/// Fails unless both sequences of shapes have the same length and the same shapes.
pub fn assert_same_structure<'a, 'b, A, B>(what: &'static str, got: A, expected: B) -> Result<()>
where
    A: IntoIterator<Item = &'a [usize]>,
    B: IntoIterator<Item = &'b [usize]>,
{
    let got: Vec<_> = got.into_iter().collect();
    let expected: Vec<_> = expected.into_iter().collect();

    if got.len() != expected.len() {
        return Err(GanErr::StructuralMismatch {
            what,
            detail: format!("got {} tensors, expected {}", got.len(), expected.len()),
        });
    }

    for (i, (g, e)) in got.iter().zip(&expected).enumerate() {
        if g != e {
            return Err(GanErr::StructuralMismatch {
                what,
                detail: format!("tensor {i} has shape {g:?}, expected {e:?}"),
            });
        }
    }

    Ok(())
}

/// Element-wise `a - b`.
pub fn subtract(what: &'static str, a: &[Tensor], b: &[Tensor]) -> Result<Vec<Tensor>> {
    assert_same_structure(what, shapes(a), shapes(b))?;
    Ok(a.iter().zip(b).map(|(a, b)| a - b).collect())
}

/// Copies out the current value of every variable of `network`, in order.
pub fn weights<N: Network + ?Sized>(network: &N) -> Vec<Tensor> {
    network.weights().iter().map(|v| v.value.clone()).collect()
}

/// Overwrites every variable of `network` with the tensor at the same position.
///
/// Nothing is written unless the whole structure matches.
pub fn assign_weights<N: Network + ?Sized>(
    what: &'static str,
    network: &mut N,
    values: &[Tensor],
) -> Result<()> {
    assert_same_structure(
        what,
        shapes(values),
        network.weights().iter().map(Variable::shape),
    )?;

    for (var, value) in network.weights_mut().iter_mut().zip(values) {
        var.value.assign(value);
    }

    Ok(())
}

pub(crate) fn shapes<'a>(tensors: &'a [Tensor]) -> impl Iterator<Item = &'a [usize]> + 'a {
    tensors.iter().map(|t| t.shape())
}

#[cfg(test)]
mod tests {
    use machine_learning::arch::{layers::Dense, Sequential};
    use ndarray::{array, ArrayD, IxDyn};

    use super::*;

    fn structure() -> Vec<Tensor> {
        vec![
            ArrayD::from_elem(IxDyn(&[4, 4]), 0.5),
            array![1., -2., 3., 4.].into_dyn(),
        ]
    }

    #[test]
    fn finite_structures_are_untouched() {
        let (out, any_non_finite) = zero_all_if_any_non_finite(structure());
        assert!(!any_non_finite);
        assert_eq!(out, structure());
    }

    #[test]
    fn a_single_nan_zeroes_everything() {
        let mut input = structure();
        input[1].as_slice_mut().unwrap()[2] = f32::NAN;

        let (out, any_non_finite) = zero_all_if_any_non_finite(input);

        assert!(any_non_finite);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], Tensor::zeros(vec![4, 4]));
        assert_eq!(out[1], Tensor::zeros(vec![4]));
    }

    #[test]
    fn infinities_are_non_finite() {
        for value in [f32::INFINITY, f32::NEG_INFINITY] {
            let mut input = structure();
            input[0].as_slice_mut().unwrap()[13] = value;

            let (out, any_non_finite) = zero_all_if_any_non_finite(input);
            assert!(any_non_finite);
            assert!(out.iter().all(|t| t.iter().all(|&x| x == 0.)));
        }
    }

    #[test]
    fn empty_structure() {
        let (out, any_non_finite) = zero_all_if_any_non_finite(vec![]);
        assert!(out.is_empty());
        assert!(!any_non_finite);
    }

    #[test]
    fn subtract_checks_structure() {
        let a = structure();
        let b = vec![Tensor::zeros(vec![4, 4])];
        assert!(matches!(
            subtract("delta", &a, &b),
            Err(GanErr::StructuralMismatch { what: "delta", .. })
        ));

        let delta = subtract("delta", &a, &a).unwrap();
        assert!(delta.iter().all(|t| t.iter().all(|&x| x == 0.)));
    }

    #[test]
    fn assign_then_snapshot() {
        let mut model = Sequential::new([Dense::new((4, 4), None)]).unwrap();
        assign_weights("model", &mut model, &structure()).unwrap();
        assert_eq!(weights(&model), structure());
    }

    #[test]
    fn failed_assign_leaves_the_model_untouched() {
        let mut model = Sequential::new([Dense::new((4, 4), None)]).unwrap();
        let values = vec![Tensor::ones(vec![4, 4]), Tensor::ones(vec![3])];

        let err = assign_weights("model", &mut model, &values);

        assert!(matches!(err, Err(GanErr::StructuralMismatch { .. })));
        assert!(weights(&model).iter().all(|t| t.iter().all(|&x| x == 0.)));
    }
}
