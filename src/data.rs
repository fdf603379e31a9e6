//! Contiguous dataset storage.
//!
//! The training loop works on slices to avoid per-step allocations. [`Inputs`] and
//! [`Dataset`] hold validated, row-major feature/target matrices; mini-batches are
//! either contiguous row ranges (evaluation) or gathered into reusable buffers
//! (shuffled training).

use std::ops::Range;

use crate::{Error, Result};

/// A collection of input samples (X), shape `(len, input_dim)`.
#[derive(Debug, Clone)]
pub struct Inputs {
    values: Vec<f32>,
    len: usize,
    input_dim: usize,
}

impl Inputs {
    /// Build inputs from a flat row-major buffer with shape `(len, input_dim)`.
    pub fn from_flat(values: Vec<f32>, input_dim: usize) -> Result<Self> {
        if input_dim == 0 {
            return Err(Error::InvalidData("input_dim must be > 0".to_owned()));
        }
        if values.len() % input_dim != 0 {
            return Err(Error::InvalidData(format!(
                "inputs length {} is not divisible by input_dim {input_dim}",
                values.len()
            )));
        }

        let len = values.len() / input_dim;
        Ok(Self {
            values,
            len,
            input_dim,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Whole matrix as a flat row-major slice.
    #[inline]
    pub fn as_flat(&self) -> &[f32] {
        &self.values
    }

    /// Returns the `idx`-th row. Panics if `idx >= len`.
    #[inline]
    pub fn row(&self, idx: usize) -> &[f32] {
        let start = idx * self.input_dim;
        &self.values[start..start + self.input_dim]
    }

    /// Returns rows `range` as one contiguous slice. Panics if out of bounds.
    #[inline]
    pub fn rows(&self, range: Range<usize>) -> &[f32] {
        &self.values[range.start * self.input_dim..range.end * self.input_dim]
    }
}

/// A supervised dataset: inputs (X) of shape `(len, input_dim)` and targets (Y) of shape
/// `(len, target_dim)`.
#[derive(Debug, Clone)]
pub struct Dataset {
    inputs: Inputs,
    targets: Vec<f32>,
    target_dim: usize,
}

impl Dataset {
    /// Build a dataset from flat row-major buffers.
    pub fn from_flat(
        inputs: Vec<f32>,
        targets: Vec<f32>,
        input_dim: usize,
        target_dim: usize,
    ) -> Result<Self> {
        Self::new(Inputs::from_flat(inputs, input_dim)?, targets, target_dim)
    }

    /// Pair already-validated inputs with a flat target buffer.
    pub fn new(inputs: Inputs, targets: Vec<f32>, target_dim: usize) -> Result<Self> {
        if target_dim == 0 {
            return Err(Error::InvalidData("target_dim must be > 0".to_owned()));
        }
        if targets.len() != inputs.len() * target_dim {
            return Err(Error::InvalidData(format!(
                "targets length {} does not match len * target_dim ({} * {target_dim})",
                targets.len(),
                inputs.len()
            )));
        }

        Ok(Self {
            inputs,
            targets,
            target_dim,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.inputs.input_dim()
    }

    #[inline]
    pub fn target_dim(&self) -> usize {
        self.target_dim
    }

    #[inline]
    pub fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    /// Returns the `idx`-th input row. Panics if `idx >= len`.
    #[inline]
    pub fn input(&self, idx: usize) -> &[f32] {
        self.inputs.row(idx)
    }

    /// Returns the `idx`-th target row. Panics if `idx >= len`.
    #[inline]
    pub fn target(&self, idx: usize) -> &[f32] {
        let start = idx * self.target_dim;
        &self.targets[start..start + self.target_dim]
    }

    /// Returns target rows `range` as one contiguous slice.
    #[inline]
    pub fn target_rows(&self, range: Range<usize>) -> &[f32] {
        &self.targets[range.start * self.target_dim..range.end * self.target_dim]
    }

    /// Index separating the training rows from the held-out validation rows.
    ///
    /// The training rows are the first `floor(len * (1 - fraction))`, matching Keras; the
    /// validation split is the remaining tail, chosen before any shuffling.
    ///
    /// `fraction` arrives as `f32`, so `len * fraction` is snapped to the nearest integer
    /// when it lies within `f32` rounding of it (`0.2 * 60000` holds out exactly 12000).
    pub fn validation_split_index(&self, fraction: f32) -> Result<usize> {
        if !(fraction.is_finite() && (0.0..1.0).contains(&fraction)) {
            return Err(Error::InvalidConfig(format!(
                "validation_split must be finite and in [0,1), got {fraction}"
            )));
        }
        let len = self.len() as f64;
        let exact = len * f64::from(fraction);
        let nearest = exact.round();
        let held_out = if (exact - nearest).abs() <= len * f64::from(f32::EPSILON) * 0.5 {
            nearest
        } else {
            exact.ceil()
        };
        Ok(self.len() - held_out as usize)
    }

    /// Copy the rows named by `indices` into `inputs_out` / `targets_out`, in order.
    ///
    /// Shape contract:
    /// - `inputs_out.len() >= indices.len() * input_dim`
    /// - `targets_out.len() >= indices.len() * target_dim`
    pub(crate) fn gather(
        &self,
        indices: &[usize],
        inputs_out: &mut [f32],
        targets_out: &mut [f32],
    ) {
        let in_dim = self.input_dim();
        let t_dim = self.target_dim;
        for (slot, &idx) in indices.iter().enumerate() {
            inputs_out[slot * in_dim..(slot + 1) * in_dim].copy_from_slice(self.input(idx));
            targets_out[slot * t_dim..(slot + 1) * t_dim].copy_from_slice(self.target(idx));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy(len: usize) -> Dataset {
        let inputs = (0..len * 2).map(|v| v as f32).collect();
        let targets = (0..len).map(|v| v as f32).collect();
        Dataset::from_flat(inputs, targets, 2, 1).unwrap()
    }

    #[test]
    fn dataset_from_flat_validates_shapes() {
        let ok = Dataset::from_flat(vec![0.0, 1.0, 2.0, 3.0], vec![0.0, 1.0], 2, 1);
        assert!(ok.is_ok());

        let err = Dataset::from_flat(vec![0.0, 1.0, 2.0], vec![0.0], 2, 1);
        assert!(err.is_err());

        let err = Dataset::from_flat(vec![0.0, 1.0], vec![0.0, 1.0], 2, 1);
        assert!(err.is_err());
    }

    #[test]
    fn validation_split_holds_out_the_tail() {
        let data = toy(10);
        assert_eq!(data.validation_split_index(0.2).unwrap(), 8);
        assert_eq!(data.validation_split_index(0.0).unwrap(), 10);
        // floor(10 * 0.75) = 7 training rows, 3 held out.
        assert_eq!(data.validation_split_index(0.25).unwrap(), 7);
        assert_eq!(data.validation_split_index(0.01).unwrap(), 9);
        assert_eq!(toy(3).validation_split_index(0.5).unwrap(), 1);
        assert_eq!(toy(1).validation_split_index(0.2).unwrap(), 0);
        assert!(data.validation_split_index(1.0).is_err());
        assert!(data.validation_split_index(-0.1).is_err());

        assert_eq!(toy(60_000).validation_split_index(0.2).unwrap(), 48_000);
    }

    #[test]
    fn gather_copies_rows_in_index_order() {
        let data = toy(4);
        let mut x = [0.0_f32; 4];
        let mut t = [0.0_f32; 2];
        data.gather(&[3, 1], &mut x, &mut t);
        assert_eq!(x, [6.0, 7.0, 2.0, 3.0]);
        assert_eq!(t, [3.0, 1.0]);
    }

    #[test]
    fn row_ranges_are_contiguous() {
        let data = toy(4);
        assert_eq!(data.inputs().rows(1..3), &[2.0, 3.0, 4.0, 5.0]);
        assert_eq!(data.target_rows(2..4), &[2.0, 3.0]);
    }
}
