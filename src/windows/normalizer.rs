use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::extractor::WindowBatch;
use super::{from_vec, to_vec};
use crate::data::columns::{ColumnIndex, MASK_COL, TARGET_COL};
use crate::error::{ForecastError, Result};
use crate::utils::median;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalerType {
    Identity,
    /// Mean and standard deviation.
    Standard,
    /// Median and median absolute deviation.
    Robust,
    /// Maps the lag range to [0, 1].
    MinMax,
    /// Maps the lag range to [-1, 1].
    MinMax1,
}

impl FromStr for ScalerType {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "identity" => Ok(ScalerType::Identity),
            "standard" => Ok(ScalerType::Standard),
            "robust" => Ok(ScalerType::Robust),
            "minmax" => Ok(ScalerType::MinMax),
            "minmax1" => Ok(ScalerType::MinMax1),
            other => Err(ForecastError::InvalidConfig(format!("unknown scaler {other}"))),
        }
    }
}

/// Per window, per channel affine statistics of one step.
#[derive(Clone, Debug)]
pub struct ScalerState<B: Backend> {
    pub shift: Tensor<B, 3>, // [W, 1, C]
    pub scale: Tensor<B, 3>, // [W, 1, C]
}

#[derive(Clone, Debug)]
pub struct Denormalized<B: Backend, const D: usize> {
    pub values: Tensor<B, D>,
    pub shift: Tensor<B, D>,
    pub scale: Tensor<B, D>,
}

impl<B: Backend> ScalerState<B> {
    /// Maps `[W, H, K]` predictions of the target back to the original
    /// scale. The target's statistics are repeated across the K outputs.
    pub fn denormalize(
        &self,
        prediction: Tensor<B, 3>,
        temporal_cols: &ColumnIndex,
    ) -> Result<Denormalized<B, 3>> {
        let y_idx = temporal_cols.get_loc(TARGET_COL)?;
        let [n_windows, _, n_outputs] = prediction.dims();
        let [expected, _, _] = self.shift.dims();
        if n_windows != expected {
            return Err(ForecastError::ShapeMismatch {
                expected,
                got: n_windows,
            });
        }

        let shift = self
            .shift
            .clone()
            .slice([0..n_windows, 0..1, y_idx..y_idx + 1])
            .repeat(2, n_outputs);
        let scale = self
            .scale
            .clone()
            .slice([0..n_windows, 0..1, y_idx..y_idx + 1])
            .repeat(2, n_outputs);
        let values = shift.clone() + scale.clone() * prediction;

        Ok(Denormalized { values, shift, scale })
    }

    /// Same as [`denormalize`](Self::denormalize) for `[W, H]` predictions.
    pub fn denormalize_2d(
        &self,
        prediction: Tensor<B, 2>,
        temporal_cols: &ColumnIndex,
    ) -> Result<Denormalized<B, 2>> {
        let out = self.denormalize(prediction.unsqueeze_dim(2), temporal_cols)?;

        Ok(Denormalized {
            values: out.values.squeeze(2),
            shift: out.shift.squeeze(2),
            scale: out.scale.squeeze(2),
        })
    }
}

/// Normalizes each window with statistics from its lag region only.
#[derive(Clone, Debug)]
pub struct TemporalNormalizer {
    scaler_type: ScalerType,
    input_size: usize,
    eps: f32,
}

impl TemporalNormalizer {
    pub fn new(scaler_type: ScalerType, input_size: usize, eps: f32) -> Self {
        Self {
            scaler_type,
            input_size,
            eps,
        }
    }

    pub fn normalize<B: Backend>(
        &self,
        windows: WindowBatch<B>,
    ) -> Result<(WindowBatch<B>, ScalerState<B>)> {
        let [n_windows, window_size, n_cols] = windows.temporal.dims();
        let mask_idx = windows.temporal_cols.get_loc(MASK_COL)?;
        if self.input_size >= window_size {
            return Err(ForecastError::ShapeMismatch {
                expected: self.input_size + 1,
                got: window_size,
            });
        }
        let device = windows.temporal.device();

        // Statistics only ever see the lag region, never the horizon.
        let lag = windows
            .temporal
            .clone()
            .slice([0..n_windows, 0..self.input_size, 0..n_cols]);
        let lag_mask = lag
            .clone()
            .slice([0..n_windows, 0..self.input_size, mask_idx..mask_idx + 1])
            .repeat(2, n_cols);
        let unobserved = lag_mask.clone().equal_elem(0.0);
        let lag = lag.mask_fill(unobserved.clone(), 0.0);
        let count = lag_mask.clone().sum_dim(1); // [W, 1, C]

        let (shift, scale) = match self.scaler_type {
            ScalerType::Identity => (
                Tensor::zeros([n_windows, 1, n_cols]).to_device(&device),
                Tensor::ones([n_windows, 1, n_cols]).to_device(&device),
            ),
            ScalerType::Standard => {
                let denom = count.clamp_min(1.0);
                let mean = (lag.clone() * lag_mask.clone()).sum_dim(1) / denom.clone();
                let centered = (lag - mean.clone()) * lag_mask;
                let variance = (centered.clone() * centered).sum_dim(1) / denom;

                (mean, variance.sqrt())
            }
            ScalerType::MinMax | ScalerType::MinMax1 => {
                let empty = count.equal_elem(0.0);
                let max = lag
                    .clone()
                    .mask_fill(unobserved.clone(), f32::MIN)
                    .max_dim(1)
                    .mask_fill(empty.clone(), 1.0);
                let min = lag
                    .mask_fill(unobserved, f32::MAX)
                    .min_dim(1)
                    .mask_fill(empty, 0.0);

                if self.scaler_type == ScalerType::MinMax {
                    (min.clone(), max - min)
                } else {
                    ((max.clone() + min.clone()) / 2.0, (max - min) / 2.0)
                }
            }
            ScalerType::Robust => {
                let (shift, scale) = robust_statistics(
                    &to_vec(lag),
                    &to_vec(lag_mask),
                    [n_windows, self.input_size, n_cols],
                );
                (
                    from_vec(shift, [n_windows, 1, n_cols], &device),
                    from_vec(scale, [n_windows, 1, n_cols], &device),
                )
            }
        };

        // The mask channel passes through untouched.
        let mut is_mask = vec![0.0; n_cols];
        is_mask[mask_idx] = 1.0;
        let is_mask: Tensor<B, 3> = from_vec(is_mask, [1, 1, n_cols], &device);
        let keep = is_mask.clone().neg() + 1.0;

        let shift = shift * keep.clone();
        let scale = scale.clamp_min(self.eps) * keep + is_mask;

        let temporal = (windows.temporal.clone() - shift.clone()) / scale.clone();
        let state = ScalerState { shift, scale };

        Ok((WindowBatch { temporal, ..windows }, state))
    }
}

/// Masked median and median absolute deviation per window and channel of
/// a `[W, L, C]` row major buffer. Channels without observations get (0, 1).
fn robust_statistics(values: &[f32], mask: &[f32], dims: [usize; 3]) -> (Vec<f32>, Vec<f32>) {
    let [n_windows, n_time, n_cols] = dims;
    let mut shift = Vec::with_capacity(n_windows * n_cols);
    let mut scale = Vec::with_capacity(n_windows * n_cols);

    for window in 0..n_windows {
        for col in 0..n_cols {
            let mut observed: Vec<f32> = (0..n_time)
                .map(|t| (window * n_time + t) * n_cols + col)
                .filter(|idx| mask[*idx] > 0.0)
                .map(|idx| values[idx])
                .collect();

            if observed.is_empty() {
                shift.push(0.0);
                scale.push(1.0);
                continue;
            }

            let center = median(&mut observed);
            let mut deviations: Vec<f32> = observed.iter().map(|v| (v - center).abs()).collect();
            shift.push(center);
            scale.push(median(&mut deviations));
        }
    }

    (shift, scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{values, TestBackend};
    use approx::assert_relative_eq;

    const EPS: f32 = 1e-6;

    fn windows(y: &[Vec<f32>], mask: &[Vec<f32>]) -> WindowBatch<TestBackend> {
        let n = y.len();
        let w = y[0].len();
        let values: Vec<f32> = y
            .iter()
            .zip(mask.iter())
            .flat_map(|(y, m)| y.iter().zip(m.iter()).flat_map(|(a, b)| [*a, *b]))
            .collect();

        WindowBatch {
            temporal: from_vec(values, [n, w, 2], &Default::default()),
            temporal_cols: ColumnIndex::new(&[TARGET_COL, MASK_COL]).unwrap(),
            statics: None,
            static_cols: None,
            window_ids: (0..n).collect(),
            windows_per_series: n,
        }
    }

    fn channel(batch: &WindowBatch<TestBackend>, col: usize) -> Vec<f32> {
        let [n, w, _] = batch.temporal.dims();
        values(batch.temporal.clone().slice([0..n, 0..w, col..col + 1]))
    }

    #[test]
    fn identity_is_a_no_op() {
        let batch = windows(&[vec![1.0, 2.0, 3.0, 4.0, 5.0]], &[vec![1.0; 5]]);
        let normalizer = TemporalNormalizer::new(ScalerType::Identity, 3, EPS);

        let (normalized, state) = normalizer.normalize(batch.clone()).unwrap();

        assert_eq!(values(state.shift.clone()), vec![0.0, 0.0]);
        assert_eq!(values(state.scale.clone()), vec![1.0, 1.0]);
        assert_eq!(values(normalized.temporal), values(batch.temporal.clone()));

        let prediction = Tensor::<TestBackend, 3>::from_floats([[[4.0], [5.0]]]);
        let out = state.denormalize(prediction, &batch.temporal_cols).unwrap();
        assert_eq!(values(out.values), vec![4.0, 5.0]);
    }

    #[test]
    fn constant_lag_is_floored() {
        let batch = windows(&[vec![5.0, 5.0, 5.0, 9.0, 9.0]], &[vec![1.0; 5]]);
        let normalizer = TemporalNormalizer::new(ScalerType::Standard, 3, EPS);

        let (_, state) = normalizer.normalize(batch).unwrap();

        let shift = values(state.shift);
        let scale = values(state.scale);
        assert_relative_eq!(shift[0], 5.0);
        assert_relative_eq!(scale[0], EPS);
        assert!(scale.iter().all(|s| s.is_finite() && *s >= EPS));
    }

    #[test]
    fn statistics_ignore_the_horizon() {
        let normalizer = TemporalNormalizer::new(ScalerType::Standard, 3, EPS);
        let calm = windows(&[vec![1.0, 2.0, 3.0, 4.0, 5.0]], &[vec![1.0; 5]]);
        let wild = windows(&[vec![1.0, 2.0, 3.0, 400.0, -500.0]], &[vec![1.0; 5]]);

        let (_, calm) = normalizer.normalize(calm).unwrap();
        let (_, wild) = normalizer.normalize(wild).unwrap();

        assert_eq!(values(calm.shift), values(wild.shift));
        assert_eq!(values(calm.scale), values(wild.scale));
    }

    #[test]
    fn statistics_skip_unavailable_lag_steps() {
        let batch = windows(
            &[vec![100.0, 2.0, 4.0, 0.0, 0.0]],
            &[vec![0.0, 1.0, 1.0, 1.0, 1.0]],
        );
        let normalizer = TemporalNormalizer::new(ScalerType::Standard, 3, EPS);

        let (_, state) = normalizer.normalize(batch).unwrap();

        let shift = values(state.shift);
        let scale = values(state.scale);
        assert_relative_eq!(shift[0], 3.0);
        assert_relative_eq!(scale[0], 1.0);
    }

    #[test]
    fn mask_channel_passes_through() {
        let mask = vec![0.0, 1.0, 1.0, 1.0, 0.0];
        let batch = windows(&[vec![3.0, 6.0, 9.0, 1.0, 1.0]], &[mask.clone()]);
        let normalizer = TemporalNormalizer::new(ScalerType::Standard, 3, EPS);

        let (normalized, state) = normalizer.normalize(batch).unwrap();

        assert_eq!(channel(&normalized, 1), mask);
        assert_eq!(values(state.shift)[1], 0.0);
        assert_eq!(values(state.scale)[1], 1.0);
    }

    #[test]
    fn round_trip_recovers_values() {
        let y = vec![
            vec![1.0, 4.0, 2.0, 8.0, 5.0],
            vec![-3.0, 10.0, 7.0, 7.5, 0.25],
        ];
        let batch = windows(&y, &[vec![1.0; 5], vec![1.0; 5]]);

        for scaler in [
            ScalerType::Standard,
            ScalerType::Robust,
            ScalerType::MinMax,
            ScalerType::MinMax1,
        ] {
            let normalizer = TemporalNormalizer::new(scaler, 3, EPS);
            let (normalized, state) = normalizer.normalize(batch.clone()).unwrap();

            let scaled_y: Tensor<TestBackend, 2> = normalized
                .temporal
                .clone()
                .slice([0..2, 0..5, 0..1])
                .squeeze(2);
            let restored = state.denormalize_2d(scaled_y, &normalized.temporal_cols).unwrap();

            let expected: Vec<f32> = y.iter().flatten().copied().collect();
            for (got, want) in values(restored.values).iter().zip(expected.iter()) {
                assert_relative_eq!(got, want, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn minmax_maps_lag_to_unit_range() {
        let batch = windows(&[vec![2.0, 6.0, 4.0, 10.0, 0.0]], &[vec![1.0; 5]]);

        let (normalized, _) = TemporalNormalizer::new(ScalerType::MinMax, 3, EPS)
            .normalize(batch.clone())
            .unwrap();
        let y = channel(&normalized, 0);
        assert_eq!(&y[..3], &[0.0, 1.0, 0.5]);
        assert_eq!(&y[3..], &[2.0, -0.5]);

        let (normalized, _) = TemporalNormalizer::new(ScalerType::MinMax1, 3, EPS)
            .normalize(batch)
            .unwrap();
        assert_eq!(&channel(&normalized, 0)[..3], &[-1.0, 1.0, 0.0]);
    }

    #[test]
    fn robust_uses_median_and_mad() {
        let batch = windows(&[vec![1.0, 2.0, 3.0, 4.0, 100.0, 0.0]], &[vec![1.0; 6]]);

        let (_, state) = TemporalNormalizer::new(ScalerType::Robust, 5, EPS)
            .normalize(batch)
            .unwrap();

        // median 3, absolute deviations [2, 1, 0, 1, 97] -> MAD 1
        assert_eq!(values(state.shift)[0], 3.0);
        assert_eq!(values(state.scale)[0], 1.0);
    }

    #[test]
    fn denormalize_repeats_target_statistics_per_output() {
        let batch = windows(&[vec![1.0, 2.0, 3.0, 4.0, 5.0]], &[vec![1.0; 5]]);
        let (normalized, state) = TemporalNormalizer::new(ScalerType::Standard, 3, EPS)
            .normalize(batch)
            .unwrap();

        let prediction = Tensor::<TestBackend, 3>::zeros([1, 2, 3]);
        let out = state.denormalize(prediction, &normalized.temporal_cols).unwrap();

        assert_eq!(out.shift.dims(), [1, 1, 3]);
        assert_eq!(out.scale.dims(), [1, 1, 3]);
        let shift = values(out.shift);
        assert!(shift.iter().all(|s| *s == shift[0]));
        assert_relative_eq!(shift[0], 2.0);
        assert_eq!(values(out.values), vec![2.0; 6]);
    }

    #[test]
    fn denormalize_checks_window_count() {
        let batch = windows(&[vec![1.0, 2.0, 3.0, 4.0, 5.0]], &[vec![1.0; 5]]);
        let (normalized, state) = TemporalNormalizer::new(ScalerType::Standard, 3, EPS)
            .normalize(batch)
            .unwrap();

        let prediction = Tensor::<TestBackend, 3>::zeros([2, 2, 1]);
        assert!(state.denormalize(prediction, &normalized.temporal_cols).is_err());
    }

    #[test]
    fn parses_scaler_names() {
        assert_eq!("robust".parse::<ScalerType>().unwrap(), ScalerType::Robust);
        assert!("revin".parse::<ScalerType>().is_err());
    }
}
