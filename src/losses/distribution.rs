use burn::tensor::{backend::Backend, Tensor};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

use crate::utils::{softplus, sorted_quantile, weighted_average};
use crate::windows::{from_vec, to_vec};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distribution {
    Normal,
}

/// Negative log-likelihood of a parametric predictive distribution. The
/// model emits raw parameters in normalized space; they are mapped back to
/// the original scale before the likelihood is evaluated.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DistributionLoss {
    pub distribution: Distribution,
    /// Sample quantiles reported next to the sample mean at prediction.
    pub quantiles: Vec<f32>,
}

#[derive(Clone, Debug)]
pub struct DistributionArgs<B: Backend> {
    pub loc: Tensor<B, 3>,   // [N, H, 1]
    pub scale: Tensor<B, 3>, // [N, H, 1]
}

impl DistributionLoss {
    pub fn normal(quantiles: Vec<f32>) -> Self {
        Self {
            distribution: Distribution::Normal,
            quantiles,
        }
    }

    /// Number of raw parameters the model emits per horizon step.
    pub fn outputs_size(&self) -> usize {
        match self.distribution {
            Distribution::Normal => 2,
        }
    }

    pub fn output_names(&self) -> Vec<String> {
        std::iter::once("mean".to_string())
            .chain(self.quantiles.iter().map(|q| format!("q{q}")))
            .collect()
    }

    pub fn scale_decouple<B: Backend>(
        &self,
        output: Tensor<B, 3>, // [N, H, 2]
        loc: Tensor<B, 3>,    // [N, 1, 1]
        scale: Tensor<B, 3>,  // [N, 1, 1]
    ) -> DistributionArgs<B> {
        let [n, h, _] = output.dims();
        let mu = output.clone().slice([0..n, 0..h, 0..1]);
        let sigma = softplus(output.slice([0..n, 0..h, 1..2]));

        DistributionArgs {
            loc: loc + scale.clone() * mu,
            scale: (sigma * scale).clamp_min(1e-6),
        }
    }

    pub fn loss<B: Backend>(
        &self,
        y: Tensor<B, 2>, // [N, H], original scale
        args: &DistributionArgs<B>,
        mask: Tensor<B, 2>,
    ) -> Tensor<B, 1> {
        let loc: Tensor<B, 2> = args.loc.clone().squeeze(2);
        let scale: Tensor<B, 2> = args.scale.clone().squeeze(2);

        let z = (y - loc) / scale.clone();
        let nll = scale.log() + z.clone() * z * 0.5 + 0.5 * (2.0 * PI).ln();

        weighted_average(nll, mask)
    }

    /// Draws `num_samples` paths per window and horizon step. Returns the
    /// samples `[N, H, S]` and the point forecast `[N, H, 1 + Q]`: the sample
    /// mean followed by the configured sample quantiles.
    pub fn sample<B: Backend>(
        &self,
        args: &DistributionArgs<B>,
        num_samples: usize,
        rng: &mut StdRng,
    ) -> (Tensor<B, 3>, Tensor<B, 3>) {
        let [n, h, _] = args.loc.dims();
        let device = args.loc.device();
        let locs = to_vec(args.loc.clone());
        let scales = to_vec(args.scale.clone());
        let num_samples = num_samples.max(1);
        let n_outputs = 1 + self.quantiles.len();

        let mut samples = Vec::with_capacity(n * h * num_samples);
        let mut point = Vec::with_capacity(n * h * n_outputs);

        for (loc, scale) in locs.iter().zip(scales.iter()) {
            let mut draws: Vec<f32> = (0..num_samples)
                .map(|_| {
                    let z: f32 = rng.sample(StandardNormal);
                    loc + scale * z
                })
                .collect();
            samples.extend_from_slice(&draws);

            point.push(draws.iter().sum::<f32>() / num_samples as f32);
            draws.sort_by(|a, b| a.total_cmp(b));
            point.extend(self.quantiles.iter().map(|q| sorted_quantile(&draws, *q)));
        }

        (
            from_vec(samples, [n, h, num_samples], &device),
            from_vec(point, [n, h, n_outputs], &device),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{values, TestBackend};
    use approx::assert_relative_eq;
    use rand::SeedableRng;

    fn args(loc: f32, scale: f32) -> DistributionArgs<TestBackend> {
        DistributionArgs {
            loc: Tensor::from_floats([[[loc], [loc]]]),
            scale: Tensor::from_floats([[[scale], [scale]]]),
        }
    }

    #[test]
    fn scale_decouple_maps_to_original_scale() {
        let loss = DistributionLoss::normal(vec![]);
        // softplus(0.5413) ~= 1
        let output = Tensor::<TestBackend, 3>::from_floats([[[1.0, 0.5413]]]);
        let loc = Tensor::<TestBackend, 3>::from_floats([[[10.0]]]);
        let scale = Tensor::<TestBackend, 3>::from_floats([[[2.0]]]);

        let args = loss.scale_decouple(output, loc, scale);

        assert_relative_eq!(values(args.loc)[0], 12.0);
        assert_relative_eq!(values(args.scale)[0], 2.0, epsilon = 1e-3);
    }

    #[test]
    fn likelihood_is_best_at_the_mean() {
        let loss = DistributionLoss::normal(vec![]);
        let mask = Tensor::<TestBackend, 2>::ones([1, 2]);

        let at_mean = loss.loss(Tensor::from_floats([[3.0, 3.0]]), &args(3.0, 1.0), mask.clone());
        let off_mean = loss.loss(Tensor::from_floats([[5.0, 5.0]]), &args(3.0, 1.0), mask);

        assert_relative_eq!(values(at_mean.clone())[0], 0.5 * (2.0 * PI).ln(), epsilon = 1e-5);
        assert!(values(off_mean)[0] > values(at_mean)[0]);
    }

    #[test]
    fn sampling_is_seeded_and_summarised() {
        let loss = DistributionLoss::normal(vec![0.1, 0.9]);

        let (samples, point) = loss.sample(&args(5.0, 0.5), 500, &mut StdRng::seed_from_u64(11));
        let (again, _) = loss.sample(&args(5.0, 0.5), 500, &mut StdRng::seed_from_u64(11));

        assert_eq!(samples.dims(), [1, 2, 500]);
        assert_eq!(point.dims(), [1, 2, 3]);
        assert_eq!(values(samples), values(again));

        let point = values(point);
        assert_relative_eq!(point[0], 5.0, epsilon = 0.1);
        assert!(point[1] < point[0] && point[0] < point[2]);
    }

    #[test]
    fn output_names_list_mean_and_quantiles() {
        let loss = DistributionLoss::normal(vec![0.1, 0.9]);
        assert_eq!(loss.output_names(), vec!["mean", "q0.1", "q0.9"]);
        assert_eq!(loss.outputs_size(), 2);
    }
}
