use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

use crate::utils::{quantile_loss, weighted_average};

/// Losses evaluated directly on the normalized point forecast.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum PointLoss {
    Mae,
    Mse,
    /// Multi-quantile pinball loss, one output per quantile.
    Quantile { quantiles: Vec<f32> },
}

impl PointLoss {
    pub fn outputs_size(&self) -> usize {
        match self {
            PointLoss::Mae | PointLoss::Mse => 1,
            PointLoss::Quantile { quantiles } => quantiles.len(),
        }
    }

    pub fn output_names(&self) -> Vec<String> {
        match self {
            PointLoss::Mae | PointLoss::Mse => vec!["y_hat".to_string()],
            PointLoss::Quantile { quantiles } => quantiles.iter().map(|q| format!("q{q}")).collect(),
        }
    }

    pub fn loss<B: Backend>(
        &self,
        y: Tensor<B, 2>,     // [N, H]
        y_hat: Tensor<B, 3>, // [N, H, K]
        mask: Tensor<B, 2>,  // [N, H]
    ) -> Tensor<B, 1> {
        match self {
            PointLoss::Mae => {
                let y_hat: Tensor<B, 2> = y_hat.squeeze(2);
                weighted_average((y - y_hat).abs(), mask)
            }
            PointLoss::Mse => {
                let y_hat: Tensor<B, 2> = y_hat.squeeze(2);
                let residual = y - y_hat;
                weighted_average(residual.clone() * residual, mask)
            }
            PointLoss::Quantile { quantiles } => {
                weighted_average(quantile_loss(y, y_hat, quantiles), mask)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{values, TestBackend};
    use approx::assert_relative_eq;

    #[test]
    fn mae_and_mse_respect_the_mask() {
        let y = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0, 3.0]]);
        let y_hat = Tensor::<TestBackend, 3>::from_floats([[[2.0], [4.0], [100.0]]]);
        let mask = Tensor::<TestBackend, 2>::from_floats([[1.0, 1.0, 0.0]]);

        let mae = PointLoss::Mae.loss(y.clone(), y_hat.clone(), mask.clone());
        let mse = PointLoss::Mse.loss(y, y_hat, mask);

        assert_relative_eq!(values(mae)[0], 1.5);
        assert_relative_eq!(values(mse)[0], 2.5);
    }

    #[test]
    fn quantile_outputs_follow_quantiles() {
        let loss = PointLoss::Quantile {
            quantiles: vec![0.1, 0.5, 0.9],
        };

        assert_eq!(loss.outputs_size(), 3);
        assert_eq!(loss.output_names(), vec!["q0.1", "q0.5", "q0.9"]);

        let y = Tensor::<TestBackend, 2>::from_floats([[1.0]]);
        let y_hat = Tensor::<TestBackend, 3>::from_floats([[[1.0, 1.0, 1.0]]]);
        let mask = Tensor::<TestBackend, 2>::from_floats([[1.0]]);
        assert_relative_eq!(values(loss.loss(y, y_hat, mask))[0], 0.0);
    }
}
