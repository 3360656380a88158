pub mod distribution;
pub mod point;

use serde::{Deserialize, Serialize};

pub use distribution::{Distribution, DistributionArgs, DistributionLoss};
pub use point::PointLoss;

/// Training objective, chosen when the forecaster is configured.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ForecastLoss {
    Point(PointLoss),
    Distribution(DistributionLoss),
}

impl Default for ForecastLoss {
    fn default() -> Self {
        ForecastLoss::Point(PointLoss::Mae)
    }
}

impl ForecastLoss {
    pub fn is_distribution_output(&self) -> bool {
        matches!(self, ForecastLoss::Distribution(_))
    }

    /// Size of the last axis of the model output.
    pub fn outputs_size(&self) -> usize {
        match self {
            ForecastLoss::Point(loss) => loss.outputs_size(),
            ForecastLoss::Distribution(loss) => loss.outputs_size(),
        }
    }

    /// Names of the last axis of predictions.
    pub fn output_names(&self) -> Vec<String> {
        match self {
            ForecastLoss::Point(loss) => loss.output_names(),
            ForecastLoss::Distribution(loss) => loss.output_names(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_report_their_outputs() {
        let point = ForecastLoss::default();
        let distribution = ForecastLoss::Distribution(DistributionLoss::normal(vec![0.5]));

        assert!(!point.is_distribution_output());
        assert_eq!(point.outputs_size(), 1);
        assert!(distribution.is_distribution_output());
        assert_eq!(distribution.outputs_size(), 2);
        assert_eq!(distribution.output_names(), vec!["mean", "q0.5"]);
    }
}
