use burn::tensor::{backend::Backend, Tensor};
use rand::rngs::StdRng;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::data::batch::Batch;
use crate::data::columns::{ColumnIndex, MASK_COL, TARGET_COL};
use crate::error::{ForecastError, Result};
use crate::losses::{DistributionLoss, ForecastLoss};
use crate::models::ForecastingModel;
use crate::windows::{
    ParsedWindow, ScalerState, TemporalNormalizer, WindowExtractor, WindowMode, WindowParser,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastStep {
    Train,
    Validate,
    Predict,
    Decompose,
}

impl FromStr for ForecastStep {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(ForecastStep::Train),
            "val" | "validate" | "validation" => Ok(ForecastStep::Validate),
            "predict" => Ok(ForecastStep::Predict),
            "decompose" => Ok(ForecastStep::Decompose),
            other => Err(ForecastError::UnknownStep(other.to_string())),
        }
    }
}

impl fmt::Display for ForecastStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ForecastStep::Train => "train",
            ForecastStep::Validate => "validate",
            ForecastStep::Predict => "predict",
            ForecastStep::Decompose => "decompose",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum StepOutput<B: Backend> {
    Loss(Tensor<B, 1>),
    /// Validation was requested without a validation holdout.
    NoValidation,
    Forecast(Tensor<B, 3>),   // [W, H, K]
    Components(Tensor<B, 4>), // [W, components, H, K]
}

struct Prepared<B: Backend> {
    parsed: ParsedWindow<B>,
    scaler: ScalerState<B>,
    temporal_cols: ColumnIndex,
}

/// Runs one step: windows, normalization, parsing, the model and then
/// either the loss or the inverse transform of the output.
#[derive(Clone, Debug)]
pub struct StepOrchestrator {
    extractor: WindowExtractor,
    normalizer: TemporalNormalizer,
    parser: WindowParser,
    loss: ForecastLoss,
    num_samples: usize,
}

impl StepOrchestrator {
    pub fn new(
        extractor: WindowExtractor,
        normalizer: TemporalNormalizer,
        parser: WindowParser,
        loss: ForecastLoss,
    ) -> Self {
        Self {
            extractor,
            normalizer,
            parser,
            loss,
            num_samples: 500,
        }
    }

    pub fn with_num_samples(mut self, num_samples: usize) -> Self {
        self.num_samples = num_samples.max(1);
        self
    }

    pub fn extractor_mut(&mut self) -> &mut WindowExtractor {
        &mut self.extractor
    }

    pub fn run<B: Backend, M: ForecastingModel<B>>(
        &self,
        step: ForecastStep,
        model: &M,
        batch: &Batch<B>,
        rng: &mut StdRng,
    ) -> Result<StepOutput<B>> {
        match step {
            ForecastStep::Train => self.train_step(model, batch, rng).map(StepOutput::Loss),
            ForecastStep::Validate => Ok(match self.validation_step(model, batch, rng)? {
                Some(loss) => StepOutput::Loss(loss),
                None => StepOutput::NoValidation,
            }),
            ForecastStep::Predict => self.predict_step(model, batch, rng).map(StepOutput::Forecast),
            ForecastStep::Decompose => self
                .decompose_step(model, batch, rng)
                .map(StepOutput::Components),
        }
    }

    pub fn train_step<B: Backend, M: ForecastingModel<B>>(
        &self,
        model: &M,
        batch: &Batch<B>,
        rng: &mut StdRng,
    ) -> Result<Tensor<B, 1>> {
        let prepared = self.prepare(batch, WindowMode::Train, rng)?;
        self.evaluate(model, prepared)
    }

    /// `None` when no validation holdout is configured.
    pub fn validation_step<B: Backend, M: ForecastingModel<B>>(
        &self,
        model: &M,
        batch: &Batch<B>,
        rng: &mut StdRng,
    ) -> Result<Option<Tensor<B, 1>>> {
        if self.extractor.val_size() == 0 {
            return Ok(None);
        }
        let prepared = self.prepare(batch, WindowMode::Validation, rng)?;
        self.evaluate(model, prepared).map(Some)
    }

    /// Forecasts on the original scale, `[W, H, K]`. Distribution losses
    /// return the sample mean followed by the sample quantiles.
    pub fn predict_step<B: Backend, M: ForecastingModel<B>>(
        &self,
        model: &M,
        batch: &Batch<B>,
        rng: &mut StdRng,
    ) -> Result<Tensor<B, 3>> {
        let prepared = self.prepare(batch, WindowMode::Predict, rng)?;
        let output = model.forward(&prepared.parsed);

        match &self.loss {
            ForecastLoss::Point(_) => Ok(prepared
                .scaler
                .denormalize(output, &prepared.temporal_cols)?
                .values),
            ForecastLoss::Distribution(loss) => {
                let [n_windows, h, _] = output.dims();
                let first = output.clone().slice([0..n_windows, 0..h, 0..1]);
                let denorm = prepared.scaler.denormalize(first, &prepared.temporal_cols)?;
                let args = loss.scale_decouple(output, denorm.shift, denorm.scale);
                let (_, point) = loss.sample(&args, self.num_samples, rng);

                Ok(point)
            }
        }
    }

    /// Per-component forecasts on the original scale. The shift is carried
    /// by the first component so the components add up to the forecast.
    pub fn decompose_step<B: Backend, M: ForecastingModel<B>>(
        &self,
        model: &M,
        batch: &Batch<B>,
        rng: &mut StdRng,
    ) -> Result<Tensor<B, 4>> {
        if self.loss.is_distribution_output() {
            return Err(ForecastError::InvalidConfig(
                "decomposition requires a point loss".to_string(),
            ));
        }
        let prepared = self.prepare(batch, WindowMode::Predict, rng)?;
        let components = model.decompose(&prepared.parsed);
        let [n_windows, n_components, h, n_outputs] = components.dims();

        let forecast: Tensor<B, 3> = components.clone().sum_dim(1).squeeze(1);
        let denorm = prepared.scaler.denormalize(forecast, &prepared.temporal_cols)?;
        let shift: Tensor<B, 4> = denorm.shift.unsqueeze_dim(1); // [W, 1, 1, K]
        let scale: Tensor<B, 4> = denorm.scale.unsqueeze_dim(1);

        let shift = if n_components > 1 {
            let rest: Tensor<B, 4> = Tensor::zeros([n_windows, n_components - 1, 1, n_outputs])
                .to_device(&shift.device());
            Tensor::cat(vec![shift, rest], 1)
        } else {
            shift
        };
        debug!(n_windows, n_components, h, "decomposed forecast");

        Ok(shift + scale * components)
    }

    fn prepare<B: Backend>(
        &self,
        batch: &Batch<B>,
        mode: WindowMode,
        rng: &mut StdRng,
    ) -> Result<Prepared<B>> {
        let windows = self.extractor.create_windows(batch, mode, rng)?;
        let (windows, scaler) = self.normalizer.normalize(windows)?;
        let parsed = self.parser.parse(&windows, mode)?;
        debug!(%mode, n_windows = parsed.n_windows(), "prepared windows");

        Ok(Prepared {
            parsed,
            scaler,
            temporal_cols: windows.temporal_cols,
        })
    }

    fn evaluate<B: Backend, M: ForecastingModel<B>>(
        &self,
        model: &M,
        prepared: Prepared<B>,
    ) -> Result<Tensor<B, 1>> {
        let output = model.forward(&prepared.parsed);
        let missing = |col: &str| ForecastError::MissingColumn(col.to_string());
        let y = prepared.parsed.outsample_y.ok_or_else(|| missing(TARGET_COL))?;
        let mask = prepared
            .parsed
            .outsample_mask
            .ok_or_else(|| missing(MASK_COL))?;

        match &self.loss {
            ForecastLoss::Point(loss) => Ok(loss.loss(y, output, mask)),
            ForecastLoss::Distribution(loss) => {
                distribution_loss(loss, output, y, mask, &prepared.scaler, &prepared.temporal_cols)
            }
        }
    }
}

/// Likelihood of the target on its original scale; the window statistics
/// become the location and scale of the predictive distribution.
fn distribution_loss<B: Backend>(
    loss: &DistributionLoss,
    output: Tensor<B, 3>,
    y: Tensor<B, 2>,
    mask: Tensor<B, 2>,
    scaler: &ScalerState<B>,
    temporal_cols: &ColumnIndex,
) -> Result<Tensor<B, 1>> {
    let denorm = scaler.denormalize_2d(y, temporal_cols)?;
    let loc: Tensor<B, 3> = denorm.shift.unsqueeze_dim(2); // [W, 1, 1]
    let scale: Tensor<B, 3> = denorm.scale.unsqueeze_dim(2);
    let args = loss.scale_decouple(output, loc, scale);

    Ok(loss.loss(denorm.values, &args, mask))
}
