use burn::config::Config;
use burn::module::{AutodiffModule, Module};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use tracing::{info, warn};

use super::step::StepOrchestrator;
use crate::data::dataset::{LongRow, TimeSeriesDataset};
use crate::data::module::TimeSeriesDataModule;
use crate::error::{ForecastError, Result as ForecastResult};
use crate::losses::ForecastLoss;
use crate::models::{ForecastingModel, GatedMlpConfig};
use crate::windows::{to_vec, ScalerType, TemporalNormalizer, WindowExtractor, WindowParser};

const CONFIG_FILE: &str = "config.json";
const MODEL_FILE: &str = "model";

#[derive(Config, Debug)]
pub struct ForecasterConfig {
    pub h: usize,
    pub input_size: usize,

    /// Stride between training and validation windows.
    #[config(default = 1)]
    pub step_size: usize,

    #[config(default = "ScalerType::Identity")]
    pub scaler_type: ScalerType,

    #[config(default = 1e-6)]
    pub scaler_eps: f32,

    /// Windows sampled per training step, all surviving windows if unset.
    #[config(default = "None")]
    pub windows_batch_size: Option<usize>,

    #[config(default = "Vec::new()")]
    pub hist_exog_list: Vec<String>,

    #[config(default = "Vec::new()")]
    pub futr_exog_list: Vec<String>,

    #[config(default = "Vec::new()")]
    pub stat_exog_list: Vec<String>,

    #[config(default = "ForecastLoss::default()")]
    pub loss: ForecastLoss,

    #[config(default = 1000)]
    pub max_steps: usize,

    #[config(default = 1e-3)]
    pub learning_rate: f64,

    #[config(default = 100)]
    pub val_check_steps: usize,

    /// Series per batch.
    #[config(default = 32)]
    pub batch_size: usize,

    #[config(default = 0)]
    pub num_workers: usize,

    #[config(default = false)]
    pub drop_last: bool,

    #[config(default = 500)]
    pub num_samples: usize,

    #[config(default = 1)]
    pub seed: u64,
}

impl ForecasterConfig {
    /// Reference model sized for this configuration's inputs and loss.
    pub fn gated_mlp(&self) -> GatedMlpConfig {
        GatedMlpConfig::new(self.input_size, self.h)
            .with_n_outputs(self.loss.outputs_size())
            .with_hist_exog_size(self.hist_exog_list.len())
            .with_futr_exog_size(self.futr_exog_list.len())
            .with_stat_exog_size(self.stat_exog_list.len())
    }

    fn orchestrator(&self) -> ForecastResult<StepOrchestrator> {
        let extractor = WindowExtractor::new(self.input_size, self.h, self.step_size)?
            .with_windows_batch_size(self.windows_batch_size)
            .with_futr_exog(!self.futr_exog_list.is_empty());
        let normalizer = TemporalNormalizer::new(self.scaler_type, self.input_size, self.scaler_eps);
        let parser = WindowParser::new(self.input_size, self.h).with_exogenous(
            self.hist_exog_list.clone(),
            self.futr_exog_list.clone(),
            self.stat_exog_list.clone(),
        );

        Ok(StepOrchestrator::new(extractor, normalizer, parser, self.loss.clone())
            .with_num_samples(self.num_samples))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitReport {
    pub train_losses: Vec<f32>,
    /// `(step, mean validation loss)` for every validation check.
    pub valid_losses: Vec<(usize, f32)>,
}

#[derive(Debug, Clone)]
pub struct Forecast<B: Backend> {
    pub values: Tensor<B, 3>, // [W, H, K], series major
    pub output_names: Vec<String>,
    /// Series of every window.
    pub unique_ids: Vec<String>,
    /// Timestamp of the last lag step of every window, `None` when it falls
    /// on padding.
    pub cutoffs: Vec<Option<i64>>,
}

/// Owns a model with its configuration and random source, and drives the
/// step orchestrator over whole datasets.
pub struct Forecaster<B: Backend, M> {
    config: ForecasterConfig,
    model: M,
    device: B::Device,
    rng: StdRng,
    steps: StepOrchestrator,
}

impl<B, M> Forecaster<B, M>
where
    B: Backend,
    M: Module<B> + ForecastingModel<B>,
{
    /// Seeds the backend before `init` so parameter initialization is
    /// reproducible.
    pub fn new<F>(config: ForecasterConfig, device: B::Device, init: F) -> ForecastResult<Self>
    where
        F: FnOnce(&ForecasterConfig) -> M,
    {
        B::seed(config.seed);
        let steps = config.orchestrator()?;
        let model = init(&config).to_device(&device);

        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            model,
            device,
            steps,
        })
    }

    pub fn config(&self) -> &ForecasterConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn predict(
        &mut self,
        dataset: &TimeSeriesDataset,
        test_size: usize,
        step_size: usize,
    ) -> ForecastResult<Forecast<B>> {
        self.steps.extractor_mut().set_holdout(0, test_size);
        self.steps.extractor_mut().set_predict_step_size(step_size)?;
        let data = self.data_module::<B>(dataset);

        let mut outputs = Vec::new();
        for batch in data.predict_loader().iter() {
            outputs.push(self.steps.predict_step(&self.model, &batch, &mut self.rng)?);
        }
        if outputs.is_empty() {
            return Err(ForecastError::NoWindowsAvailable);
        }

        let values = Tensor::cat(outputs, 0);
        let (unique_ids, cutoffs) =
            self.window_index(dataset, values.dims()[0], test_size, step_size);

        Ok(Forecast {
            values,
            output_names: self.config.loss.output_names(),
            unique_ids,
            cutoffs,
        })
    }

    /// One forecast per series over the `h` future rows, using their
    /// future exogenous values. Every series needs exactly `h` rows, all
    /// after its last observation.
    pub fn predict_with_future<S: AsRef<str>>(
        &mut self,
        dataset: &TimeSeriesDataset,
        future: &[LongRow],
        future_cols: &[S],
    ) -> ForecastResult<Forecast<B>> {
        let h = self.config.h;
        let updated = dataset.update_with_horizon(future, future_cols, h)?;

        self.predict(&updated, h, h)
    }

    /// `[W, components, H, K]` on the original scale.
    pub fn decompose(&mut self, dataset: &TimeSeriesDataset, step_size: usize) -> ForecastResult<Tensor<B, 4>> {
        self.steps.extractor_mut().set_holdout(0, 0);
        self.steps.extractor_mut().set_predict_step_size(step_size)?;
        let data = self.data_module::<B>(dataset);

        let mut outputs = Vec::new();
        for batch in data.predict_loader().iter() {
            outputs.push(self.steps.decompose_step(&self.model, &batch, &mut self.rng)?);
        }
        if outputs.is_empty() {
            return Err(ForecastError::NoWindowsAvailable);
        }

        Ok(Tensor::cat(outputs, 0))
    }

    /// Writes `config.json` and the model record into `dir`.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> ForecastResult<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        self.config.save(dir.join(CONFIG_FILE))?;
        self.model.clone().save_file(
            dir.join(MODEL_FILE),
            &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
        )?;
        info!(path = %dir.display(), "saved forecaster");

        Ok(())
    }

    /// Rebuilds the model with `init` from the stored configuration, then
    /// loads the stored parameters into it.
    pub fn load<P, F>(dir: P, device: B::Device, init: F) -> ForecastResult<Self>
    where
        P: AsRef<Path>,
        F: FnOnce(&ForecasterConfig) -> M,
    {
        let dir = dir.as_ref();
        let config = ForecasterConfig::load(dir.join(CONFIG_FILE))
            .map_err(|err| ForecastError::InvalidConfig(format!("{err:?}")))?;

        let mut forecaster = Self::new(config, device, init)?;
        forecaster.model = forecaster
            .model
            .load_file(
                dir.join(MODEL_FILE),
                &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
            )?
            .to_device(&forecaster.device);

        Ok(forecaster)
    }

    fn window_index(
        &self,
        dataset: &TimeSeriesDataset,
        n_windows: usize,
        test_size: usize,
        step_size: usize,
    ) -> (Vec<String>, Vec<Option<i64>>) {
        let input_size = self.config.input_size;
        let per_series = n_windows / dataset.n_series().max(1);
        let start = dataset.max_size().saturating_sub(input_size + test_size);

        let mut unique_ids = Vec::with_capacity(n_windows);
        let mut cutoffs = Vec::with_capacity(n_windows);
        for (series, id) in dataset.ids().iter().enumerate() {
            for window in 0..per_series {
                unique_ids.push(id.clone());
                cutoffs.push(dataset.ds_at(series, start + window * step_size + input_size - 1));
            }
        }

        (unique_ids, cutoffs)
    }

    fn data_module<DB: Backend<Device = B::Device>>(
        &self,
        dataset: &TimeSeriesDataset,
    ) -> TimeSeriesDataModule<DB> {
        TimeSeriesDataModule::new(
            dataset.clone(),
            self.device.clone(),
            self.config.batch_size,
            self.config.num_workers,
            self.config.drop_last,
            self.config.seed,
        )
    }
}

impl<B, M> Forecaster<B, M>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + ForecastingModel<B>,
    M::InnerModule: ForecastingModel<B::InnerBackend>,
{
    /// Trains for `max_steps` optimizer steps on windows that end before the
    /// last `val_size + test_size` steps of every series.
    pub fn fit(
        &mut self,
        dataset: &TimeSeriesDataset,
        val_size: usize,
        test_size: usize,
    ) -> ForecastResult<FitReport> {
        if val_size > 0 && val_size < self.config.h {
            return Err(ForecastError::InvalidConfig(format!(
                "val_size ({val_size}) must be at least the horizon ({})",
                self.config.h
            )));
        }
        self.steps.extractor_mut().set_holdout(val_size, test_size);

        let data = self.data_module::<B>(dataset);
        let valid_data = self.data_module::<B::InnerBackend>(dataset);
        let train_loader = data.train_loader();
        let mut optim = AdamConfig::new().init::<B, M>();
        let mut model = self.model.clone();
        let mut report = FitReport::default();
        let mut step = 0;

        while step < self.config.max_steps {
            let mut consumed = false;

            for batch in train_loader.iter() {
                if !data.keep(&batch) {
                    continue;
                }
                consumed = true;

                let loss = self.steps.train_step(&model, &batch, &mut self.rng)?;
                let value = to_vec(loss.clone())[0];
                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optim.step(self.config.learning_rate, model, grads);

                step += 1;
                report.train_losses.push(value);
                info!(step, loss = value, "train step");

                if val_size > 0 && step % self.config.val_check_steps.max(1) == 0 {
                    if let Some(valid_loss) = self.validate(&model.valid(), &valid_data)? {
                        info!(step, loss = valid_loss, "validation");
                        report.valid_losses.push((step, valid_loss));
                    }
                }
                if step >= self.config.max_steps {
                    break;
                }
            }

            if !consumed {
                return Err(ForecastError::InvalidConfig(format!(
                    "drop_last skipped every batch of {} series",
                    self.config.batch_size
                )));
            }
        }

        self.model = model;
        Ok(report)
    }

    /// Inference copy of the forecaster on the inner backend, with dropout
    /// disabled.
    pub fn valid(&self) -> Forecaster<B::InnerBackend, M::InnerModule> {
        Forecaster {
            config: self.config.clone(),
            model: self.model.valid(),
            device: self.device.clone(),
            rng: self.rng.clone(),
            steps: self.steps.clone(),
        }
    }

    /// Mean validation loss over the kept batches.
    fn validate(
        &mut self,
        model: &M::InnerModule,
        data: &TimeSeriesDataModule<B::InnerBackend>,
    ) -> ForecastResult<Option<f32>> {
        let mut losses = Vec::new();
        for batch in data.val_loader().iter() {
            if !data.keep(&batch) {
                continue;
            }
            if let Some(loss) = self.steps.validation_step(model, &batch, &mut self.rng)? {
                losses.push(to_vec(loss)[0]);
            }
        }

        if losses.is_empty() {
            warn!("no validation batches were kept");
            return Ok(None);
        }
        Ok(Some(losses.iter().sum::<f32>() / losses.len() as f32))
    }
}
