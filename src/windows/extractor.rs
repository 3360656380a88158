use burn::tensor::{backend::Backend, Tensor};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use super::{index_tensor, to_vec};
use crate::data::batch::Batch;
use crate::data::columns::{ColumnIndex, MASK_COL};
use crate::error::{ForecastError, Result};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMode {
    Train,
    Validation,
    Predict,
}

impl FromStr for WindowMode {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(WindowMode::Train),
            "val" | "validation" => Ok(WindowMode::Validation),
            "predict" => Ok(WindowMode::Predict),
            other => Err(ForecastError::UnknownStep(other.to_string())),
        }
    }
}

impl fmt::Display for WindowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WindowMode::Train => "train",
            WindowMode::Validation => "validation",
            WindowMode::Predict => "predict",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug)]
pub struct WindowBatch<B: Backend> {
    pub temporal: Tensor<B, 3>,           // [W, L + H, C]
    pub temporal_cols: ColumnIndex,
    pub statics: Option<Tensor<B, 2>>,    // [W, D_s], one row per window
    pub static_cols: Option<ColumnIndex>,
    pub window_ids: Vec<usize>,           // position in the unfiltered, series major enumeration
    pub windows_per_series: usize,
}

impl<B: Backend> WindowBatch<B> {
    pub fn n_windows(&self) -> usize {
        self.temporal.dims()[0]
    }

    pub fn window_size(&self) -> usize {
        self.temporal.dims()[1]
    }

    fn select(self, indices: &[usize]) -> Self {
        let idx = index_tensor::<B>(indices, &self.temporal.device());
        let statics = self.statics.map(|s| s.select(0, idx.clone()));

        Self {
            temporal: self.temporal.select(0, idx),
            statics,
            window_ids: indices.iter().map(|i| self.window_ids[*i]).collect(),
            ..self
        }
    }
}

/// Slides `input_size + h` windows over a batch of series.
#[derive(Clone, Debug)]
pub struct WindowExtractor {
    input_size: usize,
    h: usize,
    step_size: usize,
    predict_step_size: usize,
    windows_batch_size: Option<usize>,
    val_size: usize,
    test_size: usize,
    has_futr_exog: bool,
}

impl WindowExtractor {
    pub fn new(input_size: usize, h: usize, step_size: usize) -> Result<Self> {
        if input_size == 0 || h == 0 || step_size == 0 {
            return Err(ForecastError::InvalidConfig(format!(
                "input_size ({input_size}), h ({h}) and step_size ({step_size}) must be positive"
            )));
        }

        Ok(Self {
            input_size,
            h,
            step_size,
            predict_step_size: 1,
            windows_batch_size: None,
            val_size: 0,
            test_size: 0,
            has_futr_exog: false,
        })
    }

    pub fn with_windows_batch_size(mut self, windows_batch_size: Option<usize>) -> Self {
        self.windows_batch_size = windows_batch_size.filter(|n| *n > 0);
        self
    }

    pub fn with_futr_exog(mut self, has_futr_exog: bool) -> Self {
        self.has_futr_exog = has_futr_exog;
        self
    }

    pub fn set_holdout(&mut self, val_size: usize, test_size: usize) {
        self.val_size = val_size;
        self.test_size = test_size;
    }

    pub fn set_predict_step_size(&mut self, step_size: usize) -> Result<()> {
        if step_size == 0 {
            return Err(ForecastError::InvalidConfig(
                "predict step_size must be positive".to_string(),
            ));
        }
        self.predict_step_size = step_size;
        Ok(())
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn horizon(&self) -> usize {
        self.h
    }

    pub fn window_size(&self) -> usize {
        self.input_size + self.h
    }

    pub fn val_size(&self) -> usize {
        self.val_size
    }

    pub fn test_size(&self) -> usize {
        self.test_size
    }

    pub fn create_windows<B: Backend>(
        &self,
        batch: &Batch<B>,
        mode: WindowMode,
        rng: &mut StdRng,
    ) -> Result<WindowBatch<B>> {
        match mode {
            WindowMode::Train => self.train_windows(batch, rng),
            WindowMode::Validation => self.validation_windows(batch),
            WindowMode::Predict => self.predict_windows(batch),
        }
    }

    fn train_windows<B: Backend>(&self, batch: &Batch<B>, rng: &mut StdRng) -> Result<WindowBatch<B>> {
        let [n_series, n_cols, n_time] = batch.temporal.dims();
        let holdout = self.val_size + self.test_size;
        if holdout >= n_time {
            return Err(ForecastError::NoWindowsAvailable);
        }

        let temporal = batch
            .temporal
            .clone()
            .slice([0..n_series, 0..n_cols, 0..n_time - holdout]);
        let temporal = pad_horizon(temporal, self.h);
        if temporal.dims()[2] < self.window_size() {
            return Err(ForecastError::NoWindowsAvailable);
        }

        let windows = self.unfold(batch, temporal, self.step_size);

        let mask_idx = windows.temporal_cols.get_loc(MASK_COL)?;
        let n_windows = windows.n_windows();
        let window_size = self.window_size();
        let mask: Tensor<B, 2> = windows
            .temporal
            .clone()
            .slice([0..n_windows, 0..window_size, mask_idx..mask_idx + 1])
            .reshape([n_windows, window_size]);
        let lag_available = to_vec(mask.clone().slice([0..n_windows, 0..self.input_size]).sum_dim(1));
        let horizon_available = to_vec(mask.slice([0..n_windows, self.input_size..window_size]).sum_dim(1));

        let available: Vec<usize> = (0..n_windows)
            .filter(|i| lag_available[*i] > 0.0 && horizon_available[*i] > 0.0)
            .collect();
        if available.is_empty() {
            return Err(ForecastError::NoWindowsAvailable);
        }
        debug!(
            total = n_windows,
            available = available.len(),
            "filtered training windows"
        );

        let selected: Vec<usize> = match self.windows_batch_size {
            Some(size) => sample_indices(available.len(), size, rng)
                .into_iter()
                .map(|i| available[i])
                .collect(),
            None => available,
        };

        Ok(windows.select(&selected))
    }

    fn validation_windows<B: Backend>(&self, batch: &Batch<B>) -> Result<WindowBatch<B>> {
        let [n_series, n_cols, n_time] = batch.temporal.dims();
        if self.test_size >= n_time {
            return Err(ForecastError::SeriesTooShort {
                needed: self.window_size() + self.test_size,
                got: n_time,
            });
        }

        let end = n_time - self.test_size;
        let start = end.saturating_sub(self.input_size + self.val_size);
        let temporal = batch
            .temporal
            .clone()
            .slice([0..n_series, 0..n_cols, start..end]);
        self.ensure_window_fits(end - start)?;

        Ok(self.unfold(batch, temporal, self.step_size))
    }

    fn predict_windows<B: Backend>(&self, batch: &Batch<B>) -> Result<WindowBatch<B>> {
        let [n_series, n_cols, n_time] = batch.temporal.dims();
        let start = n_time.saturating_sub(self.input_size + self.test_size);
        let temporal = batch
            .temporal
            .clone()
            .slice([0..n_series, 0..n_cols, start..n_time]);

        // Future exogenous values or the test region supply the horizon.
        let temporal = if self.test_size == 0 && !self.has_futr_exog {
            pad_horizon(temporal, self.h)
        } else {
            temporal
        };
        self.ensure_window_fits(temporal.dims()[2])?;

        Ok(self.unfold(batch, temporal, self.predict_step_size))
    }

    fn ensure_window_fits(&self, n_time: usize) -> Result<()> {
        if n_time < self.window_size() {
            return Err(ForecastError::SeriesTooShort {
                needed: self.window_size(),
                got: n_time,
            });
        }
        Ok(())
    }

    /// [N, C, T] -> [N * windows, L + H, C], statics repeated per window.
    fn unfold<B: Backend>(&self, batch: &Batch<B>, temporal: Tensor<B, 3>, step: usize) -> WindowBatch<B> {
        let [n_series, n_cols, n_time] = temporal.dims();
        let window_size = self.window_size();
        let n_windows = (n_time - window_size) / step + 1;

        let windows: Vec<Tensor<B, 3>> = (0..n_windows)
            .map(|w| {
                let start = w * step;
                temporal
                    .clone()
                    .slice([0..n_series, 0..n_cols, start..start + window_size])
            })
            .collect();
        let windows: Tensor<B, 4> = Tensor::stack(windows, 1);
        let windows = windows
            .swap_dims(2, 3)
            .reshape([n_series * n_windows, window_size, n_cols]);

        let statics = batch.statics.clone().map(|statics| {
            let [_, width] = statics.dims();
            let statics: Tensor<B, 3> = statics.unsqueeze_dim(1);
            statics
                .repeat(1, n_windows)
                .reshape([n_series * n_windows, width])
        });

        WindowBatch {
            temporal: windows,
            temporal_cols: batch.temporal_cols.clone(),
            statics,
            static_cols: batch.static_cols.clone(),
            window_ids: (0..n_series * n_windows).collect(),
            windows_per_series: n_windows,
        }
    }
}

fn pad_horizon<B: Backend>(temporal: Tensor<B, 3>, h: usize) -> Tensor<B, 3> {
    let [n_series, n_cols, _] = temporal.dims();
    let padding: Tensor<B, 3> = Tensor::zeros([n_series, n_cols, h]).to_device(&temporal.device());

    Tensor::cat(vec![temporal, padding], 2)
}

/// Draws `size` window indices out of `n`, with replacement only when
/// there are fewer than `size` windows.
fn sample_indices(n: usize, size: usize, rng: &mut StdRng) -> Vec<usize> {
    if n < size {
        debug!(n, size, "sampling windows with replacement");
        (0..size).map(|_| rng.gen_range(0..n)).collect()
    } else {
        rand::seq::index::sample(rng, n, size).into_vec()
    }
}
