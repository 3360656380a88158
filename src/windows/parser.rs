use burn::tensor::{backend::Backend, Tensor};

use super::extractor::{WindowBatch, WindowMode};
use super::index_tensor;
use crate::data::columns::{ColumnIndex, MASK_COL, TARGET_COL};
use crate::error::{ForecastError, Result};

#[derive(Clone, Debug)]
pub struct ParsedWindow<B: Backend> {
    pub insample_y: Tensor<B, 2>,             // [W, L]
    pub insample_mask: Tensor<B, 2>,          // [W, L]
    pub outsample_y: Option<Tensor<B, 2>>,    // [W, H], train and validation only
    pub outsample_mask: Option<Tensor<B, 2>>, // [W, H], train and validation only
    pub hist_exog: Option<Tensor<B, 3>>,      // [W, L, X_h]
    pub futr_exog: Option<Tensor<B, 3>>,      // [W, L + H, X_f]
    pub stat_exog: Option<Tensor<B, 2>>,      // [W, X_s]
}

impl<B: Backend> ParsedWindow<B> {
    pub fn n_windows(&self) -> usize {
        self.insample_y.dims()[0]
    }
}

/// Slices normalized windows into model inputs by channel name.
#[derive(Clone, Debug)]
pub struct WindowParser {
    input_size: usize,
    h: usize,
    hist_exog_list: Vec<String>,
    futr_exog_list: Vec<String>,
    stat_exog_list: Vec<String>,
}

impl WindowParser {
    pub fn new(input_size: usize, h: usize) -> Self {
        Self {
            input_size,
            h,
            hist_exog_list: Vec::new(),
            futr_exog_list: Vec::new(),
            stat_exog_list: Vec::new(),
        }
    }

    pub fn with_exogenous(
        mut self,
        hist_exog_list: Vec<String>,
        futr_exog_list: Vec<String>,
        stat_exog_list: Vec<String>,
    ) -> Self {
        self.hist_exog_list = hist_exog_list;
        self.futr_exog_list = futr_exog_list;
        self.stat_exog_list = stat_exog_list;
        self
    }

    pub fn parse<B: Backend>(&self, windows: &WindowBatch<B>, mode: WindowMode) -> Result<ParsedWindow<B>> {
        let [n_windows, window_size, _] = windows.temporal.dims();
        if window_size != self.input_size + self.h {
            return Err(ForecastError::ShapeMismatch {
                expected: self.input_size + self.h,
                got: window_size,
            });
        }
        let cols = &windows.temporal_cols;
        let y_idx = cols.get_loc(TARGET_COL)?;
        let mask_idx = cols.get_loc(MASK_COL)?;
        let lag = 0..self.input_size;
        let horizon = self.input_size..window_size;

        let channel = |idx: usize, steps: std::ops::Range<usize>| -> Tensor<B, 2> {
            windows
                .temporal
                .clone()
                .slice([0..n_windows, steps, idx..idx + 1])
                .squeeze(2)
        };

        let insample_y = channel(y_idx, lag.clone());
        let insample_mask = channel(mask_idx, lag.clone());
        let (outsample_y, outsample_mask) = match mode {
            WindowMode::Predict => (None, None),
            WindowMode::Train | WindowMode::Validation => (
                Some(channel(y_idx, horizon.clone())),
                Some(channel(mask_idx, horizon)),
            ),
        };

        let hist_exog = self.channels(windows, &self.hist_exog_list, lag)?;
        let futr_exog = self.channels(windows, &self.futr_exog_list, 0..window_size)?;
        let stat_exog = self.static_channels(windows)?;

        Ok(ParsedWindow {
            insample_y,
            insample_mask,
            outsample_y,
            outsample_mask,
            hist_exog,
            futr_exog,
            stat_exog,
        })
    }

    fn channels<B: Backend>(
        &self,
        windows: &WindowBatch<B>,
        names: &[String],
        steps: std::ops::Range<usize>,
    ) -> Result<Option<Tensor<B, 3>>> {
        if names.is_empty() {
            return Ok(None);
        }
        let positions = windows.temporal_cols.get_locs(names)?;
        let [n_windows, _, n_cols] = windows.temporal.dims();
        let idx = index_tensor::<B>(&positions, &windows.temporal.device());

        Ok(Some(
            windows
                .temporal
                .clone()
                .slice([0..n_windows, steps, 0..n_cols])
                .select(2, idx),
        ))
    }

    fn static_channels<B: Backend>(&self, windows: &WindowBatch<B>) -> Result<Option<Tensor<B, 2>>> {
        if self.stat_exog_list.is_empty() {
            return Ok(None);
        }
        let missing = || ForecastError::MissingColumn(self.stat_exog_list[0].clone());
        let statics = windows.statics.clone().ok_or_else(missing)?;
        let cols: &ColumnIndex = windows.static_cols.as_ref().ok_or_else(missing)?;

        let positions = cols.get_locs(&self.stat_exog_list)?;
        let idx = index_tensor::<B>(&positions, &statics.device());

        Ok(Some(statics.select(1, idx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{values, TestBackend};
    use crate::windows::from_vec;

    // Two windows of L = 2, H = 1 over channels [y, price, promo, mask].
    fn windows() -> WindowBatch<TestBackend> {
        #[rustfmt::skip]
        let values = vec![
            1.0, 10.0, 100.0, 1.0,
            2.0, 20.0, 200.0, 1.0,
            3.0, 30.0, 300.0, 0.0,

            4.0, 40.0, 400.0, 0.0,
            5.0, 50.0, 500.0, 1.0,
            6.0, 60.0, 600.0, 1.0,
        ];
        WindowBatch {
            temporal: from_vec(values, [2, 3, 4], &Default::default()),
            temporal_cols: ColumnIndex::new(&["y", "price", "promo", MASK_COL]).unwrap(),
            statics: Some(from_vec(vec![7.0, 8.0, 9.0, 10.0], [2, 2], &Default::default())),
            static_cols: Some(ColumnIndex::new(&["store", "region"]).unwrap()),
            window_ids: vec![0, 1],
            windows_per_series: 2,
        }
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn slices_target_and_mask() {
        let parsed = WindowParser::new(2, 1).parse(&windows(), WindowMode::Train).unwrap();

        assert_eq!(values(parsed.insample_y), vec![1.0, 2.0, 4.0, 5.0]);
        assert_eq!(values(parsed.insample_mask), vec![1.0, 1.0, 0.0, 1.0]);
        assert_eq!(values(parsed.outsample_y.unwrap()), vec![3.0, 6.0]);
        assert_eq!(values(parsed.outsample_mask.unwrap()), vec![0.0, 1.0]);
        assert!(parsed.hist_exog.is_none());
        assert!(parsed.futr_exog.is_none());
        assert!(parsed.stat_exog.is_none());
    }

    #[test]
    fn predict_has_no_outsample() {
        let parsed = WindowParser::new(2, 1).parse(&windows(), WindowMode::Predict).unwrap();

        assert!(parsed.outsample_y.is_none());
        assert!(parsed.outsample_mask.is_none());
    }

    #[test]
    fn slices_exogenous_channels() {
        let parser = WindowParser::new(2, 1).with_exogenous(
            names(&["price"]),
            names(&["promo", "price"]),
            names(&["region"]),
        );

        let parsed = parser.parse(&windows(), WindowMode::Validation).unwrap();

        let hist = parsed.hist_exog.unwrap();
        assert_eq!(hist.dims(), [2, 2, 1]);
        assert_eq!(values(hist), vec![10.0, 20.0, 40.0, 50.0]);

        let futr = parsed.futr_exog.unwrap();
        assert_eq!(futr.dims(), [2, 3, 2]);
        assert_eq!(
            values(futr.slice([0..1, 0..3, 0..2])),
            vec![100.0, 10.0, 200.0, 20.0, 300.0, 30.0]
        );

        assert_eq!(values(parsed.stat_exog.unwrap()), vec![8.0, 10.0]);
    }

    #[test]
    fn missing_exogenous_column_fails() {
        let parser = WindowParser::new(2, 1).with_exogenous(names(&["volume"]), vec![], vec![]);

        let err = parser.parse(&windows(), WindowMode::Train).unwrap_err();
        assert!(matches!(err, ForecastError::MissingColumn(name) if name == "volume"));
    }

    #[test]
    fn missing_static_column_fails() {
        let parser = WindowParser::new(2, 1).with_exogenous(vec![], vec![], names(&["country"]));

        let err = parser.parse(&windows(), WindowMode::Train).unwrap_err();
        assert!(matches!(err, ForecastError::MissingColumn(name) if name == "country"));
    }
}
