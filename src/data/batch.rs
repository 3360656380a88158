use burn::tensor::{backend::Backend, Tensor};

use super::columns::{ColumnIndex, MASK_COL, TARGET_COL};
use crate::error::{ForecastError, Result};

#[derive(Clone, Debug)]
pub struct Batch<B: Backend> {
    pub temporal: Tensor<B, 3>,           // [N, C, T]
    pub temporal_cols: ColumnIndex,       // C names, contains y and available_mask
    pub statics: Option<Tensor<B, 2>>,    // [N, D_s]
    pub static_cols: Option<ColumnIndex>, // D_s names
}

impl<B: Backend> Batch<B> {
    pub fn new(
        temporal: Tensor<B, 3>,
        temporal_cols: ColumnIndex,
        statics: Option<Tensor<B, 2>>,
        static_cols: Option<ColumnIndex>,
    ) -> Result<Self> {
        let [n_series, n_channels, _] = temporal.dims();
        if n_channels != temporal_cols.len() {
            return Err(ForecastError::ShapeMismatch {
                expected: temporal_cols.len(),
                got: n_channels,
            });
        }
        temporal_cols.get_loc(TARGET_COL)?;
        temporal_cols.get_loc(MASK_COL)?;

        if let Some(statics) = &statics {
            let [rows, width] = statics.dims();
            if rows != n_series {
                return Err(ForecastError::ShapeMismatch {
                    expected: n_series,
                    got: rows,
                });
            }
            let expected = static_cols.as_ref().map(|c| c.len()).unwrap_or(0);
            if width != expected {
                return Err(ForecastError::ShapeMismatch { expected, got: width });
            }
        }

        Ok(Self {
            temporal,
            temporal_cols,
            statics,
            static_cols,
        })
    }

    pub fn n_series(&self) -> usize {
        self.temporal.dims()[0]
    }

    pub fn n_time(&self) -> usize {
        self.temporal.dims()[2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{series_tensor, TestBackend};

    #[test]
    fn rejects_column_count_mismatch() {
        let temporal = series_tensor(&[vec![vec![1.0, 2.0], vec![1.0, 1.0]]]);
        let cols = ColumnIndex::new(&["y", "price", MASK_COL]).unwrap();

        let err = Batch::<TestBackend>::new(temporal, cols, None, None).unwrap_err();
        assert!(matches!(
            err,
            ForecastError::ShapeMismatch { expected: 3, got: 2 }
        ));
    }

    #[test]
    fn requires_mask_channel() {
        let temporal = series_tensor(&[vec![vec![1.0, 2.0], vec![1.0, 1.0]]]);
        let cols = ColumnIndex::new(&["y", "price"]).unwrap();

        let err = Batch::<TestBackend>::new(temporal, cols, None, None).unwrap_err();
        assert!(matches!(err, ForecastError::MissingColumn(name) if name == MASK_COL));
    }

    #[test]
    fn reports_dimensions() {
        let temporal = series_tensor(&[
            vec![vec![1.0, 2.0, 3.0], vec![1.0, 1.0, 1.0]],
            vec![vec![4.0, 5.0, 6.0], vec![0.0, 1.0, 1.0]],
        ]);
        let cols = ColumnIndex::new(&["y", MASK_COL]).unwrap();

        let batch = Batch::<TestBackend>::new(temporal, cols, None, None).unwrap();
        assert_eq!(batch.n_series(), 2);
        assert_eq!(batch.n_time(), 3);
    }
}
