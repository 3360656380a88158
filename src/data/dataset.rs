use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::tensor::backend::Backend;
use burn::tensor::{Data, Shape, Tensor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::batch::Batch;
use super::columns::{ColumnIndex, MASK_COL, TARGET_COL};
use crate::error::{ForecastError, Result};

/// One observation of one series in long format; `values` follow the
/// dataset's value columns.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LongRow {
    pub unique_id: String,
    pub ds: i64,
    pub values: Vec<f32>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StaticRow {
    pub unique_id: String,
    pub values: Vec<f32>,
}

/// A single series, left padded to the dataset's `max_size`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SeriesItem {
    pub temporal: Vec<f32>,        // [C, max_size], channel major
    pub statics: Option<Vec<f32>>, // [D_s]
}

#[derive(Debug, Clone)]
pub struct TimeSeriesDataset {
    temporal: Vec<Vec<f32>>, // [rows, C], last channel is the available mask
    ds: Vec<i64>,            // [rows]
    temporal_cols: ColumnIndex,
    indptr: Vec<usize>,
    max_size: usize,
    statics: Option<Vec<Vec<f32>>>,
    static_cols: Option<ColumnIndex>,
    ids: Vec<String>,
    last_ds: Vec<i64>,
    sorted: bool,
}

impl TimeSeriesDataset {
    pub fn from_long<S: AsRef<str>>(rows: &[LongRow], value_cols: &[S], sort: bool) -> Result<Self> {
        let value_index = ColumnIndex::new(value_cols)?;
        value_index.get_loc(TARGET_COL)?;
        let temporal_cols = value_index.with_column(MASK_COL)?;

        if rows.is_empty() {
            return Err(ForecastError::InvalidConfig("dataset has no rows".to_string()));
        }

        let mut ids: Vec<String> = Vec::new();
        let mut groups: Vec<Vec<&LongRow>> = Vec::new();
        let mut lookup: HashMap<&str, usize> = HashMap::new();

        for row in rows {
            if row.values.len() != value_index.len() {
                return Err(ForecastError::ShapeMismatch {
                    expected: value_index.len(),
                    got: row.values.len(),
                });
            }
            let group = *lookup.entry(row.unique_id.as_str()).or_insert_with(|| {
                ids.push(row.unique_id.clone());
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[group].push(row);
        }

        if sort {
            let mut order: Vec<usize> = (0..ids.len()).collect();
            order.sort_by(|a, b| ids[*a].cmp(&ids[*b]));
            ids = order.iter().map(|i| ids[*i].clone()).collect();
            let mut unsorted = std::mem::take(&mut groups);
            groups = order.into_iter().map(|i| std::mem::take(&mut unsorted[i])).collect();
            for group in groups.iter_mut() {
                group.sort_by_key(|row| row.ds);
            }
        }

        let mut temporal = Vec::with_capacity(rows.len());
        let mut ds = Vec::with_capacity(rows.len());
        let mut indptr = vec![0];
        let mut last_ds = Vec::with_capacity(ids.len());
        for group in groups.iter() {
            for row in group {
                let mut values = row.values.clone();
                values.push(1.0);
                temporal.push(values);
                ds.push(row.ds);
            }
            indptr.push(temporal.len());
            last_ds.push(group.last().map(|row| row.ds).unwrap_or_default());
        }
        let max_size = groups.iter().map(|g| g.len()).max().unwrap_or(0);

        Ok(Self {
            temporal,
            ds,
            temporal_cols,
            indptr,
            max_size,
            statics: None,
            static_cols: None,
            ids,
            last_ds,
            sorted: sort,
        })
    }

    /// Attaches one static row per series, matched by id.
    pub fn with_statics<S: AsRef<str>>(mut self, rows: &[StaticRow], static_cols: &[S]) -> Result<Self> {
        let static_cols = ColumnIndex::new(static_cols)?;
        let lookup: HashMap<&str, &StaticRow> =
            rows.iter().map(|row| (row.unique_id.as_str(), row)).collect();

        let mut statics = Vec::with_capacity(self.ids.len());
        for id in self.ids.iter() {
            let row = lookup.get(id.as_str()).ok_or(ForecastError::ShapeMismatch {
                expected: self.ids.len(),
                got: rows.len(),
            })?;
            if row.values.len() != static_cols.len() {
                return Err(ForecastError::ShapeMismatch {
                    expected: static_cols.len(),
                    got: row.values.len(),
                });
            }
            statics.push(row.values.clone());
        }

        self.statics = Some(statics);
        self.static_cols = Some(static_cols);
        Ok(self)
    }

    /// Appends future observations to every series. Columns absent from
    /// `cols` are zero filled; the rows are only marked available when
    /// they carry the target.
    pub fn update_with_future<S: AsRef<str>>(&self, rows: &[LongRow], cols: &[S]) -> Result<Self> {
        let future_cols = ColumnIndex::new(cols)?;
        let mask_idx = self.temporal_cols.get_loc(MASK_COL)?;
        let positions = self.temporal_cols.get_locs(cols)?;
        if positions.contains(&mask_idx) {
            return Err(ForecastError::DuplicateColumn(MASK_COL.to_string()));
        }
        let available = if future_cols.contains(TARGET_COL) { 1.0 } else { 0.0 };

        let lookup: HashMap<&str, usize> = self
            .ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut future: Vec<Vec<&LongRow>> = vec![Vec::new(); self.ids.len()];
        for row in rows {
            let series = *lookup.get(row.unique_id.as_str()).ok_or_else(|| {
                ForecastError::InvalidConfig(format!("unknown series {}", row.unique_id))
            })?;
            if row.values.len() != future_cols.len() {
                return Err(ForecastError::ShapeMismatch {
                    expected: future_cols.len(),
                    got: row.values.len(),
                });
            }
            if row.ds <= self.last_ds[series] {
                return Err(ForecastError::InvalidConfig(format!(
                    "future row of {} at {} does not follow its history ending at {}",
                    row.unique_id, row.ds, self.last_ds[series]
                )));
            }
            future[series].push(row);
        }

        let n_cols = self.temporal_cols.len();
        let mut temporal = Vec::with_capacity(self.temporal.len() + rows.len());
        let mut ds = Vec::with_capacity(self.ds.len() + rows.len());
        let mut indptr = vec![0];
        let mut last_ds = self.last_ds.clone();

        for (series, future_rows) in future.iter_mut().enumerate() {
            let history = self.indptr[series]..self.indptr[series + 1];
            temporal.extend_from_slice(&self.temporal[history.clone()]);
            ds.extend_from_slice(&self.ds[history]);
            if self.sorted {
                future_rows.sort_by_key(|row| row.ds);
            }
            for row in future_rows.iter() {
                let mut values = vec![0.0; n_cols];
                for (value, pos) in row.values.iter().zip(positions.iter()) {
                    values[*pos] = *value;
                }
                values[mask_idx] = available;
                temporal.push(values);
                ds.push(row.ds);
                last_ds[series] = row.ds;
            }
            indptr.push(temporal.len());
        }

        let max_size = indptr.windows(2).map(|w| w[1] - w[0]).max().unwrap_or(0);

        Ok(Self {
            temporal,
            ds,
            temporal_cols: self.temporal_cols.clone(),
            indptr,
            max_size,
            statics: self.statics.clone(),
            static_cols: self.static_cols.clone(),
            ids: self.ids.clone(),
            last_ds,
            sorted: self.sorted,
        })
    }

    /// [`update_with_future`](Self::update_with_future) requiring exactly
    /// `h` future rows for every series.
    pub fn update_with_horizon<S: AsRef<str>>(
        &self,
        rows: &[LongRow],
        cols: &[S],
        h: usize,
    ) -> Result<Self> {
        let updated = self.update_with_future(rows, cols)?;
        for (series, id) in self.ids.iter().enumerate() {
            let added = updated.series_len(series) - self.series_len(series);
            if added != h {
                return Err(ForecastError::InvalidConfig(format!(
                    "series {id} has {added} future rows, expected {h}"
                )));
            }
        }

        Ok(updated)
    }

    pub fn item(&self, idx: usize) -> Option<SeriesItem> {
        if idx >= self.n_series() {
            return None;
        }

        let n_cols = self.temporal_cols.len();
        let rows = &self.temporal[self.indptr[idx]..self.indptr[idx + 1]];
        let offset = self.max_size - rows.len();

        let mut temporal = vec![0.0; n_cols * self.max_size];
        for (t, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                temporal[c * self.max_size + offset + t] = *value;
            }
        }

        let statics = self.statics.as_ref().map(|s| s[idx].clone());

        Some(SeriesItem { temporal, statics })
    }

    pub fn n_series(&self) -> usize {
        self.ids.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn series_len(&self, idx: usize) -> usize {
        self.indptr[idx + 1] - self.indptr[idx]
    }

    /// Timestamp at a position of the left padded layout, `None` on padding.
    pub fn ds_at(&self, series: usize, pos: usize) -> Option<i64> {
        let offset = self.max_size - self.series_len(series);
        if pos < offset || pos >= self.max_size {
            return None;
        }
        Some(self.ds[self.indptr[series] + pos - offset])
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn temporal_cols(&self) -> &ColumnIndex {
        &self.temporal_cols
    }

    pub fn static_cols(&self) -> Option<&ColumnIndex> {
        self.static_cols.as_ref()
    }
}

impl Dataset<SeriesItem> for TimeSeriesDataset {
    fn get(&self, index: usize) -> Option<SeriesItem> {
        self.item(index)
    }

    fn len(&self) -> usize {
        self.n_series()
    }
}

#[derive(Clone, Debug)]
pub struct SeriesBatcher<B: Backend> {
    device: B::Device,
    temporal_cols: ColumnIndex,
    static_cols: Option<ColumnIndex>,
    max_size: usize,
}

impl<B: Backend> SeriesBatcher<B> {
    pub fn new(device: B::Device, dataset: &TimeSeriesDataset) -> Self {
        Self {
            device,
            temporal_cols: dataset.temporal_cols.clone(),
            static_cols: dataset.static_cols.clone(),
            max_size: dataset.max_size,
        }
    }
}

impl<B: Backend> Batcher<SeriesItem, Batch<B>> for SeriesBatcher<B> {
    fn batch(&self, items: Vec<SeriesItem>) -> Batch<B> {
        let batch_size = items.len();
        let n_cols = self.temporal_cols.len();

        let values: Vec<f32> = items
            .iter()
            .flat_map(|item| item.temporal.iter().copied())
            .collect();
        let data = Data::new(values, Shape::new([batch_size, n_cols, self.max_size]));
        let temporal: Tensor<B, 3> = Tensor::from_data(data.convert()).to_device(&self.device);

        let statics = self.static_cols.as_ref().map(|cols| {
            let values: Vec<f32> = items
                .iter()
                .flat_map(|item| item.statics.iter().flatten().copied())
                .collect();
            let data = Data::new(values, Shape::new([batch_size, cols.len()]));
            let statics: Tensor<B, 2> = Tensor::from_data(data.convert()).to_device(&self.device);
            statics
        });

        Batch {
            temporal,
            temporal_cols: self.temporal_cols.clone(),
            statics,
            static_cols: self.static_cols.clone(),
        }
    }
}
