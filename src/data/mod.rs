pub mod batch;
pub mod columns;
pub mod dataset;
pub mod module;

pub use batch::Batch;
pub use columns::{ColumnIndex, MASK_COL, TARGET_COL};
pub use dataset::{LongRow, SeriesBatcher, SeriesItem, StaticRow, TimeSeriesDataset};
pub use module::TimeSeriesDataModule;
