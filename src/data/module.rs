use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::tensor::backend::Backend;
use std::sync::Arc;

use super::batch::Batch;
use super::dataset::{SeriesBatcher, TimeSeriesDataset};

/// Serves batches of whole series to the training and prediction loops.
pub struct TimeSeriesDataModule<B: Backend> {
    dataset: TimeSeriesDataset,
    device: B::Device,
    batch_size: usize,
    num_workers: usize,
    drop_last: bool,
    seed: u64,
}

impl<B: Backend> TimeSeriesDataModule<B> {
    pub fn new(
        dataset: TimeSeriesDataset,
        device: B::Device,
        batch_size: usize,
        num_workers: usize,
        drop_last: bool,
        seed: u64,
    ) -> Self {
        Self {
            dataset,
            device,
            batch_size: batch_size.max(1),
            num_workers,
            drop_last,
            seed,
        }
    }

    pub fn train_loader(&self) -> Arc<dyn DataLoader<Batch<B>>> {
        self.loader(true)
    }

    pub fn val_loader(&self) -> Arc<dyn DataLoader<Batch<B>>> {
        self.loader(false)
    }

    pub fn predict_loader(&self) -> Arc<dyn DataLoader<Batch<B>>> {
        self.loader(false)
    }

    /// Whether a training or validation batch should be consumed.
    /// Prediction never drops batches.
    pub fn keep(&self, batch: &Batch<B>) -> bool {
        !self.drop_last || batch.n_series() == self.batch_size
    }

    fn loader(&self, shuffle: bool) -> Arc<dyn DataLoader<Batch<B>>> {
        let batcher = SeriesBatcher::<B>::new(self.device.clone(), &self.dataset);
        let mut builder = DataLoaderBuilder::new(batcher).batch_size(self.batch_size);

        if shuffle {
            builder = builder.shuffle(self.seed);
        }
        if self.num_workers > 0 {
            builder = builder.num_workers(self.num_workers);
        }

        builder.build(self.dataset.clone())
    }
}
