pub mod extractor;
pub mod normalizer;
pub mod parser;

use burn::tensor::{backend::Backend, Data, Int, Shape, Tensor};

pub use extractor::{WindowBatch, WindowExtractor, WindowMode};
pub use normalizer::{Denormalized, ScalerState, ScalerType, TemporalNormalizer};
pub use parser::{ParsedWindow, WindowParser};

pub(crate) fn index_tensor<B: Backend>(indices: &[usize], device: &B::Device) -> Tensor<B, 1, Int> {
    let values: Vec<i64> = indices.iter().map(|i| *i as i64).collect();
    let data = Data::new(values, Shape::new([indices.len()]));
    Tensor::from_data(data.convert()).to_device(device)
}

pub(crate) fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor.into_data().convert::<f32>().value
}

pub(crate) fn from_vec<B: Backend, const D: usize>(
    values: Vec<f32>,
    shape: [usize; D],
    device: &B::Device,
) -> Tensor<B, D> {
    let data = Data::new(values, Shape::new(shape));
    Tensor::from_data(data.convert()).to_device(device)
}
