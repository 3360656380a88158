pub mod gated_mlp;

use burn::tensor::{backend::Backend, Tensor};

use crate::windows::ParsedWindow;

pub use gated_mlp::{GatedMlp, GatedMlpConfig};

/// A network that maps parsed windows to horizon forecasts in normalized
/// space. Implementations never see raw batches or scaler statistics.
pub trait ForecastingModel<B: Backend> {
    /// `[W, H, K]` where K is the loss' output size.
    fn forward(&self, windows: &ParsedWindow<B>) -> Tensor<B, 3>;

    /// `[W, components, H, K]`, components summing to the forecast.
    fn decompose(&self, windows: &ParsedWindow<B>) -> Tensor<B, 4> {
        self.forward(windows).unsqueeze_dim(1)
    }
}
