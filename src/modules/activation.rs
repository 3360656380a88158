use burn::config::Config;
use burn::module::Module;
use burn::tensor::activation::sigmoid;
use burn::tensor::{backend::Backend, Tensor};

#[derive(Module, Debug, Clone)]
pub struct Elu {
    alpha: f32,
}

impl Elu {
    pub fn forward<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        let negative = x.clone().lower_equal_elem(0.0);
        let saturated = (x.clone().exp() - 1.0) * self.alpha;

        x.mask_where(negative, saturated)
    }
}

#[derive(Config, Debug)]
pub struct EluConfig {
    #[config(default = 1.0)]
    alpha: f32,
}

impl EluConfig {
    pub fn init(&self) -> Elu {
        Elu { alpha: self.alpha }
    }
}

/// Splits the last axis in half and gates the first half with the
/// sigmoid of the second.
#[derive(Module, Debug, Clone)]
pub struct GatedLinearUnit {
    nonlinear: bool,
}

impl GatedLinearUnit {
    pub fn forward<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        let mut halves = x.chunk(2, D - 1);
        let gate = halves.remove(1);
        let value = halves.remove(0);
        let value = if self.nonlinear { value.tanh() } else { value };

        sigmoid(gate) * value
    }
}

#[derive(Config, Debug)]
pub struct GatedLinearUnitConfig {
    #[config(default = false)]
    nonlinear: bool,
}

impl GatedLinearUnitConfig {
    pub fn init(&self) -> GatedLinearUnit {
        GatedLinearUnit {
            nonlinear: self.nonlinear,
        }
    }
}
