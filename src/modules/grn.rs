use burn::config::Config;
use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::tensor::{backend::Backend, Tensor};

use super::activation::{Elu, EluConfig, GatedLinearUnit, GatedLinearUnitConfig};

/// Residual block `LayerNorm(skip(x) + GLU(W2 ELU(W1 x + Wc c)))` over
/// flat `[N, D]` features, with an optional context vector per row.
#[derive(Module, Debug)]
pub struct GatedResidualNetwork<B: Backend> {
    skip_proj: Option<Linear<B>>,
    input_linear: Linear<B>,
    context_linear: Option<Linear<B>>,
    elu: Elu,
    hidden_linear: Linear<B>,
    dropout: Dropout,
    gate_linear: Linear<B>,
    glu: GatedLinearUnit,
    layer_norm: LayerNorm<B>,
}

impl<B: Backend> GatedResidualNetwork<B> {
    pub fn forward(&self, x: Tensor<B, 2>, context: Option<Tensor<B, 2>>) -> Tensor<B, 2> {
        let skip = match &self.skip_proj {
            Some(proj) => proj.forward(x.clone()),
            None => x.clone(),
        };

        let mut hidden = self.input_linear.forward(x);
        if let (Some(linear), Some(context)) = (&self.context_linear, context) {
            hidden = hidden + linear.forward(context);
        }

        let hidden = self.elu.forward(hidden);
        let hidden = self.hidden_linear.forward(hidden);
        let hidden = self.dropout.forward(hidden);
        let hidden = self.gate_linear.forward(hidden);
        let hidden = self.glu.forward(hidden);

        self.layer_norm.forward(hidden + skip)
    }
}

#[derive(Config, Debug)]
pub struct GatedResidualNetworkConfig {
    d_input: usize,
    d_hidden: usize,

    #[config(default = "None")]
    d_output: Option<usize>,

    /// Width of the context vector, 0 for none.
    #[config(default = 0)]
    d_context: usize,

    #[config(default = 0.0)]
    dropout: f64,
}

impl GatedResidualNetworkConfig {
    pub fn init<B: Backend>(&self) -> GatedResidualNetwork<B> {
        let d_output = self.d_output.unwrap_or(self.d_input);

        let skip_proj = if self.d_input != d_output {
            Some(LinearConfig::new(self.d_input, d_output).init())
        } else {
            None
        };
        let context_linear = if self.d_context > 0 {
            Some(
                LinearConfig::new(self.d_context, self.d_hidden)
                    .with_bias(false)
                    .init(),
            )
        } else {
            None
        };

        GatedResidualNetwork {
            skip_proj,
            input_linear: LinearConfig::new(self.d_input, self.d_hidden).init(),
            context_linear,
            elu: EluConfig::new().init(),
            hidden_linear: LinearConfig::new(self.d_hidden, self.d_hidden).init(),
            dropout: DropoutConfig::new(self.dropout).init(),
            gate_linear: LinearConfig::new(self.d_hidden, d_output * 2).init(),
            glu: GatedLinearUnitConfig::new().init(),
            layer_norm: LayerNormConfig::new(d_output).init(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestBackend;

    #[test]
    fn projects_to_the_output_width() {
        let grn: GatedResidualNetwork<TestBackend> = GatedResidualNetworkConfig::new(6, 8)
            .with_d_output(Some(4))
            .with_d_context(3)
            .init();

        let x = Tensor::<TestBackend, 2>::ones([5, 6]);
        let c = Tensor::<TestBackend, 2>::ones([5, 3]);

        assert_eq!(grn.forward(x.clone(), Some(c)).dims(), [5, 4]);
        assert_eq!(grn.forward(x, None).dims(), [5, 4]);
    }
}
