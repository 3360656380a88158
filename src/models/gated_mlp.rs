use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::{backend::Backend, Tensor};

use super::ForecastingModel;
use crate::modules::{GatedResidualNetwork, GatedResidualNetworkConfig};
use crate::windows::ParsedWindow;

/// Stack of gated residual blocks over the flattened window. Every block
/// emits its own horizon contribution; the forecast is their sum.
#[derive(Module, Debug)]
pub struct GatedMlp<B: Backend> {
    h: usize,
    n_outputs: usize,
    input_proj: Linear<B>,
    blocks: Vec<GatedResidualNetwork<B>>,
    heads: Vec<Linear<B>>,
}

impl<B: Backend> GatedMlp<B> {
    fn features(&self, windows: &ParsedWindow<B>) -> Tensor<B, 2> {
        let n = windows.n_windows();
        let mut inputs = vec![windows.insample_y.clone() * windows.insample_mask.clone()];

        if let Some(hist) = &windows.hist_exog {
            let [_, steps, width] = hist.dims();
            inputs.push(hist.clone().reshape([n, steps * width]));
        }
        if let Some(futr) = &windows.futr_exog {
            let [_, steps, width] = futr.dims();
            inputs.push(futr.clone().reshape([n, steps * width]));
        }

        Tensor::cat(inputs, 1)
    }

    fn contributions(&self, windows: &ParsedWindow<B>) -> Vec<Tensor<B, 3>> {
        let n = windows.n_windows();
        let mut hidden = self.input_proj.forward(self.features(windows));
        let mut parts = Vec::with_capacity(self.blocks.len());

        for (block, head) in self.blocks.iter().zip(self.heads.iter()) {
            hidden = block.forward(hidden, windows.stat_exog.clone());
            // [N, H * K] -> [N, H, K]
            parts.push(head.forward(hidden.clone()).reshape([n, self.h, self.n_outputs]));
        }

        parts
    }
}

impl<B: Backend> ForecastingModel<B> for GatedMlp<B> {
    fn forward(&self, windows: &ParsedWindow<B>) -> Tensor<B, 3> {
        self.contributions(windows)
            .into_iter()
            .reduce(|acc, part| acc + part)
            .unwrap_or_else(|| {
                Tensor::zeros([windows.n_windows(), self.h, self.n_outputs])
                    .to_device(&windows.insample_y.device())
            })
    }

    fn decompose(&self, windows: &ParsedWindow<B>) -> Tensor<B, 4> {
        Tensor::stack(self.contributions(windows), 1)
    }
}

#[derive(Config, Debug)]
pub struct GatedMlpConfig {
    pub input_size: usize,
    pub h: usize,

    #[config(default = 1)]
    pub n_outputs: usize,

    /// Number of historical exogenous channels.
    #[config(default = 0)]
    pub hist_exog_size: usize,

    /// Number of future exogenous channels.
    #[config(default = 0)]
    pub futr_exog_size: usize,

    #[config(default = 0)]
    pub stat_exog_size: usize,

    #[config(default = 64)]
    pub d_hidden: usize,

    #[config(default = 2)]
    pub n_blocks: usize,

    #[config(default = 0.1)]
    pub dropout: f64,
}

impl GatedMlpConfig {
    pub fn init<B: Backend>(&self) -> GatedMlp<B> {
        let d_input = self.input_size
            + self.input_size * self.hist_exog_size
            + (self.input_size + self.h) * self.futr_exog_size;
        let n_blocks = self.n_blocks.max(1);

        let blocks = (0..n_blocks)
            .map(|_| {
                GatedResidualNetworkConfig::new(self.d_hidden, self.d_hidden)
                    .with_d_context(self.stat_exog_size)
                    .with_dropout(self.dropout)
                    .init()
            })
            .collect();
        let heads = (0..n_blocks)
            .map(|_| LinearConfig::new(self.d_hidden, self.h * self.n_outputs).init())
            .collect();

        GatedMlp {
            h: self.h,
            n_outputs: self.n_outputs,
            input_proj: LinearConfig::new(d_input, self.d_hidden).init(),
            blocks,
            heads,
        }
    }
}
