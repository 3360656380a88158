use burn::tensor::{backend::Backend, Data, Shape, Tensor};

/// Mask weighted mean. The denominator is floored to one so an all-zero
/// mask yields zero instead of NaN.
pub fn weighted_average<B: Backend, const D: usize>(
    x: Tensor<B, D>,
    weights: Tensor<B, D>,
) -> Tensor<B, 1> {
    let masked_out = weights.clone().equal_elem(0.0);
    let weighted = (x * weights.clone()).mask_fill(masked_out, 0.0);
    let sum_weights = weights.sum().clamp_min(1.0);

    weighted.sum() / sum_weights
}

/// Pinball loss averaged over quantiles.
pub fn quantile_loss<B: Backend>(
    y_true: Tensor<B, 2>, // [N, H]
    y_pred: Tensor<B, 3>, // [N, H, Q]
    quantiles: &[f32],
) -> Tensor<B, 2> {
    let [_, _, n_quantiles] = y_pred.dims();
    let data = Data::new(quantiles.to_vec(), Shape::new([1, 1, quantiles.len()]));
    let quantiles: Tensor<B, 3> = Tensor::from_data(data.convert()).to_device(&y_pred.device());

    let y_true: Tensor<B, 3> = y_true.unsqueeze_dim::<3>(2).repeat(2, n_quantiles);
    let residual = y_true.clone() - y_pred.clone();
    let above = y_true.lower_equal(y_pred).float() - quantiles;

    (residual * above).abs().mean_dim(2).squeeze(2)
}

pub fn softplus<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    (x.exp() + 1.0).log()
}

/// Median of the given values, NaN when empty. Reorders the slice.
pub fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return f32::NAN;
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n % 2 == 0 {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    } else {
        values[n / 2]
    }
}

/// Linear interpolation quantile of sorted values.
pub fn sorted_quantile(sorted: &[f32], q: f32) -> f32 {
    if sorted.is_empty() {
        return f32::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f32;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f32;

    sorted[lower] * (1.0 - frac) + sorted[upper] * frac
}
