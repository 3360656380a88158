pub mod activation;
pub mod grn;

pub use activation::{Elu, EluConfig, GatedLinearUnit, GatedLinearUnitConfig};
pub use grn::{GatedResidualNetwork, GatedResidualNetworkConfig};
