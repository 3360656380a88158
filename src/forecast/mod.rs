pub mod session;
pub mod step;

pub use session::{FitReport, Forecast, Forecaster, ForecasterConfig};
pub use step::{ForecastStep, StepOrchestrator, StepOutput};
