//! Windowing, masking and temporal normalization for fixed-horizon
//! forecasting models built on `burn`.
//!
//! A raw [`Batch`](data::batch::Batch) of series flows through
//! [`WindowExtractor`](windows::WindowExtractor) →
//! [`TemporalNormalizer`](windows::TemporalNormalizer) →
//! [`WindowParser`](windows::WindowParser) → a
//! [`ForecastingModel`](models::ForecastingModel), sequenced per step by the
//! [`StepOrchestrator`](forecast::StepOrchestrator). Normalization statistics
//! come from the lag region of each window only, so nothing from the
//! forecast horizon leaks into the model inputs.

pub mod data;
pub mod error;
pub mod forecast;
pub mod losses;
pub mod models;
pub mod modules;
pub mod utils;
pub mod windows;

pub use error::{ForecastError, Result};
