//! Parameter-free prediction with expert advice.
//!
//! This crate implements AdaHedge, the exponential-weights (Hedge) forecaster
//! whose learning rate is derived from its own accumulated mixability gap
//! instead of an externally tuned schedule:
//! - numerically stabilized mixture and mix loss (`mixture`)
//! - the adaptive recurrence, streaming and batch (`forecaster`)
//! - run outputs, regret and reproducibility digests (`forecast`)
//!
//! Everything here is deterministic and allocation-light; a run is a pure
//! function of its loss table.
//!
//! ```
//! use adahedge_core::{LossTable, forecast};
//!
//! let losses = LossTable::from_rows(&[[0.0, 1.0], [0.0, 1.0], [1.0, 0.0]]).unwrap();
//! let run = forecast(&losses).unwrap();
//! assert_eq!(run.weight_row(0), &[0.5, 0.5]);
//! assert!(run.regret() <= 2.0 * run.mixability_gap());
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod forecast;
pub mod forecaster;
pub mod loss_table;
pub mod mixture;

pub use config::{TraceLevel, trace_level};
pub use error::InvalidShape;
pub use forecast::{Forecast, StepTrace};
pub use forecaster::{AdaHedge, MIN_EXPERTS, forecast, forecast_traced};
pub use loss_table::LossTable;
pub use mixture::{LearningRate, Mixture, mix, mix_into};
