//! Statistical reliability scoring for worker results.

mod conformal;

pub use conformal::{CalibratedPrediction, CalibrationSet, CalibrationStatus, ConformalCalibrator};
