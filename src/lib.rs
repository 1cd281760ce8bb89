
use rustfft::num_complex::Complex;

use thiserror::Error;

pub mod config;
pub mod filters;
pub mod io;
pub mod gnss;
pub mod receiver;
pub mod rinex;

pub mod utils;

/// One complex baseband sample together with the monotone index assigned
/// to it by the sample source.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
	pub val: Complex<f64>,
	pub idx: usize,
}

#[derive(Debug, Error, PartialEq, Clone)]
pub enum DigSigProcErr {
	#[error("loss of lock")]
	LossOfLock,
	#[error("invalid telemetry data: {0}")]
	InvalidTelemetryData(&'static str),
	#[error("fewer than four valid observables at this epoch")]
	InsufficientObservables,
	#[error("least-squares iteration did not converge: {0}")]
	ConvergenceFailure(&'static str),
	#[error("invalid configuration: {0}")]
	ConfigurationInvalid(String),
	#[error("i/o failure: {0}")]
	IoFailure(String),
	#[error("{0}")]
	Other(&'static str),
}
