
use serde::{Serialize, Deserialize};

pub const SECONDS_PER_WEEK:f64 = 604_800.0;

/// Signal type a channel is bound to for its lifetime.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignalType {
	GpsL1Ca,
	GalileoE1B,
}

impl SignalType {

	pub fn code_period_sec(&self) -> f64 { match self {
		SignalType::GpsL1Ca    => 1.0e-3,
		SignalType::GalileoE1B => 4.0e-3,
	}}

	pub fn code_length_chips(&self) -> usize { match self {
		SignalType::GpsL1Ca    => 1023,
		SignalType::GalileoE1B => 4092,
	}}

	pub fn carrier_freq_hz(&self) -> f64 { 1.57542e9 }

	/// Symbol rate at the prompt correlator output.
	pub fn symbol_rate_hz(&self) -> f64 { 1.0 / self.code_period_sec() }

}

/// The record exchanged along a channel pipeline and, at each epoch, with
/// the observables aligner and PVT solver.  Downstream stages only ever see
/// copies of this struct; the producing stage owns the live slot.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct GnssSynchro {
	pub channel_id: usize,
	pub prn: usize,
	pub signal: SignalType,

	// Acquisition
	pub acq_doppler_hz: f64,
	pub acq_delay_samples: f64,
	pub acq_samplestamp_samples: usize,

	// Tracking
	pub prompt_i: f64,
	pub prompt_q: f64,
	pub carrier_doppler_hz: f64,
	pub carrier_phase_cycles: f64,
	pub code_phase_samples: f64,
	pub cn0_db_hz: f64,

	// Observables
	pub pseudorange_m: f64,
	pub tow_at_current_symbol_s: f64,
	pub tow_hybrid_at_current_symbol_s: f64,
	/// Sample index of the last sample of the symbol the TOW refers to
	pub symbol_samplestamp_samples: usize,
	pub flag_valid_pseudorange: bool,
}

impl GnssSynchro {

	pub fn new(channel_id:usize, prn:usize, signal:SignalType) -> Self {
		GnssSynchro {
			channel_id, prn, signal,
			acq_doppler_hz: 0.0, acq_delay_samples: 0.0, acq_samplestamp_samples: 0,
			prompt_i: 0.0, prompt_q: 0.0,
			carrier_doppler_hz: 0.0, carrier_phase_cycles: 0.0,
			code_phase_samples: 0.0, cn0_db_hz: 0.0,
			pseudorange_m: 0.0,
			tow_at_current_symbol_s: 0.0,
			tow_hybrid_at_current_symbol_s: 0.0,
			symbol_samplestamp_samples: 0,
			flag_valid_pseudorange: false,
		}
	}

	/// A valid pseudorange must be finite and carry a TOW inside the week.
	pub fn pseudorange_is_consistent(&self) -> bool {
		!self.flag_valid_pseudorange ||
			(self.pseudorange_m.is_finite()
				&& self.tow_at_current_symbol_s >= 0.0
				&& self.tow_at_current_symbol_s < SECONDS_PER_WEEK)
	}

}
