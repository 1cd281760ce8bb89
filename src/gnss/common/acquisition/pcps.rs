
use rustfft::num_complex::Complex;

use crate::Sample;
use crate::config::AcquisitionConfig;
use crate::gnss::synchro::SignalType;

use super::{AcqEvent, AcqState, AcquisitionResult, CorrelatorPlan};

/// Parallel code-phase search: for every Doppler bin, wipe the carrier off
/// one dwell of samples, correlate against the local code via FFT and score
/// the grid maximum against the detection threshold.
pub struct PcpsAcquisition {
	pub signal: SignalType,
	pub prn: usize,
	pub fs: f64,
	pub state: AcqState,

	pub threshold: f64,
	pub doppler_freqs: Vec<f64>,
	pub doppler_step_hz: f64,
	pub ifreq_hz: f64,
	pub max_dwells: usize,
	pub required_consecutive: usize,

	plan: CorrelatorPlan,
	samples_per_code: usize,

	buffer: Vec<Complex<f64>>,
	buffer_start_idx: usize,
	last_sample_idx: usize,

	dwell_count: usize,
	positive_streak: usize,
	pending: Option<AcquisitionResult>,
	event: Option<AcqEvent>,
	dump: Option<crate::io::TraceDump>,
}

impl PcpsAcquisition {

	pub fn new(signal:SignalType, prn:usize, fs:f64, cfg:&AcquisitionConfig,
	           replica_one_code:Vec<Complex<f64>>, samples_per_code:usize) -> Self {
		let code_period_ms = (signal.code_period_sec() * 1.0e3).round() as usize;
		let code_periods = cfg.coherent_integration_time_ms / code_period_ms;
		let len_fft = samples_per_code * code_periods.max(1);

		// Tile the single-period replica across the whole dwell
		let mut local_code:Vec<Complex<f64>> = Vec::with_capacity(len_fft);
		while local_code.len() < len_fft {
			local_code.extend_from_slice(&replica_one_code);
		}
		local_code.truncate(len_fft);

		let doppler_freqs = super::doppler_bins(cfg.doppler_max_hz, cfg.doppler_step_hz);
		let threshold = match cfg.pfa {
			Some(pfa) => super::threshold_from_pfa(pfa, len_fft, len_fft * doppler_freqs.len()),
			None => cfg.threshold,
		};

		PcpsAcquisition {
			signal, prn, fs,
			state: AcqState::Standby,
			threshold,
			doppler_freqs,
			doppler_step_hz: cfg.doppler_step_hz as f64,
			ifreq_hz: cfg.ifreq_hz as f64,
			max_dwells: cfg.max_dwells.max(1),
			required_consecutive: if cfg.bit_transition_flag { 2 } else { 1 },
			plan: CorrelatorPlan::new(local_code),
			samples_per_code,
			buffer: vec![],
			buffer_start_idx: 0,
			last_sample_idx: 0,
			dwell_count: 0,
			positive_streak: 0,
			pending: None,
			event: None,
			dump: super::open_dump(cfg),
		}
	}

	pub fn start(&mut self) {
		self.state = AcqState::Searching;
		self.buffer.clear();
		self.dwell_count = 0;
		self.positive_streak = 0;
		self.pending = None;
		self.event = None;
	}

	pub fn reset(&mut self) {
		self.state = AcqState::Standby;
		self.buffer.clear();
		self.event = None;
	}

	pub fn provide_sample(&mut self, s:&Sample) {
		if self.state != AcqState::Searching { return; }
		if s.idx <= self.last_sample_idx && s.idx > 0 { return; }
		if self.buffer.is_empty() { self.buffer_start_idx = s.idx; }
		self.last_sample_idx = s.idx;
		self.buffer.push(s.val);
	}

	pub fn poll_event(&mut self) -> Option<AcqEvent> {
		if self.state == AcqState::Searching && self.buffer.len() >= self.plan.len_fft {
			self.run_dwell();
		}
		self.event.take()
	}

	fn run_dwell(&mut self) {
		let len = self.plan.len_fft;
		let block:Vec<Complex<f64>> = self.buffer.drain(..len).collect();
		let dwell_stamp = self.buffer_start_idx;
		self.buffer_start_idx += len;

		let input_power_total:f64 = block.iter().map(|c| c.norm_sqr()).sum();

		let mut best_stat = 0.0f64;
		let mut best_doppler = 0.0f64;
		let mut best_phase = 0usize;
		for freq in self.doppler_freqs.clone() {
			let wiped = super::wipe_carrier(&block, self.fs, self.ifreq_hz + freq);
			let (idx, mag) = self.plan.correlate_peak(&wiped);
			let stat = mag / (input_power_total * (len as f64));
			if stat > best_stat {
				best_stat = stat;
				best_doppler = freq;
				best_phase = idx % self.samples_per_code;
			}
		}

		self.dwell_count += 1;
		super::dump_dwell(&mut self.dump, best_doppler, best_phase, best_stat);

		if best_stat > self.threshold {
			self.positive_streak += 1;
			let result = AcquisitionResult {
				doppler_hz: best_doppler,
				doppler_step_hz: self.doppler_step_hz,
				code_phase_samples: best_phase,
				samplestamp_samples: dwell_stamp,
				test_statistic: best_stat,
			};
			// Keep the strongest dwell of a multi-dwell confirmation
			self.pending = match self.pending {
				Some(prev) if prev.test_statistic >= best_stat => Some(prev),
				_ => Some(result),
			};
			if self.positive_streak >= self.required_consecutive {
				self.state = AcqState::Positive;
				self.event = Some(AcqEvent::Positive(self.pending.take().unwrap()));
			}
		} else {
			self.positive_streak = 0;
			self.pending = None;
			if self.dwell_count >= self.max_dwells {
				self.state = AcqState::Negative;
				self.event = Some(AcqEvent::Negative);
			}
		}
	}

}
