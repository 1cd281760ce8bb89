
use log::warn;
use rustfft::num_complex::Complex;

use crate::Sample;
use crate::config::AcquisitionConfig;
use crate::gnss::synchro::SignalType;

use super::{AcqEvent, AcqState, AcquisitionResult, CorrelatorPlan};

/// Sparse-FFT (QuickSync) variant: the dwell and the local code are folded by
/// a factor `p` before the FFT, shrinking the transform to `L/p` cells.  A
/// detection in the folded grid leaves `p` delay candidates, disambiguated by
/// direct correlation at full length.  With `p = 1` the algorithm reduces to
/// the plain parallel code-phase search.
pub struct QuickSyncAcquisition {
	pub signal: SignalType,
	pub prn: usize,
	pub fs: f64,
	pub state: AcqState,

	pub threshold: f64,
	pub folding_factor: usize,
	pub doppler_freqs: Vec<f64>,
	pub doppler_step_hz: f64,
	pub ifreq_hz: f64,
	pub max_dwells: usize,
	pub required_consecutive: usize,

	plan: CorrelatorPlan,
	local_code_full: Vec<Complex<f64>>,
	len_full: usize,
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

/// Rounds the dwell length up to the `4 * folding_factor` ms multiple the
/// folding scheme needs, logging the adjustment instead of aborting.
pub fn rounded_sampled_ms(sampled_ms:usize, folding_factor:usize) -> usize {
	let block = 4 * folding_factor.max(1);
	if sampled_ms % block == 0 && sampled_ms > 0 {
		sampled_ms
	} else {
		let rounded = ((sampled_ms / block) + 1) * block;
		warn!("QuickSync needs a coherent integration time that is a multiple of {} ms; using {} ms instead of {}",
			block, rounded, sampled_ms);
		rounded
	}
}

impl QuickSyncAcquisition {

	pub fn new(signal:SignalType, prn:usize, fs:f64, cfg:&AcquisitionConfig,
	           replica_one_code:Vec<Complex<f64>>, samples_per_code:usize) -> Self {
		let p = cfg.folding_factor.max(1);
		let sampled_ms = rounded_sampled_ms(cfg.coherent_integration_time_ms, p);
		let samples_per_ms = (fs * 1.0e-3).round() as usize;
		let len_full = sampled_ms * samples_per_ms;
		let len_folded = len_full / p;

		// Full-length replica, tiled over the dwell
		let mut local_code_full:Vec<Complex<f64>> = Vec::with_capacity(len_full);
		while local_code_full.len() < len_full {
			local_code_full.extend_from_slice(&replica_one_code);
		}
		local_code_full.truncate(len_full);

		let code_folded = fold(&local_code_full, p);

		let doppler_freqs = super::doppler_bins(cfg.doppler_max_hz, cfg.doppler_step_hz);
		let threshold = match cfg.pfa {
			Some(pfa) => super::threshold_from_pfa(pfa, len_folded, len_folded * doppler_freqs.len()),
			None => cfg.threshold,
		};

		QuickSyncAcquisition {
			signal, prn, fs,
			state: AcqState::Standby,
			threshold,
			folding_factor: p,
			doppler_freqs,
			doppler_step_hz: cfg.doppler_step_hz as f64,
			ifreq_hz: cfg.ifreq_hz as f64,
			max_dwells: cfg.max_dwells.max(1),
			required_consecutive: if cfg.bit_transition_flag { 2 } else { 1 },
			plan: CorrelatorPlan::new(code_folded),
			local_code_full,
			len_full,
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
		if self.state == AcqState::Searching && self.buffer.len() >= self.len_full {
			self.run_dwell();
		}
		self.event.take()
	}

	fn run_dwell(&mut self) {
		let block:Vec<Complex<f64>> = self.buffer.drain(..self.len_full).collect();
		let dwell_stamp = self.buffer_start_idx;
		self.buffer_start_idx += self.len_full;

		let p = self.folding_factor;
		let len_folded = self.plan.len_fft;

		let mut best_stat = 0.0f64;
		let mut best_doppler = 0.0f64;
		let mut best_folded_idx = 0usize;
		let mut best_wiped:Vec<Complex<f64>> = vec![];
		for freq in self.doppler_freqs.clone() {
			let wiped = super::wipe_carrier(&block, self.fs, self.ifreq_hz + freq);
			let folded = fold(&wiped, p);
			let input_power_total:f64 = folded.iter().map(|c| c.norm_sqr()).sum();
			let (idx, mag) = self.plan.correlate_peak(&folded);
			let stat = mag / (input_power_total * (len_folded as f64));
			if stat > best_stat {
				best_stat = stat;
				best_doppler = freq;
				best_folded_idx = idx;
				best_wiped = wiped;
			}
		}

		self.dwell_count += 1;
		super::dump_dwell(&mut self.dump, best_doppler, best_folded_idx, best_stat);

		if best_stat > self.threshold {
			// The folded peak is ambiguous among p delays; resolve by direct
			// correlation of the unfolded dwell against each candidate shift
			let code_phase = self.disambiguate(&best_wiped, best_folded_idx);

			self.positive_streak += 1;
			let result = AcquisitionResult {
				doppler_hz: best_doppler,
				doppler_step_hz: self.doppler_step_hz,
				code_phase_samples: code_phase % self.samples_per_code,
				samplestamp_samples: dwell_stamp,
				test_statistic: best_stat,
			};
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

	fn disambiguate(&self, wiped:&[Complex<f64>], folded_idx:usize) -> usize {
		let len_folded = self.len_full / self.folding_factor;
		let mut best_delay = folded_idx;
		let mut best_mag = 0.0f64;
		for m in 0..self.folding_factor {
			let delay = folded_idx + m * len_folded;
			let mut acc = Complex{ re: 0.0f64, im: 0.0f64 };
			for i in 0..self.len_full {
				acc += wiped[i] * self.local_code_full[(i + self.len_full - delay) % self.len_full].conj();
			}
			let mag = acc.norm_sqr();
			if mag > best_mag {
				best_mag = mag;
				best_delay = delay;
			}
		}
		best_delay
	}

}

/// Sums `p` equal segments of `x` element-wise, shrinking it to `len / p`.
fn fold(x:&[Complex<f64>], p:usize) -> Vec<Complex<f64>> {
	let len_folded = x.len() / p;
	let mut out = vec![Complex{ re: 0.0f64, im: 0.0f64 }; len_folded];
	for seg in 0..p {
		for i in 0..len_folded {
			out[i] += x[seg * len_folded + i];
		}
	}
	out
}
