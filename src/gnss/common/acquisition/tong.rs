
use rustfft::num_complex::Complex;

use crate::Sample;
use crate::config::AcquisitionConfig;
use crate::gnss::synchro::SignalType;

use super::{AcqEvent, AcqState, AcquisitionResult, CorrelatorPlan};

/// Tong-detector variant of the parallel code-phase search.  Every grid cell
/// carries a counter seeded at `tong_init_val`; a dwell increments the
/// counters of cells above threshold and decrements the rest.  Detection is
/// declared only when a cell reaches `tong_max_val`, which trades latency for
/// a lower false-alarm rate.
pub struct TongAcquisition {
	pub signal: SignalType,
	pub prn: usize,
	pub fs: f64,
	pub state: AcqState,

	pub threshold: f64,
	pub doppler_freqs: Vec<f64>,
	pub doppler_step_hz: f64,
	pub ifreq_hz: f64,
	pub max_dwells: usize,
	pub tong_init_val: u32,
	pub tong_max_val: u32,

	plan: CorrelatorPlan,
	samples_per_code: usize,

	counters: Vec<u32>,
	cell_mags: Vec<f64>,

	buffer: Vec<Complex<f64>>,
	buffer_start_idx: usize,
	last_sample_idx: usize,

	dwell_count: usize,
	event: Option<AcqEvent>,
	dump: Option<crate::io::TraceDump>,
}

impl TongAcquisition {

	pub fn new(signal:SignalType, prn:usize, fs:f64, cfg:&AcquisitionConfig,
	           replica_one_code:Vec<Complex<f64>>, samples_per_code:usize) -> Self {
		let code_period_ms = (signal.code_period_sec() * 1.0e3).round() as usize;
		let code_periods = cfg.coherent_integration_time_ms / code_period_ms;
		let len_fft = samples_per_code * code_periods.max(1);

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
		let n_cells = len_fft * doppler_freqs.len();

		TongAcquisition {
			signal, prn, fs,
			state: AcqState::Standby,
			threshold,
			doppler_freqs,
			doppler_step_hz: cfg.doppler_step_hz as f64,
			ifreq_hz: cfg.ifreq_hz as f64,
			// The Tong detector needs several dwells to saturate a counter
			max_dwells: cfg.max_dwells.max(cfg.tong_max_val.max(2)),
			tong_init_val: cfg.tong_init_val as u32,
			tong_max_val: cfg.tong_max_val as u32,
			plan: CorrelatorPlan::new(local_code),
			samples_per_code,
			counters: vec![cfg.tong_init_val as u32; n_cells],
			cell_mags: vec![0.0; len_fft],
			buffer: vec![],
			buffer_start_idx: 0,
			last_sample_idx: 0,
			dwell_count: 0,
			event: None,
			dump: super::open_dump(cfg),
		}
	}

	pub fn start(&mut self) {
		self.state = AcqState::Searching;
		self.buffer.clear();
		self.dwell_count = 0;
		self.event = None;
		for c in self.counters.iter_mut() { *c = self.tong_init_val; }
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
		let stat_scale = 1.0 / (input_power_total * (len as f64));

		let mut winner:Option<(usize, usize, f64)> = None;	// (bin, cell, stat)

		for (bin, freq) in self.doppler_freqs.clone().into_iter().enumerate() {
			let wiped = super::wipe_carrier(&block, self.fs, self.ifreq_hz + freq);
			let mut cell_mags = std::mem::take(&mut self.cell_mags);
			self.plan.correlate_cells(&wiped, &mut cell_mags);

			for (cell, mag) in cell_mags.iter().enumerate() {
				let stat = mag * stat_scale;
				let counter = &mut self.counters[bin * len + cell];
				if stat > self.threshold {
					*counter += 1;
					if *counter >= self.tong_max_val {
						match winner {
							Some((_, _, best)) if best >= stat => {},
							_ => winner = Some((bin, cell, stat)),
						}
					}
				} else if *counter > 0 {
					*counter -= 1;
				}
			}
			self.cell_mags = cell_mags;
		}

		self.dwell_count += 1;

		if let Some((bin, cell, stat)) = winner {
			super::dump_dwell(&mut self.dump, self.doppler_freqs[bin], cell % self.samples_per_code, stat);
			self.state = AcqState::Positive;
			self.event = Some(AcqEvent::Positive(AcquisitionResult {
				doppler_hz: self.doppler_freqs[bin],
				doppler_step_hz: self.doppler_step_hz,
				code_phase_samples: cell % self.samples_per_code,
				samplestamp_samples: dwell_stamp,
				test_statistic: stat,
			}));
		} else if self.dwell_count >= self.max_dwells {
			self.state = AcqState::Negative;
			self.event = Some(AcqEvent::Negative);
		}
	}

}
