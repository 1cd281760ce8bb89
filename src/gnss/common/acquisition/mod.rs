
use std::f64::consts;
use std::sync::Arc;

use rustfft::{FFTplanner, FFT};
use rustfft::num_complex::Complex;
use rustfft::num_traits::Zero;

use crate::Sample;
use crate::config::{AcqAlgorithm, AcquisitionConfig};
use crate::gnss::synchro::SignalType;

pub mod pcps;
pub mod tong;
pub mod quicksync;

/// Coarse estimate reported on a positive detection.
#[derive(Debug, Clone, Copy)]
pub struct AcquisitionResult {
	pub doppler_hz: f64,
	pub doppler_step_hz: f64,
	pub code_phase_samples: usize,
	pub samplestamp_samples: usize,
	pub test_statistic: f64,
}

/// Outcome of a completed search, consumed by the channel state machine.
#[derive(Debug, Clone, Copy)]
pub enum AcqEvent {
	Positive(AcquisitionResult),
	Negative,
}

/// STANDBY -> SEARCHING on activation; SEARCHING -> POSITIVE | NEGATIVE when
/// the dwell budget resolves; back to STANDBY when the consumer acknowledges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcqState {
	Standby,
	Searching,
	Positive,
	Negative,
}

/// Doppler search bins, `[-doppler_max, +doppler_max]` inclusive in steps of
/// `doppler_step`.
pub fn doppler_bins(doppler_max_hz:i64, doppler_step_hz:i64) -> Vec<f64> {
	assert!(doppler_step_hz > 0);
	let mut bins = vec![];
	let mut doppler = -doppler_max_hz;
	while doppler <= doppler_max_hz {
		bins.push(doppler as f64);
		doppler += doppler_step_hz;
	}
	bins
}

/// Detection threshold for a configured probability of false alarm.  Under
/// H0 each cell statistic is exponential with rate `lambda` (the FFT
/// length), and the grid maximum over `ncells` independent cells must stay
/// below the threshold with probability `1 - pfa`:
/// `thr = Q_exp(lambda)((1 - pfa)^(1/ncells))`.
pub fn threshold_from_pfa(pfa:f64, lambda:usize, ncells:usize) -> f64 {
	assert!(pfa > 0.0 && pfa < 1.0);
	let val = (1.0 - pfa).powf(1.0 / (ncells as f64));
	-(1.0 - val).ln() / (lambda as f64)
}

/// FFT plans plus the frequency-domain conjugate replica shared by every
/// engine variant.  Each engine owns its planner output; the scratch lives
/// and dies with the channel thread.
pub struct CorrelatorPlan {
	pub len_fft: usize,
	pub fft: Arc<dyn FFT<f64>>,
	pub ifft: Arc<dyn FFT<f64>>,
	pub local_code_freq_conj: Vec<Complex<f64>>,
	fft_out: Vec<Complex<f64>>,
	ifft_in: Vec<Complex<f64>>,
	ifft_out: Vec<Complex<f64>>,
}

impl CorrelatorPlan {

	/// Plans forward/inverse FFTs of the replica's length and precomputes
	/// the conjugate code spectrum.
	pub fn new(mut local_code:Vec<Complex<f64>>) -> Self {
		let len_fft = local_code.len();

		let mut planner = FFTplanner::new(false);
		let fft = planner.plan_fft(len_fft);
		let mut code_freq:Vec<Complex<f64>> = vec![Complex::zero(); len_fft];
		fft.process(&mut local_code, &mut code_freq);
		let local_code_freq_conj:Vec<Complex<f64>> = code_freq.iter().map(|p| p.conj()).collect();

		let mut inv_planner = FFTplanner::new(true);
		let ifft = inv_planner.plan_fft(len_fft);

		CorrelatorPlan {
			len_fft, fft, ifft, local_code_freq_conj,
			fft_out:  vec![Complex::zero(); len_fft],
			ifft_in:  vec![Complex::zero(); len_fft],
			ifft_out: vec![Complex::zero(); len_fft],
		}
	}

	/// Circular correlation of `block` (carrier already wiped) against the
	/// local code, returning `(peak_index, peak_magnitude_squared)`.
	pub fn correlate_peak(&mut self, block:&[Complex<f64>]) -> (usize, f64) {
		assert_eq!(block.len(), self.len_fft);
		let mut time_domain:Vec<Complex<f64>> = block.to_vec();
		self.fft.process(&mut time_domain, &mut self.fft_out);

		for i in 0..self.len_fft {
			self.ifft_in[i] = self.fft_out[i] * self.local_code_freq_conj[i];
		}
		self.ifft.process(&mut self.ifft_in, &mut self.ifft_out);

		let norm = self.len_fft as f64;
		let mut peak_idx = 0usize;
		let mut peak_mag = 0.0f64;
		for (idx, c) in self.ifft_out.iter().enumerate() {
			let mag = (c / norm).norm_sqr();
			if mag > peak_mag {
				peak_mag = mag;
				peak_idx = idx;
			}
		}
		(peak_idx, peak_mag)
	}

	/// Per-cell squared magnitudes of the circular correlation, for engines
	/// that score every cell instead of just the peak.
	pub fn correlate_cells(&mut self, block:&[Complex<f64>], out:&mut [f64]) {
		assert_eq!(block.len(), self.len_fft);
		assert_eq!(out.len(), self.len_fft);
		let mut time_domain:Vec<Complex<f64>> = block.to_vec();
		self.fft.process(&mut time_domain, &mut self.fft_out);

		for i in 0..self.len_fft {
			self.ifft_in[i] = self.fft_out[i] * self.local_code_freq_conj[i];
		}
		self.ifft.process(&mut self.ifft_in, &mut self.ifft_out);

		let norm = self.len_fft as f64;
		for (o, c) in out.iter_mut().zip(self.ifft_out.iter()) {
			*o = (c / norm).norm_sqr();
		}
	}

}

/// Removes the intermediate frequency plus a Doppler hypothesis from a block
/// of samples.
pub fn wipe_carrier(block:&[Complex<f64>], fs:f64, freq_hz:f64) -> Vec<Complex<f64>> {
	let phase_step_rad:f64 = (-2.0 * consts::PI * freq_hz) / fs;
	block.iter().enumerate().map(|(idx, x)| {
		let phase = phase_step_rad * (idx as f64);
		x * Complex{ re: phase.cos(), im: phase.sin() }
	}).collect()
}

/// Opens the per-role dwell trace when the configuration asks for one; a
/// failure to open warns and disables the trace rather than aborting.
pub(crate) fn open_dump(cfg:&crate::config::AcquisitionConfig) -> Option<crate::io::TraceDump> {
	if !cfg.dump { return None; }
	match crate::io::TraceDump::create(&cfg.dump_filename) {
		Ok(d) => Some(d),
		Err(e) => { log::warn!("cannot open acquisition dump {}: {}", cfg.dump_filename, e); None },
	}
}

/// One `(doppler, code_phase, statistic)` record per dwell.
pub(crate) fn dump_dwell(dump:&mut Option<crate::io::TraceDump>, doppler_hz:f64, code_phase:usize, statistic:f64) {
	if let Some(d) = dump {
		if let Err(e) = d.write_record(&[doppler_hz, code_phase as f64, statistic]) {
			log::warn!("acquisition dump write failed: {}", e);
		}
	}
}

/// The algorithmic variants behind one common contract, dispatched by tag.
pub enum AcquisitionVariant {
	Pcps(pcps::PcpsAcquisition),
	Tong(tong::TongAcquisition),
	QuickSync(quicksync::QuickSyncAcquisition),
}

impl AcquisitionVariant {

	pub fn start(&mut self) { match self {
		AcquisitionVariant::Pcps(a)      => a.start(),
		AcquisitionVariant::Tong(a)      => a.start(),
		AcquisitionVariant::QuickSync(a) => a.start(),
	}}

	pub fn provide_sample(&mut self, s:&Sample) { match self {
		AcquisitionVariant::Pcps(a)      => a.provide_sample(s),
		AcquisitionVariant::Tong(a)      => a.provide_sample(s),
		AcquisitionVariant::QuickSync(a) => a.provide_sample(s),
	}}

	/// Runs a dwell if one is buffered and returns the search outcome once
	/// the dwell budget resolves.
	pub fn poll_event(&mut self) -> Option<AcqEvent> { match self {
		AcquisitionVariant::Pcps(a)      => a.poll_event(),
		AcquisitionVariant::Tong(a)      => a.poll_event(),
		AcquisitionVariant::QuickSync(a) => a.poll_event(),
	}}

	pub fn reset(&mut self) { match self {
		AcquisitionVariant::Pcps(a)      => a.reset(),
		AcquisitionVariant::Tong(a)      => a.reset(),
		AcquisitionVariant::QuickSync(a) => a.reset(),
	}}

	pub fn state(&self) -> AcqState { match self {
		AcquisitionVariant::Pcps(a)      => a.state,
		AcquisitionVariant::Tong(a)      => a.state,
		AcquisitionVariant::QuickSync(a) => a.state,
	}}

}

/// Builds the configured acquisition variant for one PRN of one signal.
pub fn make_acquisition(signal:SignalType, prn:usize, fs:f64, cfg:&AcquisitionConfig) -> AcquisitionVariant {
	let samples_per_code = (fs * signal.code_period_sec()).round() as usize;
	let replica:Vec<Complex<f64>> = match signal {
		SignalType::GpsL1Ca    => crate::gnss::gps_l1_ca::signal::code_sampled_complex(prn, fs, 0),
		SignalType::GalileoE1B => crate::gnss::galileo_e1::signal::code_sampled_complex(prn, fs, 0, cfg.cboc),
	};

	match cfg.implementation {
		AcqAlgorithm::Pcps      => AcquisitionVariant::Pcps(pcps::PcpsAcquisition::new(signal, prn, fs, cfg, replica, samples_per_code)),
		AcqAlgorithm::Tong      => AcquisitionVariant::Tong(tong::TongAcquisition::new(signal, prn, fs, cfg, replica, samples_per_code)),
		AcqAlgorithm::QuickSync => AcquisitionVariant::QuickSync(quicksync::QuickSyncAcquisition::new(signal, prn, fs, cfg, replica, samples_per_code)),
	}
}
