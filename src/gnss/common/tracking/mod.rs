
use std::collections::VecDeque;
use std::f64::consts;

use rustfft::num_complex::Complex;

use crate::{DigSigProcErr, Sample};
use crate::config::TrackingConfig;
use crate::filters::{self, ScalarFilter, SecondOrderFIR, ThirdOrderLoopFilter};
use crate::gnss::synchro::SignalType;
use crate::utils;

pub mod lock_detectors;

pub const DEFAULT_CN0_LO_DB_HZ:f64 = 25.0;
pub const DEFAULT_CN0_HI_DB_HZ:f64 = 30.0;
pub const DEFAULT_CARRIER_LOCK_THRESHOLD:f64 = 0.6;
pub const DEFAULT_LOSS_LIMIT_SYMBOLS:usize = 50;
const LOCK_WINDOW_SYMBOLS:usize = 20;

/// Carrier-to-noise hysteresis state: optimistic above `cn0_hi`, pessimistic
/// below `cn0_lo`, loss declared after `loss_limit` consecutive pessimistic
/// symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
	OptimisticLock,
	PessimisticLock,
}

#[derive(Debug)]
pub enum TrackingResult {
	NotReady,
	/// One prompt correlator output per code period, tagged with the index
	/// of the last sample that went into it.
	Symbol{ prompt:Complex<f64>, symbol_idx:usize },
	Err(DigSigProcErr),
}

/// Closed-loop DLL/PLL tracker, generic over the signal through its code
/// table: ±1 chips for GPS L1 C/A, sub-carrier-modulated half chips for
/// Galileo E1-B.  One loop update per code period.
pub struct Tracking {
	pub signal: SignalType,
	pub prn: usize,
	pub fs: f64,

	// Carrier NCO; the acquisition Doppler is the base rate and the loop
	// filter, which carries its own integrators, supplies the offset
	carrier: Complex<f64>,
	carrier_inc: Complex<f64>,
	carrier_dphase_base_rad: f64,
	carrier_dphase_rad: f64,
	carrier_phase_cycles: f64,

	// Code NCO; phase and rate are in table units (chips or half chips)
	code_phase: f64,
	code_dphase: f64,
	code_table: Vec<f64>,
	table_units_per_sec: f64,
	spacing_units: f64,
	next_block_length: usize,

	carrier_filter: ThirdOrderLoopFilter,
	code_filter: SecondOrderFIR,
	use_atan2: bool,

	sample_buffer: Vec<(Complex<f64>, usize)>,
	prompt_buffer: VecDeque<(Complex<f64>, usize)>,

	lock_state: LockState,
	pessimistic_count: usize,
	pub cn0_lo_db_hz: f64,
	pub cn0_hi_db_hz: f64,
	pub threshold_carrier_lock: f64,
	pub loss_limit_symbols: usize,
	last_cn0_db_hz: f64,
	last_carrier_lock_test: f64,

	// Satellite time of week at the end of the last emitted symbol, once
	// the telemetry decoder has established it
	sv_tow_sec: Option<f64>,

	dump: Option<crate::io::TraceDump>,
}

impl Tracking {

	pub fn last_cn0_db_hz(&self) -> f64 { self.last_cn0_db_hz }
	pub fn last_carrier_lock_test(&self) -> f64 { self.last_carrier_lock_test }
	pub fn lock_state(&self) -> LockState { self.lock_state }
	pub fn carrier_freq_hz(&self) -> f64 { (self.carrier_dphase_rad * self.fs) / (2.0 * consts::PI) }
	pub fn carrier_phase_cycles(&self) -> f64 { self.carrier_phase_cycles }
	pub fn code_phase_samples(&self) -> f64 { self.code_phase / (self.code_dphase.max(1.0e-12)) }
	pub fn sv_tow_sec(&self) -> Option<f64> { self.sv_tow_sec }

	/// Telemetry clock handover: called when a frame boundary fixes the
	/// satellite time of the symbol that just ended.
	pub fn set_sv_tow_sec(&mut self, tow:f64) { self.sv_tow_sec = Some(tow); }

	/// Restarts the loops from a fresh acquisition estimate.
	pub fn initialize(&mut self, acq_doppler_hz:f64) {
		let acq_carrier_rad_per_sec = acq_doppler_hz * 2.0 * consts::PI;
		self.carrier = Complex{ re: 1.0, im: 0.0 };
		self.carrier_dphase_base_rad = acq_carrier_rad_per_sec / self.fs;
		self.carrier_dphase_rad = self.carrier_dphase_base_rad;
		self.carrier_inc = Complex{ re: self.carrier_dphase_rad.cos(), im: -self.carrier_dphase_rad.sin() };
		self.carrier_phase_cycles = 0.0;

		let radial_velocity_factor:f64 = (self.signal.carrier_freq_hz() + acq_doppler_hz) / self.signal.carrier_freq_hz();
		self.code_phase = 0.0;
		self.code_dphase = (radial_velocity_factor * self.table_units_per_sec) / self.fs;
		self.next_block_length = ((self.code_table.len() as f64) / self.code_dphase).floor() as usize;

		self.carrier_filter.initialize();
		self.code_filter.initialize();

		self.sample_buffer.clear();
		self.prompt_buffer.clear();

		self.lock_state = LockState::OptimisticLock;
		self.pessimistic_count = 0;
		self.last_cn0_db_hz = 0.0;
		self.last_carrier_lock_test = 0.0;
		self.sv_tow_sec = None;
	}

	fn correlate_block(&mut self, block:&[Complex<f64>]) -> (Complex<f64>, Complex<f64>, Complex<f64>) {
		let table_len = self.code_table.len();
		let mut early  = Complex{ re: 0.0, im: 0.0 };
		let mut prompt = Complex{ re: 0.0, im: 0.0 };
		let mut late   = Complex{ re: 0.0, im: 0.0 };
		for x in block {
			let early_idx  = utils::wrap_floor(self.code_phase + self.spacing_units, table_len);
			let prompt_idx = utils::wrap_floor(self.code_phase, table_len);
			let late_idx   = utils::wrap_floor(self.code_phase - self.spacing_units, table_len);
			self.code_phase += self.code_dphase;
			early  += self.code_table[early_idx]  * x;
			prompt += self.code_table[prompt_idx] * x;
			late   += self.code_table[late_idx]   * x;
		}
		self.code_phase -= table_len as f64;
		(early, prompt, late)
	}

	fn update_lock_status(&mut self) -> bool {
		if self.prompt_buffer.len() < LOCK_WINDOW_SYMBOLS { return true; }
		let coh_t = self.signal.code_period_sec();
		self.last_cn0_db_hz = lock_detectors::cn0_snv_estimator(&self.prompt_buffer, coh_t);
		self.last_carrier_lock_test = lock_detectors::carrier_lock_detector(&self.prompt_buffer);

		// Hysteresis: only climb back to optimistic above the high threshold
		match self.lock_state {
			LockState::OptimisticLock => {
				if self.last_cn0_db_hz < self.cn0_lo_db_hz || self.last_carrier_lock_test < self.threshold_carrier_lock {
					self.lock_state = LockState::PessimisticLock;
				}
			},
			LockState::PessimisticLock => {
				if self.last_cn0_db_hz > self.cn0_hi_db_hz && self.last_carrier_lock_test >= self.threshold_carrier_lock {
					self.lock_state = LockState::OptimisticLock;
				}
			},
		}

		self.lock_state == LockState::OptimisticLock
	}

	/// Feeds one sample; returns a prompt symbol every code period.
	pub fn apply(&mut self, s:&Sample) -> TrackingResult {
		self.carrier = self.carrier * self.carrier_inc;
		self.carrier_phase_cycles += self.carrier_dphase_rad / (2.0 * consts::PI);
		self.sample_buffer.push((s.val * self.carrier, s.idx));

		if self.sample_buffer.len() < self.next_block_length {
			return TrackingResult::NotReady;
		}

		let block:Vec<Complex<f64>> = self.sample_buffer.iter().map(|(c, _)| *c).collect();
		let symbol_idx = self.sample_buffer.last().map(|(_, i)| *i).unwrap_or(0);
		self.sample_buffer.clear();

		let (early, prompt, late) = self.correlate_block(&block);

		// Costas discriminator; the four-quadrant form is only sound when
		// data transitions are known absent
		let carrier_error_rad = if self.use_atan2 {
			prompt.im.atan2(prompt.re)
		} else if prompt.re == 0.0 {
			0.0
		} else {
			(prompt.im / prompt.re).atan()
		};
		let freq_correction_rad_per_sec = self.carrier_filter.apply(carrier_error_rad);
		self.carrier_dphase_rad = self.carrier_dphase_base_rad + freq_correction_rad_per_sec / self.fs;
		self.carrier_inc = Complex{ re: self.carrier_dphase_rad.cos(), im: -self.carrier_dphase_rad.sin() };

		// Normalized non-coherent early-late discriminator
		let code_error = {
			let e = early.norm();
			let l = late.norm();
			if e + l == 0.0 { 0.0 } else { 0.5 * (e - l) / (e + l) }
		};
		self.code_dphase += self.code_filter.apply(code_error / self.fs);
		self.next_block_length = (((self.code_table.len() as f64) - self.code_phase) / self.code_dphase).ceil().max(1.0) as usize;

		// Keep the carrier from drifting off the unit circle
		self.carrier = self.carrier / self.carrier.norm();

		self.prompt_buffer.push_back((prompt, symbol_idx));
		while self.prompt_buffer.len() > LOCK_WINDOW_SYMBOLS { self.prompt_buffer.pop_front(); }

		if let Some(tow) = self.sv_tow_sec {
			self.sv_tow_sec = Some(tow + self.signal.code_period_sec());
		}

		let dump_carrier_hz = self.carrier_freq_hz();
		let dump_cn0 = self.last_cn0_db_hz;
		if let Some(d) = &mut self.dump {
			if let Err(e) = d.write_record(&[prompt.re, prompt.im, dump_cn0, dump_carrier_hz]) {
				log::warn!("tracking dump write failed: {}", e);
			}
		}

		if self.update_lock_status() {
			if self.pessimistic_count > 0 { self.pessimistic_count -= 1; }
		} else {
			self.pessimistic_count += 1;
			if self.pessimistic_count > self.loss_limit_symbols {
				return TrackingResult::Err(DigSigProcErr::LossOfLock);
			}
		}

		TrackingResult::Symbol{ prompt, symbol_idx }
	}

}

/// Builds a tracker for one PRN of one signal; loop bandwidths come from the
/// tracking configuration, spacing and code tables from the signal.
pub fn new_tracker(signal:SignalType, prn:usize, fs:f64, acq_doppler_hz:f64, cfg:&TrackingConfig) -> Tracking {
	let pdi = signal.code_period_sec();

	let (code_table, table_units_per_sec, spacing_units):(Vec<f64>, f64, f64) = match signal {
		SignalType::GpsL1Ca => {
			let chips:Vec<f64> = crate::gnss::gps_l1_ca::signal::code_chips(prn).iter().map(|&c| c as f64).collect();
			(chips, crate::gnss::gps_l1_ca::CODE_RATE_CHIPS_PER_SEC, 0.5)
		},
		SignalType::GalileoE1B => {
			// Half-chip table carrying the BOC(1,1) sub-carrier sign
			let chips = crate::gnss::galileo_e1::signal::code_chips(prn);
			let mut table:Vec<f64> = Vec::with_capacity(chips.len() * 2);
			for c in chips {
				table.push(c as f64);
				table.push(-(c as f64));
			}
			(table, 2.0 * crate::gnss::galileo_e1::CODE_RATE_CHIPS_PER_SEC, 1.0)
		},
	};

	let (dll_b0, dll_b1) = filters::second_order_loop_coefficients(cfg.dll_bw_hz, pdi);

	let mut trk = Tracking {
		signal, prn, fs,
		carrier: Complex{ re: 1.0, im: 0.0 },
		carrier_inc: Complex{ re: 1.0, im: 0.0 },
		carrier_dphase_base_rad: 0.0,
		carrier_dphase_rad: 0.0,
		carrier_phase_cycles: 0.0,
		code_phase: 0.0,
		code_dphase: 0.0,
		code_table,
		table_units_per_sec,
		spacing_units,
		next_block_length: 0,
		carrier_filter: ThirdOrderLoopFilter::new(cfg.pll_bw_hz, pdi),
		code_filter: SecondOrderFIR::new(dll_b0, dll_b1),
		use_atan2: false,
		sample_buffer: vec![],
		prompt_buffer: VecDeque::new(),
		lock_state: LockState::OptimisticLock,
		pessimistic_count: 0,
		cn0_lo_db_hz: DEFAULT_CN0_LO_DB_HZ,
		cn0_hi_db_hz: DEFAULT_CN0_HI_DB_HZ,
		threshold_carrier_lock: DEFAULT_CARRIER_LOCK_THRESHOLD,
		loss_limit_symbols: DEFAULT_LOSS_LIMIT_SYMBOLS,
		last_cn0_db_hz: 0.0,
		last_carrier_lock_test: 0.0,
		sv_tow_sec: None,
		dump: if cfg.dump {
			match crate::io::TraceDump::create(&cfg.dump_filename) {
				Ok(d) => Some(d),
				Err(e) => { log::warn!("cannot open tracking dump {}: {}", cfg.dump_filename, e); None },
			}
		} else { None },
	};
	trk.initialize(acq_doppler_hz);
	trk
}
