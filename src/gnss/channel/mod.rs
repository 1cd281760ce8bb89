
use std::collections::VecDeque;

use log::{debug, info};

use crate::Sample;
use crate::config::{AcquisitionConfig, TrackingConfig};
use crate::gnss::common::acquisition::{self, AcqEvent, AcquisitionVariant};
use crate::gnss::common::tracking::{self, Tracking, TrackingResult};
use crate::gnss::galileo_e1::telemetry_decode as galileo_tlm;
use crate::gnss::gps_l1_ca::ephemeris as gps_eph;
use crate::gnss::gps_l1_ca::telemetry_decode as gps_tlm;
use crate::gnss::gps_l1_ca::telemetry_decode::subframe::{Subframe4Page, Subframe5Page, SubframeBody};
use crate::gnss::repository::NavDataRepository;
use crate::gnss::synchro::{GnssSynchro, SignalType};

/// Channel lifecycle; the transitions are driven by acquisition, tracking
/// and telemetry outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
	Idle,
	Acquiring,
	/// Acquired but still slewing the sample stream to the code boundary
	Acquired{ pull_in_remaining:usize },
	Tracking,
	TelemetrySync,
	Delivering,
	Lost,
}

/// Cross-channel notifications consumed by the controller and the front-end.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
	AcquisitionPositive{ prn:usize, doppler_hz:f64, test_statistic:f64 },
	AcquisitionNegative{ prn:usize, retries_left:usize },
	TrackingLocked{ prn:usize },
	FrameSync{ prn:usize },
	EphemerisComplete{ prn:usize },
	LossOfLock{ prn:usize },
	ChannelFreed,
}

enum TelemetryChain {
	Gps {
		decoder: gps_tlm::TelemetryDecoder,
		last_sf1: Option<gps_tlm::subframe::Subframe1>,
		last_sf2: Option<gps_tlm::subframe::Subframe2>,
		last_sf3: Option<gps_tlm::subframe::Subframe3>,
		almanac: gps_eph::Almanac,
	},
	Galileo {
		decoder: galileo_tlm::TelemetryDecoder,
		assembler: galileo_tlm::InavAssembler,
	},
}

/// One receiver channel: the acquisition, tracking and telemetry pipeline
/// for a single signal, bound to one PRN at a time.
pub struct Channel {
	pub channel_id: usize,
	pub signal: SignalType,
	pub fs: f64,

	state: ChannelState,
	prn: usize,
	candidates: VecDeque<usize>,
	retries: usize,
	retry_cap: usize,

	acq: AcquisitionVariant,
	trk: Tracking,
	tlm: TelemetryChain,
	acq_cfg: AcquisitionConfig,
	trk_cfg: TrackingConfig,

	repository: NavDataRepository,
	synchro: GnssSynchro,
	last_sample_idx: usize,
}

impl Channel {

	pub fn new(channel_id:usize, signal:SignalType, fs:f64,
	           candidates:Vec<usize>, retry_cap:usize,
	           acq_cfg:AcquisitionConfig, trk_cfg:TrackingConfig,
	           repository:NavDataRepository) -> Self {
		assert!(!candidates.is_empty(), "a channel needs at least one candidate PRN");
		let candidates:VecDeque<usize> = candidates.into();
		// The first start_acquisition call binds the list head
		let prn = *candidates.front().unwrap();

		let acq = acquisition::make_acquisition(signal, prn, fs, &acq_cfg);
		let trk = tracking::new_tracker(signal, prn, fs, 0.0, &trk_cfg);
		let tlm = match signal {
			SignalType::GpsL1Ca => TelemetryChain::Gps {
				decoder: gps_tlm::TelemetryDecoder::new(),
				last_sf1: None, last_sf2: None, last_sf3: None,
				almanac: gps_eph::Almanac::default(),
			},
			SignalType::GalileoE1B => TelemetryChain::Galileo {
				decoder: galileo_tlm::TelemetryDecoder::new(),
				assembler: galileo_tlm::InavAssembler::new(),
			},
		};

		Channel {
			channel_id, signal, fs,
			state: ChannelState::Idle,
			prn,
			candidates,
			retries: 0,
			retry_cap,
			acq, trk, tlm,
			acq_cfg, trk_cfg,
			repository,
			synchro: GnssSynchro::new(channel_id, prn, signal),
			last_sample_idx: 0,
		}
	}

	pub fn state(&self) -> ChannelState { self.state }
	pub fn prn(&self) -> usize { self.prn }
	pub fn synchro(&self) -> GnssSynchro { self.synchro }
	pub fn cn0_db_hz(&self) -> f64 { self.trk.last_cn0_db_hz() }

	/// IDLE -> ACQUIRING with the next candidate PRN.
	pub fn start_acquisition(&mut self) {
		let prn = self.candidates.pop_front().unwrap();
		self.candidates.push_back(prn);
		self.bind_prn(prn);
		self.retries = 0;
		self.state = ChannelState::Acquiring;
		self.acq.start();
		debug!("channel {} starts acquisition of {:?} PRN {}", self.channel_id, self.signal, prn);
	}

	fn bind_prn(&mut self, prn:usize) {
		self.prn = prn;
		self.acq = acquisition::make_acquisition(self.signal, prn, self.fs, &self.acq_cfg);
		self.trk = tracking::new_tracker(self.signal, prn, self.fs, 0.0, &self.trk_cfg);
		match &mut self.tlm {
			TelemetryChain::Gps { decoder, last_sf1, last_sf2, last_sf3, .. } => {
				decoder.initialize();
				*last_sf1 = None;
				*last_sf2 = None;
				*last_sf3 = None;
			},
			TelemetryChain::Galileo { decoder, assembler } => {
				decoder.initialize();
				assembler.reset();
			},
		}
		self.synchro = GnssSynchro::new(self.channel_id, prn, self.signal);
	}

	/// Feeds one sample through whatever stage the channel is in; any state
	/// transitions come back as events.
	pub fn apply(&mut self, s:&Sample) -> Vec<ChannelEvent> {
		if s.idx <= self.last_sample_idx && s.idx > 0 { return vec![]; }
		self.last_sample_idx = s.idx;
		let mut events = vec![];

		match self.state {
			ChannelState::Idle => {
				// The controller decides when an idle channel goes back to work
			},
			ChannelState::Lost => {
				self.state = ChannelState::Idle;
				events.push(ChannelEvent::ChannelFreed);
			},
			ChannelState::Acquiring => {
				self.acq.provide_sample(s);
				match self.acq.poll_event() {
					Some(AcqEvent::Positive(result)) => {
						info!("channel {} acquired {:?} PRN {}: {:.1} Hz, code phase {} samples, statistic {:.4}",
							self.channel_id, self.signal, self.prn,
							result.doppler_hz, result.code_phase_samples, result.test_statistic);

						self.synchro.acq_doppler_hz = result.doppler_hz;
						self.synchro.acq_delay_samples = result.code_phase_samples as f64;
						self.synchro.acq_samplestamp_samples = result.samplestamp_samples;

						self.trk.initialize(result.doppler_hz);

						// Slew to the next code-period boundary so tracking
						// starts aligned
						let samples_per_code = (self.fs * self.signal.code_period_sec()).round() as usize;
						let code_start = result.samplestamp_samples + result.code_phase_samples;
						let since_boundary = (s.idx + 1).saturating_sub(code_start) % samples_per_code;
						let pull_in = (samples_per_code - since_boundary) % samples_per_code;

						self.acq.reset();
						self.state = if pull_in == 0 {
							ChannelState::Tracking
						} else {
							ChannelState::Acquired{ pull_in_remaining: pull_in }
						};
						events.push(ChannelEvent::AcquisitionPositive{
							prn: self.prn,
							doppler_hz: result.doppler_hz,
							test_statistic: result.test_statistic,
						});
					},
					Some(AcqEvent::Negative) => {
						self.acq.reset();
						if self.retries < self.retry_cap {
							self.retries += 1;
							let prn = self.candidates.pop_front().unwrap();
							self.candidates.push_back(prn);
							debug!("channel {} acquisition negative on PRN {}, advancing to PRN {}", self.channel_id, self.prn, prn);
							self.bind_prn(prn);
							self.state = ChannelState::Acquiring;
							self.acq.start();
							events.push(ChannelEvent::AcquisitionNegative{
								prn: self.prn,
								retries_left: self.retry_cap - self.retries,
							});
						} else {
							debug!("channel {} exhausted its acquisition retries", self.channel_id);
							self.state = ChannelState::Lost;
							events.push(ChannelEvent::AcquisitionNegative{ prn: self.prn, retries_left: 0 });
							events.push(ChannelEvent::LossOfLock{ prn: self.prn });
						}
					},
					None => {},
				}
			},
			ChannelState::Acquired{ pull_in_remaining } => {
				self.state = if pull_in_remaining <= 1 {
					events.push(ChannelEvent::TrackingLocked{ prn: self.prn });
					ChannelState::Tracking
				} else {
					ChannelState::Acquired{ pull_in_remaining: pull_in_remaining - 1 }
				};
			},
			ChannelState::Tracking | ChannelState::TelemetrySync | ChannelState::Delivering => {
				match self.trk.apply(s) {
					TrackingResult::NotReady => {},
					TrackingResult::Symbol{ prompt, symbol_idx } => {
						self.update_synchro(prompt, symbol_idx);
						events.extend(self.feed_telemetry(prompt, symbol_idx));
					},
					TrackingResult::Err(_) => {
						info!("channel {} lost lock on {:?} PRN {}", self.channel_id, self.signal, self.prn);
						self.synchro.flag_valid_pseudorange = false;
						self.state = ChannelState::Lost;
						events.push(ChannelEvent::LossOfLock{ prn: self.prn });
					},
				}
			},
		}

		events
	}

	fn update_synchro(&mut self, prompt:rustfft::num_complex::Complex<f64>, symbol_idx:usize) {
		self.synchro.prompt_i = prompt.re;
		self.synchro.prompt_q = prompt.im;
		self.synchro.carrier_doppler_hz = self.trk.carrier_freq_hz();
		self.synchro.carrier_phase_cycles = self.trk.carrier_phase_cycles();
		self.synchro.code_phase_samples = self.trk.code_phase_samples();
		self.synchro.cn0_db_hz = self.trk.last_cn0_db_hz();
		self.synchro.symbol_samplestamp_samples = symbol_idx;

		match self.trk.sv_tow_sec() {
			Some(tow) => {
				self.synchro.tow_at_current_symbol_s = tow;
				self.synchro.flag_valid_pseudorange = self.state == ChannelState::Delivering;
			},
			None => {
				self.synchro.flag_valid_pseudorange = false;
			},
		}
	}

	fn feed_telemetry(&mut self, prompt:rustfft::num_complex::Complex<f64>, symbol_idx:usize) -> Vec<ChannelEvent> {
		let mut events = vec![];
		let prn = self.prn;
		let repository = self.repository.clone();

		match &mut self.tlm {
			TelemetryChain::Gps { decoder, last_sf1, last_sf2, last_sf3, almanac } => {
				match decoder.apply(prompt, symbol_idx) {
					gps_tlm::TelemetryDecoderResult::NotReady => {},
					gps_tlm::TelemetryDecoderResult::Err(_) => {
						// Frame trouble costs the subframe, not the channel;
						// resynchronize from the preamble search
						decoder.initialize();
					},
					gps_tlm::TelemetryDecoderResult::Frame(sf, _) => {
						if self.state == ChannelState::Tracking {
							self.state = ChannelState::TelemetrySync;
							events.push(ChannelEvent::FrameSync{ prn });
						}

						// The HOW names the start of the next subframe, which
						// is the symbol boundary that just passed
						self.trk.set_sv_tow_sec(sf.time_of_week());

						match sf.body {
							SubframeBody::Subframe1(sf1) => { *last_sf1 = Some(sf1); },
							SubframeBody::Subframe2(sf2) => { *last_sf2 = Some(sf2); },
							SubframeBody::Subframe3(sf3) => {
								*last_sf3 = Some(sf3);
								if let (Some(sf1), Some(sf2)) = (last_sf1.as_ref(), last_sf2.as_ref()) {
									if let Some(eph) = gps_eph::Ephemeris::assemble(sf1, sf2, &sf3) {
										repository.write_gps_ephemeris(prn, eph);
										if self.state == ChannelState::TelemetrySync {
											self.state = ChannelState::Delivering;
											events.push(ChannelEvent::EphemerisComplete{ prn });
										}
									}
								}
							},
							SubframeBody::Subframe4(sf4) => {
								match sf4.page {
									Subframe4Page::IonoUtc{ alpha0, alpha1, alpha2, alpha3, beta0, beta1, beta2, beta3,
											a1, a0, t_ot, wn_t, delta_t_ls, wn_lsf, dn, delta_t_lsf } => {
										repository.write_gps_iono(gps_eph::IonoParams{ alpha0, alpha1, alpha2, alpha3, beta0, beta1, beta2, beta3 });
										repository.write_gps_utc(gps_eph::UtcModel{ a0, a1, t_ot, wn_t, delta_t_ls, wn_lsf, dn, delta_t_lsf });
									},
									Subframe4Page::Almanac(entry) => {
										almanac.entries.insert(entry.sv_id, entry);
										repository.write_gps_almanac(almanac.clone());
									},
									Subframe4Page::Reserved => {},
								}
							},
							SubframeBody::Subframe5(sf5) => {
								match sf5.page {
									Subframe5Page::Almanac(entry) => {
										almanac.entries.insert(entry.sv_id, entry);
										repository.write_gps_almanac(almanac.clone());
									},
									Subframe5Page::Page25{ t_oa, wn_a } => {
										almanac.t_oa = t_oa;
										almanac.wn_a = wn_a;
										repository.write_gps_almanac(almanac.clone());
									},
								}
							},
						}
					},
				}
			},
			TelemetryChain::Galileo { decoder, assembler } => {
				match decoder.apply(prompt, symbol_idx) {
					galileo_tlm::TelemetryDecoderResult::NotReady => {},
					galileo_tlm::TelemetryDecoderResult::Err(_) => {},
					galileo_tlm::TelemetryDecoderResult::Word{ word, tow_handover, .. } => {
						if self.state == ChannelState::Tracking {
							self.state = ChannelState::TelemetrySync;
							events.push(ChannelEvent::FrameSync{ prn });
						}
						if let Some(tow) = tow_handover {
							self.trk.set_sv_tow_sec(tow);
						}
						match assembler.feed(word) {
							galileo_tlm::FeedOutcome::Nothing => {},
							galileo_tlm::FeedOutcome::Ephemeris(eph, iono) => {
								repository.write_galileo_ephemeris(prn, eph);
								repository.write_galileo_iono(iono);
								if self.state == ChannelState::TelemetrySync {
									self.state = ChannelState::Delivering;
									events.push(ChannelEvent::EphemerisComplete{ prn });
								}
							},
							galileo_tlm::FeedOutcome::Utc(utc) => {
								repository.write_galileo_utc(utc);
							},
							galileo_tlm::FeedOutcome::Almanac(alm) => {
								repository.write_galileo_almanac(alm);
							},
						}
					},
				}
			},
		}

		events
	}

}

#[cfg(test)]
mod tests {

	use crate::config::Config;
	use crate::gnss::common::acquisition::AcqState;

	use super::*;

	fn gps_channel(candidates:Vec<usize>, retry_cap:usize) -> Channel {
		let cfg = Config::from_str("Acquisition_GPS.max_dwells=1\nAcquisition_GPS.doppler_max=1000\nAcquisition_GPS.doppler_step=500\n").unwrap();
		Channel::new(0, SignalType::GpsL1Ca, 1.023e6, candidates, retry_cap,
			cfg.gps_acquisition, cfg.gps_tracking, NavDataRepository::new())
	}

	fn feed_prn_codes(ch:&mut Channel, prn:usize, n_codes:usize, start_idx:usize) -> (usize, Vec<ChannelEvent>) {
		let fs = 1.023e6;
		let code = crate::gnss::gps_l1_ca::signal::code_sampled_complex(prn, fs, 0);
		let mut events = vec![];
		let mut idx = start_idx;
		for _ in 0..n_codes {
			for i in 0..code.len() {
				let s = Sample{ val: code[i] * 50.0, idx };
				events.extend(ch.apply(&s));
				idx += 1;
			}
		}
		(idx, events)
	}

	#[test]
	fn idle_until_started_then_acquires_and_tracks() {
		let mut ch = gps_channel(vec![13], 2);
		assert_eq!(ch.state(), ChannelState::Idle);

		ch.start_acquisition();
		assert_eq!(ch.state(), ChannelState::Acquiring);

		let (idx, events) = feed_prn_codes(&mut ch, 13, 2, 0);
		assert!(events.iter().any(|e| matches!(e, ChannelEvent::AcquisitionPositive{ prn: 13, .. })),
			"events were {:?}", events);

		// With a zero code phase the channel drops straight into tracking
		// and symbols start flowing
		let (_, events) = feed_prn_codes(&mut ch, 13, 25, idx);
		assert!(matches!(ch.state(), ChannelState::Tracking | ChannelState::Acquired{..}));
		assert!(!events.iter().any(|e| matches!(e, ChannelEvent::LossOfLock{..})));
		assert!(ch.cn0_db_hz() > 40.0);
	}

	#[test]
	fn negative_acquisition_advances_the_candidate_list() {
		let mut ch = gps_channel(vec![4, 9, 27], 2);
		ch.start_acquisition();
		assert_eq!(ch.prn(), 4);

		// Feed a PRN no candidate matches; each dwell goes negative and the
		// channel walks its list
		let (idx, events) = feed_prn_codes(&mut ch, 30, 1, 0);
		assert!(events.iter().any(|e| matches!(e, ChannelEvent::AcquisitionNegative{..})), "events were {:?}", events);
		assert_eq!(ch.prn(), 9);

		let (idx2, _) = feed_prn_codes(&mut ch, 30, 1, idx);
		assert_eq!(ch.prn(), 27);

		// Third failure exhausts the retry cap
		let (_, events) = feed_prn_codes(&mut ch, 30, 1, idx2);
		assert!(events.iter().any(|e| matches!(e, ChannelEvent::LossOfLock{..})), "events were {:?}", events);
		assert_eq!(ch.state(), ChannelState::Lost);

		// The lost channel frees itself on the next sample
		let (_, events) = feed_prn_codes(&mut ch, 30, 1, 100_000_000);
		assert!(events.iter().any(|e| matches!(e, ChannelEvent::ChannelFreed)));
		assert_eq!(ch.state(), ChannelState::Idle);
	}

	#[test]
	fn synchro_stays_invalid_without_ephemeris() {
		let mut ch = gps_channel(vec![21], 1);
		ch.start_acquisition();
		let (idx, _) = feed_prn_codes(&mut ch, 21, 2, 0);
		let (_, _) = feed_prn_codes(&mut ch, 21, 30, idx);
		// Tracking fine, but no telemetry decoded: the pseudorange must not
		// be flagged valid
		assert!(!ch.synchro().flag_valid_pseudorange);
	}

	#[test]
	fn acquisition_state_machine_returns_to_standby_after_ack() {
		let cfg = Config::from_str("Acquisition_GPS.doppler_max=500\nAcquisition_GPS.doppler_step=500\n").unwrap();
		let fs = 1.023e6;
		let mut acq = acquisition::make_acquisition(SignalType::GpsL1Ca, 3, fs, &cfg.gps_acquisition);
		assert_eq!(acq.state(), AcqState::Standby);
		acq.start();
		assert_eq!(acq.state(), AcqState::Searching);

		let code = crate::gnss::gps_l1_ca::signal::code_sampled_complex(3, fs, 0);
		for (idx, c) in code.iter().enumerate() {
			acq.provide_sample(&Sample{ val: *c * 10.0, idx });
		}
		assert!(matches!(acq.poll_event(), Some(AcqEvent::Positive(_))));
		assert_eq!(acq.state(), AcqState::Positive);
		acq.reset();
		assert_eq!(acq.state(), AcqState::Standby);
	}

}
