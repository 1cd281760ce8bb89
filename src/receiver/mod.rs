
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver as ChannelReceiver, Sender};
use log::{info, warn};

use crate::Sample;
use crate::config::Config;
use crate::gnss::channel::{Channel, ChannelEvent};
use crate::gnss::observables::ObservablesAligner;
use crate::gnss::pvt::{NoFixReason, PvtSolution, PvtSolver};
use crate::gnss::repository::NavDataRepository;
use crate::gnss::synchro::{GnssSynchro, SignalType};
use crate::io::ObservablesDump;
use crate::rinex::RinexPrinter;

const SAMPLE_BATCH:usize = 2048;
const CHANNEL_DEPTH:usize = 8;

enum FeedMsg {
	Samples(Arc<Vec<Sample>>),
	/// Barrier mark: every sample before `epoch_sample` has been delivered
	Epoch(usize),
}

enum WorkerMsg {
	Synchro(GnssSynchro),
	Event(usize, ChannelEvent),
	EpochDone{ epoch_sample:usize },
}

/// What one run produced, for the front-end to report on.
pub struct ReceiverReport {
	pub fixes: Vec<PvtSolution>,
	pub no_fix_epochs: Vec<(f64, NoFixReason)>,
	pub events: Vec<(usize, ChannelEvent)>,
	pub samples_processed: usize,
}

/// The assembled receiver: one worker thread per channel pipeline, a PVT
/// thread owning the aligner, the solver, the RINEX emitter and the
/// observables dump.  Bounded channels give backpressure end to end.
pub struct Receiver {
	config: Config,
	repository: NavDataRepository,
	channel_plan: Vec<SignalType>,
}

impl Receiver {

	pub fn new(config:Config, repository:NavDataRepository, n_gps_channels:usize, n_galileo_channels:usize) -> Self {
		let mut channel_plan = vec![];
		channel_plan.extend(std::iter::repeat(SignalType::GpsL1Ca).take(n_gps_channels));
		channel_plan.extend(std::iter::repeat(SignalType::GalileoE1B).take(n_galileo_channels));
		assert!(!channel_plan.is_empty(), "a receiver needs at least one channel");
		Receiver { config, repository, channel_plan }
	}

	pub fn repository(&self) -> NavDataRepository { self.repository.clone() }

	fn build_channel(&self, channel_id:usize, signal:SignalType) -> Channel {
		let fs = self.config.fs_sps();
		let (candidates, acq_cfg, trk_cfg) = match signal {
			SignalType::GpsL1Ca => (
				self.config.channels.gps_prn_list.clone(),
				self.config.gps_acquisition.clone(),
				self.config.gps_tracking.clone()),
			SignalType::GalileoE1B => (
				self.config.channels.galileo_prn_list.clone(),
				self.config.galileo_acquisition.clone(),
				self.config.galileo_tracking.clone()),
		};
		// Stagger the candidate lists so parallel channels do not chase the
		// same PRN
		let mut candidates = candidates;
		if !candidates.is_empty() {
			let rot = channel_id % candidates.len();
			candidates.rotate_left(rot);
		}
		Channel::new(channel_id, signal, fs, candidates, self.config.channels.retry_cap, acq_cfg, trk_cfg, self.repository.clone())
	}

	/// Runs the whole dataflow over a sample stream until it ends, then
	/// drains and joins every stage.
	pub fn run<I: Iterator<Item=Sample>>(&mut self, samples:I) -> ReceiverReport {
		let n_channels = self.channel_plan.len();
		let fs = self.config.fs_sps();
		let epoch_interval_samples = ((self.config.pvt.output_rate_ms as f64) * 1.0e-3 * fs).round() as usize;
		let hybrid = self.channel_plan.iter().any(|s| *s == SignalType::GpsL1Ca)
			&& self.channel_plan.iter().any(|s| *s == SignalType::GalileoE1B);

		let (tx_worker_out, rx_worker_out) = bounded::<WorkerMsg>(n_channels * CHANNEL_DEPTH * 4);

		// Channel worker threads, one pipeline each
		let mut feeders:Vec<Sender<FeedMsg>> = vec![];
		let mut worker_handles = vec![];
		for (channel_id, signal) in self.channel_plan.iter().enumerate() {
			let (tx_feed, rx_feed) = bounded::<FeedMsg>(CHANNEL_DEPTH);
			let mut channel = self.build_channel(channel_id, *signal);
			let tx_out = tx_worker_out.clone();
			feeders.push(tx_feed);
			worker_handles.push(thread::spawn(move || {
				channel.start_acquisition();
				for msg in rx_feed.iter() {
					match msg {
						FeedMsg::Samples(batch) => {
							for s in batch.iter() {
								for event in channel.apply(s) {
									if let ChannelEvent::ChannelFreed = event {
										channel.start_acquisition();
									}
									if tx_out.send(WorkerMsg::Event(channel.channel_id, event)).is_err() { return; }
								}
							}
							if tx_out.send(WorkerMsg::Synchro(channel.synchro())).is_err() { return; }
						},
						FeedMsg::Epoch(epoch_sample) => {
							if tx_out.send(WorkerMsg::EpochDone{ epoch_sample }).is_err() { return; }
						},
					}
				}
			}));
		}
		drop(tx_worker_out);

		// PVT thread: aligner, solver, emitters
		let pvt_handle = {
			let repository = self.repository.clone();
			let pvt_cfg = self.config.pvt.clone();
			let rinex_version = self.config.rinex.version;
			thread::spawn(move || {
				run_pvt_loop(rx_worker_out, repository, pvt_cfg, rinex_version, n_channels, fs, hybrid)
			})
		};

		// Sample fan-out with batches cut at epoch boundaries
		let mut batch:Vec<Sample> = Vec::with_capacity(SAMPLE_BATCH);
		let mut samples_processed = 0usize;
		let mut next_epoch = epoch_interval_samples;
		for s in samples {
			let idx = s.idx;
			batch.push(s);
			samples_processed += 1;

			let at_epoch = idx + 1 >= next_epoch;
			if batch.len() >= SAMPLE_BATCH || at_epoch {
				let shared = Arc::new(std::mem::replace(&mut batch, Vec::with_capacity(SAMPLE_BATCH)));
				for tx in feeders.iter() {
					if tx.send(FeedMsg::Samples(shared.clone())).is_err() {
						warn!("a channel worker ended early");
					}
				}
			}
			if at_epoch {
				for tx in feeders.iter() {
					let _ = tx.send(FeedMsg::Epoch(next_epoch));
				}
				next_epoch += epoch_interval_samples;
			}
		}
		if !batch.is_empty() {
			let shared = Arc::new(batch);
			for tx in feeders.iter() {
				let _ = tx.send(FeedMsg::Samples(shared.clone()));
			}
		}

		// Closing the feeders drains the workers; the PVT loop ends when the
		// last worker sender drops
		drop(feeders);
		for h in worker_handles { let _ = h.join(); }
		let (fixes, no_fix_epochs, events) = pvt_handle.join().expect("PVT thread panicked");

		ReceiverReport { fixes, no_fix_epochs, events, samples_processed }
	}

}

fn run_pvt_loop(rx:ChannelReceiver<WorkerMsg>, repository:NavDataRepository,
		pvt_cfg:crate::config::PvtConfig, rinex_version:u8,
		n_channels:usize, fs:f64, hybrid:bool)
		-> (Vec<PvtSolution>, Vec<(f64, NoFixReason)>, Vec<(usize, ChannelEvent)>) {

	let mut aligner = ObservablesAligner::new(n_channels, fs);
	let mut solver = PvtSolver::new(pvt_cfg.averaging_depth, pvt_cfg.flag_averaging);
	let mut printer = RinexPrinter::new(rinex_version, "GNSS", ".");
	let mut dump = if pvt_cfg.dump {
		match ObservablesDump::create(&pvt_cfg.dump_filename) {
			Ok(d) => Some(d),
			Err(e) => { warn!("cannot open observables dump: {}", e); None },
		}
	} else { None };

	let mut fixes:Vec<PvtSolution> = vec![];
	let mut no_fix_epochs:Vec<(f64, NoFixReason)> = vec![];
	let mut events:Vec<(usize, ChannelEvent)> = vec![];
	let mut epoch_acks:BTreeMap<usize, usize> = BTreeMap::new();

	for msg in rx.iter() {
		match msg {
			WorkerMsg::Synchro(s) => aligner.update(s),
			WorkerMsg::Event(channel_id, event) => {
				if let ChannelEvent::LossOfLock{..} = event {
					aligner.clear_channel(channel_id);
				}
				events.push((channel_id, event));
			},
			WorkerMsg::EpochDone{ epoch_sample } => {
				let acks = epoch_acks.entry(epoch_sample).or_insert(0);
				*acks += 1;
				if *acks == n_channels {
					epoch_acks.remove(&epoch_sample);
					process_epoch(epoch_sample, &aligner, &mut solver, &repository, &mut printer,
						&mut dump, hybrid, &mut fixes, &mut no_fix_epochs);
				}
			},
		}
	}

	printer.flush();
	if let Some(d) = &mut dump { let _ = d.flush(); }
	(fixes, no_fix_epochs, events)
}

fn process_epoch(epoch_sample:usize, aligner:&ObservablesAligner, solver:&mut PvtSolver,
		repository:&NavDataRepository, printer:&mut RinexPrinter,
		dump:&mut Option<ObservablesDump>, hybrid:bool,
		fixes:&mut Vec<PvtSolution>, no_fix_epochs:&mut Vec<(f64, NoFixReason)>) {

	let epoch = match aligner.align_epoch(epoch_sample) {
		Some(e) => e,
		None => return,	// nothing delivering yet; the channels keep working
	};

	let nav = repository.snapshot();

	// Raw observables dump regardless of the solve outcome
	if let Some(d) = dump {
		let prs:Vec<f64> = epoch.observables.values().map(|o| o.pseudorange_m).collect();
		if let Err(e) = d.write_epoch(&prs, epoch.t_rx) {
			warn!("observables dump write failed: {}", e);
		}
	}

	// RINEX headers are gated on ephemeris availability: for mixed files
	// both constellations must have delivered one
	let gps_ready = !nav.gps_ephemeris.is_empty();
	let gal_ready = !nav.galileo_ephemeris.is_empty();
	let headers_ready = if hybrid { gps_ready && gal_ready } else { gps_ready || gal_ready };
	if !printer.obs_header_written && headers_ready {
		let week = nav.gps_ephemeris.values().next().map(|e| e.week_number as u32)
			.or_else(|| nav.galileo_ephemeris.values().next().map(|e| e.wn as u32))
			.unwrap_or(0);
		if let Err(e) = printer.open_files(week, epoch.t_rx) {
			warn!("cannot open RINEX files: {}", e);
		}
		printer.write_obs_header(week, epoch.t_rx, hybrid);
		printer.write_nav_header(nav.gps_iono.as_ref(), nav.gps_utc.as_ref(),
			nav.galileo_iono.as_ref(), nav.galileo_utc.as_ref());
	}

	match solver.solve(&epoch.observables, &nav, epoch.t_rx) {
		Ok(fix) => {
			info!("fix at TOW {:.3}: lat {:.6} deg, lon {:.6} deg, h {:.1} m ({} SVs, HDOP {:.2})",
				fix.rx_time,
				fix.geodetic.latitude.to_degrees(),
				fix.geodetic.longitude.to_degrees(),
				fix.geodetic.height_above_ellipsoid,
				fix.n_observations,
				fix.dop.hdop);

			if printer.obs_header_written {
				let week = nav.gps_ephemeris.values().next().map(|e| e.week_number as u32)
					.or_else(|| nav.galileo_ephemeris.values().next().map(|e| e.wn as u32))
					.unwrap_or(0);
				printer.log_obs_epoch(week, epoch.t_rx, &epoch.observables);
				printer.log_nav(epoch.t_rx, &nav.gps_ephemeris, &nav.galileo_ephemeris);
			}
			fixes.push(fix);
		},
		Err(reason) => {
			no_fix_epochs.push((epoch.t_rx, reason));
		},
	}
}

#[cfg(test)]
mod tests {

	use rustfft::num_complex::Complex;

	use super::*;

	/// Superposition of a few C/A signals, enough to exercise the thread
	/// plumbing without any navigation data.
	fn synth_samples(prns:&[usize], fs:f64, n:usize) -> Vec<Sample> {
		let codes:Vec<Vec<Complex<f64>>> = prns.iter()
			.map(|&p| crate::gnss::gps_l1_ca::signal::code_sampled_complex(p, fs, 0))
			.collect();
		(0..n).map(|idx| {
			let mut val = Complex{ re: 0.0, im: 0.0 };
			for code in codes.iter() {
				val += code[idx % code.len()] * 20.0;
			}
			Sample{ val, idx }
		}).collect()
	}

	#[test]
	fn pipeline_acquires_across_worker_threads() {
		let cfg = Config::from_str("\
GNSS-SDR.internal_fs_hz=1023000\n\
Acquisition_GPS.doppler_max=500\n\
Acquisition_GPS.doppler_step=500\n\
Acquisition_GPS.max_dwells=2\n\
PVT.output_rate_ms=100\n\
Channels_GPS.prn_list=5,12\n").unwrap();

		let mut rx = Receiver::new(cfg, NavDataRepository::new(), 2, 0);
		let samples = synth_samples(&[5, 12], 1.023e6, 1023 * 250);
		let report = rx.run(samples.into_iter());

		assert_eq!(report.samples_processed, 1023 * 250);
		let acquired:Vec<usize> = report.events.iter()
			.filter_map(|(_, e)| match e {
				ChannelEvent::AcquisitionPositive{ prn, .. } => Some(*prn),
				_ => None,
			}).collect();
		assert!(acquired.contains(&5), "events: {:?}", report.events.len());
		assert!(acquired.contains(&12));
		// Without any telemetry there is nothing to deliver, so no fixes
		// and no observables epochs at all
		assert!(report.fixes.is_empty());
	}

	#[test]
	fn insufficient_observables_never_blocks_the_pvt_thread() {
		let cfg = Config::from_str("\
GNSS-SDR.internal_fs_hz=1023000\n\
Acquisition_GPS.doppler_max=500\n\
Acquisition_GPS.doppler_step=500\n\
PVT.output_rate_ms=50\n\
Channels_GPS.prn_list=9\n").unwrap();

		let mut rx = Receiver::new(cfg, NavDataRepository::new(), 1, 0);
		let samples = synth_samples(&[9], 1.023e6, 1023 * 120);
		let report = rx.run(samples.into_iter());

		// The run drains and joins; epochs with no delivering channels are
		// skipped without producing bogus fixes
		assert!(report.fixes.is_empty());
		assert_eq!(report.samples_processed, 1023 * 120);
	}

}
