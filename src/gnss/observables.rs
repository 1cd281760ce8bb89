
use std::collections::BTreeMap;

use crate::utils::kinematics::C;

use super::synchro::GnssSynchro;

/// Nominal signal travel time added to the latest transmit time so every
/// pseudorange comes out near its physical 20000+ km value.
pub const TRAVEL_TIME_OFFSET_S:f64 = 68.802e-3;

/// One aligned epoch: every included observation carries the identical
/// hybrid receiver time.
#[derive(Debug, Clone)]
pub struct AlignedEpoch {
	pub t_rx: f64,
	pub epoch_sample: usize,
	pub observables: BTreeMap<usize, GnssSynchro>,
}

/// Fan-in across channels.  Each channel deposits its latest per-symbol
/// record; at every `output_rate_ms` boundary of the receiver sample clock
/// the aligner extrapolates all transmit times to the epoch sample, fixes a
/// common receiver time and derives the pseudoranges against it.
pub struct ObservablesAligner {
	fs: f64,
	latest: Vec<Option<GnssSynchro>>,
}

impl ObservablesAligner {

	pub fn new(n_channels:usize, fs:f64) -> Self {
		ObservablesAligner { fs, latest: vec![None; n_channels] }
	}

	/// Deposits the newest per-symbol record of one channel.
	pub fn update(&mut self, synchro:GnssSynchro) {
		let slot = synchro.channel_id;
		if slot < self.latest.len() {
			self.latest[slot] = Some(synchro);
		}
	}

	pub fn clear_channel(&mut self, channel_id:usize) {
		if channel_id < self.latest.len() {
			self.latest[channel_id] = None;
		}
	}

	/// Aligns all valid channels onto the epoch ending at `epoch_sample`.
	/// Channels without a valid pseudorange flag are excluded; fewer than
	/// one valid channel yields None.
	pub fn align_epoch(&self, epoch_sample:usize) -> Option<AlignedEpoch> {
		// Extrapolate each channel's transmit time from its last symbol to
		// the common epoch sample
		let mut extrapolated:Vec<(usize, GnssSynchro, f64)> = vec![];
		for slot in self.latest.iter() {
			if let Some(s) = slot {
				if !s.flag_valid_pseudorange || !s.pseudorange_is_consistent() { continue; }
				let dt = ((epoch_sample as i64) - (s.symbol_samplestamp_samples as i64)) as f64 / self.fs;
				extrapolated.push((s.channel_id, *s, s.tow_at_current_symbol_s + dt));
			}
		}

		if extrapolated.is_empty() { return None; }

		// The reference is the latest transmit time across channels; adding
		// the nominal travel time gives the common receiver time
		let t_tx_max = extrapolated.iter().map(|(_, _, t)| *t).fold(f64::MIN, f64::max);
		let t_rx = t_tx_max + TRAVEL_TIME_OFFSET_S;

		let mut observables = BTreeMap::new();
		for (channel_id, mut s, t_tx) in extrapolated {
			s.pseudorange_m = (t_rx - t_tx) * C;
			s.tow_at_current_symbol_s = t_tx;
			s.tow_hybrid_at_current_symbol_s = t_rx;
			observables.insert(channel_id, s);
		}

		Some(AlignedEpoch { t_rx, epoch_sample, observables })
	}

}
