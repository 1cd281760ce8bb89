
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use log::debug;

use super::gps_l1_ca::ephemeris as gps;
use super::galileo_e1::ephemeris as gal;

/// Everything the PVT solver and the RINEX emitter need from the decoders,
/// copied out atomically.
#[derive(Debug, Clone, Default)]
pub struct NavDataSnapshot {
	pub gps_ephemeris: BTreeMap<usize, gps::Ephemeris>,
	pub gps_iono: Option<gps::IonoParams>,
	pub gps_utc: Option<gps::UtcModel>,
	pub gps_almanac: Option<gps::Almanac>,
	pub galileo_ephemeris: BTreeMap<usize, gal::Ephemeris>,
	pub galileo_iono: Option<gal::IonoParams>,
	pub galileo_utc: Option<gal::UtcModel>,
	pub galileo_almanac: Option<gal::Almanac>,
}

/// Process-wide navigation-data store: ephemerides keyed by PRN, broadcast
/// models under their singleton slot.  Writers are the telemetry decoders,
/// readers the PVT solver and the RINEX emitter; a readers-writer lock keeps
/// every read a consistent copy.
#[derive(Clone)]
pub struct NavDataRepository {
	inner: Arc<RwLock<NavDataSnapshot>>,
}

impl NavDataRepository {

	pub fn new() -> Self {
		NavDataRepository { inner: Arc::new(RwLock::new(NavDataSnapshot::default())) }
	}

	/// Stores a GPS ephemeris unless a set with a higher issue of data is
	/// already present; returns whether the write took effect.
	pub fn write_gps_ephemeris(&self, prn:usize, eph:gps::Ephemeris) -> bool {
		let mut inner = self.inner.write().unwrap();
		match inner.gps_ephemeris.get(&prn) {
			Some(stored) if stored.iod() > eph.iod() => {
				debug!("GPS PRN {} ephemeris IOD {} rejected, repository holds {}", prn, eph.iod(), stored.iod());
				false
			},
			_ => { inner.gps_ephemeris.insert(prn, eph); true },
		}
	}

	pub fn write_galileo_ephemeris(&self, prn:usize, eph:gal::Ephemeris) -> bool {
		let mut inner = self.inner.write().unwrap();
		match inner.galileo_ephemeris.get(&prn) {
			Some(stored) if stored.iod() > eph.iod() => {
				debug!("Galileo PRN {} ephemeris IOD {} rejected, repository holds {}", prn, eph.iod(), stored.iod());
				false
			},
			_ => { inner.galileo_ephemeris.insert(prn, eph); true },
		}
	}

	pub fn write_gps_iono(&self, iono:gps::IonoParams) { self.inner.write().unwrap().gps_iono = Some(iono); }
	pub fn write_gps_utc(&self, utc:gps::UtcModel)     { self.inner.write().unwrap().gps_utc = Some(utc); }
	pub fn write_gps_almanac(&self, alm:gps::Almanac)  { self.inner.write().unwrap().gps_almanac = Some(alm); }

	pub fn write_galileo_iono(&self, iono:gal::IonoParams) { self.inner.write().unwrap().galileo_iono = Some(iono); }
	pub fn write_galileo_utc(&self, utc:gal::UtcModel)     { self.inner.write().unwrap().galileo_utc = Some(utc); }
	pub fn write_galileo_almanac(&self, alm:gal::Almanac)  { self.inner.write().unwrap().galileo_almanac = Some(alm); }

	pub fn read_gps_ephemeris(&self, prn:usize) -> Option<gps::Ephemeris> {
		self.inner.read().unwrap().gps_ephemeris.get(&prn).cloned()
	}

	pub fn read_galileo_ephemeris(&self, prn:usize) -> Option<gal::Ephemeris> {
		self.inner.read().unwrap().galileo_ephemeris.get(&prn).cloned()
	}

	pub fn gps_ephemeris_count(&self) -> usize { self.inner.read().unwrap().gps_ephemeris.len() }
	pub fn galileo_ephemeris_count(&self) -> usize { self.inner.read().unwrap().galileo_ephemeris.len() }

	/// Atomic deep copy for the PVT solver and the RINEX emitter.
	pub fn snapshot(&self) -> NavDataSnapshot {
		self.inner.read().unwrap().clone()
	}

}

impl Default for NavDataRepository {
	fn default() -> Self { Self::new() }
}
