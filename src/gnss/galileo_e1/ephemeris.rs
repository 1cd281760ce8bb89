
use serde::{Serialize, Deserialize};

use crate::gnss::common::orbit::{self, KeplerOrbit};

pub const SECONDS_PER_WEEK:f64 = orbit::SECONDS_PER_WEEK;

/// Galileo I/NAV broadcast ephemeris assembled from words 1 through 5 of a
/// nominal frame; angles stay in semicircles until propagation.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct Ephemeris {
	pub svid: u8,
	pub iod_nav: u16,
	pub wn: u16,

	pub t_oe: f64,  pub sqrt_a: f64, pub e: f64,     pub m0: f64,
	pub dn: f64,    pub omega: f64,  pub omega0: f64, pub omega_dot: f64,
	pub i0: f64,    pub idot: f64,
	pub cuc: f64,   pub cus: f64,    pub crc: f64,   pub crs: f64,
	pub cic: f64,   pub cis: f64,

	pub t_oc: f64,  pub a_f0: f64,   pub a_f1: f64,  pub a_f2: f64,

	pub sisa: u8,
	pub bgd_e1_e5b: f64,
	pub e1b_hs: u8,
	pub e1b_dvs: bool,
}

impl Ephemeris {

	/// Issue of data used for supersession ordering in the repository.
	pub fn iod(&self) -> u16 { self.iod_nav }

	/// Healthy means signal OK and data valid on the E1-B component.
	pub fn is_healthy(&self) -> bool { self.e1b_hs == 0 && !self.e1b_dvs }

	fn orbit(&self) -> KeplerOrbit {
		KeplerOrbit {
			sqrt_a: self.sqrt_a, e: self.e,
			m0: self.m0, dn: self.dn,
			omega: self.omega, omega0: self.omega0, omega_dot: self.omega_dot,
			i0: self.i0, idot: self.idot,
			cuc: self.cuc, cus: self.cus,
			crc: self.crc, crs: self.crs,
			cic: self.cic, cis: self.cis,
			t_oe: self.t_oe,
		}
	}

	/// SV clock offset from GST at `t`, including the relativistic term but
	/// not the broadcast group delay.
	pub fn sv_clock_correction(&self, t:f64) -> f64 {
		let tk = orbit::time_from_epoch(t, self.t_oc);
		self.a_f0 + self.a_f1 * tk + self.a_f2 * tk.powi(2) + self.orbit().relativistic_correction(t)
	}

	/// ECEF antenna position at transmit time `t` (seconds of week).
	pub fn pos_ecef(&self, t:f64) -> (f64, f64, f64) {
		self.orbit().pos_ecef(t)
	}

}

/// NeQuick broadcast coefficients and storm flags from word 5.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct IonoParams {
	pub ai0: f64,
	pub ai1: f64,
	pub ai2: f64,
	pub region_flags: u8,
}

/// GST to UTC conversion parameters from word 6.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct UtcModel {
	pub a0: f64,
	pub a1: f64,
	pub delta_t_ls: i8,
	pub t_0t: u32,
	pub wn_0t: u8,
	pub wn_lsf: u8,
	pub dn: u8,
	pub delta_t_lsf: i8,
}

impl UtcModel {

	pub fn gst_to_utc(&self, tow:f64) -> f64 {
		let dt_utc = (self.delta_t_ls as f64) + self.a0 + self.a1 * (tow - self.t_0t as f64);
		(tow - dt_utc).rem_euclid(SECONDS_PER_WEEK)
	}

}

/// One almanac slot from words 7 and 8; the semi-major axis is broadcast as
/// an offset from the nominal Galileo orbit.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct AlmanacEntry {
	pub svid: u8,
	pub delta_sqrt_a: f64,
	pub e: f64,
	pub omega: f64,
	pub delta_i: f64,
	pub omega0: f64,
	pub omega_dot: f64,
	pub m0: f64,
	pub af0: f64,
	pub af1: f64,
	pub e5b_hs: u8,
	pub e1b_hs: u8,
}

/// Almanac pages collected so far, stored whole under the singleton key.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Almanac {
	pub iod_a: u8,
	pub wn_a: u8,
	pub t_0a: u32,
	pub entries: std::collections::BTreeMap<u8, AlmanacEntry>,
}
