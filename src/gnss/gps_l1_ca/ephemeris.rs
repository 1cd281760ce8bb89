
use serde::{Serialize, Deserialize};

use crate::gnss::common::orbit::{self, KeplerOrbit};
use super::telemetry_decode::subframe::{Subframe1, Subframe2, Subframe3, AlmanacEntry};

pub const SECONDS_PER_WEEK:f64 = orbit::SECONDS_PER_WEEK;

/// A complete broadcast ephemeris set assembled from subframes 1 through 3.
/// Angular parameters are kept in the semicircle units of the broadcast
/// message and scaled by pi at propagation time.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct Ephemeris {
	pub week_number:u16, pub sv_health:u8,  pub ura_index:u8,  pub fit_interval:bool,
	pub iodc:u16,        pub iode:u8,       pub t_gd:f64,
	pub t_oc:f64,        pub a_f0:f64,      pub a_f1:f64,      pub a_f2:f64,
	pub t_oe:f64,        pub sqrt_a:f64,    pub dn:f64,        pub m0:f64,
	pub e:f64,           pub omega:f64,     pub omega0:f64,    pub omega_dot:f64,
	pub cus:f64,         pub cuc:f64,       pub crs:f64,       pub crc:f64,
	pub cis:f64,         pub cic:f64,       pub i0:f64,        pub idot:f64,
}

impl Ephemeris {

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

	/// Issue of data used for supersession ordering in the repository.
	pub fn iod(&self) -> u16 { self.iodc }

	pub fn is_healthy(&self) -> bool { self.sv_health == 0 }

	/// Assembles an ephemeris from the three subframes when their issues of
	/// data agree, meaning they belong to the same broadcast set.
	pub fn assemble(sf1:&Subframe1, sf2:&Subframe2, sf3:&Subframe3) -> Option<Ephemeris> {
		if (sf1.iodc & 0xFF) as u8 != sf2.iode || sf2.iode != sf3.iode { return None; }
		Some(Ephemeris {
			week_number: sf1.week_number, sv_health: sf1.sv_health, ura_index: sf1.ura_index,
			fit_interval: sf2.fit_interval,
			iodc: sf1.iodc, iode: sf2.iode, t_gd: sf1.t_gd,
			t_oc: sf1.t_oc, a_f0: sf1.a_f0, a_f1: sf1.a_f1, a_f2: sf1.a_f2,
			t_oe: sf2.t_oe, sqrt_a: sf2.sqrt_a, dn: sf2.dn, m0: sf2.m0,
			e: sf2.e, omega: sf3.omega, omega0: sf3.omega0, omega_dot: sf3.omega_dot,
			cus: sf2.cus, cuc: sf2.cuc, crs: sf2.crs, crc: sf3.crc,
			cis: sf3.cis, cic: sf3.cic, i0: sf3.i0, idot: sf3.idot,
		})
	}

	/// SV clock offset from system time at `t`, including the relativistic
	/// correction but not the group delay.
	pub fn sv_clock_correction(&self, t:f64) -> f64 {
		let tk = orbit::time_from_epoch(t, self.t_oc);
		self.a_f0 + self.a_f1 * tk + self.a_f2 * tk.powi(2) + self.orbit().relativistic_correction(t)
	}

	/// ECEF position of the SV antenna phase center at transmit time `t`
	/// (seconds of week).
	pub fn pos_ecef(&self, t:f64) -> (f64, f64, f64) {
		self.orbit().pos_ecef(t)
	}

}

/// Klobuchar broadcast coefficients from subframe 4 page 18.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct IonoParams {
	pub alpha0:f64, pub alpha1:f64, pub alpha2:f64, pub alpha3:f64,
	pub beta0:f64,  pub beta1:f64,  pub beta2:f64,  pub beta3:f64,
}

/// GPS to UTC conversion parameters from subframe 4 page 18.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct UtcModel {
	pub a0:f64, pub a1:f64,
	pub t_ot:u32, pub wn_t:u8,
	pub delta_t_ls:i8, pub wn_lsf:u8, pub dn:u8, pub delta_t_lsf:i8,
}

impl UtcModel {

	/// GPS system time to UTC seconds of week, ignoring a pending leap
	/// second event outside the effectivity window.
	pub fn gps_to_utc(&self, tow:f64) -> f64 {
		let dt_utc = (self.delta_t_ls as f64) + self.a0 + self.a1 * (tow - self.t_ot as f64);
		(tow - dt_utc).rem_euclid(SECONDS_PER_WEEK)
	}

}

/// Almanac pages collected so far, stored whole under the singleton key.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Almanac {
	pub t_oa: u32,
	pub wn_a: u8,
	pub entries: std::collections::BTreeMap<u8, AlmanacEntry>,
}

#[cfg(test)]
mod tests {

	use super::*;

	/// A plausible near-circular MEO ephemeris for propagation checks.
	pub fn test_ephemeris() -> Ephemeris {
		Ephemeris {
			week_number: 845, sv_health: 0, ura_index: 1, fit_interval: false,
			iodc: 91, iode: 91, t_gd: 2.0e-9,
			t_oc: 352_800.0, a_f0: 2.5e-5, a_f1: 1.0e-11, a_f2: 0.0,
			t_oe: 352_800.0, sqrt_a: 5153.65, dn: 1.5e-9, m0: 0.25,
			e: 0.01, omega: -0.35, omega0: 0.60, omega_dot: -2.5e-9,
			cus: 8.0e-6, cuc: -3.0e-7, crs: -45.0, crc: 250.0,
			cis: 1.0e-7, cic: -2.0e-7, i0: 0.305, idot: 1.0e-10,
		}
	}

	#[test]
	fn orbit_radius_is_meo() {
		let eph = test_ephemeris();
		let (x, y, z) = eph.pos_ecef(352_800.0);
		let r = (x*x + y*y + z*z).sqrt();
		// Semi-major axis ~26560 km, eccentricity 0.01
		assert!(r > 2.60e7 && r < 2.72e7, "radius {} is not a GPS orbit", r);
	}

	#[test]
	fn position_moves_continuously() {
		let eph = test_ephemeris();
		let (x0, y0, z0) = eph.pos_ecef(352_800.0);
		let (x1, y1, z1) = eph.pos_ecef(352_801.0);
		let v = ((x1-x0).powi(2) + (y1-y0).powi(2) + (z1-z0).powi(2)).sqrt();
		// Orbital speed plus earth-rotation coupling stays in the km/s range
		assert!(v > 1.0e3 && v < 6.0e3, "implausible velocity {}", v);
	}

	#[test]
	fn clock_correction_tracks_polynomial() {
		let eph = test_ephemeris();
		let dt = eph.sv_clock_correction(352_800.0 + 100.0);
		let poly = 2.5e-5 + 1.0e-11 * 100.0;
		// Relativistic term for e=0.01 stays under ~25 ns
		assert!((dt - poly).abs() < 3.0e-8);
	}

	#[test]
	fn week_rollover_is_transparent() {
		let eph = test_ephemeris();
		let near_end = eph.pos_ecef(352_800.0 - 1.0);
		let wrapped  = eph.pos_ecef(352_800.0 - 1.0 + SECONDS_PER_WEEK);
		assert!((near_end.0 - wrapped.0).abs() < 1.0e-6);
		assert!((near_end.1 - wrapped.1).abs() < 1.0e-6);
	}

	#[test]
	fn assembly_requires_matching_iod() {
		use crate::gnss::gps_l1_ca::telemetry_decode::subframe::*;
		let sf1 = Subframe1{ week_number: 845, ura_index: 1, sv_health: 0, iodc: 91,
			t_gd: 0.0, t_oc: 352_800.0, a_f2: 0.0, a_f1: 0.0, a_f0: 0.0 };
		let sf2 = Subframe2{ iode: 91, crs: 0.0, dn: 0.0, m0: 0.0, cuc: 0.0, e: 0.01,
			cus: 0.0, sqrt_a: 5153.65, t_oe: 352_800.0, fit_interval: false, aodo: 0 };
		let mut sf3 = Subframe3{ cic: 0.0, omega0: 0.0, cis: 0.0, i0: 0.3, crc: 0.0,
			omega: 0.0, omega_dot: 0.0, iode: 91, idot: 0.0 };

		assert!(Ephemeris::assemble(&sf1, &sf2, &sf3).is_some());
		sf3.iode = 92;
		assert!(Ephemeris::assemble(&sf1, &sf2, &sf3).is_none());
	}

}
