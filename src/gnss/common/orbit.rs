
use std::f64::consts;

pub const MU:f64 = 3.986005e14;          // [m^3/s^2] WGS-84 gravitational constant
pub const F_REL:f64 = -4.442807633e-10;  // [s/sqrt(m)] relativistic clock constant
pub const OMEGA_E:f64 = 7.2921151467e-5; // [rad/s] WGS-84 earth rotation rate
pub const SECONDS_PER_WEEK:f64 = 604_800.0;

/// Wraps a time difference into +/- half a week to ride over week rollovers.
pub fn time_from_epoch(t:f64, epoch:f64) -> f64 {
	let mut dt = t - epoch;
	if dt >  SECONDS_PER_WEEK / 2.0 { dt -= SECONDS_PER_WEEK; }
	if dt < -SECONDS_PER_WEEK / 2.0 { dt += SECONDS_PER_WEEK; }
	dt
}

/// Broadcast Keplerian element set shared by the GPS and Galileo
/// ephemerides; angles are in the semicircle units of the navigation
/// messages.
#[derive(Debug, Clone, Copy)]
pub struct KeplerOrbit {
	pub sqrt_a:f64, pub e:f64,
	pub m0:f64, pub dn:f64,
	pub omega:f64, pub omega0:f64, pub omega_dot:f64,
	pub i0:f64, pub idot:f64,
	pub cuc:f64, pub cus:f64,
	pub crc:f64, pub crs:f64,
	pub cic:f64, pub cis:f64,
	pub t_oe:f64,
}

impl KeplerOrbit {

	/// Eccentric anomaly at `tk` seconds from the ephemeris epoch;
	/// Newton-Raphson, up to 10 iterations or a 1e-12 step.
	pub fn eccentric_anomaly(&self, tk:f64) -> f64 {
		let a = self.sqrt_a.powi(2);
		let n0 = (MU / a.powi(3)).sqrt();
		let n = n0 + self.dn * consts::PI;
		let mk = self.m0 * consts::PI + n * tk;

		let mut ek = mk;
		for _ in 0..10 {
			let dek = (ek - self.e * ek.sin() - mk) / (1.0 - self.e * ek.cos());
			ek -= dek;
			if dek.abs() < 1.0e-12 { break; }
		}
		ek
	}

	/// Relativistic clock correction at transmit time `t` (seconds of week).
	pub fn relativistic_correction(&self, t:f64) -> f64 {
		let ek = self.eccentric_anomaly(time_from_epoch(t, self.t_oe));
		F_REL * self.e * self.sqrt_a * ek.sin()
	}

	/// ECEF antenna position at transmit time `t` (seconds of week), by the
	/// IS-GPS-200 table 20-IV propagation.
	pub fn pos_ecef(&self, t:f64) -> (f64, f64, f64) {
		let a = self.sqrt_a.powi(2);
		let tk = time_from_epoch(t, self.t_oe);
		let ek = self.eccentric_anomaly(tk);

		// True anomaly and argument of latitude
		let nu_k = {
			let y = (1.0 - self.e.powi(2)).sqrt() * ek.sin();
			let x = ek.cos() - self.e;
			y.atan2(x)
		};
		let phi_k = nu_k + self.omega * consts::PI;

		// Second-harmonic corrections
		let du_k = self.cus * (2.0 * phi_k).sin() + self.cuc * (2.0 * phi_k).cos();
		let dr_k = self.crs * (2.0 * phi_k).sin() + self.crc * (2.0 * phi_k).cos();
		let di_k = self.cis * (2.0 * phi_k).sin() + self.cic * (2.0 * phi_k).cos();

		let u_k = phi_k + du_k;
		let r_k = a * (1.0 - self.e * ek.cos()) + dr_k;
		let i_k = self.i0 * consts::PI + di_k + self.idot * consts::PI * tk;

		// Position in the orbital plane
		let x_kp = r_k * u_k.cos();
		let y_kp = r_k * u_k.sin();

		// Corrected longitude of the ascending node
		let omega_k = self.omega0 * consts::PI + (self.omega_dot * consts::PI - OMEGA_E) * tk - OMEGA_E * self.t_oe;

		let x_k = x_kp * omega_k.cos() - y_kp * i_k.cos() * omega_k.sin();
		let y_k = x_kp * omega_k.sin() + y_kp * i_k.cos() * omega_k.cos();
		let z_k = y_kp * i_k.sin();

		(x_k, y_k, z_k)
	}

}
