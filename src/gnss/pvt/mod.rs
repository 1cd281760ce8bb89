
use std::collections::{BTreeMap, VecDeque};

use log::warn;
use nalgebra::base::{DMatrix, DVector, Vector3, Vector4};
use serde::{Serialize, Deserialize};

use crate::utils::kinematics::{self, C, PositionWGS84};

use super::repository::NavDataSnapshot;
use super::synchro::{GnssSynchro, SignalType};

pub mod atmosphere;

const MAX_ITER:usize = 7;
const CONVERGENCE_M:f64 = 0.01;
const MIN_OBSERVATIONS:usize = 4;

/// Why an epoch produced no fix; surfaced to the caller, never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoFixReason {
	InsufficientObservables,
	SingularGeometry,
	ConvergenceFailure,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct DilutionOfPrecision {
	pub gdop: f64,
	pub hdop: f64,
	pub vdop: f64,
	pub tdop: f64,
}

/// One navigation fix.
#[derive(Debug, Clone)]
pub struct PvtSolution {
	pub pos_ecef: Vector3<f64>,
	pub clock_bias_m: f64,
	pub geodetic: PositionWGS84,
	pub rx_time: f64,
	pub utc_time: Option<f64>,
	pub dop: DilutionOfPrecision,
	pub n_observations: usize,
	pub residual_norm_m: f64,
	pub averaged: bool,
}

/// One satellite's contribution after ephemeris lookup and clock/atmosphere
/// corrections.
struct SvObservation {
	pseudorange_corrected_m: f64,
	sv_pos: Vector3<f64>,
	signal: SignalType,
	t_tx: f64,
}

/// Earth-rotation (Sagnac) range correction in meters for a signal
/// traveling from `sv` to `user` in ECEF.
pub fn sagnac_correction_m(sv:&Vector3<f64>, user:&Vector3<f64>) -> f64 {
	kinematics::OMEGA_E / C * (sv[0] * user[1] - sv[1] * user[0])
}

/// Weighted-least-squares PVT solver over hybrid observables.  Holds the
/// linearization point between epochs and the averaging history.
pub struct PvtSolver {
	pub averaging_depth: usize,
	pub flag_averaging: bool,
	x: Vector4<f64>,
	history: VecDeque<(Vector3<f64>, f64)>,
}

impl PvtSolver {

	pub fn new(averaging_depth:usize, flag_averaging:bool) -> Self {
		PvtSolver {
			averaging_depth: averaging_depth.max(1),
			flag_averaging,
			x: Vector4::zeros(),
			history: VecDeque::new(),
		}
	}

	/// Solves one epoch.  On NO_FIX the averaging history does not advance.
	pub fn solve(&mut self, observables:&BTreeMap<usize, GnssSynchro>, nav:&NavDataSnapshot, t_rx:f64)
			-> Result<PvtSolution, NoFixReason> {

		let svs = gather_observations(observables, nav);
		if svs.len() < MIN_OBSERVATIONS {
			return Err(NoFixReason::InsufficientObservables);
		}

		// Bootstrap with unit weights, then refine with elevation weights
		let x0 = self.x;
		let x1 = iterate_wls(&svs, nav, x0, false)?;
		let x2 = iterate_wls(&svs, nav, x1, true)?;

		let user = Vector3::new(x2[0], x2[1], x2[2]);
		let geodetic = kinematics::ecef_to_wgs84(x2[0], x2[1], x2[2]);
		let dop = compute_dop(&svs, &user, &geodetic).ok_or(NoFixReason::SingularGeometry)?;
		let residual_norm_m = residual_norm(&svs, nav, &x2);

		self.x = x2;

		let (pos_out, clock_out, averaged) = if self.flag_averaging {
			self.history.push_back((user, x2[3]));
			while self.history.len() > self.averaging_depth { self.history.pop_front(); }
			let n = self.history.len() as f64;
			let mean_pos = self.history.iter().fold(Vector3::zeros(), |acc, (p, _)| acc + p) / n;
			let mean_clk = self.history.iter().map(|(_, c)| *c).sum::<f64>() / n;
			(mean_pos, mean_clk, true)
		} else {
			(user, x2[3], false)
		};

		let geodetic_out = kinematics::ecef_to_wgs84(pos_out[0], pos_out[1], pos_out[2]);
		let utc_time = nav.gps_utc.as_ref().map(|u| u.gps_to_utc(t_rx))
			.or_else(|| nav.galileo_utc.as_ref().map(|u| u.gst_to_utc(t_rx)));

		Ok(PvtSolution {
			pos_ecef: pos_out,
			clock_bias_m: clock_out,
			geodetic: geodetic_out,
			rx_time: t_rx,
			utc_time,
			dop,
			n_observations: svs.len(),
			residual_norm_m,
			averaged,
		})
	}

}

/// Looks up ephemerides and applies SV clock and group-delay corrections.
/// Satellites without a decoded ephemeris are skipped silently; the decoder
/// is simply not done with them yet.
fn gather_observations(observables:&BTreeMap<usize, GnssSynchro>, nav:&NavDataSnapshot) -> Vec<SvObservation> {
	let mut svs:Vec<SvObservation> = vec![];
	for obs in observables.values() {
		if !obs.flag_valid_pseudorange || !obs.pseudorange_is_consistent() { continue; }
		let t_tx = obs.tow_at_current_symbol_s;

		match obs.signal {
			SignalType::GpsL1Ca => {
				if let Some(eph) = nav.gps_ephemeris.get(&obs.prn) {
					if !eph.is_healthy() { continue; }
					let (x, y, z) = eph.pos_ecef(t_tx);
					let clock = eph.sv_clock_correction(t_tx) - eph.t_gd;
					svs.push(SvObservation {
						pseudorange_corrected_m: obs.pseudorange_m + clock * C,
						sv_pos: Vector3::new(x, y, z),
						signal: obs.signal,
						t_tx,
					});
				}
			},
			SignalType::GalileoE1B => {
				if let Some(eph) = nav.galileo_ephemeris.get(&obs.prn) {
					if !eph.is_healthy() { continue; }
					let (x, y, z) = eph.pos_ecef(t_tx);
					let clock = eph.sv_clock_correction(t_tx) - eph.bgd_e1_e5b;
					svs.push(SvObservation {
						pseudorange_corrected_m: obs.pseudorange_m + clock * C,
						sv_pos: Vector3::new(x, y, z),
						signal: obs.signal,
						t_tx,
					});
				}
			},
		}
	}
	svs
}

/// Modeled range plus receiver bias and atmospheric terms for the current
/// linearization point.
fn modeled_pseudorange(sv:&SvObservation, nav:&NavDataSnapshot, x:&Vector4<f64>) -> f64 {
	let user = Vector3::new(x[0], x[1], x[2]);
	let geometric = (sv.sv_pos - user).norm() + sagnac_correction_m(&sv.sv_pos, &user);

	// Atmospheric terms only once the linearization point is on the ground
	let atmospheric = if user.norm() > 6.0e6 {
		let geo = kinematics::ecef_to_wgs84(x[0], x[1], x[2]);
		let (az, el) = kinematics::az_el(geo.latitude, geo.longitude, sv.sv_pos - user);
		let iono_s = match sv.signal {
			SignalType::GpsL1Ca => nav.gps_iono.as_ref()
				.map(|p| atmosphere::klobuchar_delay(p, az, el, geo.latitude, geo.longitude, sv.t_tx))
				.unwrap_or(0.0),
			SignalType::GalileoE1B => nav.galileo_iono.as_ref()
				.map(|p| atmosphere::nequick_light_delay(p, az, el, geo.latitude, geo.longitude, sv.t_tx))
				.unwrap_or(0.0),
		};
		iono_s * C + atmosphere::saastamoinen_delay(el, geo.height_above_ellipsoid)
	} else { 0.0 };

	geometric + x[3] + atmospheric
}

fn elevation_weight(sv:&SvObservation, x:&Vector4<f64>) -> f64 {
	let user = Vector3::new(x[0], x[1], x[2]);
	if user.norm() < 6.0e6 { return 1.0; }
	let geo = kinematics::ecef_to_wgs84(x[0], x[1], x[2]);
	let (_, el) = kinematics::az_el(geo.latitude, geo.longitude, sv.sv_pos - user);
	// Low or negative elevations keep a small but nonzero weight
	el.sin().powi(2).max(1.0e-3)
}

fn iterate_wls(svs:&[SvObservation], nav:&NavDataSnapshot, x0:Vector4<f64>, elevation_weights:bool)
		-> Result<Vector4<f64>, NoFixReason> {
	let n = svs.len();
	let mut x = x0;

	for _ in 0..MAX_ITER {
		let mut h = DMatrix::from_element(n, 4, 0.0);
		let mut v = DVector::from_element(n, 0.0);
		let mut w = DVector::from_element(n, 1.0);

		for (i, sv) in svs.iter().enumerate() {
			let user = Vector3::new(x[0], x[1], x[2]);
			let los = sv.sv_pos - user;
			let range = los.norm();
			v[i] = sv.pseudorange_corrected_m - modeled_pseudorange(sv, nav, &x);
			for j in 0..3 { h[(i, j)] = -los[j] / range; }
			h[(i, 3)] = 1.0;
			if elevation_weights { w[i] = elevation_weight(sv, &x); }
		}

		// Normal equations with the diagonal weight matrix folded in
		let mut hw = h.clone();
		let mut vw = v.clone();
		for i in 0..n {
			let s = w[i].sqrt();
			for j in 0..4 { hw[(i, j)] *= s; }
			vw[i] *= s;
		}

		let normal = hw.tr_mul(&hw);
		let q = normal.try_inverse().ok_or(NoFixReason::SingularGeometry)?;
		let dx = q * hw.tr_mul(&vw);

		x += Vector4::new(dx[0], dx[1], dx[2], dx[3]);

		if !x.iter().all(|a| a.is_finite()) {
			warn!("least-squares state diverged to a non-finite value");
			return Err(NoFixReason::ConvergenceFailure);
		}

		let dr = (dx[0].powi(2) + dx[1].powi(2) + dx[2].powi(2)).sqrt();
		if dr < CONVERGENCE_M {
			return Ok(x);
		}
	}

	warn!("least-squares did not converge within {} iterations", MAX_ITER);
	Err(NoFixReason::ConvergenceFailure)
}

fn residual_norm(svs:&[SvObservation], nav:&NavDataSnapshot, x:&Vector4<f64>) -> f64 {
	svs.iter()
		.map(|sv| (sv.pseudorange_corrected_m - modeled_pseudorange(sv, nav, x)).powi(2))
		.sum::<f64>()
		.sqrt()
}

/// DOP values from the unit-weight inverse normal matrix rotated into the
/// local east-north-up frame.
fn compute_dop(svs:&[SvObservation], user:&Vector3<f64>, geo:&PositionWGS84) -> Option<DilutionOfPrecision> {
	let n = svs.len();
	let mut h = DMatrix::from_element(n, 4, 0.0);
	for (i, sv) in svs.iter().enumerate() {
		let los = sv.sv_pos - user;
		let range = los.norm();
		for j in 0..3 { h[(i, j)] = -los[j] / range; }
		h[(i, 3)] = 1.0;
	}
	let q = (h.tr_mul(&h)).try_inverse()?;

	let r = kinematics::dcm_ecef_to_enu(geo.latitude, geo.longitude);
	let q3 = nalgebra::Matrix3::new(
		q[(0,0)], q[(0,1)], q[(0,2)],
		q[(1,0)], q[(1,1)], q[(1,2)],
		q[(2,0)], q[(2,1)], q[(2,2)]);
	let q_enu = r * q3 * r.transpose();

	Some(DilutionOfPrecision {
		gdop: (q[(0,0)] + q[(1,1)] + q[(2,2)] + q[(3,3)]).sqrt(),
		hdop: (q_enu[(0,0)] + q_enu[(1,1)]).sqrt(),
		vdop: q_enu[(2,2)].sqrt(),
		tdop: q[(3,3)].sqrt(),
	})
}

#[cfg(test)]
mod tests {

	use crate::gnss::gps_l1_ca::ephemeris::Ephemeris as GpsEphemeris;
	use crate::gnss::repository::NavDataRepository;
	use crate::gnss::synchro::{GnssSynchro, SignalType};

	use super::*;

	/// A spread of healthy MEO ephemerides giving usable geometry over the
	/// mid-latitude test site.
	fn constellation(n:usize) -> Vec<GpsEphemeris> {
		(0..n).map(|k| GpsEphemeris {
			week_number: 845, sv_health: 0, ura_index: 1, fit_interval: false,
			iodc: 10 + k as u16, iode: 10 + k as u8, t_gd: 1.0e-9 * (k as f64),
			t_oc: 345_600.0, a_f0: 1.0e-5 + 2.0e-6 * (k as f64), a_f1: 0.0, a_f2: 0.0,
			t_oe: 345_600.0, sqrt_a: 5153.7, dn: 0.0,
			m0: -0.9 + 0.35 * (k as f64),
			e: 0.003 + 0.001 * (k as f64),
			omega: 0.1 * (k as f64), omega0: -0.8 + 0.3 * (k as f64), omega_dot: 0.0,
			cus: 0.0, cuc: 0.0, crs: 0.0, crc: 0.0,
			cis: 0.0, cic: 0.0,
			i0: 0.30 + 0.01 * (k as f64), idot: 0.0,
		}).collect()
	}

	/// Synthesizes observables from a known receiver state so the solver
	/// can be checked against the truth it was built from.
	fn synthesize(truth:&Vector3<f64>, clock_bias_m:f64, t_rx:f64, ephs:&[GpsEphemeris], nav:&NavDataSnapshot)
			-> BTreeMap<usize, GnssSynchro> {
		let geo = kinematics::ecef_to_wgs84(truth[0], truth[1], truth[2]);
		let mut out = BTreeMap::new();
		for (ch, eph) in ephs.iter().enumerate() {
			let prn = ch + 1;
			let t_tx = t_rx - 0.072;
			let (x, y, z) = eph.pos_ecef(t_tx);
			let sv_pos = Vector3::new(x, y, z);
			let range = (sv_pos - truth).norm();
			let (_, el) = kinematics::az_el(geo.latitude, geo.longitude, sv_pos - truth);

			let clock = eph.sv_clock_correction(t_tx) - eph.t_gd;
			let tropo = atmosphere::saastamoinen_delay(el, geo.height_above_ellipsoid);
			let iono_s = nav.gps_iono.as_ref().map(|p| {
				let (az, _) = kinematics::az_el(geo.latitude, geo.longitude, sv_pos - truth);
				atmosphere::klobuchar_delay(p, az, el, geo.latitude, geo.longitude, t_tx)
			}).unwrap_or(0.0);

			let mut s = GnssSynchro::new(ch, prn, SignalType::GpsL1Ca);
			s.flag_valid_pseudorange = true;
			s.tow_at_current_symbol_s = t_tx;
			s.tow_hybrid_at_current_symbol_s = t_rx;
			s.pseudorange_m = range
				+ sagnac_correction_m(&sv_pos, truth)
				+ clock_bias_m
				+ tropo + iono_s * C
				- clock * C;
			out.insert(ch, s);
		}
		out
	}

	fn test_truth() -> (Vector3<f64>, PositionWGS84) {
		let geo = PositionWGS84 {
			latitude: 41.275_f64.to_radians(),
			longitude: 1.988_f64.to_radians(),
			height_above_ellipsoid: 100.0,
		};
		let (x, y, z) = kinematics::wgs84_to_ecef(&geo);
		(Vector3::new(x, y, z), geo)
	}

	#[test]
	fn recovers_synthesized_position_within_a_centimeter() {
		let repo = NavDataRepository::new();
		let ephs = constellation(6);
		for (k, eph) in ephs.iter().enumerate() {
			repo.write_gps_ephemeris(k + 1, *eph);
		}
		let nav = repo.snapshot();

		let (truth, _) = test_truth();
		let clock_bias_m = 8_500.0;
		let t_rx = 345_700.0;
		let observables = synthesize(&truth, clock_bias_m, t_rx, &ephs, &nav);

		let mut solver = PvtSolver::new(10, false);
		let fix = solver.solve(&observables, &nav, t_rx).unwrap();

		assert!((fix.pos_ecef - truth).norm() < 0.01, "error {} m", (fix.pos_ecef - truth).norm());
		assert!((fix.clock_bias_m - clock_bias_m).abs() < 0.01);
		assert_eq!(fix.n_observations, 6);
		assert!(fix.dop.hdop > 0.0 && fix.dop.hdop < 20.0);
		// The trace identity ties the DOPs together
		let lhs = fix.dop.gdop.powi(2);
		let rhs = fix.dop.hdop.powi(2) + fix.dop.vdop.powi(2) + fix.dop.tdop.powi(2);
		assert!((lhs - rhs).abs() < 1.0e-6);
	}

	#[test]
	fn three_satellites_is_no_fix() {
		let repo = NavDataRepository::new();
		let ephs = constellation(3);
		for (k, eph) in ephs.iter().enumerate() {
			repo.write_gps_ephemeris(k + 1, *eph);
		}
		let nav = repo.snapshot();
		let (truth, _) = test_truth();
		let observables = synthesize(&truth, 0.0, 345_700.0, &ephs, &nav);

		let mut solver = PvtSolver::new(10, false);
		assert!(matches!(solver.solve(&observables, &nav, 345_700.0), Err(NoFixReason::InsufficientObservables)));
	}

	#[test]
	fn missing_ephemeris_excludes_the_satellite_silently() {
		let repo = NavDataRepository::new();
		let ephs = constellation(5);
		// PRN 5's ephemeris never decoded
		for (k, eph) in ephs.iter().enumerate().take(4) {
			repo.write_gps_ephemeris(k + 1, *eph);
		}
		let nav = repo.snapshot();
		let (truth, _) = test_truth();
		let observables = synthesize(&truth, 1_000.0, 345_700.0, &ephs, &nav);

		let mut solver = PvtSolver::new(10, false);
		let fix = solver.solve(&observables, &nav, 345_700.0).unwrap();
		assert_eq!(fix.n_observations, 4);
		assert!((fix.pos_ecef - truth).norm() < 0.01);
	}

	#[test]
	fn averaging_smooths_over_the_depth() {
		let repo = NavDataRepository::new();
		let ephs = constellation(6);
		for (k, eph) in ephs.iter().enumerate() {
			repo.write_gps_ephemeris(k + 1, *eph);
		}
		let nav = repo.snapshot();
		let (truth, _) = test_truth();

		let mut solver = PvtSolver::new(4, true);
		let mut last = None;
		for epoch in 0..6 {
			let t_rx = 345_700.0 + epoch as f64;
			let observables = synthesize(&truth, 100.0, t_rx, &ephs, &nav);
			last = Some(solver.solve(&observables, &nav, t_rx).unwrap());
		}
		let fix = last.unwrap();
		assert!(fix.averaged);
		// Noise-free epochs all agree, so the mean stays on the truth
		assert!((fix.pos_ecef - truth).norm() < 0.01);
	}

	#[test]
	fn hybrid_fix_survives_losing_one_satellite() {
		use crate::gnss::galileo_e1::ephemeris::Ephemeris as GalEphemeris;

		let repo = NavDataRepository::new();
		let gps_ephs = constellation(3);
		for (k, eph) in gps_ephs.iter().enumerate() {
			repo.write_gps_ephemeris(k + 1, *eph);
		}
		let gal_ephs:Vec<GalEphemeris> = (0..3).map(|k| GalEphemeris {
			svid: (k + 1) as u8, iod_nav: 30 + k as u16, wn: 1042,
			t_oe: 345_600.0, sqrt_a: 5440.6, e: 2.0e-4,
			m0: 0.55 - 0.40 * (k as f64),
			dn: 0.0, omega: -0.2 * (k as f64),
			omega0: 0.5 + 0.3 * (k as f64), omega_dot: 0.0,
			i0: 0.31, idot: 0.0,
			cuc: 0.0, cus: 0.0, crc: 0.0, crs: 0.0, cic: 0.0, cis: 0.0,
			t_oc: 345_600.0, a_f0: -2.0e-5, a_f1: 0.0, a_f2: 0.0,
			sisa: 107, bgd_e1_e5b: 4.0e-9, e1b_hs: 0, e1b_dvs: false,
		}).collect();
		for (k, eph) in gal_ephs.iter().enumerate() {
			repo.write_galileo_ephemeris(k + 1, *eph);
		}
		let nav = repo.snapshot();

		let (truth, geo) = test_truth();
		let t_rx = 345_700.0;
		let mut observables = synthesize(&truth, 2_000.0, t_rx, &gps_ephs, &nav);
		for (k, eph) in gal_ephs.iter().enumerate() {
			let ch = 10 + k;
			let t_tx = t_rx - 0.072;
			let (x, y, z) = eph.pos_ecef(t_tx);
			let sv_pos = Vector3::new(x, y, z);
			let range = (sv_pos - truth).norm();
			let (_, el) = kinematics::az_el(geo.latitude, geo.longitude, sv_pos - truth);
			let clock = eph.sv_clock_correction(t_tx) - eph.bgd_e1_e5b;
			let tropo = atmosphere::saastamoinen_delay(el, geo.height_above_ellipsoid);

			let mut s = GnssSynchro::new(ch, k + 1, SignalType::GalileoE1B);
			s.flag_valid_pseudorange = true;
			s.tow_at_current_symbol_s = t_tx;
			s.tow_hybrid_at_current_symbol_s = t_rx;
			s.pseudorange_m = range
				+ sagnac_correction_m(&sv_pos, &truth)
				+ 2_000.0
				+ tropo
				- clock * C;
			observables.insert(ch, s);
		}

		let mut solver = PvtSolver::new(10, false);
		let full = solver.solve(&observables, &nav, t_rx).unwrap();
		assert_eq!(full.n_observations, 6);
		assert!((full.pos_ecef - truth).norm() < 0.01, "hybrid error {} m", (full.pos_ecef - truth).norm());

		// One GPS satellite drops out mid-run: still a fix, worse geometry
		observables.remove(&0);
		let degraded = solver.solve(&observables, &nav, t_rx).unwrap();
		assert_eq!(degraded.n_observations, 5);
		assert!((degraded.pos_ecef - truth).norm() < 0.01);
		// Removing an observation can only worsen the geometry
		assert!(degraded.dop.gdop >= full.dop.gdop);
	}

	#[test]
	fn unhealthy_satellite_is_dropped() {
		let repo = NavDataRepository::new();
		let mut ephs = constellation(5);
		ephs[2].sv_health = 0x3F;
		for (k, eph) in ephs.iter().enumerate() {
			repo.write_gps_ephemeris(k + 1, *eph);
		}
		let nav = repo.snapshot();
		let (truth, _) = test_truth();
		let observables = synthesize(&truth, 0.0, 345_700.0, &ephs, &nav);

		let mut solver = PvtSolver::new(10, false);
		let fix = solver.solve(&observables, &nav, 345_700.0).unwrap();
		assert_eq!(fix.n_observations, 4);
	}

}
