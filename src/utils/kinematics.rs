
use std::f64::consts;

use nalgebra::base::{Matrix3, Vector3};

pub const WGS84_SEMI_MAJOR_AXIS_METERS:f64 = 6378137.0;
pub const WGS84_SEMI_MINOR_AXIS_METERS:f64 = 6356752.314245;
pub const OMEGA_E:f64 = 7.2921151467e-5;     // [rad/s] WGS-84 earth rotation rate
pub const C:f64 = 2.99792458e8;              // [m/s] speed of light

#[derive(Debug, Clone, Copy)]
pub struct PositionWGS84 {
	pub latitude:f64,
	pub longitude:f64,
	pub height_above_ellipsoid:f64,
}

/// Rotation from ECEF into the local east-north-up frame at (lat, lon).
pub fn dcm_ecef_to_enu(lat:f64, lon:f64) -> Matrix3<f64> {
	Matrix3::new(-lon.sin(),            lon.cos(),           0.0,
	             -lat.sin()*lon.cos(), -lat.sin()*lon.sin(), lat.cos(),
	              lat.cos()*lon.cos(),  lat.cos()*lon.sin(), lat.sin())
}

/// Azimuth (clockwise from north) and elevation of a line of sight given in
/// the ECEF frame, observed from (lat, lon).
pub fn az_el(lat:f64, lon:f64, los_ecef:Vector3<f64>) -> (f64, f64) {
	let los_enu:Vector3<f64> = dcm_ecef_to_enu(lat, lon) * (los_ecef / los_ecef.norm());
	let horizontal:f64 = (los_enu[0]*los_enu[0] + los_enu[1]*los_enu[1]).sqrt();
	let mut az:f64 = if horizontal > 1.0e-12 { los_enu[0].atan2(los_enu[1]) } else { 0.0 };
	if az < 0.0 { az += 2.0*consts::PI; }
	let el:f64 = los_enu[2].atan2(horizontal);
	(az, el)
}

/// Closed-form (Bowring) conversion from ECEF coordinates to geodetic
/// latitude, longitude and height above the WGS-84 ellipsoid.
pub fn ecef_to_wgs84(e1:f64, e2:f64, e3:f64) -> PositionWGS84 {
	let a = WGS84_SEMI_MAJOR_AXIS_METERS;
	let b = WGS84_SEMI_MINOR_AXIS_METERS;
	let e_sq:f64  = (a*a - b*b) / (a*a);
	let ep_sq:f64 = (a*a - b*b) / (b*b);

	let p:f64 = (e1*e1 + e2*e2).sqrt();
	let r:f64 = (p*p + e3*e3).sqrt();

	let beta:f64 = (((b*e3)/(a*p)) * (1.0 + ep_sq*(b/r))).atan();
	let latitude:f64 = {
		let num:f64 = e3 + ep_sq * b * beta.sin().powi(3);
		let denom:f64 = p - e_sq * a * beta.cos().powi(3);
		(num/denom).atan()
	};
	let longitude:f64 = e2.atan2(e1);

	let v = a / (1.0 - e_sq*latitude.sin().powi(2)).sqrt();
	let height_above_ellipsoid = p*latitude.cos() + e3*latitude.sin() - (a*a)/v;

	PositionWGS84 { latitude, longitude, height_above_ellipsoid }
}

/// Geodetic to ECEF, the exact inverse direction of `ecef_to_wgs84`.
pub fn wgs84_to_ecef(pos:&PositionWGS84) -> (f64, f64, f64) {
	let a = WGS84_SEMI_MAJOR_AXIS_METERS;
	let b = WGS84_SEMI_MINOR_AXIS_METERS;
	let e_sq:f64 = (a*a - b*b) / (a*a);

	let (lat, lon, h) = (pos.latitude, pos.longitude, pos.height_above_ellipsoid);
	let n = a / (1.0 - e_sq*lat.sin().powi(2)).sqrt();

	let x = (n + h) * lat.cos() * lon.cos();
	let y = (n + h) * lat.cos() * lon.sin();
	let z = (n*(1.0 - e_sq) + h) * lat.sin();
	(x, y, z)
}

#[cfg(test)]
mod tests {

	use super::*;

	#[test]
	fn geodetic_round_trip() {
		let truth = PositionWGS84 {
			latitude: 41.275_f64.to_radians(),
			longitude: 1.988_f64.to_radians(),
			height_above_ellipsoid: 100.0,
		};
		let (x, y, z) = wgs84_to_ecef(&truth);
		let back = ecef_to_wgs84(x, y, z);
		assert!((back.latitude - truth.latitude).abs() < 1.0e-9);
		assert!((back.longitude - truth.longitude).abs() < 1.0e-9);
		assert!((back.height_above_ellipsoid - truth.height_above_ellipsoid).abs() < 1.0e-3);
	}

	#[test]
	fn zenith_satellite_has_90_deg_elevation() {
		let lat = 45.0_f64.to_radians();
		let lon = 10.0_f64.to_radians();
		let user = wgs84_to_ecef(&PositionWGS84{ latitude: lat, longitude: lon, height_above_ellipsoid: 0.0 });
		let above = wgs84_to_ecef(&PositionWGS84{ latitude: lat, longitude: lon, height_above_ellipsoid: 20.0e6 });
		let los = Vector3::new(above.0 - user.0, above.1 - user.1, above.2 - user.2);
		let (_, el) = az_el(lat, lon, los);
		assert!((el - std::f64::consts::FRAC_PI_2).abs() < 1.0e-6);
	}

	#[test]
	fn northern_satellite_has_zero_azimuth() {
		let lat = 0.0_f64;
		let lon = 0.0_f64;
		let user = wgs84_to_ecef(&PositionWGS84{ latitude: lat, longitude: lon, height_above_ellipsoid: 0.0 });
		let north = wgs84_to_ecef(&PositionWGS84{ latitude: 0.2, longitude: lon, height_above_ellipsoid: 1.0e6 });
		let los = Vector3::new(north.0 - user.0, north.1 - user.1, north.2 - user.2);
		let (az, el) = az_el(lat, lon, los);
		assert!(az.abs() < 1.0e-6 || (az - 2.0*std::f64::consts::PI).abs() < 1.0e-6);
		assert!(el > 0.0);
	}

}
