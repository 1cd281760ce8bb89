
use std::f64::consts;

use crate::gnss::gps_l1_ca::ephemeris::IonoParams as GpsIono;
use crate::gnss::galileo_e1::ephemeris::IonoParams as GalileoIono;

/// Klobuchar single-frequency ionospheric delay in seconds, IS-GPS-200
/// figure 20-4.  Angles in radians, `t` in GPS seconds of week.
pub fn klobuchar_delay(p:&GpsIono, az:f64, el:f64, lat:f64, lon:f64, t:f64) -> f64 {
	// The broadcast model works in semicircles
	let el_sc = el / consts::PI;
	let mut phi_u = lat / consts::PI;
	let mut lam_u = lon / consts::PI;
	if phi_u >  0.5 { phi_u =  1.0 - phi_u; lam_u -= 1.0; }
	if phi_u < -0.5 { phi_u = -1.0 - phi_u; lam_u -= 1.0; }
	if lam_u >  1.0 { lam_u -= 2.0; }
	if lam_u < -1.0 { lam_u += 2.0; }

	// Earth-centered angle to the ionospheric pierce point
	let psi = 0.0137 / (el_sc + 0.11) - 0.022;
	let phi_i = {
		let raw = phi_u + psi * az.cos();
		if raw > 0.416 { 0.416 } else if raw < -0.416 { -0.416 } else { raw }
	};
	let lam_i = lam_u + (psi * az.sin()) / (phi_i * consts::PI).cos();
	let phi_m = phi_i + 0.064 * ((lam_i * consts::PI) - 1.617).cos();

	let t_local = (4.32e4 * lam_i + t).rem_euclid(86_400.0);

	let obliquity = 1.0 + 16.0 * (0.53 - el_sc).powi(3);

	let period = {
		let raw = p.beta0 + p.beta1 * phi_m + p.beta2 * phi_m.powi(2) + p.beta3 * phi_m.powi(3);
		if raw < 72_000.0 { 72_000.0 } else { raw }
	};
	let amplitude = {
		let raw = p.alpha0 + p.alpha1 * phi_m + p.alpha2 * phi_m.powi(2) + p.alpha3 * phi_m.powi(3);
		if raw < 0.0 { 0.0 } else { raw }
	};

	let x = 2.0 * consts::PI * (t_local - 50_400.0) / period;
	if x.abs() < 1.57 {
		obliquity * (5.0e-9 + amplitude * (1.0 - x.powi(2) / 2.0 + x.powi(4) / 24.0))
	} else {
		obliquity * 5.0e-9
	}
}

/// Single-layer approximation of the NeQuick broadcast model for Galileo
/// E1: the effective ionization level from the ai coefficients scaled into a
/// vertical delay, mapped with the thin-shell obliquity at 350 km.
pub fn nequick_light_delay(p:&GalileoIono, _az:f64, el:f64, lat:f64, _lon:f64, _t:f64) -> f64 {
	// Modified dip latitude approximated from the geographic latitude
	let mu = lat / consts::PI * 2.0;
	let az_eff = p.ai0 + p.ai1 * mu + p.ai2 * mu.powi(2);
	let az_eff = if az_eff < 0.0 { 0.0 } else { az_eff };

	// Effective ionization to vertical TEC, then to an L1 delay
	let tec_el = az_eff * 1.0e16 * 0.1;
	let f_l1 = 1.57542e9;
	let vertical_delay_s = 40.3 * tec_el / (f_l1 * f_l1) / crate::utils::kinematics::C;

	// Thin-shell mapping function at 350 km
	let re = 6_371.0e3;
	let h_iono = 350.0e3;
	let sin_z = (re / (re + h_iono)) * el.cos();
	let obliquity = 1.0 / (1.0 - sin_z * sin_z).sqrt();

	vertical_delay_s * obliquity
}

/// Saastamoinen zenith delay mapped by 1/cos(z), standard-atmosphere
/// pressure and temperature at the receiver height.  Returns meters.  The
/// mapping is clamped at a 5 degree elevation; below that the obliquity
/// factor is no longer meaningful.
pub fn saastamoinen_delay(el:f64, height_m:f64) -> f64 {
	if el <= 0.0 { return 0.0; }
	let el = el.max(5.0_f64.to_radians());
	let h = if height_m < 0.0 { 0.0 } else if height_m > 11_000.0 { 11_000.0 } else { height_m };

	let pressure = 1013.25 * (1.0 - 2.2557e-5 * h).powf(5.2568);
	let temperature = 15.0 - 6.5e-3 * h + 273.15;
	let humidity = 0.7;
	let vapor = 6.108 * humidity * ((17.15 * temperature - 4684.0) / (temperature - 38.45)).exp();

	let z = consts::FRAC_PI_2 - el;
	0.002277 / z.cos() * (pressure + (1255.0 / temperature + 0.05) * vapor)
}

#[cfg(test)]
mod tests {

	use super::*;

	fn mid_latitude_iono() -> GpsIono {
		GpsIono {
			alpha0: 1.1176e-8, alpha1: 7.4506e-9, alpha2: -5.9605e-8, alpha3: -5.9605e-8,
			beta0: 90_112.0, beta1: 16_384.0, beta2: -131_072.0, beta3: -65_536.0,
		}
	}

	#[test]
	fn klobuchar_daytime_exceeds_night_floor() {
		let p = mid_latitude_iono();
		let lat = 41.0_f64.to_radians();
		let lon = 2.0_f64.to_radians();
		let el = 60.0_f64.to_radians();
		// 14:00 local solar time against 02:00
		let day = klobuchar_delay(&p, 0.5, el, lat, lon, 50_400.0);
		let night = klobuchar_delay(&p, 0.5, el, lat, lon, 7_200.0);
		assert!(day > night);
		// L1 iono delays live in the 1-30 m range
		assert!(day * crate::utils::kinematics::C > 1.0 && day * crate::utils::kinematics::C < 30.0);
	}

	#[test]
	fn klobuchar_grows_toward_the_horizon() {
		let p = mid_latitude_iono();
		let lat = 41.0_f64.to_radians();
		let lon = 2.0_f64.to_radians();
		let high = klobuchar_delay(&p, 1.0, 80.0_f64.to_radians(), lat, lon, 43_200.0);
		let low  = klobuchar_delay(&p, 1.0, 10.0_f64.to_radians(), lat, lon, 43_200.0);
		assert!(low > high);
	}

	#[test]
	fn nequick_light_is_positive_and_elevation_dependent() {
		let p = GalileoIono{ ai0: 80.0, ai1: 0.5, ai2: 0.02, region_flags: 0 };
		let lat = 45.0_f64.to_radians();
		let zenith = nequick_light_delay(&p, 0.0, 89.0_f64.to_radians(), lat, 0.0, 0.0);
		let slant  = nequick_light_delay(&p, 0.0, 15.0_f64.to_radians(), lat, 0.0, 0.0);
		assert!(zenith > 0.0);
		assert!(slant > zenith);
	}

	#[test]
	fn saastamoinen_zenith_is_about_two_and_a_half_meters() {
		let zenith = saastamoinen_delay(std::f64::consts::FRAC_PI_2, 0.0);
		assert!(zenith > 2.0 && zenith < 3.0, "zenith tropo {}", zenith);
		let slant = saastamoinen_delay(10.0_f64.to_radians(), 0.0);
		assert!(slant > 4.0 * zenith);
		// Altitude thins the troposphere
		assert!(saastamoinen_delay(std::f64::consts::FRAC_PI_2, 3000.0) < zenith);
	}

}
