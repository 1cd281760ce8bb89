
use rustfft::num_complex::Complex;

use super::{CODE_LENGTH_CHIPS, CODE_PERIOD_SEC};

/// G2 phase-selector delays per IS-GPS-200, indexed by PRN - 1.
const G2_DELAY_CHIPS:[usize; 32] = [
	  5,   6,   7,   8,  17,  18, 139, 140, 141, 251,
	252, 254, 255, 256, 257, 258, 469, 470, 471, 472,
	473, 474, 509, 512, 513, 514, 515, 516, 859, 860,
	861, 862];

/// One period of the C/A Gold code for the given PRN as ±1 chips; binary 0
/// maps to +1 and binary 1 to -1.
pub fn code_chips(prn:usize) -> Vec<i8> {
	assert!(prn >= 1 && prn <= 32, "GPS PRN must be in 1..=32");
	let delay = G2_DELAY_CHIPS[prn - 1];

	let mut g1 = [true; 10];
	let mut g2 = [true; 10];
	let mut g1_out = [false; CODE_LENGTH_CHIPS];
	let mut g2_out = [false; CODE_LENGTH_CHIPS];

	for i in 0..CODE_LENGTH_CHIPS {
		g1_out[i] = g1[9];
		g2_out[i] = g2[9];

		let g1_fb = g1[2] ^ g1[9];
		let g2_fb = g2[1] ^ g2[2] ^ g2[5] ^ g2[7] ^ g2[8] ^ g2[9];
		for j in (1..10).rev() {
			g1[j] = g1[j-1];
			g2[j] = g2[j-1];
		}
		g1[0] = g1_fb;
		g2[0] = g2_fb;
	}

	(0..CODE_LENGTH_CHIPS).map(|i| {
		let bit = g1_out[i] ^ g2_out[(i + CODE_LENGTH_CHIPS - delay) % CODE_LENGTH_CHIPS];
		if bit { -1 } else { 1 }
	}).collect()
}

/// One code period sampled at `fs`, nearest-neighbour digitized, with an
/// initial shift of `chip_shift` whole chips.  The replica length is
/// `round(fs * 1 ms)` samples.
pub fn code_sampled(prn:usize, fs:f64, chip_shift:usize) -> Vec<i8> {
	let chips = code_chips(prn);
	let samples_per_code = (fs * CODE_PERIOD_SEC).round() as usize;
	let ts = 1.0 / fs;
	let tc = 1.0 / super::CODE_RATE_CHIPS_PER_SEC;

	(0..samples_per_code).map(|i| {
		// index of the chip under sample i, replicating the original
		// nearest-neighbour resampler including its last-sample clamp
		let j = if i + 1 == samples_per_code {
			CODE_LENGTH_CHIPS - 1
		} else {
			((ts * ((i + 1) as f64)) / tc).ceil() as usize - 1
		};
		chips[(j + chip_shift) % CODE_LENGTH_CHIPS]
	}).collect()
}

/// Complex baseband replica of one code period at `fs`.
pub fn code_sampled_complex(prn:usize, fs:f64, chip_shift:usize) -> Vec<Complex<f64>> {
	code_sampled(prn, fs, chip_shift).into_iter()
		.map(|c| Complex{ re: c as f64, im: 0.0 })
		.collect()
}

#[cfg(test)]
mod tests {

	use super::*;

	fn first_10_chips_octal(prn:usize) -> u32 {
		// Chips map binary 1 to -1, so invert the sign when reading bits back
		code_chips(prn).iter().take(10)
			.fold(0u32, |acc, &c| (acc << 1) | if c < 0 { 1 } else { 0 })
	}

	#[test]
	fn first_chips_match_icd_table() {
		// IS-GPS-200 table 3-I lists the first 10 chips of each code in octal
		assert_eq!(first_10_chips_octal(1), 0o1440);
		assert_eq!(first_10_chips_octal(2), 0o1620);
		assert_eq!(first_10_chips_octal(3), 0o1710);
		assert_eq!(first_10_chips_octal(4), 0o1744);
	}

	#[test]
	fn codes_have_full_period_and_differ() {
		for prn in 1..=32 {
			assert_eq!(code_chips(prn).len(), CODE_LENGTH_CHIPS);
		}
		assert_ne!(code_chips(1), code_chips(2));
		assert_ne!(code_chips(31), code_chips(32));
	}

	#[test]
	fn periodic_autocorrelation_peaks_at_zero_lag() {
		let chips = code_chips(9);
		let corr = |lag:usize| -> i32 {
			(0..CODE_LENGTH_CHIPS)
				.map(|i| (chips[i] as i32) * (chips[(i + lag) % CODE_LENGTH_CHIPS] as i32))
				.sum()
		};
		assert_eq!(corr(0), CODE_LENGTH_CHIPS as i32);
		for lag in 1..CODE_LENGTH_CHIPS {
			// Gold code off-peak levels are bounded by t(10) = 65
			assert!(corr(lag).abs() <= 65, "lag {} exceeds Gold bound", lag);
		}
	}

	#[test]
	fn cross_correlation_is_bounded() {
		let a = code_chips(5);
		let b = code_chips(22);
		for lag in 0..CODE_LENGTH_CHIPS {
			let c:i32 = (0..CODE_LENGTH_CHIPS)
				.map(|i| (a[i] as i32) * (b[(i + lag) % CODE_LENGTH_CHIPS] as i32))
				.sum();
			assert!(c.abs() <= 65);
		}
	}

	#[test]
	fn sampled_replica_length_follows_fs() {
		assert_eq!(code_sampled(1, 2.048e6, 0).len(), 2048);
		assert_eq!(code_sampled(1, 4.0e6, 0).len(), 4000);
		// At exactly one sample per chip the replica is the chip sequence
		assert_eq!(code_sampled(1, 1.023e6, 0), code_chips(1));
	}

	#[test]
	fn chip_shift_rotates_the_code() {
		let plain = code_sampled(7, 1.023e6, 0);
		let shifted = code_sampled(7, 1.023e6, 1);
		assert_eq!(&plain[1..], &shifted[..plain.len()-1]);
	}

}
