
use rustfft::num_complex::Complex;

use super::{codes, CODE_LENGTH_CHIPS, CODE_PERIOD_SEC, CODE_RATE_CHIPS_PER_SEC};

/// CBOC(6,1,1/11) component weights for the E1-B data channel.
const CBOC_ALPHA:f64 = 0.953462589245592;	// sqrt(10/11)
const CBOC_BETA:f64  = 0.301511344577764;	// sqrt(1/11)

/// Expands one hex digit into four ±1 chips; binary 0 maps to +1.
fn hex_to_chips(digit:u8) -> [i8; 4] {
	let v = match digit {
		b'0'..=b'9' => digit - b'0',
		b'A'..=b'F' => digit - b'A' + 10,
		b'a'..=b'f' => digit - b'a' + 10,
		_ => panic!("primary code table contains a non-hex digit"),
	};
	let mut out = [0i8; 4];
	for bit in 0..4 {
		out[bit] = if (v >> (3 - bit)) & 1 == 1 { -1 } else { 1 };
	}
	out
}

/// One period of the E1-B primary code for the given PRN as ±1 chips.
pub fn code_chips(prn:usize) -> Vec<i8> {
	assert!(prn >= 1 && prn <= 50, "Galileo PRN must be in 1..=50");
	let hex = codes::E1B_PRIMARY_CODES[prn - 1];
	let mut chips:Vec<i8> = Vec::with_capacity(CODE_LENGTH_CHIPS);
	for d in hex.bytes() {
		chips.extend_from_slice(&hex_to_chips(d));
	}
	assert_eq!(chips.len(), CODE_LENGTH_CHIPS);
	chips
}

/// One 4 ms period of the modulated E1-B replica sampled at `fs` with an
/// initial shift of `chip_shift` whole chips.  BOC(1,1) by default; with
/// `cboc` set the replica carries the composite CBOC(6,1,1/11) sub-carrier.
pub fn code_sampled_complex(prn:usize, fs:f64, chip_shift:usize, cboc:bool) -> Vec<Complex<f64>> {
	let chips = code_chips(prn);
	let samples_per_code = (fs * CODE_PERIOD_SEC).round() as usize;

	(0..samples_per_code).map(|i| {
		let chip_pos = (i as f64) * CODE_RATE_CHIPS_PER_SEC / fs;
		let idx = (chip_pos.floor() as usize + chip_shift) % CODE_LENGTH_CHIPS;
		let frac = chip_pos.fract();

		let boc11:f64 = if frac < 0.5 { 1.0 } else { -1.0 };
		let chip = chips[idx] as f64;
		let sub = if cboc {
			// The small offset keeps exact sub-chip boundaries from landing a
			// floating-point ulp below their twelfth-chip index
			let boc61:f64 = if (((frac * 12.0) + 1.0e-9).floor() as usize) % 2 == 0 { 1.0 } else { -1.0 };
			CBOC_ALPHA * boc11 + CBOC_BETA * boc61
		} else {
			boc11
		};
		Complex{ re: chip * sub, im: 0.0 }
	}).collect()
}

#[cfg(test)]
mod tests {

	use super::*;

	#[test]
	fn every_prn_expands_to_full_period() {
		for prn in 1..=50 {
			let chips = code_chips(prn);
			assert_eq!(chips.len(), CODE_LENGTH_CHIPS);
			assert!(chips.iter().all(|&c| c == 1 || c == -1));
		}
	}

	#[test]
	fn codes_are_distinct_across_prns() {
		assert_ne!(code_chips(1), code_chips(2));
		assert_ne!(code_chips(49), code_chips(50));
	}

	#[test]
	fn hex_expansion_is_msb_first() {
		assert_eq!(hex_to_chips(b'0'), [1, 1, 1, 1]);
		assert_eq!(hex_to_chips(b'1'), [1, 1, 1, -1]);
		assert_eq!(hex_to_chips(b'8'), [-1, 1, 1, 1]);
		assert_eq!(hex_to_chips(b'F'), [-1, -1, -1, -1]);
	}

	#[test]
	fn boc_subcarrier_flips_mid_chip() {
		// Two samples per chip puts the second sample of each chip on the
		// negative half of the BOC(1,1) sub-carrier
		let fs = 2.0 * CODE_RATE_CHIPS_PER_SEC;
		let replica = code_sampled_complex(1, fs, 0, false);
		let chips = code_chips(1);
		assert_eq!(replica.len(), 2 * CODE_LENGTH_CHIPS);
		for i in 0..16 {
			assert_eq!(replica[2*i].re, chips[i] as f64);
			assert_eq!(replica[2*i + 1].re, -(chips[i] as f64));
		}
	}

	#[test]
	fn cboc_replica_preserves_unit_power() {
		let fs = 12.0 * CODE_RATE_CHIPS_PER_SEC;
		let replica = code_sampled_complex(3, fs, 0, true);
		let power:f64 = replica.iter().map(|c| c.norm_sqr()).sum::<f64>() / (replica.len() as f64);
		// alpha^2 + beta^2 = 1, and the two sub-carriers are aligned on a
		// 12-samples-per-chip grid, so the mean power stays at unity
		assert!((power - 1.0).abs() < 1.0e-9);
	}

}
