
use serde::{Serialize, Deserialize};

use crate::DigSigProcErr;
use crate::utils::{bits_to_scaled_signed, bits_to_scaled_unsigned, bits_to_unsigned};

#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct Subframe {
	pub time_of_week_truncated: u32,
	pub subframe_id: u8,
	pub body: SubframeBody,
}

impl Subframe {

	/// Seconds into the week at the start of the *next* subframe; the HOW
	/// counts 6-second units.
	pub fn time_of_week(&self) -> f64 { (self.time_of_week_truncated as f64) * 6.0 }

}

#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub enum SubframeBody {
	Subframe1(Subframe1),
	Subframe2(Subframe2),
	Subframe3(Subframe3),
	Subframe4(Subframe4),
	Subframe5(Subframe5),
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct Subframe1 {
	pub week_number: u16,
	pub ura_index: u8,
	pub sv_health: u8,
	pub iodc: u16,
	pub t_gd: f64,
	pub t_oc: f64,
	pub a_f2: f64,
	pub a_f1: f64,
	pub a_f0: f64,
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct Subframe2 {
	pub iode: u8,
	pub crs: f64,
	pub dn: f64,
	pub m0: f64,
	pub cuc: f64,
	pub e: f64,
	pub cus: f64,
	pub sqrt_a: f64,
	pub t_oe: f64,
	pub fit_interval: bool,
	pub aodo: u8,
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct Subframe3 {
	pub cic: f64,
	pub omega0: f64,
	pub cis: f64,
	pub i0: f64,
	pub crc: f64,
	pub omega: f64,
	pub omega_dot: f64,
	pub iode: u8,
	pub idot: f64,
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct Subframe4 {
	pub data_id: u8,
	pub sv_id: u8,
	pub page: Subframe4Page,
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub enum Subframe4Page {
	/// Page 18: ionospheric (Klobuchar) and UTC conversion parameters
	IonoUtc {
		alpha0:f64, alpha1:f64, alpha2:f64, alpha3:f64,
		beta0:f64,  beta1:f64,  beta2:f64,  beta3:f64,
		a1:f64, a0:f64, t_ot:u32, wn_t:u8,
		delta_t_ls:i8, wn_lsf:u8, dn:u8, delta_t_lsf:i8,
	},
	Almanac(AlmanacEntry),
	Reserved,
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct Subframe5 {
	pub data_id: u8,
	pub sv_id: u8,
	pub page: Subframe5Page,
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub enum Subframe5Page {
	Almanac(AlmanacEntry),
	/// Page 25: almanac reference time and week
	Page25{ t_oa:u32, wn_a:u8 },
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct AlmanacEntry {
	pub sv_id: u8,
	pub e: f64,
	pub t_oa: u32,
	pub delta_i: f64,
	pub omega_dot: f64,
	pub sv_health: u8,
	pub sqrt_a: f64,
	pub omega0: f64,
	pub omega: f64,
	pub m0: f64,
	pub af0: f64,
	pub af1: f64,
}

fn decode_almanac(bits:&[bool; 240], sv_id:u8) -> AlmanacEntry {
	AlmanacEntry {
		sv_id,
		e:         bits_to_scaled_unsigned(&bits[56..72], -21),
		t_oa:     (bits_to_unsigned(&bits[72..80]) as u32) << 12,
		delta_i:   bits_to_scaled_signed(&bits[80..96], -19),
		omega_dot: bits_to_scaled_signed(&bits[96..112], -38),
		sv_health: bits_to_unsigned(&bits[112..120]) as u8,
		sqrt_a:    bits_to_scaled_unsigned(&bits[120..144], -11),
		omega0:    bits_to_scaled_signed(&bits[144..168], -23),
		omega:     bits_to_scaled_signed(&bits[168..192], -23),
		m0:        bits_to_scaled_signed(&bits[192..216], -23),
		// a_f0 is split: 8 MSBs, then a_f1, then its 3 LSBs
		af0: {
			let mut af0_bits:Vec<bool> = bits[216..224].to_vec();
			af0_bits.extend_from_slice(&bits[235..238]);
			bits_to_scaled_signed(&af0_bits, -20)
		},
		af1: bits_to_scaled_signed(&bits[224..235], -38),
	}
}

/// Decodes 240 parity-stripped source bits into a typed subframe.
pub fn decode(bits:[bool; 240]) -> Result<Subframe, DigSigProcErr> {
	let time_of_week_truncated = bits_to_unsigned(&bits[24..41]) as u32;
	let subframe_id = bits_to_unsigned(&bits[43..46]) as u8;

	let body = match subframe_id {
		1 => SubframeBody::Subframe1(Subframe1 {
			week_number: bits_to_unsigned(&bits[48..58]) as u16,
			ura_index:   bits_to_unsigned(&bits[60..64]) as u8,
			sv_health:   bits_to_unsigned(&bits[64..70]) as u8,
			iodc: {
				let mut iodc_bits:Vec<bool> = bits[70..72].to_vec();
				iodc_bits.extend_from_slice(&bits[168..176]);
				bits_to_unsigned(&iodc_bits) as u16
			},
			t_gd:  bits_to_scaled_signed(&bits[160..168], -31),
			t_oc:  bits_to_scaled_unsigned(&bits[176..192], 4),
			a_f2:  bits_to_scaled_signed(&bits[192..200], -55),
			a_f1:  bits_to_scaled_signed(&bits[200..216], -43),
			a_f0:  bits_to_scaled_signed(&bits[216..238], -31),
		}),
		2 => SubframeBody::Subframe2(Subframe2 {
			iode:   bits_to_unsigned(&bits[48..56]) as u8,
			crs:    bits_to_scaled_signed(&bits[56..72], -5),
			dn:     bits_to_scaled_signed(&bits[72..88], -43),
			m0:     bits_to_scaled_signed(&bits[88..120], -31),
			cuc:    bits_to_scaled_signed(&bits[120..136], -29),
			e:      bits_to_scaled_unsigned(&bits[136..168], -33),
			cus:    bits_to_scaled_signed(&bits[168..184], -29),
			sqrt_a: bits_to_scaled_unsigned(&bits[184..216], -19),
			t_oe:   bits_to_scaled_unsigned(&bits[216..232], 4),
			fit_interval: bits[233],
			aodo:   bits_to_unsigned(&bits[234..239]) as u8,
		}),
		3 => SubframeBody::Subframe3(Subframe3 {
			cic:       bits_to_scaled_signed(&bits[48..64], -29),
			omega0:    bits_to_scaled_signed(&bits[64..96], -31),
			cis:       bits_to_scaled_signed(&bits[96..112], -29),
			i0:        bits_to_scaled_signed(&bits[112..144], -31),
			crc:       bits_to_scaled_signed(&bits[144..160], -5),
			omega:     bits_to_scaled_signed(&bits[160..192], -31),
			omega_dot: bits_to_scaled_signed(&bits[192..216], -43),
			iode:      bits_to_unsigned(&bits[216..224]) as u8,
			idot:      bits_to_scaled_signed(&bits[224..238], -43),
		}),
		4 => {
			let data_id = bits_to_unsigned(&bits[48..50]) as u8;
			let sv_id   = bits_to_unsigned(&bits[50..56]) as u8;
			let page = match sv_id {
				// Page 18 carries iono and UTC data under SV ID 56
				56 => Subframe4Page::IonoUtc {
					alpha0: bits_to_scaled_signed(&bits[56..64], -30),
					alpha1: bits_to_scaled_signed(&bits[64..72], -27),
					alpha2: bits_to_scaled_signed(&bits[72..80], -24),
					alpha3: bits_to_scaled_signed(&bits[80..88], -24),
					beta0:  bits_to_scaled_signed(&bits[88..96], 11),
					beta1:  bits_to_scaled_signed(&bits[96..104], 14),
					beta2:  bits_to_scaled_signed(&bits[104..112], 16),
					beta3:  bits_to_scaled_signed(&bits[112..120], 16),
					a1:     bits_to_scaled_signed(&bits[120..144], -50),
					a0:     bits_to_scaled_signed(&bits[144..176], -30),
					t_ot:  (bits_to_unsigned(&bits[176..184]) as u32) << 12,
					wn_t:   bits_to_unsigned(&bits[184..192]) as u8,
					delta_t_ls:  bits_to_unsigned(&bits[192..200]) as i8,
					wn_lsf:      bits_to_unsigned(&bits[200..208]) as u8,
					dn:          bits_to_unsigned(&bits[208..216]) as u8,
					delta_t_lsf: bits_to_unsigned(&bits[216..224]) as i8,
				},
				25..=32 => Subframe4Page::Almanac(decode_almanac(&bits, sv_id)),
				_ => Subframe4Page::Reserved,
			};
			SubframeBody::Subframe4(Subframe4{ data_id, sv_id, page })
		},
		5 => {
			let data_id = bits_to_unsigned(&bits[48..50]) as u8;
			let sv_id   = bits_to_unsigned(&bits[50..56]) as u8;
			let page = match sv_id {
				1..=24 => Subframe5Page::Almanac(decode_almanac(&bits, sv_id)),
				_ => Subframe5Page::Page25 {
					t_oa: (bits_to_unsigned(&bits[56..64]) as u32) << 12,
					wn_a:  bits_to_unsigned(&bits[64..72]) as u8,
				},
			};
			SubframeBody::Subframe5(Subframe5{ data_id, sv_id, page })
		},
		_ => return Err(DigSigProcErr::InvalidTelemetryData("subframe id outside 1 through 5")),
	};

	Ok(Subframe{ time_of_week_truncated, subframe_id, body })
}

/// Writes an unsigned value MSB-first into a bit slice; the encoding half of
/// the subframe layout, used by the navigation-message synthesizer.
pub fn put_unsigned(bits:&mut [bool], value:u64) {
	let n = bits.len();
	for i in 0..n {
		bits[i] = (value >> (n - 1 - i)) & 1 == 1;
	}
}

/// Two's-complement encoding of a scaled value, inverse of the decode
/// scalings above.
pub fn put_scaled_signed(bits:&mut [bool], value:f64, scale_exp:i32) {
	let n = bits.len();
	let raw = (value / (2.0_f64).powi(scale_exp)).round() as i64;
	let raw_u = if raw < 0 { (raw + (1i64 << n)) as u64 } else { raw as u64 };
	put_unsigned(bits, raw_u);
}

pub fn put_scaled_unsigned(bits:&mut [bool], value:f64, scale_exp:i32) {
	put_unsigned(bits, (value / (2.0_f64).powi(scale_exp)).round() as u64);
}

#[cfg(test)]
mod tests {

	use super::*;

	fn frame_with_id(id:u8, tow:u32) -> [bool; 240] {
		let mut bits = [false; 240];
		put_unsigned(&mut bits[24..41], tow as u64);
		put_unsigned(&mut bits[43..46], id as u64);
		bits
	}

	#[test]
	fn subframe1_fields_round_trip() {
		let mut bits = frame_with_id(1, 10_000);
		put_unsigned(&mut bits[48..58], 845);		// week number
		put_unsigned(&mut bits[60..64], 2);		// URA
		put_unsigned(&mut bits[64..70], 0);		// healthy
		put_unsigned(&mut bits[70..72], 0b01);		// IODC MSBs
		put_unsigned(&mut bits[168..176], 0x5A);	// IODC LSBs
		put_scaled_signed(&mut bits[160..168], -1.1641532182693481e-9, -31);	// t_gd
		put_scaled_unsigned(&mut bits[176..192], 320_000.0, 4);	// t_oc
		put_scaled_signed(&mut bits[200..216], 1.0231815394945443e-11, -43);	// a_f1
		put_scaled_signed(&mut bits[216..238], -3.7252902984619141e-7, -31);	// a_f0

		match decode(bits).unwrap() {
			Subframe{ time_of_week_truncated, subframe_id: 1, body: SubframeBody::Subframe1(sf) } => {
				assert_eq!(time_of_week_truncated, 10_000);
				assert_eq!(sf.week_number, 845);
				assert_eq!(sf.iodc, 0x15A);
				assert_eq!(sf.t_oc, 320_000.0);
				assert!((sf.t_gd - (-1.1641532182693481e-9)).abs() < 2.0_f64.powi(-32));
				assert!((sf.a_f1 - 1.0231815394945443e-11).abs() < 2.0_f64.powi(-44));
				assert!((sf.a_f0 - (-3.7252902984619141e-7)).abs() < 2.0_f64.powi(-32));
			},
			other => panic!("wrong decode: {:?}", other),
		}
	}

	#[test]
	fn subframe2_and_3_carry_ephemeris_fields() {
		let mut bits2 = frame_with_id(2, 1);
		put_unsigned(&mut bits2[48..56], 91);			// IODE
		put_scaled_signed(&mut bits2[56..72], -18.25, -5);	// crs
		put_scaled_signed(&mut bits2[88..120], 0.25, -31);	// m0 (semicircles)
		put_scaled_unsigned(&mut bits2[136..168], 0.012, -33);	// e
		put_scaled_unsigned(&mut bits2[184..216], 5153.6, -19);	// sqrt_a
		put_scaled_unsigned(&mut bits2[216..232], 352_800.0, 4);	// t_oe

		match decode(bits2).unwrap().body {
			SubframeBody::Subframe2(sf) => {
				assert_eq!(sf.iode, 91);
				assert_eq!(sf.crs, -18.25);
				assert!((sf.m0 - 0.25).abs() < 2.0_f64.powi(-31));
				assert!((sf.e - 0.012).abs() < 2.0_f64.powi(-33));
				assert!((sf.sqrt_a - 5153.6).abs() < 2.0_f64.powi(-19));
				assert_eq!(sf.t_oe, 352_800.0);
			},
			other => panic!("wrong decode: {:?}", other),
		}

		let mut bits3 = frame_with_id(3, 2);
		put_scaled_signed(&mut bits3[64..96], -0.42, -31);	// omega0
		put_scaled_signed(&mut bits3[112..144], 0.30, -31);	// i0
		put_unsigned(&mut bits3[216..224], 91);		// IODE
		match decode(bits3).unwrap().body {
			SubframeBody::Subframe3(sf) => {
				assert_eq!(sf.iode, 91);
				assert!((sf.omega0 + 0.42).abs() < 2.0_f64.powi(-30));
				assert!((sf.i0 - 0.30).abs() < 2.0_f64.powi(-30));
			},
			other => panic!("wrong decode: {:?}", other),
		}
	}

	#[test]
	fn subframe4_page18_decodes_iono_and_utc() {
		let mut bits = frame_with_id(4, 3);
		put_unsigned(&mut bits[48..50], 1);	// data id
		put_unsigned(&mut bits[50..56], 56);	// page 18
		put_scaled_signed(&mut bits[56..64], 1.1175870895385742e-8, -30);	// alpha0
		put_scaled_signed(&mut bits[88..96], 90_112.0, 11);			// beta0
		put_scaled_signed(&mut bits[144..176], 9.3132257461547852e-9, -30);	// a0
		put_unsigned(&mut bits[192..200], 18);					// delta_t_ls

		match decode(bits).unwrap().body {
			SubframeBody::Subframe4(Subframe4{ page: Subframe4Page::IonoUtc{ alpha0, beta0, a0, delta_t_ls, .. }, .. }) => {
				assert!((alpha0 - 1.1175870895385742e-8).abs() < 2.0_f64.powi(-31));
				assert_eq!(beta0, 90_112.0);
				assert!((a0 - 9.3132257461547852e-9).abs() < 2.0_f64.powi(-31));
				assert_eq!(delta_t_ls, 18);
			},
			other => panic!("wrong decode: {:?}", other),
		}
	}

	#[test]
	fn subframe5_almanac_entry_decodes() {
		let mut bits = frame_with_id(5, 4);
		put_unsigned(&mut bits[48..50], 1);
		put_unsigned(&mut bits[50..56], 17);	// SV 17 almanac
		put_scaled_unsigned(&mut bits[56..72], 0.009, -21);	// e
		put_unsigned(&mut bits[72..80], 100);			// t_oa / 4096
		put_unsigned(&mut bits[112..120], 0);			// healthy
		put_scaled_unsigned(&mut bits[120..144], 5153.0, -11);	// sqrt_a

		match decode(bits).unwrap().body {
			SubframeBody::Subframe5(Subframe5{ sv_id: 17, page: Subframe5Page::Almanac(alm), .. }) => {
				assert_eq!(alm.sv_id, 17);
				assert_eq!(alm.t_oa, 100 << 12);
				assert!((alm.e - 0.009).abs() < 2.0_f64.powi(-21));
				assert!((alm.sqrt_a - 5153.0).abs() < 2.0_f64.powi(-11));
			},
			other => panic!("wrong decode: {:?}", other),
		}
	}

	#[test]
	fn bad_subframe_id_is_rejected() {
		let bits = frame_with_id(7, 1);
		assert!(decode(bits).is_err());
	}

}
