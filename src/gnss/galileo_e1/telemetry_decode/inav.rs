
use serde::{Serialize, Deserialize};

use crate::utils::{bits_to_scaled_signed, bits_to_scaled_unsigned, bits_to_unsigned};

use super::super::ephemeris::{AlmanacEntry, IonoParams, UtcModel};

/// One decoded I/NAV word: the 128 bits spliced from the even and odd page
/// halves, typed by word number.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub enum InavWord {
	/// Ephemeris 1/4: reference time and in-plane elements
	Word1 { iod_nav:u16, t_0e:f64, m0:f64, e:f64, sqrt_a:f64 },
	/// Ephemeris 2/4: orientation of the orbital plane
	Word2 { iod_nav:u16, omega0:f64, i0:f64, omega:f64, idot:f64 },
	/// Ephemeris 3/4: rates and harmonic corrections
	Word3 { iod_nav:u16, omega_dot:f64, dn:f64, cuc:f64, cus:f64, crc:f64, crs:f64, sisa:u8 },
	/// Ephemeris 4/4: SV id, remaining harmonics and the clock model
	Word4 { iod_nav:u16, svid:u8, cic:f64, cis:f64, t_0c:f64, a_f0:f64, a_f1:f64, a_f2:f64 },
	/// Ionospheric model, group delay, health and GST
	Word5 { iono:IonoParams, bgd_e1_e5b:f64, e5b_hs:u8, e1b_hs:u8, e5b_dvs:bool, e1b_dvs:bool, wn:u16, tow:u32 },
	/// GST to UTC conversion
	Word6 { utc:UtcModel, tow:u32 },
	/// Almanac orbit part for one SV
	Word7 { iod_a:u8, wn_a:u8, t_0a:u32, entry:AlmanacEntry },
	/// Almanac clock and health completing the word 7 slot
	Word8 { iod_a:u8, af0:f64, af1:f64, e5b_hs:u8, e1b_hs:u8 },
	/// Word types without receiver-side use here (spare, SAR, slots 2/3)
	Other { word_type:u8 },
}

/// Decodes the 128-bit word content.  Field widths and scale factors follow
/// the Galileo OS signal-in-space ICD, issue 1.
pub fn decode(bits:&[bool]) -> InavWord {
	assert_eq!(bits.len(), 128);
	let word_type = bits_to_unsigned(&bits[0..6]) as u8;

	match word_type {
		1 => InavWord::Word1 {
			iod_nav: bits_to_unsigned(&bits[6..16]) as u16,
			t_0e:    (bits_to_unsigned(&bits[16..30]) as f64) * 60.0,
			m0:      bits_to_scaled_signed(&bits[30..62], -31),
			e:       bits_to_scaled_unsigned(&bits[62..94], -33),
			sqrt_a:  bits_to_scaled_unsigned(&bits[94..126], -19),
		},
		2 => InavWord::Word2 {
			iod_nav: bits_to_unsigned(&bits[6..16]) as u16,
			omega0:  bits_to_scaled_signed(&bits[16..48], -31),
			i0:      bits_to_scaled_signed(&bits[48..80], -31),
			omega:   bits_to_scaled_signed(&bits[80..112], -31),
			idot:    bits_to_scaled_signed(&bits[112..126], -43),
		},
		3 => InavWord::Word3 {
			iod_nav:   bits_to_unsigned(&bits[6..16]) as u16,
			omega_dot: bits_to_scaled_signed(&bits[16..40], -43),
			dn:        bits_to_scaled_signed(&bits[40..56], -43),
			cuc:       bits_to_scaled_signed(&bits[56..72], -29),
			cus:       bits_to_scaled_signed(&bits[72..88], -29),
			crc:       bits_to_scaled_signed(&bits[88..104], -5),
			crs:       bits_to_scaled_signed(&bits[104..120], -5),
			sisa:      bits_to_unsigned(&bits[120..128]) as u8,
		},
		4 => InavWord::Word4 {
			iod_nav: bits_to_unsigned(&bits[6..16]) as u16,
			svid:    bits_to_unsigned(&bits[16..22]) as u8,
			cic:     bits_to_scaled_signed(&bits[22..38], -29),
			cis:     bits_to_scaled_signed(&bits[38..54], -29),
			t_0c:    (bits_to_unsigned(&bits[54..68]) as f64) * 60.0,
			a_f0:    bits_to_scaled_signed(&bits[68..99], -34),
			a_f1:    bits_to_scaled_signed(&bits[99..120], -46),
			a_f2:    bits_to_scaled_signed(&bits[120..126], -59),
		},
		5 => InavWord::Word5 {
			iono: IonoParams {
				ai0: bits_to_scaled_unsigned(&bits[6..17], -2),
				ai1: bits_to_scaled_signed(&bits[17..28], -8),
				ai2: bits_to_scaled_signed(&bits[28..42], -15),
				region_flags: bits_to_unsigned(&bits[42..47]) as u8,
			},
			bgd_e1_e5b: bits_to_scaled_signed(&bits[57..67], -32),
			e5b_hs:  bits_to_unsigned(&bits[67..69]) as u8,
			e1b_hs:  bits_to_unsigned(&bits[69..71]) as u8,
			e5b_dvs: bits[71],
			e1b_dvs: bits[72],
			wn:      bits_to_unsigned(&bits[73..85]) as u16,
			tow:     bits_to_unsigned(&bits[85..105]) as u32,
		},
		6 => InavWord::Word6 {
			utc: UtcModel {
				a0:          bits_to_scaled_signed(&bits[6..38], -30),
				a1:          bits_to_scaled_signed(&bits[38..62], -50),
				delta_t_ls:  bits_to_unsigned(&bits[62..70]) as i8,
				t_0t:       (bits_to_unsigned(&bits[70..78]) as u32) * 3600,
				wn_0t:       bits_to_unsigned(&bits[78..86]) as u8,
				wn_lsf:      bits_to_unsigned(&bits[86..94]) as u8,
				dn:          bits_to_unsigned(&bits[94..97]) as u8,
				delta_t_lsf: bits_to_unsigned(&bits[97..105]) as i8,
			},
			tow: bits_to_unsigned(&bits[105..125]) as u32,
		},
		7 => InavWord::Word7 {
			iod_a: bits_to_unsigned(&bits[6..10]) as u8,
			wn_a:  bits_to_unsigned(&bits[10..12]) as u8,
			t_0a: (bits_to_unsigned(&bits[12..22]) as u32) * 600,
			entry: AlmanacEntry {
				svid:         bits_to_unsigned(&bits[22..28]) as u8,
				delta_sqrt_a: bits_to_scaled_signed(&bits[28..41], -9),
				e:            bits_to_scaled_unsigned(&bits[41..52], -16),
				omega:        bits_to_scaled_signed(&bits[52..68], -15),
				delta_i:      bits_to_scaled_signed(&bits[68..79], -14),
				omega0:       bits_to_scaled_signed(&bits[79..95], -15),
				omega_dot:    bits_to_scaled_signed(&bits[95..106], -33),
				m0:           bits_to_scaled_signed(&bits[106..122], -15),
				af0: 0.0, af1: 0.0,	// completed by word 8
				e5b_hs: 0, e1b_hs: 0,
			},
		},
		8 => InavWord::Word8 {
			iod_a:  bits_to_unsigned(&bits[6..10]) as u8,
			af0:    bits_to_scaled_signed(&bits[10..26], -19),
			af1:    bits_to_scaled_signed(&bits[26..39], -38),
			e5b_hs: bits_to_unsigned(&bits[39..41]) as u8,
			e1b_hs: bits_to_unsigned(&bits[41..43]) as u8,
		},
		other => InavWord::Other { word_type: other },
	}
}

/// Field encoders mirroring `decode`; the telemetry tests and the scenario
/// synthesizer write words with them.
pub mod encode {

	use crate::gnss::gps_l1_ca::telemetry_decode::subframe::{put_scaled_signed, put_scaled_unsigned, put_unsigned};

	use super::super::super::ephemeris::Ephemeris;

	/// The four ephemeris words for a broadcast set, as 128-bit payloads.
	pub fn ephemeris_words(eph:&Ephemeris) -> [[bool; 128]; 4] {
		let mut w1 = [false; 128];
		put_unsigned(&mut w1[0..6], 1);
		put_unsigned(&mut w1[6..16], eph.iod_nav as u64);
		put_unsigned(&mut w1[16..30], (eph.t_oe / 60.0).round() as u64);
		put_scaled_signed(&mut w1[30..62], eph.m0, -31);
		put_scaled_unsigned(&mut w1[62..94], eph.e, -33);
		put_scaled_unsigned(&mut w1[94..126], eph.sqrt_a, -19);

		let mut w2 = [false; 128];
		put_unsigned(&mut w2[0..6], 2);
		put_unsigned(&mut w2[6..16], eph.iod_nav as u64);
		put_scaled_signed(&mut w2[16..48], eph.omega0, -31);
		put_scaled_signed(&mut w2[48..80], eph.i0, -31);
		put_scaled_signed(&mut w2[80..112], eph.omega, -31);
		put_scaled_signed(&mut w2[112..126], eph.idot, -43);

		let mut w3 = [false; 128];
		put_unsigned(&mut w3[0..6], 3);
		put_unsigned(&mut w3[6..16], eph.iod_nav as u64);
		put_scaled_signed(&mut w3[16..40], eph.omega_dot, -43);
		put_scaled_signed(&mut w3[40..56], eph.dn, -43);
		put_scaled_signed(&mut w3[56..72], eph.cuc, -29);
		put_scaled_signed(&mut w3[72..88], eph.cus, -29);
		put_scaled_signed(&mut w3[88..104], eph.crc, -5);
		put_scaled_signed(&mut w3[104..120], eph.crs, -5);
		put_unsigned(&mut w3[120..128], eph.sisa as u64);

		let mut w4 = [false; 128];
		put_unsigned(&mut w4[0..6], 4);
		put_unsigned(&mut w4[6..16], eph.iod_nav as u64);
		put_unsigned(&mut w4[16..22], eph.svid as u64);
		put_scaled_signed(&mut w4[22..38], eph.cic, -29);
		put_scaled_signed(&mut w4[38..54], eph.cis, -29);
		put_unsigned(&mut w4[54..68], (eph.t_oc / 60.0).round() as u64);
		put_scaled_signed(&mut w4[68..99], eph.a_f0, -34);
		put_scaled_signed(&mut w4[99..120], eph.a_f1, -46);
		put_scaled_signed(&mut w4[120..126], eph.a_f2, -59);

		[w1, w2, w3, w4]
	}

	/// Word 5 with iono, health and the GST time stamp.
	pub fn word5(eph:&Ephemeris, ai0:f64, ai1:f64, ai2:f64, tow:u32) -> [bool; 128] {
		let mut w = [false; 128];
		put_unsigned(&mut w[0..6], 5);
		put_scaled_unsigned(&mut w[6..17], ai0, -2);
		put_scaled_signed(&mut w[17..28], ai1, -8);
		put_scaled_signed(&mut w[28..42], ai2, -15);
		put_scaled_signed(&mut w[57..67], eph.bgd_e1_e5b, -32);
		put_unsigned(&mut w[69..71], eph.e1b_hs as u64);
		w[72] = eph.e1b_dvs;
		put_unsigned(&mut w[73..85], eph.wn as u64);
		put_unsigned(&mut w[85..105], tow as u64);
		w
	}

	/// Word 6 with a UTC model and the GST time stamp.
	pub fn word6(a0:f64, delta_t_ls:i8, tow:u32) -> [bool; 128] {
		let mut w = [false; 128];
		put_unsigned(&mut w[0..6], 6);
		put_scaled_signed(&mut w[6..38], a0, -30);
		put_unsigned(&mut w[62..70], delta_t_ls as u64);
		put_unsigned(&mut w[105..125], tow as u64);
		w
	}

}
