
use std::collections::VecDeque;

use rustfft::num_complex::Complex;

use crate::DigSigProcErr;
use crate::gnss::galileo_e1::{PAGE_PART_CODED_SYMBOLS, SYNC_PATTERN};

use super::ephemeris::{Almanac, Ephemeris, IonoParams, UtcModel};

pub mod viterbi;
pub mod inav;

const PAGE_PART_SYMBOLS:usize = 10 + PAGE_PART_CODED_SYMBOLS;
const PAGE_PART_BITS:usize = 120;
const INTERLEAVER_COLS:usize = 30;
const INTERLEAVER_ROWS:usize = 8;

/// CRC-24Q generator polynomial.
const CRC24Q_POLY:u32 = 0x1864CFB;

/// CRC-24Q over a bit slice, MSB first.
pub fn crc24q(bits:&[bool]) -> u32 {
	let mut crc:u32 = 0;
	for &b in bits {
		crc ^= (b as u32) << 23;
		crc <<= 1;
		if crc & 0x100_0000 != 0 { crc ^= CRC24Q_POLY; }
	}
	crc & 0xFF_FFFF
}

/// Transmit-side block interleaver: written row-wise into an 8 x 30 matrix,
/// read column-wise.  The tests and the scenario synthesizer encode with it.
pub fn interleave(symbols:&[f64]) -> Vec<f64> {
	assert_eq!(symbols.len(), PAGE_PART_CODED_SYMBOLS);
	let mut out = vec![0.0; PAGE_PART_CODED_SYMBOLS];
	let mut k = 0usize;
	for col in 0..INTERLEAVER_COLS {
		for row in 0..INTERLEAVER_ROWS {
			out[k] = symbols[row * INTERLEAVER_COLS + col];
			k += 1;
		}
	}
	out
}

/// Receive-side deinterleaver, the inverse of `interleave`.
pub fn deinterleave(symbols:&[f64]) -> Vec<f64> {
	assert_eq!(symbols.len(), PAGE_PART_CODED_SYMBOLS);
	let mut out = vec![0.0; PAGE_PART_CODED_SYMBOLS];
	let mut k = 0usize;
	for col in 0..INTERLEAVER_COLS {
		for row in 0..INTERLEAVER_ROWS {
			out[row * INTERLEAVER_COLS + col] = symbols[k];
			k += 1;
		}
	}
	out
}

/// What the channel learns from one decoded nominal page.
#[derive(Debug)]
pub enum TelemetryDecoderResult {
	NotReady,
	/// A CRC-clean word plus the symbol index closing its page and, when the
	/// word carries GST, the time of week at the *end* of that page.
	Word{ word:inav::InavWord, last_symbol_idx:usize, tow_handover:Option<f64> },
	Err(DigSigProcErr),
}

enum DecoderState {
	LookingForSync,
	Synced{ inverted:bool },
}

/// Galileo E1-B I/NAV decoder: page-part synchronization, deinterleaving,
/// Viterbi decoding, even/odd pairing and CRC-24Q integrity.
pub struct TelemetryDecoder {
	symbols: VecDeque<(f64, usize)>,
	state: DecoderState,
	even_part: Option<[bool; PAGE_PART_BITS]>,
	crc_failures: usize,
}

impl TelemetryDecoder {

	pub fn new() -> TelemetryDecoder {
		TelemetryDecoder {
			symbols: VecDeque::new(),
			state: DecoderState::LookingForSync,
			even_part: None,
			crc_failures: 0,
		}
	}

	pub fn initialize(&mut self) {
		self.symbols.clear();
		self.state = DecoderState::LookingForSync;
		self.even_part = None;
		self.crc_failures = 0;
	}

	pub fn crc_failures(&self) -> usize { self.crc_failures }

	/// Feeds one 250 Hz prompt symbol.
	pub fn apply(&mut self, prompt:Complex<f64>, symbol_idx:usize) -> TelemetryDecoderResult {
		self.symbols.push_back((prompt.re, symbol_idx));

		match self.state {
			DecoderState::LookingForSync => {
				// Slide until the head of the buffer matches the sync word
				while self.symbols.len() >= SYNC_PATTERN.len() {
					match sync_match(&self.symbols) {
						Some(inverted) => {
							self.state = DecoderState::Synced{ inverted };
							return TelemetryDecoderResult::NotReady;
						},
						None => { self.symbols.pop_front(); },
					}
				}
				TelemetryDecoderResult::NotReady
			},
			DecoderState::Synced{ inverted } => {
				if self.symbols.len() < PAGE_PART_SYMBOLS {
					return TelemetryDecoderResult::NotReady;
				}

				// Re-verify the sync word on every part; losing it sends the
				// decoder back to searching, advanced one symbol so a stale
				// match cannot pin the search in place
				match sync_match(&self.symbols) {
					Some(inv) if inv == inverted => {},
					_ => {
						self.symbols.pop_front();
						self.state = DecoderState::LookingForSync;
						self.even_part = None;
						return TelemetryDecoderResult::Err(
							DigSigProcErr::InvalidTelemetryData("page sync lost"));
					},
				}

				for _ in 0..SYNC_PATTERN.len() { self.symbols.pop_front(); }
				let mut coded:Vec<f64> = Vec::with_capacity(PAGE_PART_CODED_SYMBOLS);
				let mut last_symbol_idx = 0usize;
				for _ in 0..PAGE_PART_CODED_SYMBOLS {
					let (s, idx) = self.symbols.pop_front().unwrap();
					coded.push(if inverted { -s } else { s });
					last_symbol_idx = idx;
				}

				let bits_vec = viterbi::decode(&deinterleave(&coded), PAGE_PART_BITS);
				let mut bits = [false; PAGE_PART_BITS];
				bits.copy_from_slice(&bits_vec);

				let is_odd = bits[0];
				let page_type_alert = bits[1];
				if page_type_alert {
					// Alert pages carry no broadcast data for this receiver
					self.even_part = None;
					return TelemetryDecoderResult::NotReady;
				}

				if !is_odd {
					self.even_part = Some(bits);
					return TelemetryDecoderResult::NotReady;
				}

				let even = match self.even_part.take() {
					Some(e) => e,
					None => return TelemetryDecoderResult::NotReady,
				};

				// CRC-24Q spans the even part and the odd part up to the
				// checksum field
				let mut crc_input:Vec<bool> = Vec::with_capacity(196);
				crc_input.extend_from_slice(&even[0..114]);
				crc_input.extend_from_slice(&bits[0..82]);
				let crc_field = crate::utils::bits_to_unsigned(&bits[82..106]) as u32;
				if crc24q(&crc_input) != crc_field {
					self.crc_failures += 1;
					return TelemetryDecoderResult::Err(
						DigSigProcErr::InvalidTelemetryData("page CRC failed"));
				}

				// Word content: 112 bits from the even part, 16 from the odd
				let mut word_bits:Vec<bool> = Vec::with_capacity(128);
				word_bits.extend_from_slice(&even[2..114]);
				word_bits.extend_from_slice(&bits[2..18]);
				let word = inav::decode(&word_bits);

				// Words 5 and 6 time-stamp the page; the handover names GST
				// at the end of the odd part, one nominal page after the stamp
				let tow_handover = match word {
					inav::InavWord::Word5{ tow, .. } => Some(tow as f64 + 2.0),
					inav::InavWord::Word6{ tow, .. } => Some(tow as f64 + 2.0),
					_ => None,
				};

				TelemetryDecoderResult::Word{ word, last_symbol_idx, tow_handover }
			},
		}
	}

}

fn sync_match(symbols:&VecDeque<(f64, usize)>) -> Option<bool> {
	let mut direct = true;
	let mut inverted = true;
	for (i, expected) in SYNC_PATTERN.iter().enumerate() {
		let s = symbols[i].0;
		// Symbol polarity +1 encodes binary 0
		let bit = s < 0.0;
		if bit != *expected { direct = false; }
		if bit == *expected { inverted = false; }
	}
	if direct { Some(false) } else if inverted { Some(true) } else { None }
}

/// Accumulates words into complete broadcast records; a record publishes
/// only when every part carries the same issue of data.
#[derive(Default)]
pub struct InavAssembler {
	word1: Option<inav::InavWord>,
	word2: Option<inav::InavWord>,
	word3: Option<inav::InavWord>,
	word4: Option<inav::InavWord>,
	word5: Option<inav::InavWord>,
	pending_almanac: Option<(u8, u8, u32, super::ephemeris::AlmanacEntry)>,
	pub almanac: Almanac,
}

impl InavAssembler {

	pub fn new() -> Self { Self::default() }

	pub fn reset(&mut self) {
		self.word1 = None;
		self.word2 = None;
		self.word3 = None;
		self.word4 = None;
		self.word5 = None;
		self.pending_almanac = None;
	}

	/// Feeds one word; returns a complete ephemeris when words 1-5 of the
	/// same IOD_nav have all arrived.
	pub fn feed(&mut self, word:inav::InavWord) -> FeedOutcome {
		match word {
			inav::InavWord::Word1{..} => self.word1 = Some(word),
			inav::InavWord::Word2{..} => self.word2 = Some(word),
			inav::InavWord::Word3{..} => self.word3 = Some(word),
			inav::InavWord::Word4{..} => self.word4 = Some(word),
			inav::InavWord::Word5{..} => self.word5 = Some(word),
			inav::InavWord::Word6{ utc, .. } => return FeedOutcome::Utc(utc),
			inav::InavWord::Word7{ iod_a, wn_a, t_0a, entry } => {
				self.pending_almanac = Some((iod_a, wn_a, t_0a, entry));
			},
			inav::InavWord::Word8{ iod_a, af0, af1, e5b_hs, e1b_hs } => {
				if let Some((pending_iod, wn_a, t_0a, mut entry)) = self.pending_almanac.take() {
					if pending_iod == iod_a {
						entry.af0 = af0;
						entry.af1 = af1;
						entry.e5b_hs = e5b_hs;
						entry.e1b_hs = e1b_hs;
						self.almanac.iod_a = iod_a;
						self.almanac.wn_a = wn_a;
						self.almanac.t_0a = t_0a;
						self.almanac.entries.insert(entry.svid, entry);
						return FeedOutcome::Almanac(self.almanac.clone());
					}
				}
			},
			inav::InavWord::Other{..} => {},
		}
		self.try_complete()
	}

	fn try_complete(&mut self) -> FeedOutcome {
		let (w1, w2, w3, w4, w5) = match (&self.word1, &self.word2, &self.word3, &self.word4, &self.word5) {
			(Some(a), Some(b), Some(c), Some(d), Some(e)) => (*a, *b, *c, *d, *e),
			_ => return FeedOutcome::Nothing,
		};

		if let (inav::InavWord::Word1{ iod_nav: i1, t_0e, m0, e, sqrt_a },
		        inav::InavWord::Word2{ iod_nav: i2, omega0, i0, omega, idot },
		        inav::InavWord::Word3{ iod_nav: i3, omega_dot, dn, cuc, cus, crc, crs, sisa },
		        inav::InavWord::Word4{ iod_nav: i4, svid, cic, cis, t_0c, a_f0, a_f1, a_f2 },
		        inav::InavWord::Word5{ iono, bgd_e1_e5b, e1b_hs, e1b_dvs, wn, .. }) = (w1, w2, w3, w4, w5) {

			if i1 != i2 || i2 != i3 || i3 != i4 {
				return FeedOutcome::Nothing;
			}

			let eph = Ephemeris {
				svid, iod_nav: i1, wn,
				t_oe: t_0e, sqrt_a, e, m0,
				dn, omega, omega0, omega_dot,
				i0, idot,
				cuc, cus, crc, crs, cic, cis,
				t_oc: t_0c, a_f0, a_f1, a_f2,
				sisa, bgd_e1_e5b, e1b_hs, e1b_dvs,
			};
			// A fresh set starts accumulating again from scratch
			self.word1 = None;
			self.word2 = None;
			self.word3 = None;
			self.word4 = None;
			FeedOutcome::Ephemeris(eph, iono)
		} else {
			FeedOutcome::Nothing
		}
	}

}

pub enum FeedOutcome {
	Nothing,
	Ephemeris(Ephemeris, IonoParams),
	Utc(UtcModel),
	Almanac(Almanac),
}

#[cfg(test)]
mod tests {

	use crate::gnss::gps_l1_ca::telemetry_decode::subframe::put_unsigned;

	use super::*;

	/// Builds the 250 transmitted soft symbols of one page part from its 120
	/// source bits.
	pub fn page_part_symbols(bits:&[bool; PAGE_PART_BITS]) -> Vec<f64> {
		let coded = viterbi::encode(&bits[..]);
		let symbols:Vec<f64> = coded.iter().map(|&b| if b { -1.0 } else { 1.0 }).collect();
		let mut out:Vec<f64> = SYNC_PATTERN.iter().map(|&b| if b { -1.0 } else { 1.0 }).collect();
		out.extend(interleave(&symbols));
		out
	}

	/// An even/odd page pair around one 128-bit word, CRC included.
	pub fn nominal_page(word_bits:&[bool; 128]) -> (Vec<f64>, Vec<f64>) {
		let mut even = [false; PAGE_PART_BITS];
		even[0] = false;	// even
		even[1] = false;	// nominal
		even[2..114].copy_from_slice(&word_bits[0..112]);

		let mut odd = [false; PAGE_PART_BITS];
		odd[0] = true;
		odd[1] = false;
		odd[2..18].copy_from_slice(&word_bits[112..128]);

		let mut crc_input:Vec<bool> = Vec::with_capacity(196);
		crc_input.extend_from_slice(&even[0..114]);
		crc_input.extend_from_slice(&odd[0..82]);
		let crc = crc24q(&crc_input);
		put_unsigned(&mut odd[82..106], crc as u64);

		(page_part_symbols(&even), page_part_symbols(&odd))
	}

	#[test]
	fn crc24q_reference_vectors() {
		// An all-zero message has a zero CRC; any flipped bit does not
		let zeros = vec![false; 196];
		assert_eq!(crc24q(&zeros), 0);
		let mut one_bit = zeros.clone();
		one_bit[0] = true;
		assert_ne!(crc24q(&one_bit), 0);

		// Linearity: crc(a ^ b) == crc(a) ^ crc(b)
		let a:Vec<bool> = (0..196).map(|i| i % 3 == 0).collect();
		let b:Vec<bool> = (0..196).map(|i| i % 5 == 1).collect();
		let xab:Vec<bool> = a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect();
		assert_eq!(crc24q(&xab), crc24q(&a) ^ crc24q(&b));
	}

	#[test]
	fn interleaver_round_trip() {
		let symbols:Vec<f64> = (0..PAGE_PART_CODED_SYMBOLS).map(|i| i as f64).collect();
		assert_eq!(deinterleave(&interleave(&symbols)), symbols);
		assert_ne!(interleave(&symbols), symbols);
	}

	#[test]
	fn decodes_a_clean_word_pair() {
		let mut word_bits = [false; 128];
		put_unsigned(&mut word_bits[0..6], 5);		// word type 5
		put_unsigned(&mut word_bits[73..85], 1042);	// week
		put_unsigned(&mut word_bits[85..105], 345_600);	// TOW

		let (even, odd) = nominal_page(&word_bits);

		let mut dec = TelemetryDecoder::new();
		let mut idx = 0usize;
		let mut result = None;
		for s in even.into_iter().chain(odd.into_iter()) {
			match dec.apply(Complex{ re: 40.0 * s, im: 0.1 }, idx) {
				TelemetryDecoderResult::Word{ word, tow_handover, .. } => { result = Some((word, tow_handover)); },
				TelemetryDecoderResult::Err(e) => panic!("decode error: {:?}", e),
				TelemetryDecoderResult::NotReady => {},
			}
			idx += 1;
		}

		match result {
			Some((inav::InavWord::Word5{ wn, tow, .. }, Some(handover))) => {
				assert_eq!(wn, 1042);
				assert_eq!(tow, 345_600);
				assert_eq!(handover, 345_602.0);
			},
			other => panic!("expected word 5, got {:?}", other.map(|(w, _)| w)),
		}
	}

	#[test]
	fn inverted_polarity_still_decodes() {
		let mut word_bits = [false; 128];
		put_unsigned(&mut word_bits[0..6], 6);
		put_unsigned(&mut word_bits[105..125], 7_200);

		let (even, odd) = nominal_page(&word_bits);
		let mut dec = TelemetryDecoder::new();
		let mut got_word = false;
		for (idx, s) in even.into_iter().chain(odd.into_iter()).enumerate() {
			if let TelemetryDecoderResult::Word{ word: inav::InavWord::Word6{ tow, .. }, .. } =
				dec.apply(Complex{ re: -30.0 * s, im: 0.0 }, idx) {
				assert_eq!(tow, 7_200);
				got_word = true;
			}
		}
		assert!(got_word);
	}

	#[test]
	fn wrong_checksum_fails_crc() {
		let mut word_bits = [false; 128];
		put_unsigned(&mut word_bits[0..6], 5);

		// Rebuild the odd part with a corrupted CRC field
		let mut even_bits = [false; PAGE_PART_BITS];
		even_bits[2..114].copy_from_slice(&word_bits[0..112]);
		let mut odd_bits = [false; PAGE_PART_BITS];
		odd_bits[0] = true;
		odd_bits[2..18].copy_from_slice(&word_bits[112..128]);
		let mut crc_input:Vec<bool> = Vec::with_capacity(196);
		crc_input.extend_from_slice(&even_bits[0..114]);
		crc_input.extend_from_slice(&odd_bits[0..82]);
		put_unsigned(&mut odd_bits[82..106], (crc24q(&crc_input) ^ 1) as u64);

		let even = page_part_symbols(&even_bits);
		let odd = page_part_symbols(&odd_bits);

		let mut dec = TelemetryDecoder::new();
		let mut saw_failure = false;
		for (idx, s) in even.into_iter().chain(odd.into_iter()).enumerate() {
			match dec.apply(Complex{ re: 25.0 * s, im: 0.0 }, idx) {
				TelemetryDecoderResult::Word{ .. } => panic!("corrupted page must not decode"),
				TelemetryDecoderResult::Err(_) => { saw_failure = true; },
				TelemetryDecoderResult::NotReady => {},
			}
		}
		assert!(saw_failure);
		assert_eq!(dec.crc_failures(), 1);
	}

	#[test]
	fn assembler_requires_matching_iod_nav() {
		let eph = crate::gnss::galileo_e1::ephemeris::Ephemeris {
			svid: 11, iod_nav: 64, wn: 1042,
			t_oe: 345_600.0, sqrt_a: 5440.6, e: 2.0e-4, m0: 0.2,
			dn: 0.0, omega: 0.1, omega0: 0.3, omega_dot: -1.0e-9,
			i0: 0.31, idot: 0.0,
			cuc: 0.0, cus: 0.0, crc: 0.0, crs: 0.0, cic: 0.0, cis: 0.0,
			t_oc: 345_600.0, a_f0: 1.0e-5, a_f1: 0.0, a_f2: 0.0,
			sisa: 107, bgd_e1_e5b: 0.0, e1b_hs: 0, e1b_dvs: false,
		};
		let words = inav::encode::ephemeris_words(&eph);
		let w5 = inav::encode::word5(&eph, 30.0, 0.0, 0.0, 345_600);

		let mut asm = InavAssembler::new();
		assert!(matches!(asm.feed(inav::decode(&words[0])), FeedOutcome::Nothing));
		assert!(matches!(asm.feed(inav::decode(&words[1])), FeedOutcome::Nothing));
		assert!(matches!(asm.feed(inav::decode(&words[2])), FeedOutcome::Nothing));
		assert!(matches!(asm.feed(inav::decode(&w5)), FeedOutcome::Nothing));
		match asm.feed(inav::decode(&words[3])) {
			FeedOutcome::Ephemeris(out, iono) => {
				assert_eq!(out.svid, 11);
				assert_eq!(out.iod_nav, 64);
				assert_eq!(out.wn, 1042);
				assert_eq!(iono.ai0, 30.0);
				assert!((out.sqrt_a - eph.sqrt_a).abs() < 2.0_f64.powi(-18));
			},
			_ => panic!("expected a complete ephemeris"),
		}

		// A word 4 from a newer issue of data must not complete with the
		// older words 1 through 3
		let newer = crate::gnss::galileo_e1::ephemeris::Ephemeris{ iod_nav: 65, ..eph };
		let newer_words = inav::encode::ephemeris_words(&newer);
		assert!(matches!(asm.feed(inav::decode(&words[0])), FeedOutcome::Nothing));
		assert!(matches!(asm.feed(inav::decode(&words[1])), FeedOutcome::Nothing));
		assert!(matches!(asm.feed(inav::decode(&words[2])), FeedOutcome::Nothing));
		assert!(matches!(asm.feed(inav::decode(&newer_words[3])), FeedOutcome::Nothing));
	}

}
