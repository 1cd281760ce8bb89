
use std::collections::VecDeque;

use crate::gnss::gps_l1_ca::PREAMBLE_BITS;

/// Searches the bit stream for the TLM preamble in either polarity,
/// confirming a candidate with the parity of the word that follows it.
pub struct PreambleDetector {
	buffer: VecDeque<bool>,
	current_bit: usize,
	inverse_sense: Option<bool>,
	preamble_location: Option<usize>,
}

impl PreambleDetector {

	pub fn new() -> PreambleDetector {
		PreambleDetector { buffer: VecDeque::new(), current_bit: 0, inverse_sense: None, preamble_location: None }
	}

	pub fn initialize(&mut self) {
		self.buffer.clear();
		self.current_bit = 0;
		self.inverse_sense = None;
		self.preamble_location = None;
	}

	pub fn apply(&mut self, b:bool) {
		self.buffer.push_back(b);
		self.current_bit += 1;
		while self.buffer.len() > 30 { self.buffer.pop_front(); }

		if self.buffer.len() == 30 && self.preamble_location.is_none() {
			let candidate:Vec<bool> = self.buffer.iter().cloned().collect();
			let matches_direct  = candidate.iter().take(8).zip(PREAMBLE_BITS.iter()).all(|(a, b)| a == b);
			let matches_inverse = candidate.iter().take(8).zip(PREAMBLE_BITS.iter()).all(|(a, b)| *a != *b);

			if matches_direct && super::parity_check(&candidate, false, false) {
				self.inverse_sense = Some(false);
				self.preamble_location = Some(self.current_bit - 30);
			} else if matches_inverse {
				let flipped:Vec<bool> = candidate.iter().map(|b| !b).collect();
				if super::parity_check(&flipped, false, false) {
					self.inverse_sense = Some(true);
					self.preamble_location = Some(self.current_bit - 30);
				}
			}
		}
	}

	/// Number of bits consumed before the preamble started, once found.
	pub fn preamble_location(&self) -> Option<usize> { self.preamble_location }

	pub fn is_inverse_sense(&self) -> Option<bool> { self.inverse_sense }

}
