
/// Rate-1/2, constraint-length-7 convolutional code used by the Galileo
/// I/NAV message: generators 171/133 octal with the second branch inverted.
const K:usize = 7;
const N_STATES:usize = 64;
const G1:u32 = 0o171;
const G2:u32 = 0o133;

fn parity(x:u32) -> bool { x.count_ones() % 2 == 1 }

/// Branch outputs for a shift register holding the current input in the MSB
/// and the previous six bits below it, newest first.
fn branch_outputs(state:usize, bit:bool) -> (bool, bool) {
	let reg:u32 = ((bit as u32) << (K - 1)) | (state as u32);
	let out1 = parity(reg & G1);
	let out2 = !parity(reg & G2);	// Galileo transmits the inverted branch
	(out1, out2)
}

fn next_state(state:usize, bit:bool) -> usize {
	((state >> 1) | ((bit as usize) << (K - 2))) & (N_STATES - 1)
}

/// Encodes a bit sequence; the caller includes the 6 tail zeros that close
/// the trellis.  Used by the telemetry tests and the scenario synthesizer.
pub fn encode(bits:&[bool]) -> Vec<bool> {
	let mut state = 0usize;
	let mut out:Vec<bool> = Vec::with_capacity(bits.len() * 2);
	for &b in bits {
		let (o1, o2) = branch_outputs(state, b);
		out.push(o1);
		out.push(o2);
		state = next_state(state, b);
	}
	out
}

/// Soft-decision Viterbi decode of `2 * n_bits` symbols where symbol
/// polarity +1 encodes binary 0.  The trellis starts in the all-zeros state
/// and the tail inside the last bits brings it back there.
pub fn decode(symbols:&[f64], n_bits:usize) -> Vec<bool> {
	assert_eq!(symbols.len(), 2 * n_bits);

	const NEG_INF:f64 = f64::NEG_INFINITY;
	let mut metric = [NEG_INF; N_STATES];
	metric[0] = 0.0;

	// Per step and destination state: the LSB the winning predecessor
	// dropped in the shift, which is all a traceback needs because the
	// destination state itself carries the input bit in its MSB
	let mut decisions:Vec<[u8; N_STATES]> = Vec::with_capacity(n_bits);

	for step in 0..n_bits {
		let s0 = symbols[2 * step];
		let s1 = symbols[2 * step + 1];
		let mut next = [NEG_INF; N_STATES];
		let mut decision = [0u8; N_STATES];

		for state in 0..N_STATES {
			if metric[state] == NEG_INF { continue; }
			for &bit in &[false, true] {
				let (o1, o2) = branch_outputs(state, bit);
				// Transmitted symbol is +1 for a 0 bit
				let e1 = if o1 { -1.0 } else { 1.0 };
				let e2 = if o2 { -1.0 } else { 1.0 };
				let m = metric[state] + e1 * s0 + e2 * s1;
				let to = next_state(state, bit);
				if m > next[to] {
					next[to] = m;
					decision[to] = (state & 1) as u8;
				}
			}
		}
		metric = next;
		decisions.push(decision);
	}

	// Traceback from the all-zeros state the tail forces
	let mut bits = vec![false; n_bits];
	let mut state = 0usize;
	for step in (0..n_bits).rev() {
		bits[step] = (state >> (K - 2)) & 1 == 1;
		state = ((state << 1) & (N_STATES - 1)) | (decisions[step][state] as usize);
	}
	bits
}
