
use std::collections::VecDeque;

use rustfft::num_complex::Complex;

/// Signal-to-noise-variance C/N0 estimator over a window of prompt symbols,
/// reported in dB-Hz for the given coherent integration time.
pub fn cn0_snv_estimator(prompt_buffer:&VecDeque<(Complex<f64>, usize)>, coh_integration_time_s:f64) -> f64 {
	let n:f64 = prompt_buffer.len() as f64;
	let p_sig:f64 = {
		let sum:f64 = prompt_buffer.iter().map(|(c, _)| c.re.abs()).sum();
		(sum / n).powi(2)
	};
	let p_tot:f64 = {
		let sum:f64 = prompt_buffer.iter().map(|(c, _)| c.norm_sqr()).sum();
		sum / n
	};
	// On a noise-free prompt the noise estimate can round to zero or below
	let noise = p_tot - p_sig;
	let snr = if noise > 0.0 { p_sig / noise } else { f64::INFINITY };
	10.0 * snr.log10() - 10.0 * coh_integration_time_s.log10()
}

/// Narrowband power ratio carrier-lock test; approaches +1 when the prompt
/// energy sits on the in-phase arm and falls toward -1 as phase lock degrades.
pub fn carrier_lock_detector(prompt_buffer:&VecDeque<(Complex<f64>, usize)>) -> f64 {
	let sum_i:f64 = prompt_buffer.iter().map(|(c, _)| c.re).sum();
	let sum_q:f64 = prompt_buffer.iter().map(|(c, _)| c.im).sum();
	let nbp:f64 = sum_i * sum_i + sum_q * sum_q;
	let nbd:f64 = sum_i * sum_i - sum_q * sum_q;
	nbd / nbp
}
