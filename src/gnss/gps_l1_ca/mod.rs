
pub mod signal;
pub mod telemetry_decode;
pub mod ephemeris;

pub const CODE_LENGTH_CHIPS:usize = 1023;
pub const CODE_RATE_CHIPS_PER_SEC:f64 = 1.023e6;
pub const CODE_PERIOD_SEC:f64 = 1.0e-3;
pub const CARRIER_FREQ_HZ:f64 = 1.57542e9;

/// Navigation data bit period in code periods (50 bps over 1 ms codes).
pub const CODES_PER_DATA_BIT:usize = 20;

/// TLM word preamble, MSB first.
pub const PREAMBLE_BITS:[bool; 8] = [true, false, false, false, true, false, true, true];
