
pub mod codes;
pub mod signal;
pub mod telemetry_decode;
pub mod ephemeris;

pub const CODE_LENGTH_CHIPS:usize = 4092;
pub const CODE_RATE_CHIPS_PER_SEC:f64 = 1.023e6;
pub const CODE_PERIOD_SEC:f64 = 4.0e-3;
pub const CARRIER_FREQ_HZ:f64 = 1.57542e9;

/// E1-B symbol rate; one symbol per primary code period.
pub const SYMBOL_RATE_HZ:f64 = 250.0;

/// I/NAV page-part synchronization pattern, MSB first: 0101100000.
pub const SYNC_PATTERN:[bool; 10] = [false, true, false, true, true, false, false, false, false, false];

/// Coded symbols per page part after the sync pattern.
pub const PAGE_PART_CODED_SYMBOLS:usize = 240;
