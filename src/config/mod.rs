
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::warn;

use crate::DigSigProcErr;

pub const DEFAULT_FS_HZ:i64 = 2_048_000;

/// Acquisition algorithm selected by the `<Role>.implementation` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcqAlgorithm {
	Pcps,
	Tong,
	QuickSync,
}

#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
	pub role: String,
	pub implementation: AcqAlgorithm,
	pub ifreq_hz: i64,
	pub doppler_max_hz: i64,
	pub doppler_step_hz: i64,
	pub coherent_integration_time_ms: usize,
	pub folding_factor: usize,
	pub bit_transition_flag: bool,
	pub max_dwells: usize,
	pub pfa: Option<f64>,
	pub threshold: f64,
	pub tong_init_val: usize,
	pub tong_max_val: usize,
	pub cboc: bool,
	pub dump: bool,
	pub dump_filename: String,
}

#[derive(Debug, Clone)]
pub struct TrackingConfig {
	pub role: String,
	pub pll_bw_hz: f64,
	pub dll_bw_hz: f64,
	pub dump: bool,
	pub dump_filename: String,
}

#[derive(Debug, Clone)]
pub struct PvtConfig {
	pub output_rate_ms: usize,
	pub averaging_depth: usize,
	pub flag_averaging: bool,
	pub dump: bool,
	pub dump_filename: String,
}

#[derive(Debug, Clone)]
pub struct ChannelsConfig {
	pub retry_cap: usize,
	pub gps_prn_list: Vec<usize>,
	pub galileo_prn_list: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct RinexConfig {
	pub version: u8,
}

/// The typed configuration record for the whole receiver.  Built from the
/// flat `Section.key=value` properties format; every recognized key is
/// enumerated here and unknown keys under recognized sections are reported
/// with a WARNING rather than silently dropped.
#[derive(Debug, Clone)]
pub struct Config {
	pub internal_fs_hz: i64,
	pub gps_acquisition: AcquisitionConfig,
	pub galileo_acquisition: AcquisitionConfig,
	pub gps_tracking: TrackingConfig,
	pub galileo_tracking: TrackingConfig,
	pub pvt: PvtConfig,
	pub channels: ChannelsConfig,
	pub rinex: RinexConfig,
}

impl Default for Config {
	fn default() -> Self { PropertyTable::new().into_config().0 }
}

impl Config {

	pub fn from_file<P: AsRef<Path>>(path:P) -> Result<Self, DigSigProcErr> {
		let text = fs::read_to_string(path).map_err(|e| DigSigProcErr::IoFailure(e.to_string()))?;
		Self::from_str(&text)
	}

	pub fn from_str(text:&str) -> Result<Self, DigSigProcErr> {
		let mut table = PropertyTable::new();
		for (lineno, line) in text.lines().enumerate() {
			let line = line.trim();
			if line.is_empty() || line.starts_with(';') || line.starts_with('#') { continue; }
			match line.find('=') {
				Some(pos) => {
					let key = line[..pos].trim().to_string();
					let value = line[pos+1..].trim().to_string();
					table.entries.insert(key, value);
				},
				None => return Err(DigSigProcErr::ConfigurationInvalid(
					format!("line {} is not a key=value pair: {:?}", lineno + 1, line))),
			}
		}
		Ok(table.into_config().0)
	}

	pub fn fs_sps(&self) -> f64 { self.internal_fs_hz as f64 }

}

struct PropertyTable {
	entries: BTreeMap<String, String>,
	consumed: std::cell::RefCell<Vec<String>>,
}

impl PropertyTable {

	fn new() -> Self { Self { entries: BTreeMap::new(), consumed: std::cell::RefCell::new(vec![]) } }

	fn get(&self, key:&str) -> Option<&str> {
		self.consumed.borrow_mut().push(key.to_string());
		self.entries.get(key).map(|s| s.as_str())
	}

	fn i64_or(&self, key:&str, default:i64) -> i64 {
		match self.get(key).map(|v| v.parse::<i64>()) {
			Some(Ok(x)) => x,
			Some(Err(_)) => { warn!("configuration key {} is not an integer, using {}", key, default); default },
			None => default,
		}
	}

	fn usize_or(&self, key:&str, default:usize) -> usize {
		match self.get(key).map(|v| v.parse::<usize>()) {
			Some(Ok(x)) => x,
			Some(Err(_)) => { warn!("configuration key {} is not an unsigned integer, using {}", key, default); default },
			None => default,
		}
	}

	fn f64_opt(&self, key:&str) -> Option<f64> {
		match self.get(key).map(|v| v.parse::<f64>()) {
			Some(Ok(x)) => Some(x),
			Some(Err(_)) => { warn!("configuration key {} is not a number, ignoring", key); None },
			None => None,
		}
	}

	fn f64_or(&self, key:&str, default:f64) -> f64 { self.f64_opt(key).unwrap_or(default) }

	fn bool_or(&self, key:&str, default:bool) -> bool {
		match self.get(key) {
			Some("true") | Some("1") => true,
			Some("false") | Some("0") => false,
			Some(v) => { let v = v.to_string(); warn!("configuration key {} has non-boolean value {:?}, using {}", key, v, default); default },
			None => default,
		}
	}

	fn string_or(&self, key:&str, default:&str) -> String {
		self.get(key).map(|s| s.to_string()).unwrap_or_else(|| default.to_string())
	}

	fn prn_list_or(&self, key:&str, default:&[usize]) -> Vec<usize> {
		match self.get(key) {
			Some(v) => {
				let parsed:Result<Vec<usize>, _> = v.split(',').map(|tok| tok.trim().parse::<usize>()).collect();
				match parsed {
					Ok(list) if !list.is_empty() => list,
					_ => { warn!("configuration key {} is not a comma-separated PRN list, using default", key); default.to_vec() },
				}
			},
			None => default.to_vec(),
		}
	}

	fn acq_algorithm_or(&self, key:&str, default:AcqAlgorithm) -> AcqAlgorithm {
		match self.get(key) {
			Some("PCPS") | Some("GPS_L1_CA_PCPS_Acquisition") | Some("Galileo_E1_PCPS_Ambiguous_Acquisition") => AcqAlgorithm::Pcps,
			Some("Tong") | Some("GPS_L1_CA_PCPS_Tong_Acquisition") => AcqAlgorithm::Tong,
			Some("QuickSync") | Some("Galileo_E1_PCPS_QuickSync_Ambiguous_Acquisition") | Some("GPS_L1_CA_PCPS_QuickSync_Acquisition") => AcqAlgorithm::QuickSync,
			Some(v) => { let v = v.to_string(); warn!("unknown acquisition implementation {:?}, using default", v); default },
			None => default,
		}
	}

	fn acquisition(&self, role:&str, code_period_ms:usize) -> AcquisitionConfig {
		let sampled_ms = self.usize_or(&format!("{}.coherent_integration_time_ms", role), code_period_ms);
		// Round the dwell up to a whole number of code periods, warning rather
		// than aborting on an invalid value.
		let sampled_ms = if sampled_ms % code_period_ms != 0 {
			let rounded = ((sampled_ms / code_period_ms) + 1) * code_period_ms;
			warn!("{}.coherent_integration_time_ms = {} is not a multiple of the {} ms code period, using {} ms",
				role, sampled_ms, code_period_ms, rounded);
			rounded
		} else { sampled_ms.max(code_period_ms) };

		let bit_transition_flag = self.bool_or(&format!("{}.bit_transition_flag", role), false);
		let max_dwells = if bit_transition_flag { 2 } else { self.usize_or(&format!("{}.max_dwells", role), 1) };

		AcquisitionConfig {
			role: role.to_string(),
			implementation: self.acq_algorithm_or(&format!("{}.implementation", role), AcqAlgorithm::Pcps),
			ifreq_hz: self.i64_or(&format!("{}.ifreq", role), 0),
			doppler_max_hz: self.i64_or(&format!("{}.doppler_max", role), 5000),
			doppler_step_hz: self.i64_or(&format!("{}.doppler_step", role), 250),
			coherent_integration_time_ms: sampled_ms,
			folding_factor: self.usize_or(&format!("{}.folding_factor", role), 2).max(1),
			bit_transition_flag,
			max_dwells,
			pfa: self.f64_opt(&format!("{}.pfa", role)),
			threshold: self.f64_or(&format!("{}.threshold", role), 0.01),
			tong_init_val: self.usize_or(&format!("{}.tong_init_val", role), 1),
			tong_max_val: self.usize_or(&format!("{}.tong_max_val", role), 2),
			cboc: self.bool_or(&format!("{}.cboc", role), false),
			dump: self.bool_or(&format!("{}.dump", role), false),
			dump_filename: self.string_or(&format!("{}.dump_filename", role), &format!("./{}.dat", role.to_lowercase())),
		}
	}

	fn tracking(&self, role:&str, default_dll_bw_hz:f64) -> TrackingConfig {
		TrackingConfig {
			role: role.to_string(),
			pll_bw_hz: self.f64_or(&format!("{}.pll_bw_hz", role), 20.0),
			dll_bw_hz: self.f64_or(&format!("{}.dll_bw_hz", role), default_dll_bw_hz),
			dump: self.bool_or(&format!("{}.dump", role), false),
			dump_filename: self.string_or(&format!("{}.dump_filename", role), &format!("./{}.dat", role.to_lowercase())),
		}
	}

	fn into_config(self) -> (Config, Vec<String>) {
		let cfg = Config {
			internal_fs_hz: self.i64_or("GNSS-SDR.internal_fs_hz", DEFAULT_FS_HZ),
			gps_acquisition: self.acquisition("Acquisition_GPS", 1),
			galileo_acquisition: self.acquisition("Acquisition_Galileo", 4),
			gps_tracking: self.tracking("Tracking_GPS", 2.0),
			galileo_tracking: self.tracking("Tracking_Galileo", 1.0),
			pvt: PvtConfig {
				output_rate_ms: self.usize_or("PVT.output_rate_ms", 100),
				averaging_depth: self.usize_or("PVT.averaging_depth", 10),
				flag_averaging: self.bool_or("PVT.flag_averaging", false),
				dump: self.bool_or("PVT.dump", false),
				dump_filename: self.string_or("PVT.dump_filename", "./pvt.dat"),
			},
			channels: ChannelsConfig {
				retry_cap: self.usize_or("Channels.retry_cap", 3),
				gps_prn_list: self.prn_list_or("Channels_GPS.prn_list", &(1..=32).collect::<Vec<usize>>()),
				galileo_prn_list: self.prn_list_or("Channels_Galileo.prn_list", &(1..=50).collect::<Vec<usize>>()),
			},
			rinex: RinexConfig {
				version: match self.usize_or("Rinex.version", 3) {
					2 => 2,
					3 => 3,
					v => { warn!("Rinex.version = {} is not supported, using 3", v); 3 },
				},
			},
		};

		// Any key we never asked for is unrecognized; say so instead of
		// silently ignoring it.
		let consumed = self.consumed.borrow();
		let unknown:Vec<String> = self.entries.keys()
			.filter(|key| !consumed.iter().any(|k| &k == key))
			.cloned().collect();
		for key in &unknown {
			warn!("unrecognized configuration key: {}", key);
		}

		(cfg, unknown)
	}

}

/// Returns the unrecognized keys of a properties text.  Used by the
/// front-end to surface configuration typos.
pub fn unrecognized_keys(text:&str) -> Vec<String> {
	let mut table = PropertyTable::new();
	for line in text.lines() {
		let line = line.trim();
		if line.is_empty() || line.starts_with(';') || line.starts_with('#') { continue; }
		if let Some(pos) = line.find('=') {
			table.entries.insert(line[..pos].trim().to_string(), line[pos+1..].trim().to_string());
		}
	}
	table.into_config().1
}
