
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::warn;

use crate::DigSigProcErr;
use crate::gnss::gps_l1_ca::ephemeris as gps;
use crate::gnss::galileo_e1::ephemeris as gal;
use crate::gnss::synchro::{GnssSynchro, SignalType};

pub const PROGRAM_NAME:&str = "GNSS-RX 0.2.0";

/// Converts a double into FORTRAN-style scientific notation with a `D`
/// exponent, a leading decimal point and a signed exponent, e.g.
/// `doub2for(-0.00001, 18, 2)` gives `-.100000000000D-04`.
pub fn doub2for(d:f64, length:usize, exp_len:usize) -> String {
	let mantissa_digits = length - exp_len - 4;	// sign, point, D, exponent sign

	if d == 0.0 || !d.is_finite() {
		return format!(" .{}D+{:0>width$}", "0".repeat(mantissa_digits), 0, width = exp_len);
	}

	let negative = d < 0.0;
	let mut exponent:i32 = d.abs().log10().floor() as i32 + 1;
	let mut mantissa = d.abs() / 10f64.powi(exponent);

	// Normalize into [0.1, 1) against log10 edge cases
	while mantissa >= 1.0 { mantissa /= 10.0; exponent += 1; }
	while mantissa < 0.1 { mantissa *= 10.0; exponent -= 1; }

	let scaled = (mantissa * 10f64.powi(mantissa_digits as i32)).round() as u64;
	let (digits, exponent) = if scaled >= 10u64.pow(mantissa_digits as u32) {
		// Rounding carried past the leading digit
		(scaled / 10, exponent + 1)
	} else {
		(scaled, exponent)
	};

	format!("{}.{:0>width$}D{}{:0>exp_width$}",
		if negative { "-" } else { " " },
		digits,
		if exponent < 0 { "-" } else { "+" },
		exponent.abs(),
		width = mantissa_digits,
		exp_width = exp_len)
}

/// GPS week and seconds of week to a calendar date; leap years handled,
/// leap seconds not.
pub fn gps_time_to_calendar(week:u32, tow:f64) -> (i32, u32, u32, u32, u32, f64) {
	const DAYS_IN_MONTH:[[u32; 12]; 2] = [
		[31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31],
		[31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]];
	fn is_leap(y:i32) -> bool { (y % 4 == 0 && y % 100 != 0) || y % 400 == 0 }

	// GPS epoch: 1980-01-06
	let days = (week as i64) * 7 + (tow / 86_400.0).floor() as i64;
	let seconds_of_day = tow.rem_euclid(86_400.0);

	let mut year:i32 = 1980;
	let mut day_of_year:i64 = 5 + days;	// January 6th is day index 5
	loop {
		let year_len = if is_leap(year) { 366 } else { 365 };
		if day_of_year < year_len { break; }
		day_of_year -= year_len;
		year += 1;
	}

	let table = &DAYS_IN_MONTH[is_leap(year) as usize];
	let mut month = 0usize;
	while day_of_year >= table[month] as i64 {
		day_of_year -= table[month] as i64;
		month += 1;
	}

	let hour = (seconds_of_day / 3600.0).floor() as u32;
	let minute = ((seconds_of_day - hour as f64 * 3600.0) / 60.0).floor() as u32;
	let second = seconds_of_day - hour as f64 * 3600.0 - minute as f64 * 60.0;

	(year, month as u32 + 1, day_of_year as u32 + 1, hour, minute, second)
}

fn day_of_year(year:i32, month:u32, day:u32) -> u32 {
	const CUM:[u32; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];
	let leap = ((year % 4 == 0 && year % 100 != 0) || year % 400 == 0) && month > 2;
	CUM[month as usize - 1] + day + leap as u32
}

/// IGS short filename `ssssDDDf.yyT`.
pub fn igs_filename(site:&str, week:u32, tow:f64, session:char, file_type:char) -> String {
	let (year, month, day, ..) = gps_time_to_calendar(week, tow);
	format!("{:<4}{:03}{}.{:02}{}",
		&site.to_lowercase()[..4.min(site.len())],
		day_of_year(year, month, day),
		session,
		year % 100,
		file_type)
}

fn header_line(content:&str, label:&str) -> String {
	let line = format!("{:<60}{:<20}", content, label);
	debug_assert_eq!(line.len(), 80);
	line
}

fn sat_id(signal:SignalType, prn:usize) -> String {
	match signal {
		SignalType::GpsL1Ca    => format!("G{:02}", prn),
		SignalType::GalileoE1B => format!("E{:02}", prn),
	}
}

/// Generates RINEX 2.11 / 3.01 observation and navigation files: headers
/// exactly once per session, observation records at the PVT cadence,
/// navigation records at most once per six seconds.
pub struct RinexPrinter {
	pub version: u8,
	site: String,
	dir: PathBuf,
	obs: Option<BufWriter<File>>,
	nav: Option<BufWriter<File>>,
	pub obs_header_written: bool,
	pub nav_header_written: bool,
	last_nav_output_tow: Option<f64>,
}

const NAV_OUTPUT_PERIOD_S:f64 = 6.0;

impl RinexPrinter {

	pub fn new<P: AsRef<Path>>(version:u8, site:&str, dir:P) -> Self {
		RinexPrinter {
			version,
			site: site.to_string(),
			dir: dir.as_ref().to_path_buf(),
			obs: None,
			nav: None,
			obs_header_written: false,
			nav_header_written: false,
			last_nav_output_tow: None,
		}
	}

	fn write_lines(file:&mut Option<BufWriter<File>>, text:&str) {
		if let Some(f) = file {
			// Observation fixes outrank logging; an emitter failure warns
			// and processing continues
			if let Err(e) = f.write_all(text.as_bytes()) {
				warn!("RINEX write failed: {}", e);
			}
		}
	}

	pub fn open_files(&mut self, week:u32, tow:f64) -> Result<(), DigSigProcErr> {
		let obs_name = igs_filename(&self.site, week, tow, '0', 'O');
		// Mixed navigation files take the 2.11 GPS suffix in version 2 and
		// the mixed suffix in version 3
		let nav_name = igs_filename(&self.site, week, tow, '0', if self.version == 2 { 'N' } else { 'P' });
		let obs_f = File::create(self.dir.join(obs_name)).map_err(|e| DigSigProcErr::IoFailure(e.to_string()))?;
		let nav_f = File::create(self.dir.join(nav_name)).map_err(|e| DigSigProcErr::IoFailure(e.to_string()))?;
		self.obs = Some(BufWriter::new(obs_f));
		self.nav = Some(BufWriter::new(nav_f));
		Ok(())
	}

	// ---- headers -----------------------------------------------------

	/// Observation header; `hybrid` widens the satellite system to mixed.
	pub fn obs_header(&self, week:u32, tow:f64, hybrid:bool) -> String {
		let mut out = String::new();
		let (version_str, system) = match (self.version, hybrid) {
			(2, false) => ("     2.11", "G (GPS)"),
			(2, true)  => ("     2.11", "M (MIXED)"),
			(_, false) => ("     3.01", "G: GPS"),
			(_, true)  => ("     3.01", "M: MIXED"),
		};
		out.push_str(&header_line(&format!("{:<20}{:<20}{}", version_str, "OBSERVATION DATA", system), "RINEX VERSION / TYPE"));
		out.push('\n');
		out.push_str(&header_line(&format!("{:<20}{:<20}{:<20}", PROGRAM_NAME, "", ""), "PGM / RUN BY / DATE"));
		out.push('\n');
		out.push_str(&header_line(&format!("{:<60}", self.site.to_uppercase()), "MARKER NAME"));
		out.push('\n');
		out.push_str(&header_line(&format!("{:<20}{:<40}", "SOFTWARE DEFINED", "RADIO RECEIVER"), "OBSERVER / AGENCY"));
		out.push('\n');
		out.push_str(&header_line(&format!("{:<20}{:<20}{:<20}", "1", "GNSS RECEIVER", "0.2.0"), "REC # / TYPE / VERS"));
		out.push('\n');
		out.push_str(&header_line(
			&format!("{:14.4}{:14.4}{:14.4}", 0.0, 0.0, 0.0),
			"APPROX POSITION XYZ"));
		out.push('\n');
		out.push_str(&header_line(
			&format!("{:14.4}{:14.4}{:14.4}", 0.0, 0.0, 0.0),
			"ANTENNA: DELTA H/E/N"));
		out.push('\n');

		if self.version == 2 {
			out.push_str(&header_line("     2    C1    L1", "# / TYPES OF OBSERV"));
			out.push('\n');
		} else {
			out.push_str(&header_line("G    2 C1C L1C", "SYS / # / OBS TYPES"));
			out.push('\n');
			if hybrid {
				out.push_str(&header_line("E    2 C1B L1B", "SYS / # / OBS TYPES"));
				out.push('\n');
			}
		}

		let (y, mo, d, h, mi, s) = gps_time_to_calendar(week, tow);
		out.push_str(&header_line(
			&format!("{:6}{:6}{:6}{:6}{:6}{:13.7}     GPS", y, mo, d, h, mi, s),
			"TIME OF FIRST OBS"));
		out.push('\n');
		out.push_str(&header_line("", "END OF HEADER"));
		out.push('\n');
		out
	}

	/// Navigation header with the broadcast iono and UTC models available
	/// at gating time.
	pub fn nav_header(&self,
			gps_iono:Option<&gps::IonoParams>, gps_utc:Option<&gps::UtcModel>,
			gal_iono:Option<&gal::IonoParams>, gal_utc:Option<&gal::UtcModel>) -> String {
		let mut out = String::new();
		let type_str = if self.version == 2 { "N: GPS NAV DATA" } else { "N: GNSS NAV DATA" };
		let system = if self.version == 2 { "" } else if gal_iono.is_some() && gps_iono.is_some() { "M: MIXED" } else if gal_iono.is_some() { "E: GALILEO" } else { "G: GPS" };
		let version_str = if self.version == 2 { "     2.11" } else { "     3.01" };
		out.push_str(&header_line(&format!("{:<20}{:<20}{}", version_str, type_str, system), "RINEX VERSION / TYPE"));
		out.push('\n');
		out.push_str(&header_line(&format!("{:<20}{:<20}{:<20}", PROGRAM_NAME, "", ""), "PGM / RUN BY / DATE"));
		out.push('\n');

		if self.version == 2 {
			if let Some(iono) = gps_iono {
				out.push_str(&header_line(
					&format!("  {}{}{}{}",
						doub2for(iono.alpha0, 12, 2), doub2for(iono.alpha1, 12, 2),
						doub2for(iono.alpha2, 12, 2), doub2for(iono.alpha3, 12, 2)),
					"ION ALPHA"));
				out.push('\n');
				out.push_str(&header_line(
					&format!("  {}{}{}{}",
						doub2for(iono.beta0, 12, 2), doub2for(iono.beta1, 12, 2),
						doub2for(iono.beta2, 12, 2), doub2for(iono.beta3, 12, 2)),
					"ION BETA"));
				out.push('\n');
			}
			if let Some(utc) = gps_utc {
				out.push_str(&header_line(
					&format!("   {}{}{:9}{:9}",
						doub2for(utc.a0, 18, 2), doub2for(utc.a1, 18, 2), utc.t_ot, utc.wn_t),
					"DELTA-UTC: A0,A1,T,W"));
				out.push('\n');
				out.push_str(&header_line(&format!("{:6}", utc.delta_t_ls), "LEAP SECONDS"));
				out.push('\n');
			}
		} else {
			if let Some(iono) = gps_iono {
				out.push_str(&header_line(
					&format!("GPSA {}{}{}{}",
						doub2for(iono.alpha0, 12, 2), doub2for(iono.alpha1, 12, 2),
						doub2for(iono.alpha2, 12, 2), doub2for(iono.alpha3, 12, 2)),
					"IONOSPHERIC CORR"));
				out.push('\n');
				out.push_str(&header_line(
					&format!("GPSB {}{}{}{}",
						doub2for(iono.beta0, 12, 2), doub2for(iono.beta1, 12, 2),
						doub2for(iono.beta2, 12, 2), doub2for(iono.beta3, 12, 2)),
					"IONOSPHERIC CORR"));
				out.push('\n');
			}
			if let Some(iono) = gal_iono {
				out.push_str(&header_line(
					&format!("GAL  {}{}{}",
						doub2for(iono.ai0, 12, 2), doub2for(iono.ai1, 12, 2), doub2for(iono.ai2, 12, 2)),
					"IONOSPHERIC CORR"));
				out.push('\n');
			}
			if let Some(utc) = gps_utc {
				out.push_str(&header_line(
					&format!("GPUT {}{}{:7}{:5}",
						doub2for(utc.a0, 17, 2), doub2for(utc.a1, 16, 2), utc.t_ot, utc.wn_t),
					"TIME SYSTEM CORR"));
				out.push('\n');
				out.push_str(&header_line(&format!("{:6}", utc.delta_t_ls), "LEAP SECONDS"));
				out.push('\n');
			} else if let Some(utc) = gal_utc {
				out.push_str(&header_line(
					&format!("GAUT {}{}{:7}{:5}",
						doub2for(utc.a0, 17, 2), doub2for(utc.a1, 16, 2), utc.t_0t, utc.wn_0t),
					"TIME SYSTEM CORR"));
				out.push('\n');
				out.push_str(&header_line(&format!("{:6}", utc.delta_t_ls), "LEAP SECONDS"));
				out.push('\n');
			}
		}

		out.push_str(&header_line("", "END OF HEADER"));
		out.push('\n');
		out
	}

	pub fn write_obs_header(&mut self, week:u32, tow:f64, hybrid:bool) {
		let text = self.obs_header(week, tow, hybrid);
		Self::write_lines(&mut self.obs, &text);
		self.obs_header_written = true;
	}

	pub fn write_nav_header(&mut self,
			gps_iono:Option<&gps::IonoParams>, gps_utc:Option<&gps::UtcModel>,
			gal_iono:Option<&gal::IonoParams>, gal_utc:Option<&gal::UtcModel>) {
		let text = self.nav_header(gps_iono, gps_utc, gal_iono, gal_utc);
		Self::write_lines(&mut self.nav, &text);
		self.nav_header_written = true;
	}

	// ---- observation records ----------------------------------------

	/// One observation epoch from the channels in the delivering state.
	pub fn obs_epoch(&self, week:u32, tow:f64, observables:&BTreeMap<usize, GnssSynchro>) -> String {
		let mut sats:Vec<&GnssSynchro> = observables.values()
			.filter(|o| o.flag_valid_pseudorange)
			.collect();
		sats.sort_by_key(|o| (o.signal, o.prn));
		if sats.is_empty() { return String::new(); }

		let (y, mo, d, h, mi, s) = gps_time_to_calendar(week, tow);
		let mut out = String::new();

		if self.version == 2 {
			let mut epoch_line = format!(" {:02} {:2} {:2} {:2} {:2}{:11.7}  {:1}{:3}",
				y % 100, mo, d, h, mi, s, 0, sats.len());
			for sat in sats.iter().take(12) {
				epoch_line.push_str(&sat_id(sat.signal, sat.prn));
			}
			out.push_str(&epoch_line);
			out.push('\n');
			for sat in sats.iter() {
				out.push_str(&format!("{:14.3}  {:14.3}\n", sat.pseudorange_m, sat.carrier_phase_cycles));
			}
		} else {
			out.push_str(&format!("> {:4} {:02} {:02} {:02} {:02}{:11.7}  {:1}{:3}\n",
				y, mo, d, h, mi, s, 0, sats.len()));
			for sat in sats.iter() {
				out.push_str(&format!("{}{:14.3}  {:14.3}\n",
					sat_id(sat.signal, sat.prn), sat.pseudorange_m, sat.carrier_phase_cycles));
			}
		}
		out
	}

	pub fn log_obs_epoch(&mut self, week:u32, tow:f64, observables:&BTreeMap<usize, GnssSynchro>) {
		let text = self.obs_epoch(week, tow, observables);
		Self::write_lines(&mut self.obs, &text);
	}

	// ---- navigation records -----------------------------------------

	fn nav_field_line(&self, indent:&str, fields:&[f64]) -> String {
		let mut line = String::from(indent);
		for f in fields {
			line.push_str(&doub2for(*f, 18, 2));
			line.push(' ');
		}
		// Trailing blanks are stripped; RINEX readers pad as needed
		while line.ends_with(' ') { line.pop(); }
		line.push('\n');
		line
	}

	/// One GPS broadcast record.
	pub fn gps_nav_record(&self, prn:usize, eph:&gps::Ephemeris) -> String {
		let (y, mo, d, h, mi, s) = gps_time_to_calendar(eph.week_number as u32, eph.t_oc);
		let mut out = String::new();

		if self.version == 2 {
			out.push_str(&format!("{:2} {:02} {:2} {:2} {:2} {:2}{:5.1}{}{}{}\n",
				prn, y % 100, mo, d, h, mi, s,
				doub2for(eph.a_f0, 18, 2), doub2for(eph.a_f1, 18, 2), doub2for(eph.a_f2, 18, 2)));
		} else {
			out.push_str(&format!("G{:02} {:4} {:02} {:02} {:02} {:02} {:02}{}{}{}\n",
				prn, y, mo, d, h, mi, s as u32,
				doub2for(eph.a_f0, 18, 2), doub2for(eph.a_f1, 18, 2), doub2for(eph.a_f2, 18, 2)));
		}

		let indent = if self.version == 2 { "   " } else { "    " };
		out.push_str(&self.nav_field_line(indent, &[eph.iode as f64, eph.crs, eph.dn, eph.m0]));
		out.push_str(&self.nav_field_line(indent, &[eph.cuc, eph.e, eph.cus, eph.sqrt_a]));
		out.push_str(&self.nav_field_line(indent, &[eph.t_oe, eph.cic, eph.omega0, eph.cis]));
		out.push_str(&self.nav_field_line(indent, &[eph.i0, eph.crc, eph.omega, eph.omega_dot]));
		out.push_str(&self.nav_field_line(indent, &[eph.idot, 1.0, eph.week_number as f64, 0.0]));
		out.push_str(&self.nav_field_line(indent, &[eph.ura_index as f64, eph.sv_health as f64, eph.t_gd, eph.iodc as f64]));
		out.push_str(&self.nav_field_line(indent, &[0.0, eph.fit_interval as u8 as f64]));
		out
	}

	/// One Galileo broadcast record (version 3 only; version 2 predates
	/// Galileo and skips them).
	pub fn galileo_nav_record(&self, prn:usize, eph:&gal::Ephemeris) -> String {
		if self.version == 2 { return String::new(); }
		let (y, mo, d, h, mi, s) = gps_time_to_calendar(eph.wn as u32, eph.t_oc);
		let mut out = String::new();
		out.push_str(&format!("E{:02} {:4} {:02} {:02} {:02} {:02} {:02}{}{}{}\n",
			prn, y, mo, d, h, mi, s as u32,
			doub2for(eph.a_f0, 18, 2), doub2for(eph.a_f1, 18, 2), doub2for(eph.a_f2, 18, 2)));
		let indent = "    ";
		out.push_str(&self.nav_field_line(indent, &[eph.iod_nav as f64, eph.crs, eph.dn, eph.m0]));
		out.push_str(&self.nav_field_line(indent, &[eph.cuc, eph.e, eph.cus, eph.sqrt_a]));
		out.push_str(&self.nav_field_line(indent, &[eph.t_oe, eph.cic, eph.omega0, eph.cis]));
		out.push_str(&self.nav_field_line(indent, &[eph.i0, eph.crc, eph.omega, eph.omega_dot]));
		out.push_str(&self.nav_field_line(indent, &[eph.idot, 0.0, eph.wn as f64, 0.0]));
		out.push_str(&self.nav_field_line(indent, &[eph.sisa as f64, eph.e1b_hs as f64, eph.bgd_e1_e5b, 0.0]));
		out.push_str(&self.nav_field_line(indent, &[0.0]));
		out
	}

	/// Appends the current ephemeris maps, at most once per six seconds of
	/// receiver time regardless of the PVT cadence.
	pub fn log_nav(&mut self, tow:f64,
			gps_ephs:&BTreeMap<usize, gps::Ephemeris>,
			gal_ephs:&BTreeMap<usize, gal::Ephemeris>) {
		if let Some(last) = self.last_nav_output_tow {
			if (tow - last).abs() < NAV_OUTPUT_PERIOD_S { return; }
		}
		self.last_nav_output_tow = Some(tow);

		let mut text = String::new();
		for (prn, eph) in gps_ephs.iter() {
			text.push_str(&self.gps_nav_record(*prn, eph));
		}
		for (prn, eph) in gal_ephs.iter() {
			text.push_str(&self.galileo_nav_record(*prn, eph));
		}
		Self::write_lines(&mut self.nav, &text);
	}

	pub fn flush(&mut self) {
		if let Some(f) = &mut self.obs { let _ = f.flush(); }
		if let Some(f) = &mut self.nav { let _ = f.flush(); }
	}

}
