
use clap::{App, Arg};
use colored::*;
use itertools::Itertools;

use gnss_rx::config::{self, Config};
use gnss_rx::gnss::channel::ChannelEvent;
use gnss_rx::gnss::repository::NavDataRepository;
use gnss_rx::io::IqFileSource;
use gnss_rx::receiver::Receiver;

fn main() {
	env_logger::init();

	let matches = App::new("GNSS Receiver")
		.version("0.2.0")
		.about("Takes interleaved i16 IQ samples centered on 1575.42 MHz and produces hybrid GPS/Galileo fixes plus RINEX files")
		.arg(Arg::with_name("filename")
			.short("f").long("filename")
			.help("Input IQ sample file")
			.required(true).takes_value(true))
		.arg(Arg::with_name("config")
			.short("c").long("config")
			.help("Receiver configuration file (Section.key=value lines)")
			.takes_value(true))
		.arg(Arg::with_name("gps_channels")
			.long("gps-channels")
			.help("Number of GPS L1 C/A channels")
			.takes_value(true))
		.arg(Arg::with_name("galileo_channels")
			.long("galileo-channels")
			.help("Number of Galileo E1 channels")
			.takes_value(true))
		.get_matches();

	let fname = matches.value_of("filename").unwrap();

	let cfg = match matches.value_of("config") {
		Some(path) => {
			let text = std::fs::read_to_string(path).unwrap_or_else(|e| {
				eprintln!("{}", format!("Unable to read {}: {}", path, e).red());
				std::process::exit(1);
			});
			for key in config::unrecognized_keys(&text) {
				eprintln!("{}", format!("Unrecognized configuration key: {}", key).yellow());
			}
			Config::from_str(&text).unwrap_or_else(|e| {
				eprintln!("{}", format!("Bad configuration: {}", e).red());
				std::process::exit(1);
			})
		},
		None => Config::default(),
	};

	let n_gps:usize = matches.value_of("gps_channels").map(|v| v.parse().expect("--gps-channels takes an integer")).unwrap_or(6);
	let n_gal:usize = matches.value_of("galileo_channels").map(|v| v.parse().expect("--galileo-channels takes an integer")).unwrap_or(0);

	eprintln!("Decoding {} at {} sps with {} GPS + {} Galileo channels", fname, cfg.internal_fs_hz, n_gps, n_gal);

	let source = IqFileSource::new(fname).unwrap_or_else(|e| {
		eprintln!("{}", format!("Unable to open {}: {}", fname, e).red());
		std::process::exit(1);
	});

	let mut receiver = Receiver::new(cfg, NavDataRepository::new(), n_gps, n_gal);
	let report = receiver.run(source);

	for (channel_id, event) in &report.events {
		match event {
			ChannelEvent::AcquisitionPositive{ prn, doppler_hz, test_statistic } =>
				eprintln!("{}", format!("ch{:02} acquired PRN {} at {:.0} Hz (statistic {:.4})", channel_id, prn, doppler_hz, test_statistic).cyan()),
			ChannelEvent::EphemerisComplete{ prn } =>
				eprintln!("{}", format!("ch{:02} PRN {} ephemeris complete", channel_id, prn).green()),
			ChannelEvent::LossOfLock{ prn } =>
				eprintln!("{}", format!("ch{:02} PRN {} loss of lock", channel_id, prn).red()),
			_ => {},
		}
	}

	for fix in &report.fixes {
		println!("TOW {:.3}  lat {:10.6}  lon {:11.6}  h {:8.2}  SVs {}  HDOP {:.2}",
			fix.rx_time,
			fix.geodetic.latitude.to_degrees(),
			fix.geodetic.longitude.to_degrees(),
			fix.geodetic.height_above_ellipsoid,
			fix.n_observations,
			fix.dop.hdop);
	}

	let delivered:Vec<usize> = report.events.iter()
		.filter_map(|(_, e)| match e {
			ChannelEvent::EphemerisComplete{ prn } => Some(*prn),
			_ => None,
		})
		.unique().sorted().collect();
	if !delivered.is_empty() {
		eprintln!("Ephemerides decoded for PRNs {:?}", delivered);
	}

	eprintln!("{} samples, {} fixes, {} epochs without a fix",
		report.samples_processed, report.fixes.len(), report.no_fix_epochs.len());
}
