
//! Drives one Galileo E1-B channel from raw baseband samples to a decoded
//! ephemeris: BOC tracking, page synchronization, deinterleaving, Viterbi
//! decoding, CRC checking and I/NAV word assembly.

use rustfft::num_complex::Complex;

use gnss_rx::Sample;
use gnss_rx::config::Config;
use gnss_rx::gnss::channel::{Channel, ChannelState};
use gnss_rx::gnss::galileo_e1::{signal, SYNC_PATTERN};
use gnss_rx::gnss::galileo_e1::ephemeris::Ephemeris;
use gnss_rx::gnss::galileo_e1::telemetry_decode::{crc24q, interleave, viterbi};
use gnss_rx::gnss::galileo_e1::telemetry_decode::inav;
use gnss_rx::gnss::gps_l1_ca::telemetry_decode::subframe::put_unsigned;
use gnss_rx::gnss::repository::NavDataRepository;
use gnss_rx::gnss::synchro::SignalType;

const PRN:usize = 19;
// Two samples per chip, so one sample per BOC(1,1) half chip
const FS:f64 = 2.046e6;

fn test_ephemeris() -> Ephemeris {
	Ephemeris {
		svid: PRN as u8, iod_nav: 77, wn: 1042,
		t_oe: 351_000.0, sqrt_a: 5440.6, e: 1.6e-4, m0: -0.42,
		dn: 1.0e-9, omega: 0.11, omega0: -0.77, omega_dot: -1.8e-9,
		i0: 0.31, idot: 2.0e-10,
		cuc: -2.4e-6, cus: 7.7e-6, crc: 180.5, crs: -38.25,
		cic: 3.7e-8, cis: -1.9e-8,
		t_oc: 351_000.0, a_f0: -5.5e-4, a_f1: -8.0e-12, a_f2: 0.0,
		sisa: 107, bgd_e1_e5b: 4.0e-9, e1b_hs: 0, e1b_dvs: false,
	}
}

/// Symbols of one page part: sync pattern plus the interleaved FEC output
/// of its 120 source bits.
fn page_part_symbols(bits:&[bool; 120]) -> Vec<f64> {
	let coded = viterbi::encode(&bits[..]);
	let symbols:Vec<f64> = coded.iter().map(|&b| if b { -1.0 } else { 1.0 }).collect();
	let mut out:Vec<f64> = SYNC_PATTERN.iter().map(|&b| if b { -1.0 } else { 1.0 }).collect();
	out.extend(interleave(&symbols));
	out
}

/// An even/odd nominal page pair around one 128-bit word, CRC included.
fn nominal_page(word_bits:&[bool; 128]) -> Vec<f64> {
	let mut even = [false; 120];
	even[2..114].copy_from_slice(&word_bits[0..112]);

	let mut odd = [false; 120];
	odd[0] = true;
	odd[2..18].copy_from_slice(&word_bits[112..128]);

	let mut crc_input:Vec<bool> = Vec::with_capacity(196);
	crc_input.extend_from_slice(&even[0..114]);
	crc_input.extend_from_slice(&odd[0..82]);
	put_unsigned(&mut odd[82..106], crc24q(&crc_input) as u64);

	let mut out = page_part_symbols(&even);
	out.extend(page_part_symbols(&odd));
	out
}

/// The symbol schedule of the run: filler pages for synchronization, the
/// four ephemeris words and word 5 carrying iono, health and GST.
fn symbol_stream() -> Vec<f64> {
	let eph = test_ephemeris();
	let words = inav::encode::ephemeris_words(&eph);
	let w5 = inav::encode::word5(&eph, 40.5, -0.125, 0.0, 351_060);

	let filler = {
		let mut bits = [false; 128];
		put_unsigned(&mut bits[0..6], 0);	// spare word
		bits
	};

	let mut symbols:Vec<f64> = vec![];
	// Enough filler up front to absorb the sync search, including a false
	// page-sync candidate or two inside coded data
	symbols.extend(nominal_page(&filler));
	symbols.extend(nominal_page(&filler));
	symbols.extend(nominal_page(&filler));
	symbols.extend(nominal_page(&words[0]));
	symbols.extend(nominal_page(&words[1]));
	symbols.extend(nominal_page(&words[2]));
	symbols.extend(nominal_page(&words[3]));
	symbols.extend(nominal_page(&w5));
	// One trailing filler flushes the last word through the channel
	symbols.extend(nominal_page(&filler));
	symbols
}

#[test]
fn channel_decodes_inav_ephemeris_from_baseband() {
	let cfg = Config::from_str("\
Acquisition_Galileo.doppler_max=1000\n\
Acquisition_Galileo.doppler_step=500\n\
Acquisition_Galileo.max_dwells=2\n").unwrap();

	let repo = NavDataRepository::new();
	let mut channel = Channel::new(0, SignalType::GalileoE1B, FS,
		vec![PRN], 2, cfg.galileo_acquisition, cfg.galileo_tracking, repo.clone());
	channel.start_acquisition();

	let replica = signal::code_sampled_complex(PRN, FS, 0, false);
	let samples_per_symbol = replica.len();
	let symbols = symbol_stream();

	let mut idx = 0usize;
	for &symbol in symbols.iter() {
		for i in 0..samples_per_symbol {
			let s = Sample{ val: replica[i] * (symbol * 55.0), idx };
			channel.apply(&s);
			idx += 1;
		}
	}

	assert_eq!(channel.state(), ChannelState::Delivering, "channel ended in {:?}", channel.state());

	let eph = repo.read_galileo_ephemeris(PRN).expect("ephemeris must be published");
	let truth = test_ephemeris();
	assert_eq!(eph.svid, truth.svid);
	assert_eq!(eph.iod_nav, truth.iod_nav);
	assert_eq!(eph.wn, truth.wn);
	assert_eq!(eph.t_oe, truth.t_oe);
	assert!((eph.sqrt_a - truth.sqrt_a).abs() < 2.0_f64.powi(-18));
	assert!((eph.m0 - truth.m0).abs() < 2.0_f64.powi(-30));
	assert!((eph.crc - truth.crc).abs() < 2.0_f64.powi(-4));
	assert!((eph.a_f0 - truth.a_f0).abs() < 2.0_f64.powi(-33));

	// Iono parameters from word 5 land in the repository too
	let snap = repo.snapshot();
	let iono = snap.galileo_iono.expect("word 5 publishes the iono model");
	assert_eq!(iono.ai0, 40.5);
	assert_eq!(iono.ai1, -0.125);

	// GST handover from word 5 validates the pseudorange
	let synchro = channel.synchro();
	assert!(synchro.flag_valid_pseudorange);
	assert!(synchro.tow_at_current_symbol_s > 351_000.0);
	assert!(synchro.pseudorange_is_consistent());
}
