
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rustfft::num_complex::Complex;

use crate::{DigSigProcErr, Sample};

/// Streams interleaved little-endian i16 (I,Q) pairs from a file, one
/// `Sample` per pair, tagging each with its monotone sample index.
pub struct IqFileSource {
	reader: BufReader<File>,
	idx: usize,
}

impl IqFileSource {

	pub fn new<P: AsRef<Path>>(path:P) -> Result<Self, DigSigProcErr> {
		let f = File::open(path).map_err(|e| DigSigProcErr::IoFailure(e.to_string()))?;
		Ok(Self { reader: BufReader::new(f), idx: 0 })
	}

}

impl Iterator for IqFileSource {
	type Item = Sample;

	fn next(&mut self) -> Option<Sample> {
		let i = self.reader.read_i16::<LittleEndian>().ok()?;
		let q = self.reader.read_i16::<LittleEndian>().ok()?;
		let s = Sample { val: Complex{ re: i as f64, im: q as f64 }, idx: self.idx };
		self.idx += 1;
		Some(s)
	}

}

/// Raw binary dump of the observables fed to the PVT solver: one
/// `(pseudorange_m, 0.0, rx_time_s)` triplet of little-endian doubles per
/// channel per epoch.
pub struct ObservablesDump {
	writer: BufWriter<File>,
}

impl ObservablesDump {

	pub fn create<P: AsRef<Path>>(path:P) -> Result<Self, DigSigProcErr> {
		let f = File::create(path).map_err(|e| DigSigProcErr::IoFailure(e.to_string()))?;
		Ok(Self { writer: BufWriter::new(f) })
	}

	pub fn write_epoch(&mut self, pseudoranges_m:&[f64], rx_time_s:f64) -> Result<(), DigSigProcErr> {
		for pr in pseudoranges_m {
			self.writer.write_f64::<LittleEndian>(*pr).map_err(|e| DigSigProcErr::IoFailure(e.to_string()))?;
			self.writer.write_f64::<LittleEndian>(0.0).map_err(|e| DigSigProcErr::IoFailure(e.to_string()))?;
			self.writer.write_f64::<LittleEndian>(rx_time_s).map_err(|e| DigSigProcErr::IoFailure(e.to_string()))?;
		}
		Ok(())
	}

	pub fn flush(&mut self) -> Result<(), DigSigProcErr> {
		self.writer.flush().map_err(|e| DigSigProcErr::IoFailure(e.to_string()))
	}

}

/// Flat little-endian f64 record dump behind the per-role `dump` /
/// `dump_filename` configuration keys.
pub struct TraceDump {
	writer: BufWriter<File>,
}

impl TraceDump {

	pub fn create<P: AsRef<Path>>(path:P) -> Result<Self, DigSigProcErr> {
		let f = File::create(path).map_err(|e| DigSigProcErr::IoFailure(e.to_string()))?;
		Ok(Self { writer: BufWriter::new(f) })
	}

	pub fn write_record(&mut self, fields:&[f64]) -> Result<(), DigSigProcErr> {
		for x in fields {
			self.writer.write_f64::<LittleEndian>(*x).map_err(|e| DigSigProcErr::IoFailure(e.to_string()))?;
		}
		Ok(())
	}

}
