// Copyright 2019 The Zilproxy Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Serialization and deserialization layer specialized for binary encoding.
//! Ensures consistency and safety for everything the store persists.
//!
//! To use it simply implement `Writeable` or `Readable` and then use the
//! `serialize` or `deserialize` functions on them as appropriate.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Maximum length of a variable-size field we are willing to read back,
/// anything above it indicates a corrupted value.
const MAX_VEC_LEN: u32 = 1 << 20;

/// Possible errors deriving from serializing or deserializing.
#[derive(Debug, Fail)]
pub enum Error {
	/// Wraps an io error produced when reading or writing
	#[fail(display = "IO error: {}", _0)]
	IOErr(io::Error),
	/// Data wasn't in a consumable format
	#[fail(display = "corrupted data")]
	CorruptedData,
	/// When asked to read too much data
	#[fail(display = "too large read: {}", _0)]
	TooLargeReadErr(u32),
}

use failure::Fail;

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error::IOErr(e)
	}
}

/// Implementations defined how different numbers and binary structures are
/// written to an underlying stream or container.
pub trait Writer {
	/// Writes a u8 as bytes
	fn write_u8(&mut self, n: u8) -> Result<(), Error>;
	/// Writes a u32 as bytes
	fn write_u32(&mut self, n: u32) -> Result<(), Error>;
	/// Writes a u64 as bytes
	fn write_u64(&mut self, n: u64) -> Result<(), Error>;
	/// Writes a i64 as bytes
	fn write_i64(&mut self, n: i64) -> Result<(), Error>;
	/// Writes a f64 as its IEEE-754 bit pattern
	fn write_f64(&mut self, n: f64) -> Result<(), Error>;
	/// Writes a variable length byte sequence, the length is encoded as a
	/// u32 prefix.
	fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error>;
	/// Writes a length-prefixed utf8 string.
	fn write_str(&mut self, s: &str) -> Result<(), Error> {
		self.write_bytes(s.as_bytes())
	}
	/// Writes a fixed number of bytes. The reader is expected to know the
	/// actual length on read.
	fn write_fixed_bytes(&mut self, bytes: &[u8]) -> Result<(), Error>;
}

/// Implementations defined how different numbers and binary structures are
/// read from an underlying stream or container.
pub trait Reader {
	/// Read a u8 from the underlying Read
	fn read_u8(&mut self) -> Result<u8, Error>;
	/// Read a u32 from the underlying Read
	fn read_u32(&mut self) -> Result<u32, Error>;
	/// Read a u64 from the underlying Read
	fn read_u64(&mut self) -> Result<u64, Error>;
	/// Read a i64 from the underlying Read
	fn read_i64(&mut self) -> Result<i64, Error>;
	/// Read a f64 from the underlying Read
	fn read_f64(&mut self) -> Result<f64, Error>;
	/// Read a length-prefixed byte sequence
	fn read_bytes(&mut self) -> Result<Vec<u8>, Error>;
	/// Read a length-prefixed utf8 string
	fn read_str(&mut self) -> Result<String, Error> {
		let bytes = self.read_bytes()?;
		String::from_utf8(bytes).map_err(|_| Error::CorruptedData)
	}
	/// Read a fixed number of bytes from the underlying reader.
	fn read_fixed_bytes(&mut self, length: usize) -> Result<Vec<u8>, Error>;
}

/// Trait that every type that can be serialized as binary must implement.
/// Writes directly to a Writer, a utility type thinly wrapping an
/// underlying Write implementation.
pub trait Writeable {
	/// Write the data held by this Writeable to the provided writer
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error>;
}

/// Trait that every type that can be deserialized from binary must implement.
/// Reads directly to a Reader, a utility type thinly wrapping an
/// underlying Read implementation.
pub trait Readable
where
	Self: Sized,
{
	/// Reads the data necessary to this Readable from the provided reader
	fn read<R: Reader>(reader: &mut R) -> Result<Self, Error>;
}

/// Deserializes a Readable from any std::io::Read implementation.
pub fn deserialize<T: Readable>(source: &mut dyn Read) -> Result<T, Error> {
	let mut reader = BinReader { source };
	T::read(&mut reader)
}

/// Serializes a Writeable into any std::io::Write implementation.
pub fn serialize<W: Writeable>(sink: &mut dyn Write, thing: &W) -> Result<(), Error> {
	let mut writer = BinWriter { sink };
	thing.write(&mut writer)
}

/// Utility function to serialize a writeable directly in memory using a
/// Vec<u8>.
pub fn ser_vec<W: Writeable>(thing: &W) -> Result<Vec<u8>, Error> {
	let mut vec = Vec::new();
	serialize(&mut vec, thing)?;
	Ok(vec)
}

/// Utility wrapper for an underlying byte Writer. Defines higher level
/// methods to write numbers, byte vectors, etc.
struct BinWriter<'a> {
	sink: &'a mut dyn Write,
}

impl<'a> Writer for BinWriter<'a> {
	fn write_u8(&mut self, n: u8) -> Result<(), Error> {
		self.sink.write_u8(n).map_err(From::from)
	}

	fn write_u32(&mut self, n: u32) -> Result<(), Error> {
		self.sink.write_u32::<BigEndian>(n).map_err(From::from)
	}

	fn write_u64(&mut self, n: u64) -> Result<(), Error> {
		self.sink.write_u64::<BigEndian>(n).map_err(From::from)
	}

	fn write_i64(&mut self, n: i64) -> Result<(), Error> {
		self.sink.write_i64::<BigEndian>(n).map_err(From::from)
	}

	fn write_f64(&mut self, n: f64) -> Result<(), Error> {
		self.sink
			.write_u64::<BigEndian>(n.to_bits())
			.map_err(From::from)
	}

	fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
		self.write_u32(bytes.len() as u32)?;
		self.write_fixed_bytes(bytes)
	}

	fn write_fixed_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
		self.sink.write_all(bytes).map_err(From::from)
	}
}

/// Utility wrapper for an underlying byte Reader. Defines higher level
/// methods to read numbers, byte vectors, etc.
struct BinReader<'a> {
	source: &'a mut dyn Read,
}

impl<'a> Reader for BinReader<'a> {
	fn read_u8(&mut self) -> Result<u8, Error> {
		self.source.read_u8().map_err(From::from)
	}

	fn read_u32(&mut self) -> Result<u32, Error> {
		self.source.read_u32::<BigEndian>().map_err(From::from)
	}

	fn read_u64(&mut self) -> Result<u64, Error> {
		self.source.read_u64::<BigEndian>().map_err(From::from)
	}

	fn read_i64(&mut self) -> Result<i64, Error> {
		self.source.read_i64::<BigEndian>().map_err(From::from)
	}

	fn read_f64(&mut self) -> Result<f64, Error> {
		let bits = self.source.read_u64::<BigEndian>()?;
		Ok(f64::from_bits(bits))
	}

	fn read_bytes(&mut self) -> Result<Vec<u8>, Error> {
		let len = self.read_u32()?;
		if len > MAX_VEC_LEN {
			return Err(Error::TooLargeReadErr(len));
		}
		self.read_fixed_bytes(len as usize)
	}

	fn read_fixed_bytes(&mut self, length: usize) -> Result<Vec<u8>, Error> {
		let mut buf = vec![0; length];
		self.source
			.read_exact(&mut buf)
			.map(move |_| buf)
			.map_err(From::from)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	struct Sample {
		num: u64,
		fee: f64,
		name: String,
		tag: Vec<u8>,
	}

	impl Writeable for Sample {
		fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
			writer.write_u64(self.num)?;
			writer.write_f64(self.fee)?;
			writer.write_str(&self.name)?;
			writer.write_bytes(&self.tag)
		}
	}

	impl Readable for Sample {
		fn read<R: Reader>(reader: &mut R) -> Result<Sample, Error> {
			Ok(Sample {
				num: reader.read_u64()?,
				fee: reader.read_f64()?,
				name: reader.read_str()?,
				tag: reader.read_bytes()?,
			})
		}
	}

	#[test]
	fn ser_roundtrip() {
		let s = Sample {
			num: 42,
			fee: 0.125,
			name: "default_worker".to_string(),
			tag: vec![1, 2, 3],
		};
		let bin = ser_vec(&s).unwrap();
		let back: Sample = deserialize(&mut &bin[..]).unwrap();
		assert_eq!(back.num, 42);
		assert_eq!(back.fee, 0.125);
		assert_eq!(back.name, "default_worker");
		assert_eq!(back.tag, vec![1, 2, 3]);
	}

	#[test]
	fn deser_truncated() {
		let s = Sample {
			num: 7,
			fee: 1.0,
			name: "w".to_string(),
			tag: vec![],
		};
		let bin = ser_vec(&s).unwrap();
		let res: Result<Sample, Error> = deserialize(&mut &bin[..bin.len() - 2]);
		assert!(res.is_err());
	}
}
