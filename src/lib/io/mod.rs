/*
cfbfreader library & toolset
Copyright (C) 2018 Steve Muller <steve.muller@outlook.com>

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/

use std::io::{Read, Seek, SeekFrom, Error, ErrorKind};
use std::sync::Mutex;

/// Read-only, random-access view over the raw bytes of a compound file.
///
/// Reads are positional and take `&self`, so that a decoded file can serve several readers at once.
pub trait ByteSource {
	/// Total number of bytes available.
	fn size(&self) -> u64;

	/// Fills `buf` with the bytes starting at `offset`.
	/// Fails with `ErrorKind::UnexpectedEof` if the source ends before `buf` is full.
	fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), Error>;
}

impl ByteSource for [u8] {
	fn size(&self) -> u64 {
		self.len() as u64
	}

	fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), Error> {
		let end = offset.checked_add(buf.len() as u64);
		match end {
			Some(end) if end <= self.len() as u64 => {
				buf.copy_from_slice(&self[offset as usize..end as usize]);
				Ok(())
			},
			_ => Err(Error::new(ErrorKind::UnexpectedEof, "Read past the end of the byte source")),
		}
	}
}

impl ByteSource for Vec<u8> {
	fn size(&self) -> u64 {
		self.as_slice().size()
	}

	fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), Error> {
		self.as_slice().read_exact_at(offset, buf)
	}
}

impl<'a, T> ByteSource for &'a T where T: ByteSource + ?Sized {
	fn size(&self) -> u64 {
		(**self).size()
	}

	fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), Error> {
		(**self).read_exact_at(offset, buf)
	}
}

impl<T> ByteSource for Box<T> where T: ByteSource + ?Sized {
	fn size(&self) -> u64 {
		(**self).size()
	}

	fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), Error> {
		(**self).read_exact_at(offset, buf)
	}
}

/// Adapts a seekable reader (such as a `File`) to a `ByteSource`.
/// Concurrent reads are serialised through a mutex, since every read moves the shared file pointer.
pub struct SeekableSource<R: Read + Seek> {
	inner: Mutex<R>,
	size: u64,
}

impl<R> SeekableSource<R> where R: Read + Seek {
	pub fn new(mut inner: R) -> Result<SeekableSource<R>, Error> {
		let size = inner.seek(SeekFrom::End(0))?;
		Ok(SeekableSource { inner: Mutex::new(inner), size })
	}

	pub fn into_inner(self) -> R {
		// A poisoned lock only means that another reader panicked; the reader itself is still usable
		self.inner.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}

impl<R> ByteSource for SeekableSource<R> where R: Read + Seek {
	fn size(&self) -> u64 {
		self.size
	}

	fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), Error> {
		let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
		inner.seek(SeekFrom::Start(offset))?;
		inner.read_exact(buf)
	}
}

/// Buffers an entire non-seekable input (e.g. standard input) in memory.
/// Compound files cannot be decoded front-to-back, since sector chains may point backwards.
pub fn read_all(mut read: impl Read) -> Result<Vec<u8>, Error> {
	let mut data: Vec<u8> = Vec::new();
	read.read_to_end(&mut data)?;
	Ok(data)
}
