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

use std::cmp::min;
use std::io::Write;
use log::{debug, trace};
use super::directory::ObjectType;
use super::error::{ChainFault, ChainKind, FormatError};
use super::{read_at, CompoundFile};
use crate::io::ByteSource;

/// Where the content of a stream lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamDescriptor {
	pub entry_id: u32,
	/// First sector (or mini-sector) of the content, as stored in the directory entry.
	pub start: u32,
	pub size: u64,
	/// Whether `sectors` are mini-sectors in the mini stream rather than regular sectors.
	pub in_mini_stream: bool,
	/// The resolved chain, in order.
	pub sectors: Vec<u32>,
}

impl<S> CompoundFile<S> where S: ByteSource {
	/// Resolves the sector chain of a stream object.
	///
	/// Streams smaller than the mini stream cutoff size live in the mini stream and are chained through the miniFAT.
	/// All other streams, as well as the mini stream itself (the content of the root entry), are chained through the FAT.
	pub fn stream_descriptor(&self, id: u32) -> Result<StreamDescriptor, FormatError> {
		let entry = self.entry(id).ok_or(FormatError::NoSuchEntry(id))?;
		let start = entry.starting_sector_location;
		match entry.object_type {
			ObjectType::RootStorage => Ok(StreamDescriptor {
				entry_id: id,
				start,
				size: self.mini_stream.size,
				in_mini_stream: false,
				sectors: self.mini_stream.sectors.clone(),
			}),
			ObjectType::Stream => {
				let size = entry.stream_size;
				let in_mini_stream = size < self.header.mini_stream_cutoff_size as u64;
				let kind = ChainKind::Stream { entry: id, mini: in_mini_stream };
				// Empty streams own no sectors, whatever their starting location says
				let sectors = if size == 0 {
					Vec::new()
				}
				else if in_mini_stream {
					self.mini_fat.table.chain(start, kind)?
				}
				else {
					self.fat.chain(start, kind)?
				};
				Ok(StreamDescriptor { entry_id: id, start, size, in_mini_stream, sectors })
			},
			object_type => Err(FormatError::NotAStream { entry: id, object_type }),
		}
	}

	/// Returns the content of a stream object, or the mini stream if `id` is the root entry.
	pub fn read_stream(&self, id: u32) -> Result<Vec<u8>, FormatError> {
		let mut data = Vec::new();
		self.visit_stream(id, |chunk| {
			data.extend_from_slice(chunk);
			Ok(())
		})?;
		Ok(data)
	}

	/// Copies the content of a stream object to `output`, one sector at a time.
	/// Returns the number of bytes written.
	pub fn dump_stream(&self, id: u32, output: &mut dyn Write) -> Result<u64, FormatError> {
		self.visit_stream(id, |chunk| output.write_all(chunk).map_err(FormatError::from))
	}

	/// Feeds the content of a stream, in chain order and truncated to its declared size, to `consume`.
	fn visit_stream<F>(&self, id: u32, mut consume: F) -> Result<u64, FormatError> where F: FnMut(&[u8]) -> Result<(), FormatError> {
		let descriptor = self.stream_descriptor(id)?;
		let kind = ChainKind::Stream { entry: id, mini: descriptor.in_mini_stream };
		let broken = |fault| FormatError::BrokenChain { chain: kind, start: descriptor.start, fault };

		let unit = if descriptor.in_mini_stream { self.header.mini_sector_size } else { self.header.sector_size };
		let available = descriptor.sectors.len() as u64 * unit;
		if available < descriptor.size {
			return Err(broken(ChainFault::TooShort { available, declared: descriptor.size }));
		}
		debug!("[visit_stream] Reading stream #{} ({} bytes) from {} {}sector(s)",
			id, descriptor.size, descriptor.sectors.len(), if descriptor.in_mini_stream { "mini-" } else { "" });

		let mut size_remaining = descriptor.size;
		for &sector in &descriptor.sectors {
			if size_remaining == 0 {
				break;
			}
			let offset = if descriptor.in_mini_stream {
				self.mini_stream.mini_sector_offset(&self.header, sector).ok_or_else(|| broken(ChainFault::OutsideMiniStream(sector)))?
			}
			else {
				self.header.sector_offset(sector)
			};

			// The last sector is usually only partially used
			let num_bytes = min(unit, size_remaining);
			trace!("[visit_stream] Copying {} bytes from {:#X}", num_bytes, offset);
			consume(&read_at(&self.source, offset, num_bytes as usize)?)?;
			size_remaining -= num_bytes;
		}
		Ok(descriptor.size)
	}
}
