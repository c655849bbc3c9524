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

use byteorder::{ByteOrder, LittleEndian};
use log::{info, debug, warn};
use super::directory::DirectoryEntry;
use super::error::{ChainFault, ChainKind, FormatError};
use super::fat::AllocationTable;
use super::structures::{Header, Table, Warning};
use super::read_sector;
use crate::io::ByteSource;

/// The miniFAT, along with the list of regular sectors that hold it.
pub struct MiniFat {
	pub table: AllocationTable,
	pub sectors: Vec<u32>,
}

/// Reads the miniFAT, whose sectors form a regular chain in the FAT.
/// The table is limited to the number of mini-sectors that the sectors of the mini stream can hold.
pub fn build_mini_fat<S>(source: &S, header: &Header, fat: &AllocationTable, mini_stream: &MiniStream, warnings: &mut Vec<Warning>) -> Result<MiniFat, FormatError> where S: ByteSource + ?Sized {
	let sectors = fat.chain(header.first_mini_fat_sector_location, ChainKind::MiniFat)?;
	let entries_per_sector = header.entries_per_sector();
	let mut raw = vec![0u32; sectors.len() * entries_per_sector];
	for (i, &sector) in sectors.iter().enumerate() {
		debug!("[build_mini_fat] Reading miniFAT sector #{:#X}", sector);
		let buffer = read_sector(source, header, sector)?;
		LittleEndian::read_u32_into(&buffer, &mut raw[i * entries_per_sector..(i + 1) * entries_per_sector]);
	}
	raw.truncate(mini_stream.capacity(header));

	let found = sectors.len() as u32;
	if found != header.number_of_mini_fat_sectors {
		let warning = Warning::CountMismatch { table: Table::MiniFat, declared: header.number_of_mini_fat_sectors, found };
		warn!("[build_mini_fat] {}", warning);
		warnings.push(warning);
	}
	info!("[build_mini_fat] MiniFAT has {} entries ({} sectors)", raw.len(), found);
	Ok(MiniFat { table: AllocationTable::from_raw(&raw), sectors })
}

/// The mini stream: the content of the root entry, stored in regular sectors, and divided into mini-sectors.
#[derive(Clone, Debug, Default)]
pub struct MiniStream {
	/// Regular sectors holding the mini stream, in chain order.
	pub sectors: Vec<u32>,
	/// Declared length of the mini stream.
	pub size: u64,
}

impl MiniStream {
	/// Resolves the chain of the root entry through the FAT.
	pub fn locate(header: &Header, fat: &AllocationTable, root: &DirectoryEntry) -> Result<MiniStream, FormatError> {
		let start = root.starting_sector_location;
		let size = root.stream_size;
		let sectors = if size == 0 { Vec::new() } else { fat.chain(start, ChainKind::MiniStream)? };

		let available = sectors.len() as u64 * header.sector_size;
		if available < size {
			return Err(FormatError::BrokenChain { chain: ChainKind::MiniStream, start, fault: ChainFault::TooShort { available, declared: size } });
		}
		info!("[locate_mini_stream] Mini stream is {} bytes in {} sector(s)", size, sectors.len());
		Ok(MiniStream { sectors, size })
	}

	/// Number of mini-sectors that the regular sectors of the mini stream can hold.
	pub fn capacity(&self, header: &Header) -> usize {
		self.sectors.len() * (header.sector_size / header.mini_sector_size) as usize
	}

	/// Absolute file offset of the given mini-sector, if it starts within the mini stream.
	/// Mini-sectors never straddle two sectors, since the sector size is a multiple of the mini-sector size.
	/// The last mini-sector may extend past the declared size of the mini stream; its tail is then taken
	/// from the backing sector, which is always complete. Readers stop at the declared size of their own stream.
	pub fn mini_sector_offset(&self, header: &Header, mini_sector: u32) -> Option<u64> {
		let offset = mini_sector as u64 * header.mini_sector_size;
		if offset >= self.size {
			return None;
		}
		let sector = self.sectors.get((offset / header.sector_size) as usize)?;
		Some(header.sector_offset(*sector) + offset % header.sector_size)
	}
}
