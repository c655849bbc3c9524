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

use std::collections::HashSet;
use std::convert::TryFrom;
use byteorder::{ByteOrder, LittleEndian};
use log::{info, debug, trace, warn};
use super::error::{ChainFault, ChainKind, FormatError};
use super::structures::{Header, Table, Warning, DIFSECT, FATSECT, ENDOFCHAIN, FREESECT};
use super::read_sector;
use crate::io::ByteSource;

/// Classification of a single FAT (or miniFAT) slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FatEntry {
	/// The sector holds FAT entries.
	FatSector,
	/// The sector holds DIFAT entries.
	DifatSector,
	/// The sector is the last one of its chain.
	EndOfChain,
	/// The sector is unallocated.
	Free,
	/// The sector is followed by the given sector in its chain.
	Data(u32),
}

impl FatEntry {
	/// The raw 32-bit value as it is stored in the file.
	pub fn raw(self) -> u32 {
		match self {
			FatEntry::FatSector => FATSECT,
			FatEntry::DifatSector => DIFSECT,
			FatEntry::EndOfChain => ENDOFCHAIN,
			FatEntry::Free => FREESECT,
			FatEntry::Data(next) => next,
		}
	}
}

impl From<u32> for FatEntry {
	fn from(raw: u32) -> FatEntry {
		match raw {
			FATSECT => FatEntry::FatSector,
			DIFSECT => FatEntry::DifatSector,
			ENDOFCHAIN => FatEntry::EndOfChain,
			FREESECT => FatEntry::Free,
			next => FatEntry::Data(next),
		}
	}
}

/// A sector allocation table, indexed by sector number (FAT) or mini-sector number (miniFAT).
#[derive(Clone, Debug, Default)]
pub struct AllocationTable {
	entries: Vec<FatEntry>,
}

impl AllocationTable {
	pub fn new(entries: Vec<FatEntry>) -> AllocationTable {
		AllocationTable { entries }
	}

	pub fn from_raw(raw: &[u32]) -> AllocationTable {
		AllocationTable { entries: raw.iter().map(|&value| FatEntry::from(value)).collect() }
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn get(&self, sector: u32) -> Option<FatEntry> {
		self.entries.get(sector as usize).cloned()
	}

	pub fn entries(&self) -> &[FatEntry] {
		&self.entries
	}

	/// Lists the sectors of the chain starting at `start`, in chain order.
	///
	/// A chain starting with ENDOFCHAIN is empty. Every other sector of the chain must be inside the table,
	/// must not have been visited before, and must be classified as `Data` or `EndOfChain`.
	/// Hence the chain is never longer than the table.
	pub fn chain(&self, start: u32, kind: ChainKind) -> Result<Vec<u32>, FormatError> {
		let mut chain = Vec::new();
		if start == ENDOFCHAIN {
			return Ok(chain);
		}

		let broken = |fault| FormatError::BrokenChain { chain: kind, start, fault };
		let mut visited = HashSet::new();
		let mut current = start;
		loop {
			let entry = self.get(current).ok_or_else(|| broken(ChainFault::OutOfBounds(current)))?;
			if !visited.insert(current) {
				return Err(broken(ChainFault::Revisited(current)));
			}
			chain.push(current);
			match entry {
				FatEntry::Data(next) => {
					trace!("[chain] {} chain: sector #{:#X} is followed by #{:#X}", kind, current, next);
					current = next;
				},
				FatEntry::EndOfChain => break,
				entry => return Err(broken(ChainFault::Unexpected { sector: current, entry })),
			}
		}
		debug!("[chain] {} chain starting at #{:#X} has {} sector(s)", kind, start, chain.len());
		Ok(chain)
	}
}

/// Reads every FAT sector listed by the DIFAT into one table.
///
/// The FAT sector at DIFAT position `i` holds the slots of sectors `i * (sector_size / 4)` and following.
/// Free DIFAT entries are skipped (their slots read as free), and the first ENDOFCHAIN ends the DIFAT.
/// The table never has more slots than the source has sectors: FAT sectors whose slots all lie past the end
/// of the source are counted but not read.
pub fn build_fat<S>(source: &S, header: &Header, difat: &[u32], warnings: &mut Vec<Warning>) -> Result<AllocationTable, FormatError> where S: ByteSource + ?Sized {
	let entries_per_sector = header.entries_per_sector();
	let addressable = usize::try_from(header.addressable_sectors(source.size())).unwrap_or(usize::MAX);
	let mut raw: Vec<u32> = Vec::new();
	let mut fat_sectors = Vec::new();

	for (i, &fat_sector_location) in difat.iter().enumerate() {
		match fat_sector_location {
			ENDOFCHAIN => break,
			FREESECT => continue,
			DIFSECT | FATSECT => {
				return Err(FormatError::BrokenChain {
					chain: ChainKind::Fat,
					start: i as u32,
					fault: ChainFault::Unexpected { sector: i as u32, entry: FatEntry::from(fat_sector_location) },
				});
			},
			_ => {},
		}

		fat_sectors.push(fat_sector_location);
		let start = i.saturating_mul(entries_per_sector);
		if start >= addressable {
			debug!("[build_fat] DIFAT entry #{}: FAT sector #{:#X} only covers sectors past the end of the file", i, fat_sector_location);
			continue;
		}

		trace!("[build_fat] DIFAT entry #{}: reading FAT sector #{:#X}", i, fat_sector_location);
		let buffer = read_sector(source, header, fat_sector_location)?;
		if raw.len() < start + entries_per_sector {
			raw.resize(start + entries_per_sector, FREESECT);
		}
		LittleEndian::read_u32_into(&buffer, &mut raw[start..start + entries_per_sector]);
	}
	raw.truncate(addressable);

	let fat = AllocationTable::from_raw(&raw);

	// Every FAT sector should be marked as such in the FAT itself
	for &sector in &fat_sectors {
		if fat.get(sector) != Some(FatEntry::FatSector) {
			debug!("[build_fat] FAT sector #{:#X} is marked as {:?}", sector, fat.get(sector));
		}
	}

	let found = fat_sectors.len() as u32;
	if found != header.number_of_fat_sectors {
		let warning = Warning::CountMismatch { table: Table::Fat, declared: header.number_of_fat_sectors, found };
		warn!("[build_fat] {}", warning);
		warnings.push(warning);
	}
	info!("[build_fat] FAT has {} entries ({} FAT sectors)", fat.len(), found);
	Ok(fat)
}
