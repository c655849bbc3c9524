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
use byteorder::{ByteOrder, LittleEndian};
use log::{info, debug, trace, warn};
use super::error::FormatError;
use super::structures::{Header, Table, Warning, ENDOFCHAIN, FREESECT};
use super::read_sector;
use crate::io::ByteSource;

/// Assembles the complete DIFAT: the entries of the header, followed by the entries of all chained DIFAT sectors.
/// The last slot of every DIFAT sector holds the location of the next DIFAT sector instead of a FAT sector location.
pub fn resolve_difat<S>(source: &S, header: &Header, inline_difat: Vec<u32>, warnings: &mut Vec<Warning>) -> Result<Vec<u32>, FormatError> where S: ByteSource + ?Sized {
	let mut difat = inline_difat;
	let entries_per_sector = header.entries_per_sector() - 1;
	let mut visited = HashSet::new();
	let mut next_difat_location = header.first_difat_sector_location;

	// Some writers terminate the chain with FREESECT instead of ENDOFCHAIN
	while next_difat_location != ENDOFCHAIN && next_difat_location != FREESECT {
		if !visited.insert(next_difat_location) {
			return Err(FormatError::DifatCycle { sector: next_difat_location });
		}
		trace!("[resolve_difat] Reading DIFAT sector #{:#X}", next_difat_location);
		let buffer = read_sector(source, header, next_difat_location)?;
		let start = difat.len();
		difat.resize(start + entries_per_sector, FREESECT);
		LittleEndian::read_u32_into(&buffer[..entries_per_sector * 4], &mut difat[start..]);
		next_difat_location = LittleEndian::read_u32(&buffer[entries_per_sector * 4..]);
		debug!("[resolve_difat] Next DIFAT sector is #{:#X}", next_difat_location);
	}

	let found = visited.len() as u32;
	if found != header.number_of_difat_sectors {
		let warning = Warning::CountMismatch { table: Table::Difat, declared: header.number_of_difat_sectors, found };
		warn!("[resolve_difat] {}", warning);
		warnings.push(warning);
	}
	info!("[resolve_difat] DIFAT has {} entries ({} DIFAT sectors)", difat.len(), found);
	Ok(difat)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cfbf::structures::{Clsid, HEADER_DIFAT_ENTRIES};

	fn header(first_difat_sector_location: u32, number_of_difat_sectors: u32) -> Header {
		Header {
			clsid: Clsid::default(),
			minor_version: 0x3E,
			major_version: 3,
			byte_order: 0xFFFE,
			sector_shift: 9,
			sector_size: 512,
			mini_sector_shift: 6,
			mini_sector_size: 64,
			number_of_directory_sectors: 0,
			number_of_fat_sectors: 0,
			first_directory_sector_location: ENDOFCHAIN,
			transaction_signature: 0,
			mini_stream_cutoff_size: 4096,
			first_mini_fat_sector_location: ENDOFCHAIN,
			number_of_mini_fat_sectors: 0,
			first_difat_sector_location,
			number_of_difat_sectors,
		}
	}

	/// Builds a source with a blank header sector followed by DIFAT sectors.
	/// DIFAT sector `i` lists FAT sectors `1000 * (i + 1) + k` and points to `next[i]`.
	fn source(next: &[u32]) -> Vec<u8> {
		let mut data = vec![0u8; 512 * (next.len() + 1)];
		for (i, &n) in next.iter().enumerate() {
			let sector = &mut data[512 * (i + 1)..512 * (i + 2)];
			for k in 0..127 {
				LittleEndian::write_u32(&mut sector[k * 4..], 1000 * (i as u32 + 1) + k as u32);
			}
			LittleEndian::write_u32(&mut sector[508..], n);
		}
		data
	}

	#[test]
	fn header_only() {
		let mut warnings = Vec::new();
		let difat = resolve_difat(&source(&[]), &header(ENDOFCHAIN, 0), vec![FREESECT; HEADER_DIFAT_ENTRIES], &mut warnings).unwrap();
		assert_eq!(difat.len(), HEADER_DIFAT_ENTRIES);
		assert!(warnings.is_empty());
	}

	#[test]
	fn follows_chained_difat_sectors() {
		let mut warnings = Vec::new();
		let data = source(&[1, ENDOFCHAIN]);
		let difat = resolve_difat(&data, &header(0, 2), vec![FREESECT; HEADER_DIFAT_ENTRIES], &mut warnings).unwrap();
		assert_eq!(difat.len(), HEADER_DIFAT_ENTRIES + 2 * 127);
		assert_eq!(difat[HEADER_DIFAT_ENTRIES], 1000);
		assert_eq!(difat[HEADER_DIFAT_ENTRIES + 126], 1126);
		assert_eq!(difat[HEADER_DIFAT_ENTRIES + 127], 2000);
		assert!(warnings.is_empty());
	}

	#[test]
	fn count_mismatch_is_reported() {
		let mut warnings = Vec::new();
		resolve_difat(&source(&[ENDOFCHAIN]), &header(0, 3), vec![FREESECT; HEADER_DIFAT_ENTRIES], &mut warnings).unwrap();
		assert_eq!(warnings, vec![Warning::CountMismatch { table: Table::Difat, declared: 3, found: 1 }]);
	}

	#[test]
	fn detects_cycles() {
		let mut warnings = Vec::new();
		let data = source(&[1, 0]);
		match resolve_difat(&data, &header(0, 2), vec![FREESECT; HEADER_DIFAT_ENTRIES], &mut warnings) {
			Err(FormatError::DifatCycle { sector: 0 }) => {},
			_ => panic!("expected a DIFAT cycle"),
		}
	}

	#[test]
	fn self_referencing_sector_is_a_cycle() {
		let mut warnings = Vec::new();
		let data = source(&[0]);
		assert!(matches!(resolve_difat(&data, &header(0, 1), vec![FREESECT; HEADER_DIFAT_ENTRIES], &mut warnings), Err(FormatError::DifatCycle { sector: 0 })));
	}

	#[test]
	fn chain_past_end_of_file_is_truncated() {
		let mut warnings = Vec::new();
		let data = source(&[7]);
		assert!(matches!(resolve_difat(&data, &header(0, 2), vec![FREESECT; HEADER_DIFAT_ENTRIES], &mut warnings), Err(FormatError::TruncatedSource { .. })));
	}
}
