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
use super::error::FormatError;
use super::structures::{Clsid, Header, Warning, SIGNATURE, HEADER_SIZE, HEADER_DIFAT_ENTRIES};
use super::read_at;
use crate::io::ByteSource;

/// A decoded header, together with the DIFAT entries that trail it.
pub struct DecodedHeader {
	pub header: Header,
	pub inline_difat: Vec<u32>,
	pub warnings: Vec<Warning>,
}

/// Reads and validates the 512-byte header at the beginning of the source.
pub fn decode_header<S>(source: &S) -> Result<DecodedHeader, FormatError> where S: ByteSource + ?Sized {
	// Check the signature before anything else, so that foreign files are rejected without further reads
	let mut signature = [0u8; 8];
	let available = source.size().min(8) as usize;
	source.read_exact_at(0, &mut signature[..available])?;
	if available < 8 || signature != SIGNATURE {
		debug!("[decode_header] Bad signature {:02X?}", signature);
		return Err(FormatError::BadSignature(signature));
	}

	info!("[decode_header] Reading CFBF file header ({} bytes)", HEADER_SIZE);
	let buffer = read_at(source, 0, HEADER_SIZE)?;

	let mut clsid = [0u8; 16];
	clsid.copy_from_slice(&buffer[0x08..0x18]);
	let minor_version = LittleEndian::read_u16(&buffer[0x18..]);
	let major_version = LittleEndian::read_u16(&buffer[0x1A..]);
	let byte_order = LittleEndian::read_u16(&buffer[0x1C..]);
	let sector_shift = LittleEndian::read_u16(&buffer[0x1E..]);
	let mini_sector_shift = LittleEndian::read_u16(&buffer[0x20..]);
	// skip reserved (6 bytes)
	let number_of_directory_sectors = LittleEndian::read_u32(&buffer[0x28..]);
	let number_of_fat_sectors = LittleEndian::read_u32(&buffer[0x2C..]);
	let first_directory_sector_location = LittleEndian::read_u32(&buffer[0x30..]);
	let transaction_signature = LittleEndian::read_u32(&buffer[0x34..]);
	let mini_stream_cutoff_size = LittleEndian::read_u32(&buffer[0x38..]);
	let first_mini_fat_sector_location = LittleEndian::read_u32(&buffer[0x3C..]);
	let number_of_mini_fat_sectors = LittleEndian::read_u32(&buffer[0x40..]);
	let first_difat_sector_location = LittleEndian::read_u32(&buffer[0x44..]);
	let number_of_difat_sectors = LittleEndian::read_u32(&buffer[0x48..]);

	let mut inline_difat = vec![0u32; HEADER_DIFAT_ENTRIES];
	LittleEndian::read_u32_into(&buffer[0x4C..HEADER_SIZE], &mut inline_difat);

	// A sector must at least hold one directory entry, and the mini-sectors must fit into a sector
	if sector_shift < 7 || sector_shift > 16 || mini_sector_shift > sector_shift {
		return Err(FormatError::UnsupportedSectorShift { sector_shift, mini_sector_shift });
	}

	let mut warnings = Vec::new();
	match major_version {
		3 | 4 => {
			let expected = if major_version == 3 { 9 } else { 12 };
			if sector_shift != expected {
				warnings.push(Warning::VersionMismatch { major_version, sector_shift, expected });
			}
		},
		_ => warnings.push(Warning::UnknownVersion { major_version }),
	}
	if byte_order != 0xFFFE {
		warnings.push(Warning::ByteOrder(byte_order));
	}
	for warning in &warnings {
		warn!("[decode_header] {}", warning);
	}

	let header = Header {
		clsid: Clsid(clsid),
		minor_version,
		major_version,
		byte_order,
		sector_shift,
		sector_size: 1 << sector_shift,
		mini_sector_shift,
		mini_sector_size: 1 << mini_sector_shift,
		number_of_directory_sectors,
		number_of_fat_sectors,
		first_directory_sector_location,
		transaction_signature,
		mini_stream_cutoff_size,
		first_mini_fat_sector_location,
		number_of_mini_fat_sectors,
		first_difat_sector_location,
		number_of_difat_sectors,
	};
	debug!("[decode_header] Version {}.{}, sector size {}, mini-sector size {}, cutoff {}",
		header.major_version, header.minor_version, header.sector_size, header.mini_sector_size, header.mini_stream_cutoff_size);

	Ok(DecodedHeader { header, inline_difat, warnings })
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cfbf::structures::{ENDOFCHAIN, FREESECT};

	fn raw_header(major_version: u16, sector_shift: u16) -> Vec<u8> {
		let mut buffer = vec![0u8; HEADER_SIZE];
		buffer[..8].copy_from_slice(&SIGNATURE);
		LittleEndian::write_u16(&mut buffer[0x18..], 0x3E);
		LittleEndian::write_u16(&mut buffer[0x1A..], major_version);
		LittleEndian::write_u16(&mut buffer[0x1C..], 0xFFFE);
		LittleEndian::write_u16(&mut buffer[0x1E..], sector_shift);
		LittleEndian::write_u16(&mut buffer[0x20..], 6);
		LittleEndian::write_u32(&mut buffer[0x2C..], 1);
		LittleEndian::write_u32(&mut buffer[0x30..], 1);
		LittleEndian::write_u32(&mut buffer[0x38..], 4096);
		LittleEndian::write_u32(&mut buffer[0x3C..], ENDOFCHAIN);
		LittleEndian::write_u32(&mut buffer[0x44..], ENDOFCHAIN);
		for i in 0..HEADER_DIFAT_ENTRIES {
			LittleEndian::write_u32(&mut buffer[0x4C + i * 4..], FREESECT);
		}
		LittleEndian::write_u32(&mut buffer[0x4C..], 0);
		buffer
	}

	#[test]
	fn decodes_version_3_header() {
		let decoded = decode_header(&raw_header(3, 9)).unwrap();
		let header = &decoded.header;
		assert_eq!(header.major_version, 3);
		assert_eq!(header.minor_version, 0x3E);
		assert_eq!(header.sector_size, 512);
		assert_eq!(header.mini_sector_size, 64);
		assert_eq!(header.number_of_fat_sectors, 1);
		assert_eq!(header.first_directory_sector_location, 1);
		assert_eq!(header.mini_stream_cutoff_size, 4096);
		assert_eq!(header.first_difat_sector_location, ENDOFCHAIN);
		assert_eq!(header.sector_offset(0), 512);
		assert_eq!(decoded.inline_difat.len(), HEADER_DIFAT_ENTRIES);
		assert_eq!(decoded.inline_difat[0], 0);
		assert_eq!(decoded.inline_difat[1], FREESECT);
		assert!(decoded.warnings.is_empty());
	}

	#[test]
	fn rejects_foreign_signature() {
		let mut buffer = raw_header(3, 9);
		buffer[0] = b'P';
		match decode_header(&buffer) {
			Err(FormatError::BadSignature(found)) => assert_eq!(found[0], b'P'),
			_ => panic!("expected a bad signature"),
		}
	}

	#[test]
	fn rejects_short_input_as_foreign() {
		let buffer = vec![0xD0u8, 0xCF, 0x11];
		assert!(matches!(decode_header(&buffer), Err(FormatError::BadSignature(_))));
	}

	#[test]
	fn truncated_header() {
		let buffer = raw_header(3, 9);
		match decode_header(&buffer[..100]) {
			Err(FormatError::TruncatedSource { offset: 0, length, available: 100 }) => assert_eq!(length, HEADER_SIZE as u64),
			_ => panic!("expected a truncated source"),
		}
	}

	#[test]
	fn version_mismatch_is_only_a_warning() {
		let decoded = decode_header(&raw_header(4, 9)).unwrap();
		assert_eq!(decoded.header.sector_size, 512);
		assert_eq!(decoded.warnings, vec![Warning::VersionMismatch { major_version: 4, sector_shift: 9, expected: 12 }]);
	}

	#[test]
	fn absurd_sector_shift_is_rejected() {
		assert!(matches!(decode_header(&raw_header(3, 40)), Err(FormatError::UnsupportedSectorShift { sector_shift: 40, .. })));
	}
}
