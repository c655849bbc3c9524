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

// Also see: [MS-CFB]: Compound File Binary File Format specifications, https://msdn.microsoft.com/en-us/library/dd942138.aspx

use std::fmt;

/// The magic number at the very beginning of every CFBF file.
pub const SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
/// Size of the header record. With 4096-byte sectors, the rest of the first sector is padding.
pub const HEADER_SIZE: usize = 512;
/// Number of DIFAT entries stored at the end of the header.
pub const HEADER_DIFAT_ENTRIES: usize = 109;
/// Size of one directory entry record.
pub const DIRECTORY_ENTRY_SIZE: usize = 128;

/// Marks a sector holding DIFAT entries.
pub const DIFSECT: u32 = 0xFFFFFFFC;
/// Marks a sector holding FAT entries.
pub const FATSECT: u32 = 0xFFFFFFFD;
/// Terminates a sector chain.
pub const ENDOFCHAIN: u32 = 0xFFFFFFFE;
/// Marks an unallocated sector.
pub const FREESECT: u32 = 0xFFFFFFFF;
/// Marks an absent sibling or child in a directory entry.
pub const NOSTREAM: u32 = 0xFFFFFFFF;

/// The header of a CFBF file, excluding the trailing DIFAT entries.
#[derive(Clone, Debug)]
pub struct Header {
	pub clsid: Clsid,
	pub minor_version: u16,
	pub major_version: u16,
	pub byte_order: u16,
	pub sector_shift: u16,
	pub sector_size: u64, // virtual field; not actually contained in CFBF file
	pub mini_sector_shift: u16,
	pub mini_sector_size: u64, // virtual field; not actually contained in CFBF file
	pub number_of_directory_sectors: u32,
	pub number_of_fat_sectors: u32,
	pub first_directory_sector_location: u32,
	pub transaction_signature: u32,
	pub mini_stream_cutoff_size: u32,
	pub first_mini_fat_sector_location: u32,
	pub number_of_mini_fat_sectors: u32,
	pub first_difat_sector_location: u32,
	pub number_of_difat_sectors: u32,
}

impl Header {
	/// Absolute file offset of the given sector. Sector #0 starts right after the (sector-sized) header.
	pub fn sector_offset(&self, sector: u32) -> u64 {
		(sector as u64 + 1) * self.sector_size
	}

	/// Number of 32-bit entries that fit in one sector.
	pub fn entries_per_sector(&self) -> usize {
		(self.sector_size / 4) as usize
	}

	/// Number of sectors (including a trailing partial one) that a source of the given size can hold.
	pub fn addressable_sectors(&self, source_size: u64) -> u64 {
		((source_size + self.sector_size - 1) / self.sector_size).saturating_sub(1)
	}
}

/// A 16-byte class identifier. The first three groups are stored little-endian, the last two big-endian.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Clsid(pub [u8; 16]);

impl Clsid {
	pub fn is_null(&self) -> bool {
		self.0.iter().all(|&b| b == 0)
	}
}

impl fmt::Display for Clsid {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let b = &self.0;
		write!(f, "{:02X}{:02X}{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}-",
			b[3], b[2], b[1], b[0], b[5], b[4], b[7], b[6], b[8], b[9])?;
		for byte in &b[10..] {
			write!(f, "{:02X}", byte)?;
		}
		Ok(())
	}
}

/// Which allocation table a sector-count warning refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Table {
	Difat,
	Fat,
	MiniFat,
}

/// Anomaly that does not prevent decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Warning {
	/// The sector shift is not the one prescribed by the major version; the declared shift is used anyway.
	VersionMismatch { major_version: u16, sector_shift: u16, expected: u16 },
	/// Major version other than 3 or 4.
	UnknownVersion { major_version: u16 },
	/// Byte order mark other than 0xFFFE.
	ByteOrder(u16),
	/// The header's sector count for a table disagrees with the number of sectors actually found.
	CountMismatch { table: Table, declared: u32, found: u32 },
	/// Directory entry #0 is not of type root storage.
	RootType(u8),
}

impl fmt::Display for Warning {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			Warning::VersionMismatch { major_version, sector_shift, expected } =>
				write!(f, "sector shift {} does not match major version {} (expected {})", sector_shift, major_version, expected),
			Warning::UnknownVersion { major_version } =>
				write!(f, "unknown major version {}", major_version),
			Warning::ByteOrder(found) =>
				write!(f, "byte order mark is {:#06X}, expected 0xFFFE", found),
			Warning::CountMismatch { table, declared, found } =>
				write!(f, "header declares {} {:?} sector(s), found {}", declared, table, found),
			Warning::RootType(found) =>
				write!(f, "directory entry #0 has object type {}, expected 5 (root storage)", found),
		}
	}
}
