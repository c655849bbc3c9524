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

//! Decoder for the Compound File Binary File Format.
//!
//! Decoding runs in fixed stages, each one consuming only the output of the previous ones:
//! header, DIFAT, FAT, directory, miniFAT (and mini stream). The result is immutable;
//! stream contents are read on demand.

mod difat;
mod directory;
mod error;
mod fat;
mod header;
mod minifat;
mod stream;
mod structures;

pub use self::directory::{Color, DirectoryEntry, Listing, ObjectType};
pub use self::error::{ChainFault, ChainKind, FormatError};
pub use self::fat::{AllocationTable, FatEntry};
pub use self::minifat::MiniStream;
pub use self::stream::StreamDescriptor;
pub use self::structures::{Clsid, Header, Table, Warning};
pub use self::structures::{SIGNATURE, DIFSECT, FATSECT, ENDOFCHAIN, FREESECT, NOSTREAM};

use log::info;
use self::directory::Directory;
use self::minifat::MiniFat;
use crate::io::ByteSource;

/// A decoded compound file.
pub struct CompoundFile<S: ByteSource> {
	source: S,
	header: Header,
	warnings: Vec<Warning>,
	difat: Vec<u32>,
	fat: AllocationTable,
	directory: Directory,
	mini_fat: MiniFat,
	mini_stream: MiniStream,
}

/// Decodes the structure of a compound file: header, allocation tables and directory tree.
pub fn decode<S>(source: S) -> Result<CompoundFile<S>, FormatError> where S: ByteSource {
	let decoded = header::decode_header(&source)?;
	let header = decoded.header;
	let mut warnings = decoded.warnings;

	let difat = difat::resolve_difat(&source, &header, decoded.inline_difat, &mut warnings)?;
	let fat = fat::build_fat(&source, &header, &difat, &mut warnings)?;
	let directory = directory::read_directory(&source, &header, &fat, &mut warnings)?;
	let mini_stream = MiniStream::locate(&header, &fat, &directory.entries[0])?;
	let mini_fat = minifat::build_mini_fat(&source, &header, &fat, &mini_stream, &mut warnings)?;

	info!("[decode] Decoded {} directory entries, {} warning(s)", directory.entries.len(), warnings.len());
	Ok(CompoundFile { source, header, warnings, difat, fat, directory, mini_fat, mini_stream })
}

impl<S> CompoundFile<S> where S: ByteSource {
	pub fn header(&self) -> &Header {
		&self.header
	}

	/// Anomalies that were found during decoding, but did not prevent it.
	pub fn warnings(&self) -> &[Warning] {
		&self.warnings
	}

	/// The complete DIFAT, i.e. the locations of the FAT sectors (including unused slots).
	pub fn difat(&self) -> &[u32] {
		&self.difat
	}

	pub fn fat(&self) -> &AllocationTable {
		&self.fat
	}

	pub fn mini_fat(&self) -> &AllocationTable {
		&self.mini_fat.table
	}

	pub fn directory_sectors(&self) -> &[u32] {
		&self.directory.sectors
	}

	pub fn mini_fat_sectors(&self) -> &[u32] {
		&self.mini_fat.sectors
	}

	/// Regular sectors that hold the mini stream.
	pub fn mini_stream_sectors(&self) -> &[u32] {
		&self.mini_stream.sectors
	}

	/// All directory entries by ID, including unused and unreachable ones.
	pub fn all_entries(&self) -> &[DirectoryEntry] {
		&self.directory.entries
	}

	pub fn entry(&self, id: u32) -> Option<&DirectoryEntry> {
		self.directory.entries.get(id as usize)
	}

	pub fn root(&self) -> &DirectoryEntry {
		&self.directory.entries[0]
	}

	/// The entries reachable from the root, in listing order, each with its folder depth.
	pub fn entries<'a>(&'a self) -> impl Iterator<Item = (usize, &'a DirectoryEntry)> + 'a {
		self.directory.listing.iter().map(move |listing| (listing.depth, &self.directory.entries[listing.id as usize]))
	}

	/// Finds an object by its path.
	/// The path is a collection of names for the root storage object, all intermediate storage objects (directories), and the final object (directory or file).
	/// ```ignore
	/// file.find_by_path(&["Root Entry", "Dir1", "Dir2", "MyFile"])
	/// ```
	pub fn find_by_path(&self, path: &[&str]) -> Option<&DirectoryEntry> {
		let (first, rest) = path.split_first()?;
		let mut current = self.root();
		if current.name != *first {
			return None;
		}
		for segment in rest {
			current = self.find_sibling(current.child()?, segment)?;
		}
		Some(current)
	}

	/// Finds the first object with the given name, in listing order.
	pub fn find_by_name(&self, name: &str) -> Option<&DirectoryEntry> {
		self.entries().map(|(_, entry)| entry).find(|entry| entry.name == name)
	}

	/// Searches the sibling tree rooted at `id` for the given name.
	/// The tree was checked for cycles and dangling links during decoding.
	fn find_sibling(&self, id: u32, name: &str) -> Option<&DirectoryEntry> {
		let mut pending = vec![id];
		while let Some(id) = pending.pop() {
			let entry = self.entry(id)?;
			if entry.name == name {
				return Some(entry);
			}
			pending.extend(entry.left_sibling());
			pending.extend(entry.right_sibling());
		}
		None
	}

	pub fn into_source(self) -> S {
		self.source
	}
}

/// Reads `length` bytes at the given absolute offset.
pub(crate) fn read_at<S>(source: &S, offset: u64, length: usize) -> Result<Vec<u8>, FormatError> where S: ByteSource + ?Sized {
	let available = source.size();
	if offset.checked_add(length as u64).map_or(true, |end| end > available) {
		return Err(FormatError::TruncatedSource { offset, length: length as u64, available });
	}
	let mut buffer = vec![0u8; length];
	source.read_exact_at(offset, &mut buffer)?;
	Ok(buffer)
}

/// Reads one complete sector.
pub(crate) fn read_sector<S>(source: &S, header: &Header, sector: u32) -> Result<Vec<u8>, FormatError> where S: ByteSource + ?Sized {
	read_at(source, header.sector_offset(sector), header.sector_size as usize)
}
