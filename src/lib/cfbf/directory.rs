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

use std::char::{decode_utf16, REPLACEMENT_CHARACTER};
use std::collections::HashSet;
use byteorder::{ByteOrder, LittleEndian};
use log::{info, debug, trace, warn};
use super::error::{ChainKind, FormatError};
use super::fat::AllocationTable;
use super::structures::{Clsid, Header, Warning, DIRECTORY_ENTRY_SIZE, NOSTREAM};
use super::read_sector;
use crate::io::ByteSource;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectType {
	/// An unused directory slot.
	Unallocated,
	/// A folder.
	Storage,
	/// A file.
	Stream,
	/// The root folder, which also owns the mini stream.
	RootStorage,
	Unknown(u8),
}

impl From<u8> for ObjectType {
	fn from(raw: u8) -> ObjectType {
		match raw {
			0 => ObjectType::Unallocated,
			1 => ObjectType::Storage,
			2 => ObjectType::Stream,
			5 => ObjectType::RootStorage,
			other => ObjectType::Unknown(other),
		}
	}
}

impl ObjectType {
	pub fn raw(self) -> u8 {
		match self {
			ObjectType::Unallocated => 0,
			ObjectType::Storage => 1,
			ObjectType::Stream => 2,
			ObjectType::RootStorage => 5,
			ObjectType::Unknown(raw) => raw,
		}
	}
}

/// Node color in the red-black tree of siblings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Color {
	Red,
	Black,
	Unknown(u8),
}

impl From<u8> for Color {
	fn from(raw: u8) -> Color {
		match raw {
			0 => Color::Red,
			1 => Color::Black,
			other => Color::Unknown(other),
		}
	}
}

#[derive(Clone, Debug)]
pub struct DirectoryEntry {
	pub id: u32,
	/// Absolute position of the 128-byte record in the file.
	pub offset: u64,
	pub name: String,
	/// Length of the name in bytes, including the terminating NUL character.
	pub name_length: u16,
	/// Whether this object is a folder or a file.
	pub object_type: ObjectType,
	pub color: Color,
	/// The ID of the left sibling object in the binary tree (in this folder).
	pub left_sibling_id: u32,
	/// The ID of the right sibling object in the binary tree (in this folder).
	pub right_sibling_id: u32,
	/// If this object is a folder: the ID of the root of its children's tree. Otherwise undefined.
	pub child_id: u32,
	pub clsid: Clsid,
	pub state_bits: u32,
	pub creation_time: u64,
	pub modified_time: u64,
	/// If this object is a file: the location of the first (mini-)sector that holds the file content.
	/// For the root folder: the first sector of the mini stream.
	pub starting_sector_location: u32,
	/// If this object is a file: the length of the file content. For the root folder: the length of the mini stream.
	pub stream_size: u64,
}

impl DirectoryEntry {
	/// Decodes one 128-byte directory record.
	/// Version 3 files may carry garbage in the upper half of the stream size, which is therefore dropped.
	pub fn parse(id: u32, offset: u64, record: &[u8], major_version: u16) -> DirectoryEntry {
		let mut name_units = [0u16; 32];
		LittleEndian::read_u16_into(&record[0..64], &mut name_units);
		let name_length = LittleEndian::read_u16(&record[64..]);
		let units = (name_length as usize / 2).min(32);
		let name = decode_utf16(name_units[..units].iter().cloned())
			.map(|r| r.unwrap_or(REPLACEMENT_CHARACTER))
			.collect::<String>()
			.trim_end_matches('\0')
			.to_owned();

		let mut clsid = [0u8; 16];
		clsid.copy_from_slice(&record[80..96]);
		let mut stream_size = LittleEndian::read_u64(&record[120..]);
		if major_version == 3 {
			stream_size &= 0xFFFFFFFF;
		}

		DirectoryEntry {
			id,
			offset,
			name,
			name_length,
			object_type: ObjectType::from(record[66]),
			color: Color::from(record[67]),
			left_sibling_id: LittleEndian::read_u32(&record[68..]),
			right_sibling_id: LittleEndian::read_u32(&record[72..]),
			child_id: LittleEndian::read_u32(&record[76..]),
			clsid: Clsid(clsid),
			state_bits: LittleEndian::read_u32(&record[96..]),
			creation_time: LittleEndian::read_u64(&record[100..]),
			modified_time: LittleEndian::read_u64(&record[108..]),
			starting_sector_location: LittleEndian::read_u32(&record[116..]),
			stream_size,
		}
	}

	pub fn left_sibling(&self) -> Option<u32> {
		link(self.left_sibling_id)
	}

	pub fn right_sibling(&self) -> Option<u32> {
		link(self.right_sibling_id)
	}

	/// The root of this folder's children's tree. Always `None` for anything but folders.
	pub fn child(&self) -> Option<u32> {
		if self.is_storage() { link(self.child_id) } else { None }
	}

	/// Whether this object is a folder (including the root folder).
	pub fn is_storage(&self) -> bool {
		self.object_type == ObjectType::Storage || self.object_type == ObjectType::RootStorage
	}

	pub fn is_stream(&self) -> bool {
		self.object_type == ObjectType::Stream
	}
}

fn link(id: u32) -> Option<u32> {
	if id == NOSTREAM { None } else { Some(id) }
}

/// One line of the directory listing: an entry and its folder nesting depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Listing {
	pub id: u32,
	pub depth: usize,
}

/// The decoded directory: all entries by ID, plus the depth-annotated listing of the tree.
#[derive(Clone, Debug)]
pub struct Directory {
	pub entries: Vec<DirectoryEntry>,
	pub listing: Vec<Listing>,
	pub sectors: Vec<u32>,
}

/// Reads all directory sectors and reconstructs the tree below the root entry.
pub fn read_directory<S>(source: &S, header: &Header, fat: &AllocationTable, warnings: &mut Vec<Warning>) -> Result<Directory, FormatError> where S: ByteSource + ?Sized {
	let sectors = fat.chain(header.first_directory_sector_location, ChainKind::Directory)?;
	info!("[read_directory] Directory occupies {} sector(s)", sectors.len());

	let entries_per_sector = header.sector_size as usize / DIRECTORY_ENTRY_SIZE;
	let mut entries = Vec::with_capacity(sectors.len() * entries_per_sector);
	for &sector in &sectors {
		let buffer = read_sector(source, header, sector)?;
		for (i, record) in buffer.chunks(DIRECTORY_ENTRY_SIZE).enumerate() {
			let id = entries.len() as u32;
			let offset = header.sector_offset(sector) + (i * DIRECTORY_ENTRY_SIZE) as u64;
			let entry = DirectoryEntry::parse(id, offset, record, header.major_version);
			trace!("[read_directory] Entry #{} '{}' ({:?}) at {:#X}", id, entry.name, entry.object_type, offset);
			entries.push(entry);
		}
	}

	let root = entries.first().ok_or(FormatError::MissingRoot)?;
	if root.object_type != ObjectType::RootStorage {
		let warning = Warning::RootType(root.object_type.raw());
		warn!("[read_directory] {}", warning);
		warnings.push(warning);
	}

	let listing = walk_tree(&entries)?;
	debug!("[read_directory] {} of {} entries are reachable from the root", listing.len(), entries.len());
	Ok(Directory { entries, listing, sectors })
}

enum Step {
	/// Expand the subtree rooted at `id`, which was linked from `parent`.
	Visit { id: u32, parent: u32, depth: usize },
	/// Append `id` to the listing.
	Emit { id: u32, depth: usize },
}

/// Lists the tree starting at entry #0: left siblings first, then the entry itself, then its right siblings,
/// and finally the children of folders one level deeper. Children of the root are not indented.
///
/// Every entry may be reached only once; otherwise the tree contains a cycle.
pub fn walk_tree(entries: &[DirectoryEntry]) -> Result<Vec<Listing>, FormatError> {
	let mut listing = Vec::new();
	if entries.is_empty() {
		return Ok(listing);
	}

	let mut visited = HashSet::new();
	let mut stack = vec![Step::Visit { id: 0, parent: 0, depth: 0 }];
	while let Some(step) = stack.pop() {
		match step {
			Step::Emit { id, depth } => listing.push(Listing { id, depth }),
			Step::Visit { id, parent, depth } => {
				let entry = entries.get(id as usize).ok_or(FormatError::DanglingEntry { entry: parent, link: id })?;
				if !visited.insert(id) {
					return Err(FormatError::DirectoryCycle { entry: id });
				}

				// Pushed in reverse, since the stack pops the last step first
				if let Some(child) = entry.child() {
					let child_depth = if entry.object_type == ObjectType::RootStorage { depth } else { depth + 1 };
					stack.push(Step::Visit { id: child, parent: id, depth: child_depth });
				}
				if let Some(right) = entry.right_sibling() {
					stack.push(Step::Visit { id: right, parent: id, depth });
				}
				stack.push(Step::Emit { id, depth });
				if let Some(left) = entry.left_sibling() {
					stack.push(Step::Visit { id: left, parent: id, depth });
				}
			},
		}
	}
	Ok(listing)
}
