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

//! In-memory writer for small version 3 compound files, used as test fixtures.

#![allow(dead_code)]

pub const ENDOFCHAIN: u32 = 0xFFFFFFFE;
pub const FREESECT: u32 = 0xFFFFFFFF;
pub const FATSECT: u32 = 0xFFFFFFFD;
pub const NOSTREAM: u32 = 0xFFFFFFFF;

pub const SECTOR_SIZE: usize = 512;
pub const MINI_SECTOR_SIZE: usize = 64;
pub const CUTOFF: usize = 4096;

const SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

pub struct Entry {
	pub name: String,
	pub object_type: u8,
	pub left: u32,
	pub right: u32,
	pub child: u32,
	pub clsid: [u8; 16],
	pub start: u32,
	pub size: u64,
}

impl Entry {
	fn new(name: &str, object_type: u8) -> Entry {
		Entry { name: name.to_owned(), object_type, left: NOSTREAM, right: NOSTREAM, child: NOSTREAM, clsid: [0; 16], start: 0, size: 0 }
	}

	fn encode(&self) -> Vec<u8> {
		let mut record = vec![0u8; 128];
		let units: Vec<u16> = self.name.encode_utf16().collect();
		assert!(units.len() < 32);
		for (i, unit) in units.iter().enumerate() {
			record[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
		}
		let name_length = if units.is_empty() { 0 } else { (units.len() as u16 + 1) * 2 };
		record[64..66].copy_from_slice(&name_length.to_le_bytes());
		record[66] = self.object_type;
		record[67] = 1;
		record[68..72].copy_from_slice(&self.left.to_le_bytes());
		record[72..76].copy_from_slice(&self.right.to_le_bytes());
		record[76..80].copy_from_slice(&self.child.to_le_bytes());
		record[80..96].copy_from_slice(&self.clsid);
		record[116..120].copy_from_slice(&self.start.to_le_bytes());
		record[120..128].copy_from_slice(&self.size.to_le_bytes());
		record
	}
}

/// Lays out streams the way a writer would: big streams in regular sectors, small ones in the mini stream.
/// Entry #0 is always the root.
pub struct Builder {
	sectors: Vec<Vec<u8>>,
	fat: Vec<u32>,
	mini_stream: Vec<u8>,
	mini_fat: Vec<u32>,
	entries: Vec<Entry>,
}

/// The built file, and where its structures ended up.
pub struct Image {
	pub bytes: Vec<u8>,
	pub first_directory_sector: u32,
	pub first_mini_fat_sector: u32,
	pub fat_sectors: Vec<u32>,
}

impl Builder {
	pub fn new() -> Builder {
		Builder {
			sectors: Vec::new(),
			fat: Vec::new(),
			mini_stream: Vec::new(),
			mini_fat: Vec::new(),
			entries: vec![Entry::new("Root Entry", 5)],
		}
	}

	pub fn storage(&mut self, name: &str) -> u32 {
		self.entries.push(Entry::new(name, 1));
		self.entries.len() as u32 - 1
	}

	pub fn stream(&mut self, name: &str, data: &[u8]) -> u32 {
		let mut entry = Entry::new(name, 2);
		entry.size = data.len() as u64;
		entry.start = if data.is_empty() {
			ENDOFCHAIN
		}
		else if data.len() < CUTOFF {
			self.mini_chain(data)
		}
		else {
			self.chain(data)
		};
		self.entries.push(entry);
		self.entries.len() as u32 - 1
	}

	/// Sets the tree links of an entry.
	pub fn link(&mut self, id: u32, left: u32, right: u32, child: u32) -> &mut Builder {
		let entry = &mut self.entries[id as usize];
		entry.left = left;
		entry.right = right;
		entry.child = child;
		self
	}

	pub fn entry_mut(&mut self, id: u32) -> &mut Entry {
		&mut self.entries[id as usize]
	}

	/// Appends `data` as a new chain of regular sectors.
	fn chain(&mut self, data: &[u8]) -> u32 {
		if data.is_empty() {
			return ENDOFCHAIN;
		}
		let start = self.sectors.len() as u32;
		for chunk in data.chunks(SECTOR_SIZE) {
			let mut sector = vec![0u8; SECTOR_SIZE];
			sector[..chunk.len()].copy_from_slice(chunk);
			self.sectors.push(sector);
			self.fat.push(self.sectors.len() as u32);
		}
		*self.fat.last_mut().unwrap() = ENDOFCHAIN;
		start
	}

	/// Appends `data` as a new chain of mini-sectors.
	fn mini_chain(&mut self, data: &[u8]) -> u32 {
		let start = (self.mini_stream.len() / MINI_SECTOR_SIZE) as u32;
		for chunk in data.chunks(MINI_SECTOR_SIZE) {
			let mut mini_sector = vec![0u8; MINI_SECTOR_SIZE];
			mini_sector[..chunk.len()].copy_from_slice(chunk);
			self.mini_stream.extend_from_slice(&mini_sector);
			self.mini_fat.push((self.mini_stream.len() / MINI_SECTOR_SIZE) as u32);
		}
		*self.mini_fat.last_mut().unwrap() = ENDOFCHAIN;
		start
	}

	pub fn build(mut self) -> Image {
		// Mini stream, held by the root entry
		let mini_stream = std::mem::replace(&mut self.mini_stream, Vec::new());
		self.entries[0].start = self.chain(&mini_stream);
		self.entries[0].size = mini_stream.len() as u64;

		// MiniFAT, padded with free slots
		let mut mini_fat = Vec::new();
		for value in &self.mini_fat {
			mini_fat.extend_from_slice(&value.to_le_bytes());
		}
		while mini_fat.len() % SECTOR_SIZE != 0 {
			mini_fat.push(0xFF);
		}
		let number_of_mini_fat_sectors = (mini_fat.len() / SECTOR_SIZE) as u32;
		let first_mini_fat_sector = self.chain(&mini_fat);

		// Directory, padded with unused entries
		let mut directory = Vec::new();
		for entry in &self.entries {
			directory.extend(entry.encode());
		}
		while directory.len() % SECTOR_SIZE != 0 {
			directory.extend(Entry::new("", 0).encode());
		}
		let first_directory_sector = self.chain(&directory);

		// FAT sectors go last and must cover themselves
		let data_sectors = self.sectors.len();
		let entries_per_sector = SECTOR_SIZE / 4;
		let mut number_of_fat_sectors = 1;
		while data_sectors + number_of_fat_sectors > number_of_fat_sectors * entries_per_sector {
			number_of_fat_sectors += 1;
		}
		assert!(number_of_fat_sectors <= 109);
		let fat_sectors: Vec<u32> = (data_sectors..data_sectors + number_of_fat_sectors).map(|s| s as u32).collect();
		for _ in &fat_sectors {
			self.fat.push(FATSECT);
		}
		self.fat.resize(number_of_fat_sectors * entries_per_sector, FREESECT);

		let mut bytes = vec![0u8; SECTOR_SIZE];
		bytes[0..8].copy_from_slice(&SIGNATURE);
		bytes[0x18..0x1A].copy_from_slice(&0x3Eu16.to_le_bytes());
		bytes[0x1A..0x1C].copy_from_slice(&3u16.to_le_bytes());
		bytes[0x1C..0x1E].copy_from_slice(&0xFFFEu16.to_le_bytes());
		bytes[0x1E..0x20].copy_from_slice(&9u16.to_le_bytes());
		bytes[0x20..0x22].copy_from_slice(&6u16.to_le_bytes());
		bytes[0x2C..0x30].copy_from_slice(&(number_of_fat_sectors as u32).to_le_bytes());
		bytes[0x30..0x34].copy_from_slice(&first_directory_sector.to_le_bytes());
		bytes[0x38..0x3C].copy_from_slice(&(CUTOFF as u32).to_le_bytes());
		bytes[0x3C..0x40].copy_from_slice(&first_mini_fat_sector.to_le_bytes());
		bytes[0x40..0x44].copy_from_slice(&number_of_mini_fat_sectors.to_le_bytes());
		bytes[0x44..0x48].copy_from_slice(&ENDOFCHAIN.to_le_bytes());
		for i in 0..109 {
			let value = fat_sectors.get(i).cloned().unwrap_or(FREESECT);
			bytes[0x4C + i * 4..0x50 + i * 4].copy_from_slice(&value.to_le_bytes());
		}

		for sector in &self.sectors {
			bytes.extend_from_slice(sector);
		}
		for value in &self.fat {
			bytes.extend_from_slice(&value.to_le_bytes());
		}

		Image { bytes, first_directory_sector, first_mini_fat_sector, fat_sectors }
	}
}

impl Image {
	/// Absolute offset of a directory entry record. The directory is laid out contiguously.
	pub fn entry_offset(&self, id: u32) -> usize {
		(self.first_directory_sector as usize + 1) * SECTOR_SIZE + id as usize * 128
	}

	/// Absolute offset of the FAT slot for the given sector.
	pub fn fat_slot_offset(&self, sector: u32) -> usize {
		let fat_sector = self.fat_sectors[sector as usize / (SECTOR_SIZE / 4)];
		(fat_sector as usize + 1) * SECTOR_SIZE + (sector as usize % (SECTOR_SIZE / 4)) * 4
	}

	pub fn set_u16(&mut self, offset: usize, value: u16) {
		self.bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
	}

	pub fn set_u32(&mut self, offset: usize, value: u32) {
		self.bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
	}
}

/// `len` bytes of the given value.
pub fn fill(value: u8, len: usize) -> Vec<u8> {
	vec![value; len]
}
