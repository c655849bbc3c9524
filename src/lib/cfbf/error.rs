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

use std::fmt;
use std::io;
use thiserror::Error;
use super::directory::ObjectType;
use super::fat::FatEntry;

/// The sector chain that was being followed when a structural error was found.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainKind {
	/// The FAT sectors listed by the DIFAT.
	Fat,
	Directory,
	MiniFat,
	/// The root entry's chain, which backs the mini stream.
	MiniStream,
	/// The content of a stream object, either in regular sectors or in mini-sectors.
	Stream { entry: u32, mini: bool },
}

impl fmt::Display for ChainKind {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			ChainKind::Fat => write!(f, "FAT"),
			ChainKind::Directory => write!(f, "directory"),
			ChainKind::MiniFat => write!(f, "miniFAT"),
			ChainKind::MiniStream => write!(f, "mini stream"),
			ChainKind::Stream { entry, mini: false } => write!(f, "stream #{}", entry),
			ChainKind::Stream { entry, mini: true } => write!(f, "stream #{} (mini)", entry),
		}
	}
}

/// Why a sector chain is considered broken.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainFault {
	/// The sector number lies outside of the allocation table.
	OutOfBounds(u32),
	/// The sector was already part of this chain.
	Revisited(u32),
	/// The sector is classified as something else than a data sector or the end of the chain.
	Unexpected { sector: u32, entry: FatEntry },
	/// The mini-sector lies beyond the end of the mini stream.
	OutsideMiniStream(u32),
	/// The chain holds fewer bytes than the declared size.
	TooShort { available: u64, declared: u64 },
}

impl fmt::Display for ChainFault {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			ChainFault::OutOfBounds(sector) => write!(f, "sector #{:#X} is outside of the allocation table", sector),
			ChainFault::Revisited(sector) => write!(f, "sector #{:#X} occurs twice", sector),
			ChainFault::Unexpected { sector, entry } => write!(f, "sector #{:#X} is marked as {:?}", sector, entry),
			ChainFault::OutsideMiniStream(sector) => write!(f, "mini-sector #{:#X} is outside of the mini stream", sector),
			ChainFault::TooShort { available, declared } => write!(f, "chain holds {} bytes, but {} are declared", available, declared),
		}
	}
}

#[derive(Debug, Error)]
pub enum FormatError {
	#[error("not a CFBF file (signature {0:02X?})")]
	BadSignature([u8; 8]),
	#[error("unsupported sector shift {sector_shift} (mini-sector shift {mini_sector_shift})")]
	UnsupportedSectorShift { sector_shift: u16, mini_sector_shift: u16 },
	#[error("file is truncated: {length} bytes needed at offset {offset:#X}, but the file has {available} bytes")]
	TruncatedSource { offset: u64, length: u64, available: u64 },
	#[error("broken {chain} chain starting at sector #{start:#X}: {fault}")]
	BrokenChain { chain: ChainKind, start: u32, fault: ChainFault },
	#[error("DIFAT sector #{sector:#X} occurs twice in the DIFAT chain")]
	DifatCycle { sector: u32 },
	#[error("directory entry #{entry} is reached twice in the directory tree")]
	DirectoryCycle { entry: u32 },
	#[error("directory entry #{entry} links to non-existing entry #{link}")]
	DanglingEntry { entry: u32, link: u32 },
	#[error("directory is empty, there is no root entry")]
	MissingRoot,
	#[error("there is no directory entry #{0}")]
	NoSuchEntry(u32),
	#[error("directory entry #{entry} is of type {object_type:?}, not a stream")]
	NotAStream { entry: u32, object_type: ObjectType },
	#[error("I/O error: {0}")]
	Io(#[from] io::Error),
}
