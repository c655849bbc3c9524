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

#[macro_use] // enable value_t! macro
extern crate clap;

use std::io::{stdin, stdout, Write};
use std::fs::File;
use clap::{Arg, App, AppSettings, SubCommand, ArgMatches};
use log::LevelFilter;
use cfbfreader::cfbf::{self, CompoundFile, FormatError, ObjectType};
use cfbfreader::io::{self, ByteSource, SeekableSource};

fn main() {
	let input_arg = Arg::with_name("input")
		.value_name("FILE")
		.help("A file in Compound File Binary File Format (CFBF). If omitted, the file will be read from STDIN instead.")
		.short("i")
		.long("input")
		.required(false);

	let matches = App::new("cfbfdump")
		.version("1.1")
		.author("Steve Muller <steve.muller@outlook.com>")
		.about("This utility reads a Compound File Binary File Format (also known as OLE file, COM file, or Structured Storage file) and dumps all contained files.")
		.setting(AppSettings::SubcommandRequired)
		.arg(Arg::with_name("verbose")
			.short("v")
			.help("Increases the debug verbosity. This will print a lot of debug messages to standard error (STDERR). Can be used up to 3 times.")
			.multiple(true)
			.takes_value(false))
		.subcommand(SubCommand::with_name("list")
			.about("Lists all objects contained in the CFBF file. Each output line holds the internal object ID, the object type, the stream size and the (indented) object name.")
			.arg(input_arg.clone())
		)
		.subcommand(SubCommand::with_name("dump")
			.about("Dumps a stream from the CFBF file.")
			.arg(Arg::with_name("id")
				.value_name("STREAMID")
				.help("The ID of the stream that shall be dumped.")
				.long("id")
				.required(true))
			.arg(Arg::with_name("output")
				.value_name("FILE")
				.help("The file where the stream shall be written to. If this parameter is not specified (or has the value '-'), the stream will be written to STDOUT instead.")
				.short("o")
				.long("output")
				.required(false))
			.arg(input_arg.clone())
		)
		.subcommand(SubCommand::with_name("info")
			.about("Prints the header fields, the warnings and the allocation tables of the CFBF file.")
			.arg(input_arg)
		)
	.get_matches();

	let level = match matches.occurrences_of("verbose") {
		0 => LevelFilter::Warn,
		1 => LevelFilter::Info,
		2 => LevelFilter::Debug,
		_ => LevelFilter::Trace,
	};
	env_logger::Builder::new().filter_level(level).init();

	if let Err(e) = dispatch(matches) {
		eprintln!("ERROR: {}", e);
		std::process::exit(1);
	}
}

fn dispatch(matches: ArgMatches) -> Result<(), FormatError> {
	match matches.subcommand() {
		("list", Some(submatches)) => dispatch_list(submatches),
		("dump", Some(submatches)) => dispatch_dump(submatches),
		("info", Some(submatches)) => dispatch_info(submatches),
		_ => unreachable!("clap requires a known subcommand"),
	}
}

fn open_input(matches: &ArgMatches) -> Result<CompoundFile<Box<dyn ByteSource>>, FormatError> {
	let source: Box<dyn ByteSource> = match matches.value_of("input").unwrap_or("") {
		"" | "-" => Box::new(io::read_all(stdin())?),
		inputfile => Box::new(SeekableSource::new(File::open(inputfile)?)?),
	};
	cfbf::decode(source)
}

fn dispatch_list(matches: &ArgMatches) -> Result<(), FormatError> {
	let file = open_input(matches)?;
	for (depth, entry) in file.entries() {
		let object_type = match entry.object_type {
			ObjectType::RootStorage => "root",
			ObjectType::Storage => "storage",
			ObjectType::Stream => "stream",
			ObjectType::Unallocated => "unused",
			ObjectType::Unknown(_) => "unknown",
		};
		let suffix = if entry.is_storage() { "/" } else { "" };
		println!("{:>4} {:<7} {:>10} {}{}{}", entry.id, object_type, entry.stream_size, "  ".repeat(depth), entry.name.escape_default(), suffix);
	}
	Ok(())
}

fn dispatch_dump(matches: &ArgMatches) -> Result<(), FormatError> {
	let id = value_t!(matches, "id", u32).unwrap_or_else(|e| e.exit());
	let file = open_input(matches)?;
	let mut output: Box<dyn Write> = match matches.value_of("output").unwrap_or("") {
		"" | "-" => Box::new(stdout()),
		outputfile => Box::new(File::create(outputfile)?),
	};
	file.dump_stream(id, &mut output)?;
	output.flush()?;
	Ok(())
}

fn dispatch_info(matches: &ArgMatches) -> Result<(), FormatError> {
	let file = open_input(matches)?;
	let header = file.header();
	println!("Version:                {}.{}", header.major_version, header.minor_version);
	println!("CLSID:                  {}", header.clsid);
	println!("Byte order:             {:#06X}", header.byte_order);
	println!("Sector size:            {} (shift {})", header.sector_size, header.sector_shift);
	println!("Mini-sector size:       {} (shift {})", header.mini_sector_size, header.mini_sector_shift);
	println!("Mini stream cutoff:     {}", header.mini_stream_cutoff_size);
	println!("Directory sectors:      {} declared, chain {:X?}", header.number_of_directory_sectors, file.directory_sectors());
	println!("FAT sectors:            {} declared, {} FAT entries", header.number_of_fat_sectors, file.fat().len());
	println!("MiniFAT sectors:        {} declared, chain {:X?}, {} miniFAT entries", header.number_of_mini_fat_sectors, file.mini_fat_sectors(), file.mini_fat().len());
	println!("DIFAT sectors:          {} declared, {} DIFAT entries", header.number_of_difat_sectors, file.difat().len());
	println!("Mini stream sectors:    {:X?}", file.mini_stream_sectors());
	for warning in file.warnings() {
		println!("Warning:                {}", warning);
	}
	Ok(())
}
