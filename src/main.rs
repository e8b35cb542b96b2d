// bwaimg: Versioned, checksummed BWA index images and alignment record encoding.
//
// Copyright 2025 Tommi Mäklin [tommi@maklin.fi].
//
// Copyrights in this project are retained by contributors. No copyright assignment
// is required to contribute to this project.
//
// Except as otherwise noted (below and/or in individual files), this
// project is licensed under the Apache License, Version 2.0
// <LICENSE-APACHE> or <http://www.apache.org/licenses/LICENSE-2.0> or
// the MIT license, <LICENSE-MIT> or <http://opensource.org/licenses/MIT>,
// at your option.
//
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;

use bwaimg::Error;
use bwaimg::Result;
use bwaimg::aligner::Aligner;
use bwaimg::aligner::PairEndStats;
use bwaimg::aligner::PairOrientation;
use bwaimg::decoder::decode_contig_directory;
use bwaimg::index::Algorithm;
use bwaimg::printer::sam::format_sam_header;
use bwaimg::printer::sam::format_sam_line;
use bwaimg::printer::sam::write_sam_header;

use clap::Parser;
use needletail::FastxReader;

mod cli;

/// Initializes the logger with verbosity given in `log_max_level`.
fn init_log(log_max_level: usize) {
    stderrlog::new()
    .module(module_path!())
    .module("bwaimg")
    .quiet(false)
    .verbosity(log_max_level)
    .timestamp(stderrlog::Timestamp::Off)
    .init()
    .unwrap();
}

/// A query read with its name truncated at the first whitespace.
struct Read {
    name: String,
    seq: Vec<u8>,
    qual: Option<Vec<u8>>,
}

fn open_reads(
    path: &Path,
) -> Result<Box<dyn FastxReader>> {
    needletail::parse_fastx_file(path).map_err(|e| {
        Error::InvalidArgument(format!("can't read {}: {}", path.display(), e))
    })
}

fn next_read(
    reader: &mut Box<dyn FastxReader>,
) -> Result<Option<Read>> {
    match reader.next() {
        Some(record) => {
            let record = record.map_err(|e| Error::InvalidArgument(format!("malformed read: {}", e)))?;
            let id = String::from_utf8_lossy(record.id()).to_string();
            let name = id.split_whitespace().next().unwrap_or("").to_string();
            Ok(Some(Read { name, seq: record.seq().to_vec(), qual: record.qual().map(|x| x.to_vec()) }))
        },
        None => Ok(None),
    }
}

/// Reads up to `batch_size` reads, or pairs when `mates` is given.
fn next_batch(
    reads: &mut Box<dyn FastxReader>,
    mates: &mut Option<Box<dyn FastxReader>>,
    batch_size: usize,
) -> Result<Vec<Read>> {
    let mut batch: Vec<Read> = Vec::with_capacity(batch_size);
    while batch.len() < batch_size {
        let Some(read) = next_read(reads)? else { break };
        batch.push(read);
        if let Some(mates) = mates.as_mut() {
            let mate = next_read(mates)?.ok_or_else(|| {
                Error::InvalidArgument("mate file has fewer reads than the read file".to_string())
            })?;
            batch.push(mate);
        }
    }
    Ok(batch)
}

fn run(
    command: &cli::Commands,
) -> Result<()> {
    match command {
        cli::Commands::Index { reference, prefix, algorithm, .. } => {
            let algorithm: Algorithm = algorithm.parse()?;
            let prefix = prefix.clone().unwrap_or(reference.clone());
            bwaimg::build_index(reference, &prefix, algorithm)?;
        },

        cli::Commands::Image { input, out_file, from_fasta, algorithm, .. } => {
            if *from_fasta {
                let algorithm: Algorithm = algorithm.parse()?;
                bwaimg::create_image_from_fasta(input, out_file, algorithm)?;
            } else {
                bwaimg::build_image(input, out_file)?;
            }
        },

        cli::Commands::Contigs { image, ignore_version, .. } => {
            let handle = bwaimg::open_image(image, *ignore_version, false)?;
            let names = decode_contig_directory(&bwaimg::list_contigs(&handle)?)?;
            let mut conn_out = BufWriter::new(std::io::stdout());
            names.iter().zip(handle.contigs().iter()).try_for_each(|(name, contig)| {
                writeln!(conn_out, "{}\t{}", name, contig.len)
            }).map_err(|e| Error::io("Failed to write to stdout", e))?;
            conn_out.flush().map_err(|e| Error::io("Failed to write to stdout", e))?;
            bwaimg::close_image(handle)?;
        },

        cli::Commands::Align {
            image, reads, mates, min_seed_len, min_score, insert_size, batch_size,
            ignore_version, verify_checksum, ..
        } => {
            let handle = bwaimg::open_image(image, *ignore_version, *verify_checksum)?;

            let mut aligner = Aligner::new(&handle);
            aligner.options_mut().min_seed_len = *min_seed_len;
            aligner.options_mut().t = *min_score;
            if mates.is_some() {
                aligner.align_pairs();
            }
            if let Some(average) = insert_size {
                let mut pestat = [PairEndStats::failed(); 4];
                pestat[PairOrientation::FR.index()] = PairEndStats::from_average(*average)?;
                aligner.set_pair_stats(Some(pestat));
            }

            let mut conn_out = BufWriter::new(std::io::stdout());
            let header = format_sam_header(handle.contigs())?;
            write_sam_header(&header, &mut conn_out)?;

            let mut reads = open_reads(reads)?;
            let mut mates = match mates {
                Some(path) => Some(open_reads(path)?),
                None => None,
            };

            let batch_size = (*batch_size).max(1);
            loop {
                let batch = next_batch(&mut reads, &mut mates, batch_size)?;
                if batch.is_empty() {
                    break;
                }
                let seqs: Vec<&[u8]> = batch.iter().map(|read| read.seq.as_slice()).collect();
                let records = aligner.align_seqs(&seqs)?;
                log::info!("Aligned {} reads", batch.len());

                for (read, read_records) in batch.iter().zip(records.iter()) {
                    for record in read_records {
                        format_sam_line(&read.name, &read.seq, read.qual.as_deref(), record, &header, &mut conn_out)?;
                    }
                }
            }
            conn_out.flush().map_err(|e| Error::io("Failed to write to stdout", e))?;

            drop(aligner);
            bwaimg::close_image(handle)?;
        },

        cli::Commands::Version => {
            println!("{}", bwaimg::version());
        },
    }
    Ok(())
}

fn main() {
    let cli = cli::Cli::parse();

    // Subcommands:
    let verbose = match &cli.command {
        Some(cli::Commands::Index { verbose, .. }) => *verbose,
        Some(cli::Commands::Image { verbose, .. }) => *verbose,
        Some(cli::Commands::Contigs { verbose, .. }) => *verbose,
        Some(cli::Commands::Align { verbose, .. }) => *verbose,
        Some(cli::Commands::Version) => false,
        None => {
            eprintln!("No subcommand given, see `bwaimg --help`");
            std::process::exit(2);
        },
    };
    init_log(if verbose { 2 } else { 1 });

    if let Some(command) = &cli.command {
        if let Err(e) = run(command) {
            log::error!("{}", e);
            std::process::exit(1);
        }
    }
}
