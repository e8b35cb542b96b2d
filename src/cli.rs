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
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    // Build index files from a reference
    Index {
        // Input fasta or fastq reference, may be gzipped
        #[arg(group = "input", required = true, help = "Reference file")]
        reference: PathBuf,

        // Prefix of the index files, defaults to the reference path
        #[arg(short = 'p', long = "prefix", required = false)]
        prefix: Option<PathBuf>,

        // Suffix array construction algorithm
        #[arg(short = 'a', long = "algorithm", default_value = "auto", help = "Algorithm: auto, is, or rb2")]
        algorithm: String,

        // Verbosity
        #[arg(long = "verbose", default_value_t = false)]
        verbose: bool,
    },

    // Package index files into an image
    Image {
        // Index prefix, or a reference file with --fasta
        #[arg(group = "input", required = true, help = "Index prefix")]
        input: PathBuf,

        // Output image path
        #[arg(short = 'o', long = "output", required = true)]
        out_file: PathBuf,

        // Index `input` as a reference first
        #[arg(long = "fasta", default_value_t = false)]
        from_fasta: bool,

        // Suffix array construction algorithm, used with --fasta
        #[arg(short = 'a', long = "algorithm", default_value = "auto", help = "Algorithm: auto, is, or rb2")]
        algorithm: String,

        // Verbosity
        #[arg(long = "verbose", default_value_t = false)]
        verbose: bool,
    },

    // List the contigs of an image
    Contigs {
        // Input image
        #[arg(group = "input", required = true, help = "Image file")]
        image: PathBuf,

        // Open images written by other versions
        #[arg(long = "ignore-version", default_value_t = false)]
        ignore_version: bool,

        // Verbosity
        #[arg(long = "verbose", default_value_t = false)]
        verbose: bool,
    },

    // Align reads against an image and print SAM
    Align {
        // Input image
        #[arg(group = "input", required = true, help = "Image file")]
        image: PathBuf,

        // Reads, or the first reads of pairs
        #[arg(required = true, help = "Fasta or fastq reads")]
        reads: PathBuf,

        // Mates of the reads in `reads`
        #[arg(required = false, help = "Fasta or fastq mates")]
        mates: Option<PathBuf>,

        // Minimum seed length
        #[arg(short = 'k', long = "min-seed-len", default_value_t = 19)]
        min_seed_len: i32,

        // Minimum score to output
        #[arg(short = 'T', long = "min-score", default_value_t = 30)]
        min_score: i32,

        // Expected insert size of pairs
        #[arg(short = 'I', long = "insert-size", required = false)]
        insert_size: Option<f64>,

        // Reads per alignment batch
        #[arg(long = "batch-size", default_value_t = 10000)]
        batch_size: usize,

        // Open images written by other versions
        #[arg(long = "ignore-version", default_value_t = false)]
        ignore_version: bool,

        // Verify the image checksum before aligning
        #[arg(long = "verify-checksum", default_value_t = false)]
        verify_checksum: bool,

        // Verbosity
        #[arg(long = "verbose", default_value_t = false)]
        verbose: bool,
    },

    // Print the version written into images
    Version,
}
