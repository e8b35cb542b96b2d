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

//! Plain text output of decoded alignment records.
//!
//! Only SAM is supported. [format_sam_header](sam::format_sam_header) builds
//! the header from the contig table of an image and
//! [format_sam_line](sam::format_sam_line) formats one record of a query.
//!

pub mod sam;
