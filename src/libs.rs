//! # Alternative mapping libraries
//!
//! Author: Emanuel Schmid-Siegert
//!
//! These libraries help to judge reads which support a structural variant.
//! Reads overlapping regions of interest in a BAM file are cross-referenced
//! with the much more permissive alignments of LAST (MAF output). For each read
//! the best alternative mappings are laid out along the read and plotted,
//! which shows quickly if a read could equally well originate from elsewhere.
//!
//! The libraries are split into :
//!  - common: data structures, errors and output shared by everything
//!  - hts_lib_based: region handling and candidate read selection from BAM via htslib
//!  - last_based: parsing of LAST alignments and collection per read
//!  - layout: ranking of mappings and segment geometry
//!  - plotting: SVG output of the layouts
//!

/// structures and functions used by all parts
pub mod lib {
    pub mod common;
    /// candidate reads from BAM and BED
    pub mod hts_lib_based;
    /// LAST/MAF parsing and per-read collection
    pub mod last_based;
    pub mod layout;
    /// SVG rendering
    pub mod plotting;
}
