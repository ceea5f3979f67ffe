//! File name classification: extension and paired-end strand.

use super::Strand;
use regex::Regex;
use std::sync::LazyLock;

/// `sample_S1_L001_R1_001.fastq.gz`
static INFIX_STRAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_R([12])_").expect("valid strand regex"));

/// `sample_R1.fastq.gz`, `sampleR2.fq`
static SUFFIX_STRAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"R([12])\.f(?:ast)?q(?:\.gz)?$").expect("valid strand regex"));

/// What a file in a technology directory is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// `.fastq` / `.fq`, optionally gzipped.
    Fastq {
        /// Whether the file is gzip-wrapped.
        gzipped: bool,
    },
    /// `.bam`, needs conversion.
    Bam,
    /// Anything else.
    Other,
}

/// Classifies a file name by extension.
#[must_use]
pub fn classify_extension(file_name: &str) -> FileKind {
    let (stem, gzipped) = match file_name.strip_suffix(".gz") {
        Some(stem) => (stem, true),
        None => (file_name, false),
    };
    if stem.ends_with(".fastq") || stem.ends_with(".fq") {
        FileKind::Fastq { gzipped }
    } else if !gzipped && file_name.ends_with(".bam") {
        FileKind::Bam
    } else {
        FileKind::Other
    }
}

/// Classifies the strand of a paired-end file name.
///
/// The infix pattern wins when both match. Returns `None` when neither pattern
/// matches; such files are excluded from assembly input.
#[must_use]
pub fn classify_strand(file_name: &str) -> Option<Strand> {
    INFIX_STRAND
        .captures(file_name)
        .or_else(|| SUFFIX_STRAND.captures(file_name))
        .and_then(|caps| match &caps[1] {
            "1" => Some(Strand::One),
            "2" => Some(Strand::Two),
            _ => None,
        })
}
