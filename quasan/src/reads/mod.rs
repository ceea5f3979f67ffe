//! Read inventory: what sequencing data a sample has.
//!
//! The [`ReadCollector`] scans `rawdata/` once per run and produces an
//! immutable [`ReadInventory`] keyed by [`Technology`].

mod collector;
mod strand;

pub use collector::{ReadCollector, ReadPair};
pub use strand::{classify_extension, classify_strand, FileKind};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Sequencing technology, the key of the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Technology {
    /// Paired-end short reads.
    ShortPaired,
    /// Long reads.
    LongRead,
}

impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShortPaired => write!(f, "short-paired"),
            Self::LongRead => write!(f, "long-read"),
        }
    }
}

/// Sequencing platform, one per `rawdata/` subdirectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// `rawdata/illumina`
    Illumina,
    /// `rawdata/pacbio`
    PacBio,
    /// `rawdata/nanopore`
    Nanopore,
}

impl Platform {
    /// Recognized platforms in scan order.
    pub const ALL: [Self; 3] = [Self::Illumina, Self::PacBio, Self::Nanopore];

    /// Subdirectory name under `rawdata/`.
    #[must_use]
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Illumina => "illumina",
            Self::PacBio => "pacbio",
            Self::Nanopore => "nanopore",
        }
    }

    /// Maps a subdirectory name to a platform.
    #[must_use]
    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.dir_name() == name)
    }

    /// The technology this platform produces.
    #[must_use]
    pub fn technology(self) -> Technology {
        match self {
            Self::Illumina => Technology::ShortPaired,
            Self::PacBio | Self::Nanopore => Technology::LongRead,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Strand of a paired-end read file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strand {
    /// `R1`
    One,
    /// `R2`
    Two,
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One => write!(f, "R1"),
            Self::Two => write!(f, "R2"),
        }
    }
}

/// One read file of a set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadFile {
    /// Path of the file.
    pub path: PathBuf,
    /// Platform that produced it.
    pub platform: Platform,
    /// Strand, for paired-end files.
    pub strand: Option<Strand>,
}

/// Ordered read files of one technology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadSet {
    technology: Technology,
    files: Vec<ReadFile>,
}

impl ReadSet {
    /// Creates a read set. Files keep the given order.
    #[must_use]
    pub fn new(technology: Technology, files: Vec<ReadFile>) -> Self {
        Self { technology, files }
    }

    /// The technology.
    #[must_use]
    pub fn technology(&self) -> Technology {
        self.technology
    }

    /// All files in listing order.
    #[must_use]
    pub fn files(&self) -> &[ReadFile] {
        &self.files
    }

    /// All paths in listing order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|f| f.path.as_path())
    }

    /// Paths of one strand in listing order.
    #[must_use]
    pub fn strand_paths(&self, strand: Strand) -> Vec<&Path> {
        self.files
            .iter()
            .filter(|f| f.strand == Some(strand))
            .map(|f| f.path.as_path())
            .collect()
    }

    /// Platform of the set (the platform of its first file).
    #[must_use]
    pub fn platform(&self) -> Option<Platform> {
        self.files.first().map(|f| f.platform)
    }

    /// Number of files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if the set has no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Read sets keyed by technology.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadInventory {
    sets: BTreeMap<Technology, ReadSet>,
}

impl ReadInventory {
    /// Creates an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a set, replacing any set of the same technology. Empty sets are ignored.
    #[must_use]
    pub fn with_set(mut self, set: ReadSet) -> Self {
        if !set.is_empty() {
            self.sets.insert(set.technology(), set);
        }
        self
    }

    /// The set of a technology.
    #[must_use]
    pub fn get(&self, technology: Technology) -> Option<&ReadSet> {
        self.sets.get(&technology)
    }

    /// Returns true if the technology has reads.
    #[must_use]
    pub fn has(&self, technology: Technology) -> bool {
        self.sets.contains_key(&technology)
    }

    /// Technologies present, in key order.
    pub fn technologies(&self) -> impl Iterator<Item = Technology> + '_ {
        self.sets.keys().copied()
    }

    /// Every read path, short reads first.
    pub fn all_paths(&self) -> impl Iterator<Item = &Path> {
        self.sets.values().flat_map(ReadSet::paths)
    }

    /// Returns true if no technology has reads.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn illumina(path: &str, strand: Strand) -> ReadFile {
        ReadFile {
            path: PathBuf::from(path),
            platform: Platform::Illumina,
            strand: Some(strand),
        }
    }

    #[test]
    fn test_platform_mapping() {
        assert_eq!(Platform::from_dir_name("nanopore"), Some(Platform::Nanopore));
        assert_eq!(Platform::from_dir_name("iontorrent"), None);
        assert_eq!(Platform::PacBio.technology(), Technology::LongRead);
        assert_eq!(Platform::Illumina.technology(), Technology::ShortPaired);
    }

    #[test]
    fn test_strand_paths_keep_order() {
        let set = ReadSet::new(
            Technology::ShortPaired,
            vec![
                illumina("a_R1_001.fastq.gz", Strand::One),
                illumina("a_R2_001.fastq.gz", Strand::Two),
                illumina("b_R1_001.fastq.gz", Strand::One),
            ],
        );
        assert_eq!(
            set.strand_paths(Strand::One),
            vec![Path::new("a_R1_001.fastq.gz"), Path::new("b_R1_001.fastq.gz")]
        );
        assert_eq!(set.strand_paths(Strand::Two).len(), 1);
    }

    #[test]
    fn test_inventory_ignores_empty_sets() {
        let inventory = ReadInventory::new()
            .with_set(ReadSet::new(Technology::LongRead, Vec::new()))
            .with_set(ReadSet::new(
                Technology::ShortPaired,
                vec![illumina("R1.fastq", Strand::One)],
            ));

        assert!(inventory.has(Technology::ShortPaired));
        assert!(!inventory.has(Technology::LongRead));
        assert_eq!(inventory.technologies().collect::<Vec<_>>(), vec![Technology::ShortPaired]);
    }

    #[test]
    fn test_technology_display() {
        assert_eq!(Technology::ShortPaired.to_string(), "short-paired");
        assert_eq!(serde_json::to_string(&Technology::LongRead).unwrap(), r#""long-read""#);
    }
}
