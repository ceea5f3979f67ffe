//! Assembly strategy selection and run tags.

use crate::config::RUN_DATE_FORMAT;
use crate::errors::NoUsableReadsError;
use crate::layout::SampleLayout;
use crate::reads::{ReadInventory, Technology};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Which assembly path a run takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Short paired-end reads only.
    #[serde(alias = "illumina")]
    IlluminaOnly,
    /// Long reads only.
    #[serde(alias = "longread")]
    LongReadOnly,
    /// Long-read assembly polished with short reads.
    Hybrid,
}

impl Strategy {
    /// Name used in tags.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::IlluminaOnly => "illumina",
            Self::LongReadOnly => "longread",
            Self::Hybrid => "hybrid",
        }
    }

    /// Technologies the strategy needs.
    #[must_use]
    pub fn required(self) -> &'static [Technology] {
        match self {
            Self::IlluminaOnly => &[Technology::ShortPaired],
            Self::LongReadOnly => &[Technology::LongRead],
            Self::Hybrid => &[Technology::ShortPaired, Technology::LongRead],
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "illumina" | "illumina_only" => Ok(Self::IlluminaOnly),
            "longread" | "long_read_only" => Ok(Self::LongReadOnly),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown strategy '{other}' (expected illumina, longread or hybrid)")),
        }
    }
}

/// `<YYYYMMDD>_<strategy>_<sample>`, the prefix of every tagged artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    date: NaiveDate,
    strategy: Strategy,
    sample_id: String,
}

impl Tag {
    /// Creates a tag.
    #[must_use]
    pub fn new(date: NaiveDate, strategy: Strategy, sample_id: impl Into<String>) -> Self {
        Self {
            date,
            strategy,
            sample_id: sample_id.into(),
        }
    }

    /// The run date.
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// The strategy.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// The sample id.
    #[must_use]
    pub fn sample_id(&self) -> &str {
        &self.sample_id
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            self.date.format(RUN_DATE_FORMAT),
            self.strategy.name(),
            self.sample_id
        )
    }
}

/// Picks the strategy for an inventory.
///
/// Short and long reads give `Hybrid`, only short `IlluminaOnly`, only long
/// `LongReadOnly`. A forced strategy is accepted when the reads it needs exist.
///
/// # Errors
///
/// `NoUsableReadsError` when nothing usable is present or a forced strategy
/// lacks its reads.
pub fn choose(
    inventory: &ReadInventory,
    forced: Option<Strategy>,
    sample_root: &Path,
) -> Result<Strategy, NoUsableReadsError> {
    if let Some(strategy) = forced {
        if let Some(missing) = strategy.required().iter().find(|t| !inventory.has(**t)) {
            return Err(NoUsableReadsError::new(
                sample_root,
                format!("strategy '{strategy}' was forced but no {missing} reads were collected"),
            ));
        }
        return Ok(strategy);
    }
    match (inventory.has(Technology::ShortPaired), inventory.has(Technology::LongRead)) {
        (true, true) => Ok(Strategy::Hybrid),
        (true, false) => Ok(Strategy::IlluminaOnly),
        (false, true) => Ok(Strategy::LongReadOnly),
        (false, false) => Err(NoUsableReadsError::new(
            sample_root,
            "expected paired reads in rawdata/illumina or long reads in rawdata/pacbio or rawdata/nanopore",
        )),
    }
}

/// Picks the strategy and computes the tag. Pure: the run date is an input.
///
/// # Errors
///
/// See [`choose`].
pub fn select(
    inventory: &ReadInventory,
    forced: Option<Strategy>,
    run_date: NaiveDate,
    layout: &SampleLayout,
) -> Result<(Strategy, Tag), NoUsableReadsError> {
    let strategy = choose(inventory, forced, layout.root())?;
    Ok((strategy, Tag::new(run_date, strategy, layout.sample_id())))
}

/// Finds the latest date of an existing `<date>_<strategy>_<sample>_` artifact.
///
/// Looks in the assembly and annotation directories, so a run resumed on a
/// later day keeps naming artifacts with the date of the first run.
#[must_use]
pub fn discover_run_date(layout: &SampleLayout, strategy: Strategy) -> Option<NaiveDate> {
    let pattern = format!(
        r"^(\d{{8}})_{}_{}_",
        strategy.name(),
        regex::escape(layout.sample_id())
    );
    let re = Regex::new(&pattern).ok()?;

    let dirs = [
        layout.assembly_dir(),
        layout.annotation_dir(crate::config::Annotator::Prokka),
        layout.annotation_dir(crate::config::Annotator::Pgap),
    ];
    let found = dirs
        .iter()
        .filter_map(|dir| fs::read_dir(dir).ok())
        .flatten()
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let caps = re.captures(&name)?;
            NaiveDate::parse_from_str(&caps[1], RUN_DATE_FORMAT).ok()
        })
        .max();
    if let Some(date) = found {
        debug!("Reusing run date {} from existing artifacts", date.format(RUN_DATE_FORMAT));
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reads::{Platform, ReadFile, ReadSet, Strand};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 4, 26).unwrap()
    }

    fn short() -> ReadSet {
        ReadSet::new(
            Technology::ShortPaired,
            vec![
                ReadFile {
                    path: PathBuf::from("S_R1.fastq"),
                    platform: Platform::Illumina,
                    strand: Some(Strand::One),
                },
                ReadFile {
                    path: PathBuf::from("S_R2.fastq"),
                    platform: Platform::Illumina,
                    strand: Some(Strand::Two),
                },
            ],
        )
    }

    fn long() -> ReadSet {
        ReadSet::new(
            Technology::LongRead,
            vec![ReadFile {
                path: PathBuf::from("n.fastq.gz"),
                platform: Platform::Nanopore,
                strand: None,
            }],
        )
    }

    fn layout() -> SampleLayout {
        SampleLayout::new("/data/STRAIN01").unwrap()
    }

    #[test]
    fn test_precedence() {
        let both = ReadInventory::new().with_set(short()).with_set(long());
        let only_short = ReadInventory::new().with_set(short());
        let only_long = ReadInventory::new().with_set(long());

        assert_eq!(select(&both, None, date(), &layout()).unwrap().0, Strategy::Hybrid);
        assert_eq!(select(&only_short, None, date(), &layout()).unwrap().0, Strategy::IlluminaOnly);
        assert_eq!(select(&only_long, None, date(), &layout()).unwrap().0, Strategy::LongReadOnly);
    }

    #[test]
    fn test_empty_inventory_is_an_error() {
        let err = select(&ReadInventory::new(), None, date(), &layout()).unwrap_err();
        assert_eq!(err.root, PathBuf::from("/data/STRAIN01"));
    }

    #[test]
    fn test_tag_format_and_determinism() {
        let inventory = ReadInventory::new().with_set(short());
        let first = select(&inventory, None, date(), &layout()).unwrap();
        let second = select(&inventory, None, date(), &layout()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.1.to_string(), "20210426_illumina_STRAIN01");
    }

    #[test]
    fn test_forced_strategy() {
        let both = ReadInventory::new().with_set(short()).with_set(long());
        let (strategy, tag) = select(&both, Some(Strategy::IlluminaOnly), date(), &layout()).unwrap();
        assert_eq!(strategy, Strategy::IlluminaOnly);
        assert_eq!(tag.strategy(), Strategy::IlluminaOnly);

        let only_short = ReadInventory::new().with_set(short());
        let err = select(&only_short, Some(Strategy::Hybrid), date(), &layout()).unwrap_err();
        assert!(err.message.contains("long-read"));
    }

    #[test]
    fn test_parse_strategy_names() {
        assert_eq!("longread".parse::<Strategy>().unwrap(), Strategy::LongReadOnly);
        assert_eq!("illumina_only".parse::<Strategy>().unwrap(), Strategy::IlluminaOnly);
        assert!("sanger".parse::<Strategy>().is_err());
        let parsed: Strategy = serde_json::from_str(r#""illumina""#).unwrap();
        assert_eq!(parsed, Strategy::IlluminaOnly);
    }

    #[test]
    fn test_discover_run_date_latest_wins() {
        let tmp = TempDir::new().unwrap();
        let layout = SampleLayout::new(tmp.path().join("STRAIN01")).unwrap();
        fs::create_dir_all(layout.assembly_dir()).unwrap();
        fs::create_dir_all(layout.annotation_dir(crate::config::Annotator::Prokka)).unwrap();
        for name in [
            "20210101_illumina_STRAIN01_shovill.fa",
            "20210426_hybrid_STRAIN01_flye.fa",
            "20200101_illumina_STRAIN012_shovill.fa",
        ] {
            fs::write(layout.assembly_dir().join(name), ">c\n").unwrap();
        }
        fs::write(
            layout
                .annotation_dir(crate::config::Annotator::Prokka)
                .join("20210305_illumina_STRAIN01_prokka_annotation.gbk"),
            "LOCUS",
        )
        .unwrap();

        assert_eq!(
            discover_run_date(&layout, Strategy::IlluminaOnly),
            NaiveDate::from_ymd_opt(2021, 3, 5)
        );
        assert_eq!(discover_run_date(&layout, Strategy::Hybrid), Some(date()));
        assert_eq!(discover_run_date(&layout, Strategy::LongReadOnly), None);
    }
}
