//! Scans `rawdata/` and builds the read inventory.

use super::strand::{classify_extension, classify_strand, FileKind};
use super::{Platform, ReadFile, ReadInventory, ReadSet, Strand, Technology};
use crate::artifacts::{ArtifactManager, ArtifactMove};
use crate::config::PipelineConfig;
use crate::errors::{AggregationError, InputError, QuasanError};
use crate::layout::SampleLayout;
use crate::stages::CommandLine;
use crate::tools::{verify_contract, Invocation, ToolInvoker};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Stage name used for BAM conversions in logs, errors and scratch paths.
const CONVERSION_STAGE: &str = "bam-conversion";

/// The strand-1 / strand-2 pair handed to assemblers and polishers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPair {
    /// Strand-1 reads.
    pub r1: PathBuf,
    /// Strand-2 reads.
    pub r2: PathBuf,
}

/// Builds a [`ReadInventory`] for one sample.
#[derive(Debug, Clone)]
pub struct ReadCollector {
    layout: SampleLayout,
    samtools: String,
    threads: usize,
    invoker: Arc<dyn ToolInvoker>,
    artifacts: ArtifactManager,
}

impl ReadCollector {
    /// Creates a collector.
    #[must_use]
    pub fn new(config: &PipelineConfig, layout: SampleLayout, invoker: Arc<dyn ToolInvoker>) -> Self {
        Self {
            layout,
            samtools: config.program("samtools"),
            threads: config.threads,
            invoker,
            artifacts: ArtifactManager::new(),
        }
    }

    /// Scans the sample directory.
    ///
    /// # Errors
    ///
    /// `InputError` if the sample or its `rawdata/` directory is missing.
    /// BAM conversion failures propagate as tool or artifact errors.
    pub async fn collect(&self) -> Result<ReadInventory, QuasanError> {
        let root = self.layout.root();
        if !root.is_dir() {
            return Err(InputError::new(root, "sample directory does not exist").into());
        }
        let rawdata = self.layout.rawdata_dir();
        if !rawdata.is_dir() {
            return Err(InputError::new(&rawdata, "missing rawdata directory").into());
        }

        let mut by_platform: HashMap<Platform, Vec<ReadFile>> = HashMap::new();
        for (name, path) in sorted_entries(&rawdata)? {
            if !path.is_dir() {
                debug!("Ignoring file {} at the rawdata root", path.display());
                continue;
            }
            match Platform::from_dir_name(&name) {
                Some(platform) => {
                    let files = self.scan_platform(platform, &path).await?;
                    by_platform.insert(platform, files);
                }
                None => warn!("Unknown technology directory '{}', ignoring it", name),
            }
        }

        let mut inventory = ReadInventory::new();
        if let Some(files) = by_platform.remove(&Platform::Illumina) {
            if let Some(set) = build_short_set(files) {
                inventory = inventory.with_set(set);
            }
        }
        let pacbio = by_platform.remove(&Platform::PacBio).unwrap_or_default();
        let nanopore = by_platform.remove(&Platform::Nanopore).unwrap_or_default();
        let long = if nanopore.is_empty() {
            pacbio
        } else {
            if !pacbio.is_empty() {
                warn!(
                    "Both pacbio and nanopore reads found; using nanopore, ignoring {} pacbio file(s)",
                    pacbio.len()
                );
            }
            nanopore
        };
        inventory = inventory.with_set(ReadSet::new(Technology::LongRead, long));

        for technology in inventory.technologies() {
            let count = inventory.get(technology).map_or(0, ReadSet::len);
            info!(technology = %technology, files = count, "Collected reads");
        }
        Ok(inventory)
    }

    /// Resolves a short-paired set into exactly one strand-1 and one strand-2 path,
    /// concatenating into `tmp/reads/` when more than two files are present.
    ///
    /// # Errors
    ///
    /// `AggregationError` if concatenation fails, `InputError` if a strand is empty.
    pub fn resolve_pair(&self, set: &ReadSet) -> Result<ReadPair, QuasanError> {
        let r1s = set.strand_paths(Strand::One);
        let r2s = set.strand_paths(Strand::Two);
        let illumina_dir = self.layout.rawdata_dir().join(Platform::Illumina.dir_name());
        let (Some(first_r1), Some(first_r2)) = (r1s.first(), r2s.first()) else {
            return Err(InputError::new(illumina_dir, "paired reads need both R1 and R2 files").into());
        };

        if set.len() <= 2 {
            return Ok(ReadPair {
                r1: first_r1.to_path_buf(),
                r2: first_r2.to_path_buf(),
            });
        }

        let scratch = self.layout.reads_scratch_dir();
        info!(
            r1_files = r1s.len(),
            r2_files = r2s.len(),
            "Concatenating short reads into {}",
            scratch.display()
        );
        Ok(ReadPair {
            r1: self.concatenate_strand(&scratch, Strand::One, &r1s)?,
            r2: self.concatenate_strand(&scratch, Strand::Two, &r2s)?,
        })
    }

    fn concatenate_strand(
        &self,
        scratch: &Path,
        strand: Strand,
        files: &[&Path],
    ) -> Result<PathBuf, AggregationError> {
        if let [single] = files {
            return Ok(single.to_path_buf());
        }
        let gzipped: Vec<bool> = files
            .iter()
            .map(|p| file_name(p).is_some_and(|n| n.ends_with(".gz")))
            .collect();
        let extension = if gzipped.iter().all(|g| *g) {
            "fastq.gz"
        } else if gzipped.iter().all(|g| !*g) {
            "fastq"
        } else {
            return Err(AggregationError::new(
                scratch.join(format!("reads_{strand}")),
                "cannot concatenate gzipped and plain fastq files",
            ));
        };
        let target = scratch.join(format!("reads_{strand}.{extension}"));
        self.artifacts.concatenate(files, &target)?;
        Ok(target)
    }

    async fn scan_platform(&self, platform: Platform, dir: &Path) -> Result<Vec<ReadFile>, QuasanError> {
        let entries: Vec<(String, PathBuf)> = sorted_entries(dir)?
            .into_iter()
            .filter(|(_, p)| p.is_file())
            .collect();
        let converted: HashSet<PathBuf> = entries
            .iter()
            .filter(|(name, _)| classify_extension(name) == FileKind::Bam)
            .flat_map(|(_, p)| conversion_targets(platform, p))
            .map(|target| target.path)
            .collect();

        let mut files = Vec::new();
        for (name, path) in entries {
            match classify_extension(&name) {
                FileKind::Fastq { .. } => {
                    if converted.contains(&path) {
                        continue;
                    }
                    info!("Found fastq file: {}", name);
                    files.push(read_file(platform, path));
                }
                FileKind::Bam => files.extend(self.convert_bam(platform, &path).await?),
                FileKind::Other => {
                    info!("The file {} is not a fastq file, skipping it", name);
                }
            }
        }
        Ok(files)
    }

    async fn convert_bam(&self, platform: Platform, bam: &Path) -> Result<Vec<ReadFile>, QuasanError> {
        let targets = conversion_targets(platform, bam);
        if targets.iter().all(|t| is_non_empty_file(&t.path)) {
            info!("{} already converted, skipping conversion", bam.display());
            return Ok(targets);
        }

        let scratch = self.layout.scratch_dir(CONVERSION_STAGE);
        self.artifacts.remove_scratch(CONVERSION_STAGE, &scratch)?;
        fs::create_dir_all(&scratch)?;

        let moves: Vec<ArtifactMove> = targets
            .iter()
            .filter_map(|t| file_name(&t.path).map(|n| ArtifactMove::new(scratch.join(n), t.path.clone())))
            .collect();

        let mut command = CommandLine::new(&self.samtools)
            .arg("fastq")
            .arg("-@")
            .arg(self.threads.to_string());
        command = match moves.as_slice() {
            [r1, r2] => command
                .arg("-1")
                .path_arg(&r1.scratch)
                .arg("-2")
                .path_arg(&r2.scratch)
                .args(["-0", "/dev/null", "-s", "/dev/null", "-n"]),
            [single] => command.arg("-0").path_arg(&single.scratch),
            _ => return Err(InputError::new(bam, "cannot derive conversion targets").into()),
        };
        let invocation = Invocation::new(
            CONVERSION_STAGE,
            command.path_arg(bam),
            moves.iter().map(|m| m.scratch.clone()).collect(),
        );

        info!("Converting {} to fastq", bam.display());
        self.invoker.invoke(&invocation).await?;
        verify_contract(&invocation)?;
        self.artifacts.finalize(CONVERSION_STAGE, &moves, &scratch)?;
        Ok(targets)
    }
}

fn read_file(platform: Platform, path: PathBuf) -> ReadFile {
    let strand = match platform {
        Platform::Illumina => file_name(&path).and_then(classify_strand),
        Platform::PacBio | Platform::Nanopore => None,
    };
    ReadFile { path, platform, strand }
}

/// Splits Illumina files by strand and checks the pairing invariant.
fn build_short_set(files: Vec<ReadFile>) -> Option<ReadSet> {
    let (paired, ambiguous): (Vec<_>, Vec<_>) = files.into_iter().partition(|f| f.strand.is_some());
    for file in &ambiguous {
        warn!(
            "Cannot tell the strand of {} (expected _R1_/_R2_ or R1/R2.fastq); excluding it from assembly input",
            file.path.display()
        );
    }

    let set = ReadSet::new(Technology::ShortPaired, paired);
    let r1 = set.strand_paths(Strand::One).len();
    let r2 = set.strand_paths(Strand::Two).len();
    if r1 == 0 || r2 == 0 {
        if !set.is_empty() {
            warn!(r1, r2, "Illumina reads are not paired; ignoring the short-read set");
        }
        return None;
    }
    if r1 != r2 {
        warn!(r1, r2, "Unequal number of R1 and R2 files");
    }
    Some(set)
}

/// Files a BAM is converted to, next to the BAM. Illumina targets carry the
/// strand they are written for, whatever the BAM stem looks like.
fn conversion_targets(platform: Platform, bam: &Path) -> Vec<ReadFile> {
    let Some(stem) = file_name(bam).and_then(|n| n.strip_suffix(".bam")) else {
        return Vec::new();
    };
    let dir = bam.parent().unwrap_or_else(|| Path::new("."));
    let target = |name: String, strand: Option<Strand>| ReadFile {
        path: dir.join(name),
        platform,
        strand,
    };
    match platform {
        Platform::Illumina => vec![
            target(format!("{stem}_R1.fastq.gz"), Some(Strand::One)),
            target(format!("{stem}_R2.fastq.gz"), Some(Strand::Two)),
        ],
        Platform::PacBio | Platform::Nanopore => vec![target(format!("{stem}.fastq.gz"), None)],
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<(String, PathBuf)>, QuasanError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        entries.push((name, entry.path()));
    }
    entries.sort();
    Ok(entries)
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

fn is_non_empty_file(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockInvoker;
    use std::fs;
    use tempfile::TempDir;

    fn sample(tmp: &TempDir) -> PathBuf {
        let root = tmp.path().join("STRAIN01");
        fs::create_dir_all(root.join("rawdata")).unwrap();
        root
    }

    fn touch(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn collector(root: &Path, invoker: Arc<MockInvoker>) -> ReadCollector {
        let config = PipelineConfig::new(root).with_threads(2);
        ReadCollector::new(&config, SampleLayout::new(root).unwrap(), invoker)
    }

    #[tokio::test]
    async fn test_missing_sample_dir_is_input_error() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("nope");
        let err = collector(&root, Arc::new(MockInvoker::new())).collect().await.unwrap_err();
        assert_eq!(err.kind(), "InputError");
    }

    #[tokio::test]
    async fn test_missing_rawdata_is_input_error() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("S");
        fs::create_dir_all(&root).unwrap();
        let err = collector(&root, Arc::new(MockInvoker::new())).collect().await.unwrap_err();
        assert!(err.to_string().contains("rawdata"));
    }

    #[tokio::test]
    async fn test_collects_pair_and_skips_other_files() {
        let tmp = TempDir::new().unwrap();
        let root = sample(&tmp);
        let illumina = root.join("rawdata/illumina");
        touch(&illumina.join("S_R2.fastq.gz"), "r2");
        touch(&illumina.join("S_R1.fastq.gz"), "r1");
        touch(&illumina.join("S_1.fastq.gz"), "ambiguous");
        touch(&illumina.join("README.txt"), "notes");
        fs::create_dir_all(root.join("rawdata/iontorrent")).unwrap();

        let inventory = collector(&root, Arc::new(MockInvoker::new())).collect().await.unwrap();
        let set = inventory.get(Technology::ShortPaired).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.strand_paths(Strand::One), vec![illumina.join("S_R1.fastq.gz").as_path()]);
        assert_eq!(set.strand_paths(Strand::Two), vec![illumina.join("S_R2.fastq.gz").as_path()]);
        assert!(!inventory.has(Technology::LongRead));
    }

    #[tokio::test]
    async fn test_unpaired_illumina_is_dropped() {
        let tmp = TempDir::new().unwrap();
        let root = sample(&tmp);
        touch(&root.join("rawdata/illumina/S_R1.fastq"), "r1");

        let inventory = collector(&root, Arc::new(MockInvoker::new())).collect().await.unwrap();
        assert!(inventory.is_empty());
    }

    #[tokio::test]
    async fn test_nanopore_preferred_over_pacbio() {
        let tmp = TempDir::new().unwrap();
        let root = sample(&tmp);
        touch(&root.join("rawdata/pacbio/p.fastq.gz"), "p");
        touch(&root.join("rawdata/nanopore/n.fastq.gz"), "n");

        let inventory = collector(&root, Arc::new(MockInvoker::new())).collect().await.unwrap();
        let set = inventory.get(Technology::LongRead).unwrap();
        assert_eq!(set.platform(), Some(Platform::Nanopore));
        assert_eq!(set.len(), 1);
    }

    #[tokio::test]
    async fn test_bam_conversion_supersedes_bam() {
        let tmp = TempDir::new().unwrap();
        let root = sample(&tmp);
        let pacbio = root.join("rawdata/pacbio");
        touch(&pacbio.join("movie.subreads.bam"), "bam");

        let invoker = Arc::new(MockInvoker::new());
        let inventory = collector(&root, invoker.clone()).collect().await.unwrap();

        let set = inventory.get(Technology::LongRead).unwrap();
        assert_eq!(set.paths().collect::<Vec<_>>(), vec![pacbio.join("movie.subreads.fastq.gz").as_path()]);
        assert!(is_non_empty_file(&pacbio.join("movie.subreads.fastq.gz")));
        assert!(!root.join("tmp").join(CONVERSION_STAGE).exists());

        let calls = invoker.invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].command.program, "samtools");
        assert_eq!(&calls[0].command.args[..4], &["fastq", "-@", "2", "-0"]);
    }

    #[tokio::test]
    async fn test_bam_conversion_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let root = sample(&tmp);
        let illumina = root.join("rawdata/illumina");
        touch(&illumina.join("run.bam"), "bam");
        touch(&illumina.join("run_R1.fastq.gz"), "r1");
        touch(&illumina.join("run_R2.fastq.gz"), "r2");

        let invoker = Arc::new(MockInvoker::new());
        let inventory = collector(&root, invoker.clone()).collect().await.unwrap();

        assert_eq!(invoker.call_count(), 0);
        assert_eq!(inventory.get(Technology::ShortPaired).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_illumina_bam_targets_keep_their_strand() {
        let tmp = TempDir::new().unwrap();
        let root = sample(&tmp);
        let illumina = root.join("rawdata/illumina");
        touch(&illumina.join("S_R2_001.bam"), "bam");

        let inventory = collector(&root, Arc::new(MockInvoker::new())).collect().await.unwrap();
        let set = inventory.get(Technology::ShortPaired).unwrap();

        assert_eq!(
            set.strand_paths(Strand::One),
            vec![illumina.join("S_R2_001_R1.fastq.gz").as_path()]
        );
        assert_eq!(
            set.strand_paths(Strand::Two),
            vec![illumina.join("S_R2_001_R2.fastq.gz").as_path()]
        );
    }

    #[tokio::test]
    async fn test_failed_conversion_propagates() {
        let tmp = TempDir::new().unwrap();
        let root = sample(&tmp);
        touch(&root.join("rawdata/nanopore/n.bam"), "bam");

        let invoker = Arc::new(MockInvoker::new().failing_on(CONVERSION_STAGE, 1));
        let err = collector(&root, invoker).collect().await.unwrap_err();
        assert_eq!(err.kind(), "ToolExecutionError");
    }

    #[test]
    fn test_resolve_pair_without_concatenation() {
        let tmp = TempDir::new().unwrap();
        let root = sample(&tmp);
        let set = ReadSet::new(
            Technology::ShortPaired,
            vec![
                read_file(Platform::Illumina, root.join("a_R1.fastq")),
                read_file(Platform::Illumina, root.join("a_R2.fastq")),
            ],
        );
        let pair = collector(&root, Arc::new(MockInvoker::new())).resolve_pair(&set).unwrap();
        assert_eq!(pair.r1, root.join("a_R1.fastq"));
        assert_eq!(pair.r2, root.join("a_R2.fastq"));
    }

    #[test]
    fn test_resolve_pair_concatenates_in_listing_order() {
        let tmp = TempDir::new().unwrap();
        let root = sample(&tmp);
        let dir = root.join("rawdata/illumina");
        let mut files = Vec::new();
        for (lane, strand) in [("L001", 1), ("L001", 2), ("L002", 1), ("L002", 2), ("L003", 1), ("L003", 2)] {
            let path = dir.join(format!("S_{lane}_R{strand}_001.fastq"));
            touch(&path, &format!("@{lane}/{strand}\n"));
            files.push(read_file(Platform::Illumina, path));
        }
        let set = ReadSet::new(Technology::ShortPaired, files);

        let pair = collector(&root, Arc::new(MockInvoker::new())).resolve_pair(&set).unwrap();

        assert_eq!(pair.r1, root.join("tmp/reads/reads_R1.fastq"));
        assert_eq!(fs::read_to_string(&pair.r1).unwrap(), "@L001/1\n@L002/1\n@L003/1\n");
        assert_eq!(fs::read_to_string(&pair.r2).unwrap(), "@L001/2\n@L002/2\n@L003/2\n");
    }

    #[test]
    fn test_resolve_pair_rejects_mixed_compression() {
        let tmp = TempDir::new().unwrap();
        let root = sample(&tmp);
        let dir = root.join("rawdata/illumina");
        let names = ["a_R1.fastq", "b_R1.fastq.gz", "a_R2.fastq"];
        let files = names
            .iter()
            .map(|n| {
                touch(&dir.join(n), "x");
                read_file(Platform::Illumina, dir.join(n))
            })
            .collect();
        let set = ReadSet::new(Technology::ShortPaired, files);

        let err = collector(&root, Arc::new(MockInvoker::new())).resolve_pair(&set).unwrap_err();
        assert_eq!(err.kind(), "AggregationError");
    }
}
