//! Scratch-to-canonical artifact handling.
//!
//! A running stage only writes under its scratch directory. Once the tool has
//! succeeded, [`ArtifactManager::finalize`] renames each declared output to its
//! canonical path and removes the scratch directory. Renames happen in the
//! declared order; the first failure fails the whole finalize and nothing is
//! rolled back, so a partially finalized stage is recorded as failed and the
//! gate re-checks every canonical path on the next run.

use crate::errors::{AggregationError, ArtifactError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One scratch output and its canonical destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMove {
    /// Where the tool writes it.
    pub scratch: PathBuf,
    /// Where it lives once the stage is done.
    pub canonical: PathBuf,
    /// For directory outputs, a file inside the directory whose presence
    /// stands for the whole directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<PathBuf>,
}

impl ArtifactMove {
    /// Creates a move.
    #[must_use]
    pub fn new(scratch: impl Into<PathBuf>, canonical: impl Into<PathBuf>) -> Self {
        Self {
            scratch: scratch.into(),
            canonical: canonical.into(),
            marker: None,
        }
    }

    /// Marks this move as a directory checked through `marker`.
    #[must_use]
    pub fn with_marker(mut self, marker: impl Into<PathBuf>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    /// Path the tool must have produced.
    #[must_use]
    pub fn scratch_check(&self) -> PathBuf {
        self.marker
            .as_ref()
            .map_or_else(|| self.scratch.clone(), |m| self.scratch.join(m))
    }

    /// Path whose presence means the stage is done.
    #[must_use]
    pub fn canonical_check(&self) -> PathBuf {
        self.marker
            .as_ref()
            .map_or_else(|| self.canonical.clone(), |m| self.canonical.join(m))
    }
}

/// Literal token replacement applied while merging a text report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    /// The placeholder, e.g. `strain`.
    pub token: String,
    /// Its replacement, the sample tag.
    pub replacement: String,
}

impl Substitution {
    /// Creates a substitution.
    #[must_use]
    pub fn new(token: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            replacement: replacement.into(),
        }
    }
}

/// SHA-256 of a canonical artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDigest {
    /// Canonical path.
    pub path: PathBuf,
    /// Hex-encoded SHA-256; `None` for directories.
    pub sha256: Option<String>,
}

/// Moves, merges and cleans up stage artifacts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactManager;

impl ArtifactManager {
    /// Creates a manager.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Moves every scratch artifact to its canonical path, then removes `scratch_dir`.
    ///
    /// # Errors
    ///
    /// `ArtifactError` on the first failed rename or on cleanup failure.
    pub fn finalize(
        &self,
        stage: &str,
        moves: &[ArtifactMove],
        scratch_dir: &Path,
    ) -> Result<(), ArtifactError> {
        for artifact in moves {
            if let Some(parent) = artifact.canonical.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| ArtifactError::new(stage, parent, e.to_string()))?;
            }
            // rename() replaces files but not non-empty directories
            if artifact.scratch.is_dir() && artifact.canonical.is_dir() {
                fs::remove_dir_all(&artifact.canonical)
                    .map_err(|e| ArtifactError::new(stage, &artifact.canonical, e.to_string()))?;
            }
            fs::rename(&artifact.scratch, &artifact.canonical).map_err(|e| {
                ArtifactError::new(
                    stage,
                    &artifact.scratch,
                    format!("cannot move to '{}': {e}", artifact.canonical.display()),
                )
            })?;
            debug!(
                stage,
                "Moved {} -> {}",
                artifact.scratch.display(),
                artifact.canonical.display()
            );
        }
        self.remove_scratch(stage, scratch_dir)?;
        info!(stage, artifacts = moves.len(), "Saved canonical artifacts");
        Ok(())
    }

    /// Removes a scratch directory tree. Missing directories are fine.
    ///
    /// # Errors
    ///
    /// `ArtifactError` if the tree exists and cannot be removed.
    pub fn remove_scratch(&self, stage: &str, scratch_dir: &Path) -> Result<(), ArtifactError> {
        match fs::remove_dir_all(scratch_dir) {
            Ok(()) => {
                debug!(stage, "Removed scratch {}", scratch_dir.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ArtifactError::new(stage, scratch_dir, e.to_string())),
        }
    }

    /// Copies a text report into `report_dir`, replacing every occurrence of the
    /// placeholder token line by line. Returns the path written.
    ///
    /// # Errors
    ///
    /// `ArtifactError` if the report cannot be read or written.
    pub fn merge_report(
        &self,
        stage: &str,
        raw_report: &Path,
        report_dir: &Path,
        file_name: &str,
        substitution: Option<&Substitution>,
    ) -> Result<PathBuf, ArtifactError> {
        let target = report_dir.join(file_name);
        let to_err = |path: &Path, e: io::Error| ArtifactError::new(stage, path, e.to_string());

        fs::create_dir_all(report_dir).map_err(|e| to_err(report_dir, e))?;
        match substitution {
            None => {
                fs::copy(raw_report, &target).map_err(|e| to_err(raw_report, e))?;
            }
            Some(sub) => {
                let reader = BufReader::new(File::open(raw_report).map_err(|e| to_err(raw_report, e))?);
                let mut writer =
                    BufWriter::new(File::create(&target).map_err(|e| to_err(&target, e))?);
                for line in reader.lines() {
                    let line = line.map_err(|e| to_err(raw_report, e))?;
                    writeln!(writer, "{}", line.replace(&sub.token, &sub.replacement))
                        .map_err(|e| to_err(&target, e))?;
                }
                writer.flush().map_err(|e| to_err(&target, e))?;
            }
        }
        debug!(stage, "Merged report {} into {}", raw_report.display(), target.display());
        Ok(target)
    }

    /// Concatenates `inputs` byte for byte, in order, into `target`.
    ///
    /// Writes to `<target>.partial` and renames on success so an interrupted
    /// concatenation never leaves a plausible-looking target behind.
    ///
    /// # Errors
    ///
    /// `AggregationError` on any read or write failure.
    pub fn concatenate(&self, inputs: &[&Path], target: &Path) -> Result<(), AggregationError> {
        let to_err = |e: io::Error| AggregationError::new(target, e.to_string());
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(to_err)?;
        }
        let mut partial = target.as_os_str().to_owned();
        partial.push(".partial");
        let partial = PathBuf::from(partial);

        let written = write_concatenation(inputs, &partial, target).and_then(|()| {
            fs::rename(&partial, target).map_err(to_err)
        });
        if written.is_err() && fs::remove_file(&partial).is_ok() {
            debug!("Removed {}", partial.display());
        }
        written
    }

    /// Hashes a canonical artifact. Directories get no digest.
    ///
    /// # Errors
    ///
    /// IO errors reading the file.
    pub fn digest(&self, path: &Path) -> io::Result<ArtifactDigest> {
        if path.is_dir() {
            return Ok(ArtifactDigest {
                path: path.to_path_buf(),
                sha256: None,
            });
        }
        let mut hasher = Sha256::new();
        let mut file = File::open(path)?;
        io::copy(&mut file, &mut hasher)?;
        Ok(ArtifactDigest {
            path: path.to_path_buf(),
            sha256: Some(hex::encode(hasher.finalize())),
        })
    }
}

fn write_concatenation(inputs: &[&Path], partial: &Path, target: &Path) -> Result<(), AggregationError> {
    let to_err = |e: io::Error| AggregationError::new(target, e.to_string());
    let mut writer = BufWriter::new(File::create(partial).map_err(to_err)?);
    for input in inputs {
        let mut reader = File::open(input).map_err(|e| {
            AggregationError::new(target, format!("cannot read '{}': {e}", input.display()))
        })?;
        io::copy(&mut reader, &mut writer).map_err(to_err)?;
    }
    writer.flush().map_err(to_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_finalize_moves_and_cleans_scratch() {
        let tmp = TempDir::new().unwrap();
        let scratch = tmp.path().join("tmp/assembly");
        write(&scratch.join("shovill/contigs.fa"), ">c1\nACGT\n");
        write(&scratch.join("shovill/contigs.gfa"), "H\n");
        write(&scratch.join("shovill/shovill.log"), "log");

        let moves = vec![
            ArtifactMove::new(scratch.join("shovill/contigs.fa"), tmp.path().join("assembly/T_shovill.fa")),
            ArtifactMove::new(scratch.join("shovill/contigs.gfa"), tmp.path().join("assembly/T_shovill.gfa")),
        ];
        ArtifactManager::new().finalize("assembly", &moves, &scratch).unwrap();

        assert_eq!(fs::read_to_string(tmp.path().join("assembly/T_shovill.fa")).unwrap(), ">c1\nACGT\n");
        assert!(tmp.path().join("assembly/T_shovill.gfa").exists());
        assert!(!scratch.exists());
    }

    #[test]
    fn test_finalize_failure_keeps_earlier_moves_and_scratch() {
        let tmp = TempDir::new().unwrap();
        let scratch = tmp.path().join("tmp/assembly");
        write(&scratch.join("out/a.fa"), "a");

        let moves = vec![
            ArtifactMove::new(scratch.join("out/a.fa"), tmp.path().join("assembly/a.fa")),
            ArtifactMove::new(scratch.join("out/missing.gfa"), tmp.path().join("assembly/a.gfa")),
        ];
        let err = ArtifactManager::new().finalize("assembly", &moves, &scratch).unwrap_err();

        assert_eq!(err.stage, "assembly");
        assert_eq!(err.path, scratch.join("out/missing.gfa"));
        assert!(tmp.path().join("assembly/a.fa").exists());
        assert!(scratch.exists());
    }

    #[test]
    fn test_finalize_replaces_existing_directory() {
        let tmp = TempDir::new().unwrap();
        let scratch = tmp.path().join("tmp/discovery");
        write(&scratch.join("antismash/index.html"), "new");
        write(&tmp.path().join("antismash/index.html"), "old");
        write(&tmp.path().join("antismash/stale.js"), "old");

        let moves = vec![ArtifactMove::new(scratch.join("antismash"), tmp.path().join("antismash"))
            .with_marker("index.html")];
        assert_eq!(moves[0].canonical_check(), tmp.path().join("antismash/index.html"));

        ArtifactManager::new().finalize("discovery", &moves, &scratch).unwrap();

        assert_eq!(fs::read_to_string(tmp.path().join("antismash/index.html")).unwrap(), "new");
        assert!(!tmp.path().join("antismash/stale.js").exists());
    }

    #[test]
    fn test_remove_scratch_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let manager = ArtifactManager::new();
        manager.remove_scratch("qc", &tmp.path().join("never-created")).unwrap();
    }

    #[test]
    fn test_merge_report_substitutes_every_occurrence() {
        let tmp = TempDir::new().unwrap();
        let raw = tmp.path().join("annotation/T_prokka_summary.txt");
        write(&raw, "organism: Genus species strain \ncontigs: 12\nstrain strain\n");

        let sub = Substitution::new("strain", "20210426_illumina_S1");
        let merged = ArtifactManager::new()
            .merge_report("annotation", &raw, &tmp.path().join("reports/prokka"), "S1.txt", Some(&sub))
            .unwrap();

        assert_eq!(
            fs::read_to_string(merged).unwrap(),
            "organism: Genus species 20210426_illumina_S1 \ncontigs: 12\n20210426_illumina_S1 20210426_illumina_S1\n"
        );
        assert!(raw.exists());
    }

    #[test]
    fn test_merge_report_plain_copy() {
        let tmp = TempDir::new().unwrap();
        let raw = tmp.path().join("report.tsv");
        write(&raw, "Assembly\tstrain\n");

        let merged = ArtifactManager::new()
            .merge_report("quast", &raw, &tmp.path().join("reports"), "report.tsv", None)
            .unwrap();
        assert_eq!(fs::read_to_string(merged).unwrap(), "Assembly\tstrain\n");
    }

    #[test]
    fn test_concatenate_is_byte_exact() {
        let tmp = TempDir::new().unwrap();
        let inputs: Vec<PathBuf> = (0..3).map(|i| tmp.path().join(format!("in{i}"))).collect();
        let contents: [&[u8]; 3] = [b"\x1f\x8b\x00first", b"second\n", b"\xffthird"];
        for (path, content) in inputs.iter().zip(contents) {
            fs::write(path, content).unwrap();
        }
        let target = tmp.path().join("tmp/reads/reads_R1.fastq.gz");
        let refs: Vec<&Path> = inputs.iter().map(PathBuf::as_path).collect();

        ArtifactManager::new().concatenate(&refs, &target).unwrap();

        assert_eq!(fs::read(&target).unwrap(), contents.concat());
        assert!(!tmp.path().join("tmp/reads/reads_R1.fastq.gz.partial").exists());
    }

    #[test]
    fn test_concatenate_missing_input() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("missing.fastq");
        let err = ArtifactManager::new()
            .concatenate(&[missing.as_path()], &tmp.path().join("out.fastq"))
            .unwrap_err();
        assert!(err.message.contains("missing.fastq"));
    }

    #[test]
    fn test_concatenate_failure_removes_partial_file() {
        let tmp = TempDir::new().unwrap();
        let present = tmp.path().join("L001_R1.fastq");
        fs::write(&present, "@a\n").unwrap();
        let missing = tmp.path().join("L002_R1.fastq");
        let target = tmp.path().join("tmp/reads/reads_R1.fastq");

        ArtifactManager::new()
            .concatenate(&[present.as_path(), missing.as_path()], &target)
            .unwrap_err();

        assert!(!target.exists());
        assert!(!tmp.path().join("tmp/reads/reads_R1.fastq.partial").exists());
    }

    #[test]
    fn test_digest() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.fa");
        fs::write(&path, "abc").unwrap();

        let digest = ArtifactManager::new().digest(&path).unwrap();
        assert_eq!(
            digest.sha256.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
        assert_eq!(ArtifactManager::new().digest(tmp.path()).unwrap().sha256, None);
    }
}
