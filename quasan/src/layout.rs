//! Filesystem layout of a sample directory.
//!
//! ```text
//! STRAINXX/
//! ├── rawdata/{illumina,pacbio,nanopore}/
//! ├── qc/
//! ├── assembly/<tag>_<tool>.{fa,gfa}
//! │   └── qc/
//! ├── annotation/{prokka,pgap}/<tag>_<tool>_<suffix>
//! ├── antismash/
//! ├── multiqc/
//! │   └── reports/
//! └── tmp/<stage>/
//! ```

use crate::config::Annotator;
use crate::errors::InputError;
use std::path::{Path, PathBuf};

/// Name of the raw read directory.
pub const RAWDATA_DIR: &str = "rawdata";

/// Resolves every path of the layout for one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleLayout {
    root: PathBuf,
    sample_id: String,
}

impl SampleLayout {
    /// Creates a layout rooted at `root`. The sample id is the final path component.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, InputError> {
        let root = root.into();
        let sample_id = root
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| InputError::new(&root, "cannot derive a sample id from this path"))?
            .to_string();
        Ok(Self { root, sample_id })
    }

    /// The sample directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The sample id (directory name).
    #[must_use]
    pub fn sample_id(&self) -> &str {
        &self.sample_id
    }

    /// `rawdata/`
    #[must_use]
    pub fn rawdata_dir(&self) -> PathBuf {
        self.root.join(RAWDATA_DIR)
    }

    /// `qc/`
    #[must_use]
    pub fn qc_dir(&self) -> PathBuf {
        self.root.join("qc")
    }

    /// `assembly/`
    #[must_use]
    pub fn assembly_dir(&self) -> PathBuf {
        self.root.join("assembly")
    }

    /// `assembly/qc/`
    #[must_use]
    pub fn assembly_qc_dir(&self) -> PathBuf {
        self.assembly_dir().join("qc")
    }

    /// `assembly/<tag>_<tool>.<ext>`
    #[must_use]
    pub fn assembly_file(&self, tag: &str, tool: &str, ext: &str) -> PathBuf {
        self.assembly_dir().join(format!("{tag}_{tool}.{ext}"))
    }

    /// `annotation/`
    #[must_use]
    pub fn annotation_root(&self) -> PathBuf {
        self.root.join("annotation")
    }

    /// `annotation/<annotator>/`
    #[must_use]
    pub fn annotation_dir(&self, annotator: Annotator) -> PathBuf {
        self.annotation_root().join(annotator.tool_name())
    }

    /// `annotation/<annotator>/<tag>_<annotator>_<suffix>`
    #[must_use]
    pub fn annotation_file(&self, annotator: Annotator, tag: &str, suffix: &str) -> PathBuf {
        self.annotation_dir(annotator)
            .join(format!("{tag}_{}_{suffix}", annotator.tool_name()))
    }

    /// `antismash/`
    #[must_use]
    pub fn antismash_dir(&self) -> PathBuf {
        self.root.join("antismash")
    }

    /// `multiqc/`
    #[must_use]
    pub fn multiqc_dir(&self) -> PathBuf {
        self.root.join("multiqc")
    }

    /// `multiqc/reports/`, the canonical report directory aggregated at the end.
    #[must_use]
    pub fn report_dir(&self) -> PathBuf {
        self.multiqc_dir().join("reports")
    }

    /// `tmp/`
    #[must_use]
    pub fn scratch_root(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// `tmp/<stage>/`, the only place a running stage writes.
    #[must_use]
    pub fn scratch_dir(&self, stage: &str) -> PathBuf {
        self.scratch_root().join(stage)
    }

    /// `tmp/reads/`, scratch for concatenated short reads.
    #[must_use]
    pub fn reads_scratch_dir(&self) -> PathBuf {
        self.scratch_dir("reads")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_id_from_dir_name() {
        let layout = SampleLayout::new("/data/STRAIN_XX").unwrap();
        assert_eq!(layout.sample_id(), "STRAIN_XX");
        assert_eq!(layout.rawdata_dir(), PathBuf::from("/data/STRAIN_XX/rawdata"));
    }

    #[test]
    fn test_root_without_name_is_rejected() {
        assert!(SampleLayout::new("/").is_err());
    }

    #[test]
    fn test_canonical_names() {
        let layout = SampleLayout::new("/data/S1").unwrap();
        let tag = "20210426_illumina_S1";

        assert_eq!(
            layout.assembly_file(tag, "shovill", "fa"),
            PathBuf::from("/data/S1/assembly/20210426_illumina_S1_shovill.fa")
        );
        assert_eq!(
            layout.annotation_file(Annotator::Prokka, tag, "annotation.gbk"),
            PathBuf::from("/data/S1/annotation/prokka/20210426_illumina_S1_prokka_annotation.gbk")
        );
        assert_eq!(layout.scratch_dir("assembly"), PathBuf::from("/data/S1/tmp/assembly"));
        assert_eq!(layout.report_dir(), PathBuf::from("/data/S1/multiqc/reports"));
    }
}
