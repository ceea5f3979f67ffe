//! Sample directory fixtures.

use crate::reads::Platform;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Builds a sample directory tree on disk.
#[derive(Debug, Clone)]
pub struct SampleFixture {
    root: PathBuf,
}

impl SampleFixture {
    /// Creates `<parent>/<sample_id>/rawdata/`.
    pub fn create(parent: &Path, sample_id: &str) -> io::Result<Self> {
        let root = parent.join(sample_id);
        fs::create_dir_all(root.join(crate::layout::RAWDATA_DIR))?;
        Ok(Self { root })
    }

    /// The sample directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes a read file under `rawdata/<platform>/`.
    pub fn add_reads(&self, platform: Platform, file_name: &str, content: &str) -> io::Result<PathBuf> {
        self.write(
            &Path::new(crate::layout::RAWDATA_DIR)
                .join(platform.dir_name())
                .join(file_name),
            content,
        )
    }

    /// Writes `<stem>_R1.fastq.gz` and `<stem>_R2.fastq.gz` under `rawdata/illumina/`.
    pub fn add_illumina_pair(&self, stem: &str) -> io::Result<(PathBuf, PathBuf)> {
        Ok((
            self.add_reads(Platform::Illumina, &format!("{stem}_R1.fastq.gz"), "@r1\nACGT\n+\nIIII\n")?,
            self.add_reads(Platform::Illumina, &format!("{stem}_R2.fastq.gz"), "@r2\nTGCA\n+\nIIII\n")?,
        ))
    }

    /// Writes any file relative to the sample directory.
    pub fn write(&self, relative: &Path, content: &str) -> io::Result<PathBuf> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(path)
    }
}
