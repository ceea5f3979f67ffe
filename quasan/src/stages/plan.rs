//! Per-strategy stage sequence.
//!
//! | Stage       | Tool                    | Canonical outputs                              |
//! |-------------|-------------------------|------------------------------------------------|
//! | qc          | fastqc                  | `qc/<read>_fastqc.{html,zip}`                  |
//! | assembly    | shovill / flye          | `assembly/<tag>_<tool>.{fa,gfa}`               |
//! | polishing   | pypolca (hybrid)        | `assembly/<tag>_pypolca.fa`                    |
//! | busco       | busco                   | `assembly/qc/<tag>_busco.txt`                  |
//! | quast       | quast                   | `assembly/qc/<tag>_quast.tsv`                  |
//! | annotation  | prokka / pgap.py        | `annotation/<tool>/<tag>_<tool>_<suffix>`      |
//! | discovery   | antismash               | `antismash/`                                   |
//! | aggregation | multiqc                 | `multiqc/<tag>_multiqc_report.html`            |

use super::{Arg, CommandTemplate, Precondition, ReportSpec, Stage, StageKind};
use crate::artifacts::ArtifactMove;
use crate::config::{Annotator, PipelineConfig};
use crate::errors::ConfigError;
use crate::layout::SampleLayout;
use crate::reads::{Platform, ReadInventory, Technology};
use crate::strategy::{Strategy, Tag};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Prokka output extensions and their canonical suffixes.
const PROKKA_OUTPUTS: [(&str, &str); 6] = [
    ("gbk", "annotation.gbk"),
    ("gff", "annotation.gff"),
    ("faa", "proteins.faa"),
    ("ffn", "genes.ffn"),
    ("tsv", "features.tsv"),
    ("txt", "summary.txt"),
];

/// PGAP output files and their canonical suffixes.
const PGAP_OUTPUTS: [(&str, &str); 4] = [
    ("annot.gbk", "annotation.gbk"),
    ("annot.gff", "annotation.gff"),
    ("annot.faa", "proteins.faa"),
    ("annot.sqn", "submission.sqn"),
];

/// The ordered stages of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    stages: Vec<Stage>,
}

impl StagePlan {
    /// Builds the plan for the requested stages.
    ///
    /// Unrequested stages are left out entirely. Polishing and assembly QC
    /// follow the assembly request.
    ///
    /// # Errors
    ///
    /// `ConfigError` if the PGAP submission files cannot be generated.
    pub fn build(
        config: &PipelineConfig,
        layout: &SampleLayout,
        tag: &Tag,
        inventory: &ReadInventory,
    ) -> Result<Self, ConfigError> {
        let planner = Planner {
            config,
            layout,
            tag: tag.to_string(),
            strategy: tag.strategy(),
            inventory,
        };
        let final_assembly = planner.final_assembly();
        let annotation_gbk = layout.annotation_file(config.annotator, &planner.tag, "annotation.gbk");

        let mut stages = Vec::new();
        if config.stages.qc {
            stages.push(planner.qc());
        }
        if config.stages.assembly {
            stages.push(planner.assembly());
            if planner.strategy == Strategy::Hybrid {
                stages.push(planner.polishing());
            }
            stages.push(planner.busco(&final_assembly));
            stages.push(planner.quast(&final_assembly));
        }
        if config.stages.annotation {
            stages.push(match config.annotator {
                Annotator::Prokka => planner.prokka(&final_assembly),
                Annotator::Pgap => planner.pgap(&final_assembly)?,
            });
        }
        if config.stages.discovery {
            stages.push(planner.antismash(&annotation_gbk));
        }
        if config.stages.aggregation {
            stages.push(planner.multiqc());
        }
        Ok(Self { stages })
    }

    /// Stages in run order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Stage names in run order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(Stage::name).collect()
    }

    /// Index of the last stage that reads the short-read pair.
    #[must_use]
    pub fn last_pair_consumer(&self) -> Option<usize> {
        self.stages.iter().rposition(|s| s.command().needs_pair())
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if no stage is planned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

struct Planner<'a> {
    config: &'a PipelineConfig,
    layout: &'a SampleLayout,
    tag: String,
    strategy: Strategy,
    inventory: &'a ReadInventory,
}

impl Planner<'_> {
    fn threads(&self) -> String {
        self.config.threads.to_string()
    }

    fn scratch(&self, kind: StageKind) -> PathBuf {
        self.layout.scratch_dir(kind.name())
    }

    fn assembler(&self) -> &'static str {
        match self.strategy {
            Strategy::IlluminaOnly => "shovill",
            Strategy::LongReadOnly | Strategy::Hybrid => "flye",
        }
    }

    /// The assembly every downstream stage consumes.
    fn final_assembly(&self) -> PathBuf {
        let tool = match self.strategy {
            Strategy::Hybrid => "pypolca",
            Strategy::IlluminaOnly | Strategy::LongReadOnly => self.assembler(),
        };
        self.layout.assembly_file(&self.tag, tool, "fa")
    }

    fn qc(&self) -> Stage {
        let scratch = self.scratch(StageKind::Qc);
        let command = CommandTemplate::new(self.config.program("fastqc"))
            .flag("-t", self.threads())
            .arg("-o")
            .path_arg(&scratch)
            .push(Arg::AllReads);

        let mut stage = Stage::new(StageKind::Qc, &scratch, command).requires(Precondition::AnyReads);
        for read in self.inventory.all_paths() {
            let Some(stem) = read.file_name().and_then(|n| n.to_str()).map(fastqc_stem) else {
                continue;
            };
            for ext in ["html", "zip"] {
                let name = format!("{stem}_fastqc.{ext}");
                stage = stage.output(ArtifactMove::new(scratch.join(&name), self.layout.qc_dir().join(&name)));
            }
            let zip = format!("{stem}_fastqc.zip");
            stage = stage.report(ReportSpec {
                source: self.layout.qc_dir().join(&zip),
                subdir: "fastqc".to_string(),
                file_name: zip,
                substitute: false,
            });
        }
        stage
    }

    fn assembly(&self) -> Stage {
        let scratch = self.scratch(StageKind::Assembly);
        let tool = self.assembler();
        let out = scratch.join(tool);
        let (stage, fasta, graph) = match self.strategy {
            Strategy::IlluminaOnly => {
                let mut command = CommandTemplate::new(self.config.program(tool))
                    .arg("--outdir")
                    .path_arg(&out)
                    .arg("--R1")
                    .push(Arg::ShortR1)
                    .arg("--R2")
                    .push(Arg::ShortR2)
                    .flag("--cpus", self.threads());
                if let Some(size) = &self.config.genome_size {
                    command = command.flag("--gsize", size.as_str());
                }
                if let Some(ram) = self.config.memory_gb {
                    command = command.flag("--ram", ram.to_string());
                }
                let stage = Stage::new(StageKind::Assembly, &scratch, command)
                    .requires(Precondition::ReadsAvailable(Technology::ShortPaired));
                (stage, "contigs.fa", "contigs.gfa")
            }
            Strategy::LongReadOnly | Strategy::Hybrid => {
                let mut command = CommandTemplate::new(self.config.program(tool))
                    .arg(self.long_read_flag())
                    .push(Arg::LongReads)
                    .arg("--out-dir")
                    .path_arg(&out)
                    .flag("--threads", self.threads());
                if let Some(size) = &self.config.genome_size {
                    command = command.flag("--genome-size", size.as_str());
                }
                let stage = Stage::new(StageKind::Assembly, &scratch, command)
                    .requires(Precondition::ReadsAvailable(Technology::LongRead));
                (stage, "assembly.fasta", "assembly_graph.gfa")
            }
        };
        stage
            .output(ArtifactMove::new(out.join(fasta), self.layout.assembly_file(&self.tag, tool, "fa")))
            .output(ArtifactMove::new(out.join(graph), self.layout.assembly_file(&self.tag, tool, "gfa")))
    }

    fn long_read_flag(&self) -> &'static str {
        match self.inventory.get(Technology::LongRead).and_then(|s| s.platform()) {
            Some(Platform::PacBio) => "--pacbio-raw",
            _ => "--nano-raw",
        }
    }

    fn polishing(&self) -> Stage {
        let scratch = self.scratch(StageKind::Polishing);
        let out = scratch.join("pypolca");
        let draft = self.layout.assembly_file(&self.tag, self.assembler(), "fa");
        let command = CommandTemplate::new(self.config.program("pypolca"))
            .arg("run")
            .arg("-a")
            .path_arg(&draft)
            .arg("-1")
            .push(Arg::ShortR1)
            .arg("-2")
            .push(Arg::ShortR2)
            .flag("-t", self.threads())
            .arg("-o")
            .path_arg(&out);
        Stage::new(StageKind::Polishing, &scratch, command)
            .requires(Precondition::ArtifactPresent(draft))
            .requires(Precondition::ReadsAvailable(Technology::ShortPaired))
            .output(ArtifactMove::new(
                out.join("pypolca_corrected.fasta"),
                self.layout.assembly_file(&self.tag, "pypolca", "fa"),
            ))
    }

    fn busco(&self, assembly: &Path) -> Stage {
        let scratch = self.scratch(StageKind::Busco);
        let lineage = &self.config.busco_lineage;
        let command = CommandTemplate::new(self.config.program("busco"))
            .arg("-i")
            .path_arg(assembly)
            .flag("-l", lineage.as_str())
            .flag("-m", "genome")
            .flag("-o", "busco")
            .arg("--out_path")
            .path_arg(&scratch)
            .flag("-c", self.threads());
        let canonical = self.layout.assembly_qc_dir().join(format!("{}_busco.txt", self.tag));
        Stage::new(StageKind::Busco, &scratch, command)
            .requires(Precondition::ArtifactPresent(assembly.to_path_buf()))
            .output(ArtifactMove::new(
                scratch.join("busco").join(format!("short_summary.specific.{lineage}.busco.txt")),
                &canonical,
            ))
            .report(ReportSpec {
                source: canonical,
                subdir: "busco".to_string(),
                file_name: format!("short_summary.specific.{lineage}.{}.txt", self.tag),
                substitute: false,
            })
    }

    fn quast(&self, assembly: &Path) -> Stage {
        let scratch = self.scratch(StageKind::Quast);
        let out = scratch.join("quast");
        let command = CommandTemplate::new(self.config.program("quast"))
            .arg("-o")
            .path_arg(&out)
            .flag("-t", self.threads())
            .flag("-l", self.tag.as_str())
            .path_arg(assembly);
        let canonical = self.layout.assembly_qc_dir().join(format!("{}_quast.tsv", self.tag));
        Stage::new(StageKind::Quast, &scratch, command)
            .requires(Precondition::ArtifactPresent(assembly.to_path_buf()))
            .output(ArtifactMove::new(out.join("report.tsv"), &canonical))
            .report(ReportSpec {
                source: canonical,
                subdir: "quast".to_string(),
                file_name: "report.tsv".to_string(),
                substitute: false,
            })
    }

    fn prokka(&self, assembly: &Path) -> Stage {
        let scratch = self.scratch(StageKind::Annotation);
        let out = scratch.join("prokka");
        let prefix = format!("{}_prokka", self.tag);
        let mut command = CommandTemplate::new(self.config.program("prokka"))
            .arg("--outdir")
            .path_arg(&out)
            .flag("--prefix", prefix.as_str())
            .flag("--cpus", self.threads());
        if let Some(locus_tag) = &self.config.locus_tag {
            command = command.flag("--locustag", locus_tag.as_str());
        }
        if let Some(gram) = self.config.gram {
            command = command.flag("--gram", gram.to_string());
        }
        if let Some((genus, species)) = self.config.organism.as_deref().and_then(|o| o.split_once(' ')) {
            command = command.flag("--genus", genus).flag("--species", species);
        }
        command = command.path_arg(assembly);

        let mut stage = Stage::new(StageKind::Annotation, &scratch, command)
            .requires(Precondition::ArtifactPresent(assembly.to_path_buf()));
        for (ext, suffix) in PROKKA_OUTPUTS {
            stage = stage.output(ArtifactMove::new(
                out.join(format!("{prefix}.{ext}")),
                self.layout.annotation_file(Annotator::Prokka, &self.tag, suffix),
            ));
        }
        stage.report(ReportSpec {
            source: self.layout.annotation_file(Annotator::Prokka, &self.tag, "summary.txt"),
            subdir: "prokka".to_string(),
            file_name: format!("{prefix}.txt"),
            substitute: true,
        })
    }

    fn pgap(&self, assembly: &Path) -> Result<Stage, ConfigError> {
        let scratch = self.scratch(StageKind::Annotation);
        let out = scratch.join("pgap");
        let input_yaml = scratch.join("input.yaml");
        let submol_yaml = scratch.join("submol.yaml");

        let mut command = CommandTemplate::new(self.config.program("pgap.py"))
            .arg("-r")
            .arg("--no-self-update")
            .arg("-o")
            .path_arg(&out)
            .flag("--cpus", self.threads())
            .path_arg(&input_yaml);
        if let Some(data) = &self.config.pgap_data {
            command = command.env("PGAP_INPUT_DIR", data.display().to_string());
        }

        let mut stage = Stage::new(StageKind::Annotation, &scratch, command)
            .requires(Precondition::ArtifactPresent(assembly.to_path_buf()))
            .input(&input_yaml, to_yaml(&PgapInput::new(assembly, &submol_yaml))?)
            .input(&submol_yaml, to_yaml(&self.submol())?);
        for (file, suffix) in PGAP_OUTPUTS {
            stage = stage.output(ArtifactMove::new(
                out.join(file),
                self.layout.annotation_file(Annotator::Pgap, &self.tag, suffix),
            ));
        }
        Ok(stage)
    }

    fn submol(&self) -> Submol<'_> {
        Submol {
            organism: Organism {
                genus_species: self.config.organism.as_deref().unwrap_or_default(),
            },
            locus_tag_prefix: self.config.locus_tag.as_deref(),
            bioproject: self.config.bioproject.as_deref(),
            biosample: self.config.biosample.as_deref(),
        }
    }

    fn antismash(&self, genbank: &Path) -> Stage {
        let scratch = self.scratch(StageKind::Discovery);
        let out = scratch.join("antismash");
        let mut command = CommandTemplate::new(self.config.program("antismash"))
            .arg("--output-dir")
            .path_arg(&out)
            .flag("--output-basename", self.tag.as_str())
            .flag("--cpus", self.threads())
            .flag("--genefinding-tool", "none");
        if let Some(databases) = &self.config.antismash_databases {
            command = command.arg("--databases").path_arg(databases);
        }
        command = command.path_arg(genbank);

        Stage::new(StageKind::Discovery, &scratch, command)
            .requires(Precondition::ArtifactPresent(genbank.to_path_buf()))
            .output(ArtifactMove::new(out, self.layout.antismash_dir()).with_marker("index.html"))
    }

    fn multiqc(&self) -> Stage {
        let scratch = self.scratch(StageKind::Aggregation);
        let name = format!("{}_multiqc_report", self.tag);
        let report_dir = self.layout.report_dir();
        let command = CommandTemplate::new(self.config.program("multiqc"))
            .path_arg(&report_dir)
            .arg("-o")
            .path_arg(&scratch)
            .flag("-n", name.as_str())
            .arg("-f");

        let data = format!("{name}_data");
        Stage::new(StageKind::Aggregation, &scratch, command)
            .requires(Precondition::ArtifactPresent(report_dir))
            .output(ArtifactMove::new(
                scratch.join(format!("{name}.html")),
                self.layout.multiqc_dir().join(format!("{name}.html")),
            ))
            .output(
                ArtifactMove::new(scratch.join(&data), self.layout.multiqc_dir().join(&data))
                    .with_marker("multiqc_data.json"),
            )
    }
}

/// PGAP `submol.yaml`: organism and submission metadata.
#[derive(Debug, Serialize)]
struct Submol<'a> {
    organism: Organism<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    locus_tag_prefix: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bioproject: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    biosample: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Organism<'a> {
    genus_species: &'a str,
}

/// PGAP `input.yaml`: the CWL job file pointing at the assembly and `submol.yaml`.
#[derive(Debug, Serialize)]
struct PgapInput {
    fasta: CwlFile,
    submol: CwlFile,
}

impl PgapInput {
    fn new(assembly: &Path, submol: &Path) -> Self {
        Self {
            fasta: CwlFile::new(assembly),
            submol: CwlFile::new(submol),
        }
    }
}

#[derive(Debug, Serialize)]
struct CwlFile {
    class: &'static str,
    location: PathBuf,
}

impl CwlFile {
    fn new(path: &Path) -> Self {
        Self {
            class: "File",
            location: path.to_path_buf(),
        }
    }
}

fn to_yaml(value: &impl Serialize) -> Result<String, ConfigError> {
    serde_yaml::to_string(value).map_err(|e| ConfigError::new("annotator", format!("cannot write PGAP input: {e}")))
}

/// FastQC names its reports after the read file without its extensions.
fn fastqc_stem(file_name: &str) -> &str {
    let name = file_name.strip_suffix(".gz").unwrap_or(file_name);
    name.strip_suffix(".fastq")
        .or_else(|| name.strip_suffix(".fq"))
        .unwrap_or(name)
}
