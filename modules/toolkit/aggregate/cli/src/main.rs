use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use eyre::{Result, WrapErr};

use riboprof_aggregate_rs::{Aggregator, Config, ConfigBuilder, ProfileStore, Validator};
use riboprof_io_rs::bam::{AlignmentSource, Loaded, ReaderBuilder};

#[derive(Parser)]
#[command(name = "riboprof", version, about = "Per-gene ribosome profile aggregation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Count read lengths x start positions for every annotated gene
    Aggregate(AggregateArgs),
    /// Recompute a finished container from its inputs and report every difference
    Validate(ValidateArgs),
}

#[derive(Args)]
struct AggregateArgs {
    /// GFF3 gene models, optionally gzip-compressed
    #[arg(short, long)]
    annotation: PathBuf,

    /// Indexed BAM file (.bai next to it) or a SAM file
    #[arg(short = 'b', long)]
    alignments: PathBuf,

    /// Output container
    #[arg(short, long)]
    output: PathBuf,

    /// JSON file with run parameters. Command line options take precedence.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sample name used inside the container
    #[arg(short, long)]
    dataset: Option<String>,

    /// Worker threads; negative values count back from all available cores
    #[arg(short, long, allow_negative_numbers = true)]
    threads: Option<isize>,

    #[arg(long)]
    min_read_length: Option<usize>,

    #[arg(long)]
    max_read_length: Option<usize>,

    /// Only the coding body is annotated; synthesize flanks of --buffer positions
    #[arg(long)]
    single_feature: bool,

    #[arg(long)]
    buffer: Option<usize>,

    /// The annotated body includes the stop codon (single-feature mode)
    #[arg(long)]
    stop_codon_in_feature: bool,

    /// Attribute holding an alias of each gene
    #[arg(long)]
    secondary_id_field: Option<String>,

    /// Deflate level of the stored arrays, 0 disables compression
    #[arg(long)]
    compression_level: Option<u32>,
}

#[derive(Args)]
struct ValidateArgs {
    /// Container produced by `riboprof aggregate`
    container: PathBuf,

    #[arg(short, long)]
    annotation: PathBuf,

    #[arg(short = 'b', long)]
    alignments: PathBuf,
}

impl AggregateArgs {
    fn config(&self) -> Result<Config> {
        let mut builder = match &self.config {
            Some(path) => ConfigBuilder::from(Config::from_json_path(path)?),
            None => ConfigBuilder::new(
                self.output
                    .file_stem()
                    .map(|x| x.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            ),
        };

        if let Some(dataset) = &self.dataset {
            builder = builder.with_dataset(dataset.clone());
        }
        if let Some(threads) = self.threads {
            builder = builder.with_threads(threads);
        }
        if self.min_read_length.is_some() || self.max_read_length.is_some() {
            let defaults = Config::default();
            builder = builder.with_read_lengths(
                self.min_read_length.unwrap_or(*defaults.min_read_length()),
                self.max_read_length.unwrap_or(*defaults.max_read_length()),
            );
        }
        if self.single_feature {
            builder = builder.with_three_feature_mode(false);
        }
        if self.stop_codon_in_feature {
            builder = builder.with_stop_codon_in_feature(true);
        }
        if let Some(buffer) = self.buffer {
            builder = builder.with_buffer(buffer);
        }
        if let Some(field) = &self.secondary_id_field {
            builder = builder.with_secondary_id_field(Some(field.clone()));
        }
        if let Some(level) = self.compression_level {
            builder = builder.with_compression_level(level);
        }
        Ok(builder.build()?)
    }

    fn run(self) -> Result<()> {
        let config = self.config()?;
        let source = open_alignments(&self.alignments)?;

        let summary = Aggregator::new(config)?.run(&self.annotation, source.as_ref(), &self.output)?;
        println!("{}\t{summary}", self.output.display());
        Ok(())
    }
}

impl ValidateArgs {
    fn run(self) -> Result<()> {
        let store = ProfileStore::open(&self.container)?;
        let mut source = open_alignments(&self.alignments)?;

        let report = Validator::for_store(&store)?.validate_path(&store, &self.annotation, source.as_mut())?;
        for mismatch in report.mismatches() {
            log::error!(
                "{} on {}: {} expected {}, found {}",
                mismatch.gene,
                mismatch.sequence,
                mismatch.field,
                mismatch.expected,
                mismatch.found
            );
        }
        for (gene, dropped) in report.out_of_range() {
            log::debug!("{gene}: {dropped} reads outside the read-length range");
        }

        let report = report.ensure()?;
        println!(
            "{}\tconsistent: {} genes, {} aliases, {} reads",
            self.container.display(),
            report.genes_checked(),
            report.aliases_checked(),
            report.reads_counted()
        );
        Ok(())
    }
}

fn open_alignments(path: &Path) -> Result<Box<dyn AlignmentSource>> {
    let source: Box<dyn AlignmentSource> = if path.extension().is_some_and(|x| x == "sam") {
        Box::new(Loaded::from_sam_path(path)?)
    } else {
        Box::new(ReaderBuilder::new(path).build()?)
    };
    Ok(source)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Aggregate(args) => args.run(),
        Command::Validate(args) => args.run(),
    }
    .wrap_err("riboprof failed")
}
