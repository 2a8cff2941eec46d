//! `posesweep` command-line entry point.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use posesweep::base::Base;
use posesweep::config::SweepConfig;
use posesweep::grid::{parse_grid, smoke_test_grid};
use posesweep::recognizer::{CommandRecognizer, RecognizerConfig};
use posesweep::runner::{CancellationToken, ExperimentRunner};
use posesweep::sink::{CsvResultSink, ResultSink};

#[derive(Parser, Debug)]
#[command(author, version, about = "Sweep pose noise over a training base and record recognition counts")]
struct Args {
    /// JSON config file; flags override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Result dataset (CSV, appended to if it exists)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Read-only original training base
    #[arg(long)]
    original_base: Option<PathBuf>,

    /// Noisy working copy of the training base
    #[arg(long)]
    noisy_base: Option<PathBuf>,

    /// Test set passed to the recognizer
    #[arg(long)]
    test_set: Option<PathBuf>,

    /// Total wall-clock budget in seconds
    #[arg(long)]
    budget_secs: Option<u64>,

    /// Expected duration of one recognition run in seconds
    #[arg(long)]
    per_point_cost_secs: Option<u64>,

    /// Master noise seed
    #[arg(long)]
    seed: Option<u64>,

    /// Explicit grid in the form t:r,t:r,...
    #[arg(long, conflicts_with = "smoke_test")]
    grid: Option<String>,

    /// Use the grid (0,0),(1,1),(2,2)
    #[arg(long, default_value_t = false)]
    smoke_test: bool,

    /// Sweep manifest path (JSON)
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Recognizer executable
    #[arg(long)]
    recognizer: Option<PathBuf>,

    /// Recognizer argument, repeatable; {base} and {test_set} are substituted
    #[arg(long = "recognizer-arg", allow_hyphen_values = true)]
    recognizer_args: Vec<String>,

    /// Recognizer timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Print the grid and exit
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Debug logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<SweepConfig> {
        let mut config = match &self.config {
            Some(path) => SweepConfig::load(path)?,
            None => SweepConfig::default(),
        };

        if let Some(v) = self.output {
            config.output = v;
        }
        if let Some(v) = self.original_base {
            config.original_base = Some(v);
        }
        if let Some(v) = self.noisy_base {
            config.noisy_base = Some(v);
        }
        if let Some(v) = self.test_set {
            config.test_set = Some(v);
        }
        if let Some(v) = self.budget_secs {
            config.budget_secs = v;
        }
        if let Some(v) = self.per_point_cost_secs {
            config.per_point_cost_secs = v;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(v) = self.manifest {
            config.manifest = Some(v);
        }

        if self.smoke_test {
            config.grid = Some(
                smoke_test_grid()
                    .iter()
                    .map(|p| [p.stddev_t(), p.stddev_r()])
                    .collect(),
            );
        } else if let Some(text) = &self.grid {
            config.grid = Some(parse_grid(text)?.into_iter().map(|(t, r)| [t, r]).collect());
        }

        if let Some(program) = self.recognizer {
            let mut recognizer = config
                .recognizer
                .take()
                .unwrap_or_else(|| RecognizerConfig::new(&program));
            recognizer.program = program;
            config.recognizer = Some(recognizer);
        }
        if let Some(recognizer) = config.recognizer.as_mut() {
            if !self.recognizer_args.is_empty() {
                recognizer.args = self.recognizer_args;
            }
            if let Some(v) = self.timeout_secs {
                recognizer.timeout_secs = v;
            }
        }
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("posesweep=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("posesweep=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let dry_run = args.dry_run;
    init_tracing(args.verbose);

    let config = args.into_config()?;
    let grid = config.grid()?;

    if dry_run {
        println!("index,stddev_t,stddev_r");
        for (i, p) in grid.iter().enumerate() {
            println!("{i},{},{}", p.stddev_t(), p.stddev_r());
        }
        return Ok(());
    }

    config.validate()?;
    let (Some(original), Some(noisy), Some(test_set), Some(recognizer)) = (
        config.original_base.as_ref(),
        config.noisy_base.as_ref(),
        config.test_set.as_ref(),
        config.recognizer.clone(),
    ) else {
        bail!("incomplete configuration");
    };

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        handler_token.cancel();
    })
    .context("cannot install Ctrl-C handler")?;

    let sink = CsvResultSink::open(&config.output)
        .with_context(|| format!("cannot open dataset {}", config.output.display()))?;
    let existing = sink.rows().len();
    if existing > 0 {
        info!(rows = existing, output = %config.output.display(), "appending to existing dataset");
    }

    let mut runner = ExperimentRunner::new(
        Base::open(original)?,
        Base::open(noisy)?,
        test_set,
        CommandRecognizer::new(recognizer)?,
        sink,
    )?
    .with_cancellation(token);
    if let Some(seed) = config.seed {
        runner = runner.with_seed(seed);
    }
    if let Some(path) = &config.manifest {
        runner = runner
            .with_manifest(path)
            .with_manifest_config(serde_json::to_value(&config)?);
    }

    let report = runner.run(&grid)?;
    for skipped in &report.skipped {
        warn!(
            index = skipped.index,
            stddev_t = skipped.point.stddev_t(),
            stddev_r = skipped.point.stddev_r(),
            kind = %skipped.kind,
            "no row for point"
        );
    }
    let unattempted = report.reconcile(&grid);
    info!(
        rows = report.completed.len(),
        skipped = report.skipped.len(),
        unattempted = unattempted.len(),
        master_seed = runner.master_seed(),
        output = %config.output.display(),
        "done"
    );
    Ok(())
}
