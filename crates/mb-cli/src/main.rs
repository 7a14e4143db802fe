//! mvabatch CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use mb_batch::{
    BatchOptions, BatchSummary, CommandRunner, CommandTemplate, DryRunRunner, ListingSource,
    ProcessRunner, WalkOptions,
};

mod train;

const DEFAULT_LOCAL_ROOT: &str =
    "/eos/uscms/store/user/rasharma/SecondStep/WWTree_2017-11-26_18h59/HaddedFiles/";
const DEFAULT_ENDPOINT: &str = "root://cmseos.fnal.gov";
const DEFAULT_REMOTE_PATH: &str =
    "/store/user/rasharma/SecondStep/WWTree_2017-11-26_18h59/HaddedFiles/";
const DEFAULT_APPLY_MACRO: &str = "TMVAClassificationApplication.C";

#[derive(Parser)]
#[command(name = "mvabatch")]
#[command(about = "mvabatch - batch ROOT ntuples through TMVA training and scoring")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Scoring macro run once per file
    #[arg(long, default_value = DEFAULT_APPLY_MACRO)]
    r#macro: String,

    /// Executable that runs the macro
    #[arg(long, default_value = "root")]
    program: String,

    /// Print each command as a JSON line instead of running it
    #[arg(long)]
    dry_run: bool,

    /// Stop at the first command that exits unsuccessfully
    #[arg(long)]
    fail_fast: bool,
}

impl RunArgs {
    fn template(&self) -> CommandTemplate {
        CommandTemplate { program: self.program.clone(), ..CommandTemplate::for_macro(&self.r#macro) }
    }

    fn batch_options(&self) -> BatchOptions {
        BatchOptions { fail_fast: self.fail_fast }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scoring macro on every file under a local directory
    Walk {
        /// Directory to walk recursively
        #[arg(long, default_value = DEFAULT_LOCAL_ROOT)]
        root: PathBuf,

        /// Only files with this extension (e.g. `root`)
        #[arg(long)]
        extension: Option<String>,

        /// Sort files by path instead of directory traversal order
        #[arg(long)]
        sorted: bool,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Run the scoring macro on every entry of a remote XRootD listing
    Remote {
        /// XRootD endpoint, prepended to every listed entry
        #[arg(long, default_value = DEFAULT_ENDPOINT)]
        endpoint: String,

        /// Remote directory to list
        #[arg(long, default_value = DEFAULT_REMOTE_PATH)]
        path: String,

        /// Listing client, invoked as `<lister> <endpoint> ls <path>`
        #[arg(long, default_value = "xrdfs")]
        lister: String,

        /// Read a captured listing instead of running the lister
        #[arg(long)]
        listing_file: Option<PathBuf>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Render the training macro from a config and run it with ROOT
    Train {
        /// Training config (YAML, or JSON by extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Directory for the macro, plan and TMVA outputs
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,

        /// Executable that runs the macro
        #[arg(long, default_value = "root")]
        program: String,

        /// Write the macro and plan but do not run ROOT
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the resolved training plan (weights, variables, cuts) as JSON
    Plan {
        /// Training config (YAML, or JSON by extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Output file (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check a training config without rendering anything
    Validate {
        /// Training config (YAML, or JSON by extension)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Render the companion scoring macro for a trained method
    RenderApply {
        /// Training config (YAML, or JSON by extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Booked method to evaluate; repeat or comma-separate for several
        #[arg(long = "method", value_delimiter = ',', default_value = "BDTG")]
        methods: Vec<String>,

        /// Branch holding the classifier response in the output tree
        #[arg(long, default_value = "BDT_response")]
        branch: String,

        /// Tree to score. Defaults to the config's `tree_name`.
        #[arg(long)]
        tree: Option<String>,

        /// Default input file baked into the macro signature
        #[arg(long, default_value = "")]
        default_input: String,

        /// Output macro path. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Walk { root, extension, sorted, run } => {
            cmd_walk(&root, WalkOptions { extension, sorted }, &run)
        }
        Commands::Remote { endpoint, path, lister, listing_file, run } => {
            let source = match listing_file {
                Some(path) => ListingSource::File { path, endpoint },
                None => ListingSource::Command { lister, endpoint, path },
            };
            cmd_remote(&source, &run)
        }
        Commands::Train { config, out_dir, program, dry_run } => {
            train::cmd_train(&config, &out_dir, &program, dry_run)
        }
        Commands::Plan { config, output } => train::cmd_plan(&config, output.as_ref()),
        Commands::Validate { config } => train::cmd_validate(&config),
        Commands::RenderApply { config, methods, branch, tree, default_input, output } => {
            train::cmd_render_apply(&config, methods, branch, tree, default_input, output.as_ref())
        }
    }
}

/// Pick the runner for `run` and hand it to `f`.
fn with_runner<F>(run: &RunArgs, f: F) -> Result<BatchSummary>
where
    F: FnOnce(&mut dyn CommandRunner) -> mb_core::Result<BatchSummary>,
{
    let summary = if run.dry_run {
        let stdout = std::io::stdout();
        let mut runner = DryRunRunner::new(stdout.lock());
        f(&mut runner)?
    } else {
        f(&mut ProcessRunner)?
    };
    if summary.stopped_early {
        anyhow::bail!(
            "stopped after {} of the listed inputs: a command failed (--fail-fast)",
            summary.invoked
        );
    }
    Ok(summary)
}

fn cmd_walk(root: &Path, walk: WalkOptions, run: &RunArgs) -> Result<()> {
    let template = run.template();
    let opts = run.batch_options();
    let summary = with_runner(run, |runner| {
        mb_batch::run_local(root, &walk, &template, runner, &opts)
    })
    .with_context(|| format!("walk {}", root.display()))?;
    tracing::info!(
        invoked = summary.invoked,
        failed = summary.failed,
        skipped = summary.skipped,
        "walk complete"
    );
    Ok(())
}

fn cmd_remote(source: &ListingSource, run: &RunArgs) -> Result<()> {
    let template = run.template();
    let opts = run.batch_options();
    let summary = with_runner(run, |runner| mb_batch::run_remote(source, &template, runner, &opts))
        .context("remote listing batch")?;
    tracing::info!(
        invoked = summary.invoked,
        failed = summary.failed,
        skipped = summary.skipped,
        "remote batch complete"
    );
    Ok(())
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
