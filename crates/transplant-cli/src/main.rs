//! transplant - graft pretrained donor weights into a multi-branch network
//!
//! Usage:
//!   transplant graft --target dual.safetensors \
//!       --donor rgb=rgb.safetensors --donor nir=nir.safetensors \
//!       --preset dual-backbone -o transplanted.safetensors
//!   transplant inspect donor.safetensors       # Keys with resolved layers
//!   transplant plan --preset dual-backbone     # Print a plan as TOML
//!   transplant presets                         # List built-in plans

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod error;
mod logging;
mod output;

use commands::{graft, inspect, plan, presets};

/// transplant - cross-architecture weight transplantation
///
/// Copies pretrained tensors from donor networks into a freshly initialised
/// target by layer index and writes a fresh training checkpoint.
#[derive(Parser)]
#[command(name = "transplant")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Where the surgery plan comes from
#[derive(Args)]
struct PlanSource {
    /// TOML plan file
    #[arg(long, value_name = "FILE", conflicts_with = "preset", required_unless_present = "preset")]
    plan: Option<PathBuf>,

    /// Built-in plan (see `transplant presets`)
    #[arg(long, value_name = "NAME")]
    preset: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Transplant donor weights into a target and write a checkpoint
    Graft {
        /// Target skeleton (SafeTensors)
        #[arg(long, value_name = "FILE")]
        target: PathBuf,

        /// Donor file, repeatable
        #[arg(long = "donor", value_name = "NAME=PATH", required = true, value_parser = graft::parse_donor)]
        donors: Vec<(String, PathBuf)>,

        #[command(flatten)]
        source: PlanSource,

        /// Output checkpoint
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Process target keys in parallel
        #[arg(long)]
        parallel: bool,

        /// Write an unset best_fitness entry into the checkpoint
        #[arg(long)]
        best_fitness: bool,

        /// List every record, not only skipped ones
        #[arg(long)]
        all: bool,
    },

    /// List parameter keys with their resolved layer index
    Inspect {
        /// SafeTensors file or checkpoint
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Only show keys containing this pattern
        #[arg(long)]
        filter: Option<String>,

        /// Limit number of keys shown
        #[arg(long, default_value = "100")]
        limit: usize,
    },

    /// Validate a plan and print it as TOML
    Plan {
        #[command(flatten)]
        source: PlanSource,
    },

    /// List built-in plans
    Presets,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Graft {
            target,
            donors,
            source,
            output,
            parallel,
            best_fitness,
            all,
        } => plan::load(source.plan.as_deref(), source.preset.as_deref()).and_then(|surgery| {
            graft::run(
                &surgery,
                &target,
                donors,
                &output,
                graft::Flags {
                    parallel,
                    best_fitness,
                    all,
                    json: cli.json,
                    quiet: cli.quiet,
                },
            )
        }),

        Commands::Inspect {
            file,
            filter,
            limit,
        } => inspect::run(&file, filter.as_deref(), limit, cli.json),

        Commands::Plan { source } => plan::load(source.plan.as_deref(), source.preset.as_deref())
            .and_then(|surgery| plan::run(&surgery, cli.json)),

        Commands::Presets => presets::run(cli.json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            e.exit_code()
        }
    }
}
