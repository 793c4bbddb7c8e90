use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::manifest::Flavor;

#[derive(Debug, Clone, Parser)]
#[command(name = "register-weaver")]
#[command(about = "Collect service registrars from compiled classes and weave them into the collector")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Run one transform over the units listed in a build manifest.
    Transform {
        #[arg(short = 'm', long, value_name = "FILE")]
        manifest: PathBuf,

        #[arg(short = 'o', long, value_name = "DIR")]
        output: PathBuf,

        #[arg(long)]
        incremental: bool,

        #[arg(long)]
        scan_only: bool,

        #[arg(long, value_enum, default_value_t = Flavor::Application)]
        flavor: Flavor,

        #[arg(long, value_name = "N")]
        threads: Option<usize>,
    },
    /// Print what the scanner sees in a class file or archive.
    Inspect {
        path: PathBuf,
    },
}
