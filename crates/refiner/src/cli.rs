use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "novel-refiner", about = "novel-refiner workflow CLI")]
pub struct Cli {
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Init,
    Scan {
        start: u32,
        count: Option<usize>,
    },
    Plan {
        start: u32,
        count: Option<usize>,
        #[arg(long)]
        highlights: Option<PathBuf>,
    },
    Refine {
        block_file: PathBuf,
    },
    RefineExec {
        block_file: PathBuf,
        #[arg(long)]
        block: Option<String>,
    },
}
