mod cli;
mod config;
mod exec;
mod init;
mod logging;
mod task;

use anyhow::Result;
use clap::Parser;
use serde_json::json;

use refiner_core::RefinerError;

use crate::cli::{Cli, Command};
use crate::exec::ToolFailure;
use crate::task::TaskDescriptor;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = if cli.verbose {
        true
    } else {
        logging::env_flag()
    };
    logging::init(verbose);
    match cli.command {
        Command::Init => init::run(&cli.root),
        Command::Scan { start, count } => emit(task::run_scan(&cli.root, start, count)),
        Command::Plan {
            start,
            count,
            highlights,
        } => emit(task::run_plan(&cli.root, start, count, highlights)),
        Command::Refine { block_file } => emit(task::run_refine(&cli.root, &block_file)),
        Command::RefineExec { block_file, block } => {
            report(exec::run(&cli.root, &block_file, block.as_deref()))
        }
    }
}

fn emit(result: Result<TaskDescriptor>) -> Result<()> {
    match result {
        Ok(descriptor) => {
            println!("{}", serde_json::to_string_pretty(&descriptor)?);
            Ok(())
        }
        Err(err) => {
            println!("{}", serde_json::to_string_pretty(&error_object(&err))?);
            Err(err)
        }
    }
}

fn report(result: Result<()>) -> Result<()> {
    if let Err(err) = result {
        println!("{}", serde_json::to_string_pretty(&error_object(&err))?);
        return Err(err);
    }
    Ok(())
}

fn error_object(err: &anyhow::Error) -> serde_json::Value {
    let kind = if let Some(core) = err.downcast_ref::<RefinerError>() {
        match core {
            RefinerError::NotFound(_) => "not_found",
            RefinerError::Decode(_) => "decode",
            RefinerError::ParseRange(_) => "parse",
            RefinerError::NoMatch(_) => "no_match",
            RefinerError::Io(_) => "io",
        }
    } else if err.downcast_ref::<ToolFailure>().is_some() {
        "external_tool"
    } else {
        "config"
    };
    json!({
        "error": {
            "kind": kind,
            "message": format!("{err:#}"),
        }
    })
}
