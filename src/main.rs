#![warn(clippy::pedantic)]
#![allow(
    clippy::style,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc
)]

pub mod cli;
mod cmd;

use crate::cli::RampBench;
use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    env_logger::init();
    let args = RampBench::parse();
    cmd::run::run(&args)?;
    Ok(())
}
