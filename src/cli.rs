use clap::Parser;

#[derive(Parser, Debug)]
#[command(
author,
version,
about = r#"
██████╗░░█████╗░███╗░░░███╗██████╗░  ██████╗░███████╗███╗░░██╗░█████╗░██╗░░██╗
██╔══██╗██╔══██╗████╗░████║██╔══██╗  ██╔══██╗██╔════╝████╗░██║██╔══██╗██║░░██║
██████╔╝███████║██╔████╔██║██████╔╝  ██████╦╝█████╗░░██╔██╗██║██║░░╚═╝███████║
██╔══██╗██╔══██║██║╚██╔╝██║██╔═══╝░  ██╔══██╗██╔══╝░░██║╚████║██║░░██╗██╔══██║
██║░░██║██║░░██║██║░╚═╝░██║██║░░░░░  ██████╦╝███████╗██║░╚███║╚█████╔╝██║░░██║
╚═╝░░╚═╝╚═╝░░╚═╝╚═╝░░░░░╚═╝╚═╝░░░░░  ╚═════╝░╚══════╝╚═╝░░╚══╝░╚════╝░╚═╝░░╚═╝

A load-generation harness that drives a workload at a time-varying rate"#,
long_about = None)]
pub struct RampBench {
    /// The module to resolve a task descriptor from
    pub module: String,

    /// How long to run the rate ramp, in seconds
    #[arg(short, long, default_value_t = 10.0)]
    pub duration: f64,

    /// Disable the live terminal table in favor of one log line per tick
    #[arg(short, long)]
    pub verbose: bool,

    /// Directory to write results.json into once the benchmark completes
    #[arg(long)]
    pub export_dir: Option<std::path::PathBuf>,

    /// Sampling window for exported series, in seconds (defaults to
    /// duration / 50.0 when exporting)
    #[arg(long)]
    pub sample_interval: Option<f64>,
}
