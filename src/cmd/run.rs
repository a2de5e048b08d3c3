use crate::cli::RampBench;
use anyhow::Result;
use log::info;
use ramp_bench::aggregator;
use ramp_bench::catalog::TaskCatalog;
use ramp_bench::driver::Driver;
use std::collections::BTreeMap;

pub fn run(args: &RampBench) -> Result<()> {
    let task = TaskCatalog::resolve(&args.module)?;
    info!(
        "running \"{}\" for {}s (executor={:?}, max_concurrency={})",
        task.name(),
        args.duration,
        task.config().executor,
        task.config().max_concurrency
    );

    let mut driver = Driver::new(task.clone(), args.duration, args.verbose);
    let registry = driver.run()?;

    if let Some(dir) = &args.export_dir {
        let sample_interval = args
            .sample_interval
            .unwrap_or(args.duration / 50.0);
        let series = aggregator::aggregate(&registry, args.duration, sample_interval);
        let mut by_task = BTreeMap::new();
        by_task.insert(task.name().to_string(), series);
        let written = aggregator::export(dir, &by_task)?;
        info!("wrote results to {}", written.display());
    }

    Ok(())
}
