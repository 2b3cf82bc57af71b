//! gcbench - drive the kernel's memory reclaim with concurrent synthetic load

mod cli;

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::Cli;
use libgcbench_core::{
    load_file_config, run_prewarm, workload, AdminControl, BenchError, BenchFileConfig,
    CollectorTelemetry, Harness, JsonReport, PrewarmConfig, ProcfsAdmin, ProcfsTelemetry,
    ReportSink, RunConfig, StdFs, TextReport,
};

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so the report on stdout stays clean
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(&cli) {
        eprintln!("gcbench: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn run(cli: &Cli) -> Result<(), BenchError> {
    let file = match cli.config {
        Some(ref path) => load_file_config(path)?,
        None => BenchFileConfig::default(),
    };
    let paths = cli.host_paths(&file);
    let admin = ProcfsAdmin::new(&paths.procfs_root);

    if cli.force_gc {
        admin.force_collection()?;
        let heap = ProcfsTelemetry::new(&paths.procfs_root).heap_bytes()?;
        println!("kernel heap use:   {} Mb", heap >> 20);
        return Ok(());
    }
    if let Some(mb) = cli.heap_min() {
        return admin.set_min_heap_mb(mb);
    }
    if let Some(factor) = cli.growth() {
        return admin.set_heap_growth_factor(factor);
    }

    let config = RunConfig::new(
        cli.workload(&file),
        cli.work.or(file.duration_secs).unwrap_or(1),
        cli.threads.or(file.workers).unwrap_or(1),
        cli.scale.or(file.scale).unwrap_or(1),
    );
    config.validate()?;
    println!(
        "scale factor: {}, work factor: {}, worker threads: {}{}",
        config.scale(),
        config.duration_secs(),
        config.workers(),
        if cli.sleep_forever { ", sleeping forever" } else { "" }
    );

    let started = Instant::now();
    let prewarm = PrewarmConfig {
        dir: paths.work_dir.clone(),
        scale: config.scale(),
        rewinds: cli.prewarm_rewinds(&file),
    };
    if prewarm.scale > 0 {
        println!("creating {} vnodes...", prewarm.scale * 1000);
    }
    let stats = run_prewarm(&prewarm, &StdFs, &admin, |pct| println!("{}%", pct))?;
    info!(
        created = stats.created,
        rewinds = stats.rewinds_used,
        "prewarm done"
    );
    if let Some(count) = stats.cached_entries {
        println!("cached entries: {}", count);
    }
    println!("setup: {} ms", started.elapsed().as_millis());

    let fs = Arc::new(StdFs);
    let workload = workload::build(config.workload(), &paths, fs);
    let telemetry = Arc::new(ProcfsTelemetry::new(&paths.procfs_root));

    let mut sinks: Vec<Box<dyn ReportSink>> = vec![Box::new(TextReport::new(std::io::stdout()))];
    let json_report = cli.json_report.clone().or(file.json_report);
    if let Some(ref path) = json_report {
        sinks.push(Box::new(JsonReport::new(path)));
    }

    Harness::new(config, workload, telemetry).run(&mut sinks)?;
    if let Some(path) = json_report {
        println!("Report saved to {}", path.display());
    }

    if cli.sleep_forever {
        println!("sleeping forever...");
        loop {
            std::thread::park();
        }
    }
    Ok(())
}
