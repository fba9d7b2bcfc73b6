#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::env;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use weir_harness::{WorkloadConfig, run_workload};
use weir_types::Geometry;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let cmd = args.first().map(String::as_str);

    match cmd {
        Some("simulate") => simulate(&args[1..]),
        Some("geometry") => geometry(&args[1..]),
        Some("--help" | "-h" | "help") | None => {
            print_usage();
            Ok(())
        }
        Some(other) => {
            print_usage();
            bail!("unknown command: {other}")
        }
    }
}

// Reports go to stdout; all diagnostics stay on stderr.
fn init_tracing() {
    let filter = if env::var(EnvFilter::DEFAULT_ENV).is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::default().add_directive(LevelFilter::INFO.into())
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn simulate(args: &[String]) -> Result<()> {
    let mut config = WorkloadConfig::default();
    let mut index = 0_usize;
    while index < args.len() {
        match args[index].as_str() {
            "--commands" => {
                let raw = args.get(index + 1).context("--commands requires a value")?;
                config.command_count = raw.parse().context("invalid --commands value")?;
                index += 2;
            }
            "--seed" => {
                let raw = args.get(index + 1).context("--seed requires a value")?;
                config.seed = raw.parse().context("invalid --seed value")?;
                index += 2;
            }
            "--max-blocks" => {
                let raw = args.get(index + 1).context("--max-blocks requires a value")?;
                config.max_blocks_per_command = raw.parse().context("invalid --max-blocks value")?;
                index += 2;
            }
            "--span" => {
                let raw = args.get(index + 1).context("--span requires a value")?;
                config.lba_span = raw.parse().context("invalid --span value")?;
                index += 2;
            }
            "--interval" => {
                let raw = args.get(index + 1).context("--interval requires a value")?;
                config.completion_interval = raw.parse().context("invalid --interval value")?;
                index += 2;
            }
            "--buffers" => {
                let raw = args.get(index + 1).context("--buffers requires a value")?;
                config.sim.buffer_entries = raw.parse().context("invalid --buffers value")?;
                index += 2;
            }
            "--ring" => {
                let raw = args.get(index + 1).context("--ring requires a value")?;
                config.sim.dma_ring = raw.parse().context("invalid --ring value")?;
                index += 2;
            }
            "--slots" => {
                let raw = args.get(index + 1).context("--slots requires a value")?;
                config.sim.geometry.request_slots = raw.parse().context("invalid --slots value")?;
                index += 2;
            }
            other => {
                bail!("unknown simulate option: {other}");
            }
        }
    }

    let report = run_workload(&config)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.quiescent {
        bail!(
            "workload failed to quiesce; {} request slot(s) still in flight",
            report.final_census.total() - report.final_census.free
        );
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct GeometryReport {
    geometry: Geometry,
    dies: u32,
    main_slices: u64,
}

fn geometry(args: &[String]) -> Result<()> {
    let mut geometry = Geometry::default();
    let mut index = 0_usize;
    while index < args.len() {
        match args[index].as_str() {
            "--channels" => {
                let raw = args.get(index + 1).context("--channels requires a value")?;
                geometry.channels = raw.parse().context("invalid --channels value")?;
                index += 2;
            }
            "--ways" => {
                let raw = args.get(index + 1).context("--ways requires a value")?;
                geometry.ways = raw.parse().context("invalid --ways value")?;
                index += 2;
            }
            "--blocks" => {
                let raw = args.get(index + 1).context("--blocks requires a value")?;
                geometry.blocks_per_die = raw.parse().context("invalid --blocks value")?;
                index += 2;
            }
            "--pages" => {
                let raw = args.get(index + 1).context("--pages requires a value")?;
                geometry.pages_per_block = raw.parse().context("invalid --pages value")?;
                index += 2;
            }
            "--slice-blocks" => {
                let raw = args.get(index + 1).context("--slice-blocks requires a value")?;
                geometry.host_blocks_per_slice = raw.parse().context("invalid --slice-blocks value")?;
                index += 2;
            }
            "--slots" => {
                let raw = args.get(index + 1).context("--slots requires a value")?;
                geometry.request_slots = raw.parse().context("invalid --slots value")?;
                index += 2;
            }
            other => {
                bail!("unknown geometry option: {other}");
            }
        }
    }

    geometry.validate()?;
    let report = GeometryReport {
        dies: geometry.dies(),
        main_slices: geometry.main_slices(),
        geometry,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_usage() {
    println!("weir-cli — seeded workload runs against the request scheduler");
    println!();
    println!("USAGE:");
    println!(
        "  weir-cli simulate [--commands N] [--seed S] [--max-blocks N] [--span N] [--interval N] [--buffers N] [--ring N] [--slots N]"
    );
    println!(
        "  weir-cli geometry [--channels N] [--ways N] [--blocks N] [--pages N] [--slice-blocks N] [--slots N]"
    );
    println!();
    println!("SIMULATE:");
    println!("  Generates a seeded mixed read/write command stream, feeds it through the");
    println!("  scheduler over in-memory collaborators, drains every queue, and prints a");
    println!("  JSON report. Fails if any request slot is still in flight at the end.");
    println!();
    println!("GEOMETRY:");
    println!("  Validates a device geometry and prints it with derived totals.");
    println!();
    println!("EXAMPLES:");
    println!("  weir-cli simulate --commands 2048 --seed 7 > report.json");
    println!("  weir-cli simulate --max-blocks 64 --interval 4 --buffers 8");
    println!("  weir-cli geometry --channels 4 --ways 2 --slots 256");
}
