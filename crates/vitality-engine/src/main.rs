//! `vitality-sim`: simulator and configuration tools

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vitality_core::EngineConfig;
use vitality_engine::{run_simulator, SimulatorConfig};
use vitality_progression::LevelTable;

fn main() -> anyhow::Result<()> {
    let cli = Command::new("vitality-sim")
        .version(vitality_engine::VERSION)
        .about("Vitality progression and rewards engine tools")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run a seeded concurrent workload and verify ledger invariants")
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("users")
                        .long("users")
                        .default_value("16")
                        .value_parser(value_parser!(usize))
                        .help("Number of simulated users"),
                )
                .arg(
                    Arg::new("days")
                        .long("days")
                        .default_value("14")
                        .value_parser(value_parser!(u32))
                        .help("Number of simulated days"),
                )
                .arg(
                    Arg::new("ops")
                        .long("ops")
                        .default_value("500")
                        .value_parser(value_parser!(u64))
                        .help("Operations per simulated day"),
                )
                .arg(
                    Arg::new("threads")
                        .long("threads")
                        .default_value("4")
                        .value_parser(value_parser!(usize))
                        .help("Worker threads"),
                )
                .arg(
                    Arg::new("floor")
                        .long("floor")
                        .default_value("50")
                        .value_parser(value_parser!(u64))
                        .help("Reserve floor XP for conversions"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output the report as JSON"),
                ),
        )
        .subcommand(
            Command::new("levels")
                .about("Print the level table")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Configuration file (.toml, .yaml); defaults otherwise"),
                ),
        )
        .subcommand(
            Command::new("check-config")
                .about("Validate a configuration file")
                .arg(
                    Arg::new("path")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Configuration file (.toml, .yaml)"),
                ),
        );

    let matches = cli.get_matches();
    init_tracing(matches.get_flag("log-json"));

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let config = SimulatorConfig {
                seed: *args.get_one::<u64>("seed").context("missing --seed")?,
                users: *args.get_one::<usize>("users").context("missing --users")?,
                days: *args.get_one::<u32>("days").context("missing --days")?,
                operations_per_day: *args.get_one::<u64>("ops").context("missing --ops")?,
                threads: *args.get_one::<usize>("threads").context("missing --threads")?,
                reserve_floor_xp: *args.get_one::<u64>("floor").context("missing --floor")?,
            };

            let report = run_simulator(config).context("simulator setup failed")?;
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.generate_text());
            }

            std::process::exit(if report.passed() { 0 } else { 1 });
        }
        Some(("levels", args)) => {
            let config = match args.get_one::<PathBuf>("config") {
                Some(path) => EngineConfig::from_path(path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => EngineConfig::default(),
            };
            let table = LevelTable::from_config(&config.levels)?;

            println!("Level  Threshold XP");
            for (level, threshold) in table.iter() {
                println!("{level:>5}  {threshold:>12}");
            }
        }
        Some(("check-config", args)) => {
            let path = args
                .get_one::<PathBuf>("path")
                .context("missing configuration path")?;
            match EngineConfig::from_path(path) {
                Ok(config) => {
                    println!("{}: OK", path.display());
                    println!("  Levels: {}", config.levels.thresholds.len());
                    println!("  XP per credit: {}", config.conversion.xp_per_credit);
                    println!("  Reserve floor: {}", config.conversion.reserve_floor_xp);
                }
                Err(err) => {
                    eprintln!("{}: {err}", path.display());
                    std::process::exit(1);
                }
            }
        }
        _ => unreachable!("subcommand required"),
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
