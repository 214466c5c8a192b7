mod cli;
mod demos;

use anyhow::{Context, Result};
use bytesize::ByteSize;
use cli::{expect_arg, LOGGING_LEVELS};
use demos::{Location, Program, PROGRAMS};
use env_logger::{Env, TimestampPrecision};
use log::{debug, info, warn};
use smg::{
    config::SmgOptions,
    smg::plotter::SmgPlotter,
    transfer::{Bug, NeverShutdown, SmgState, SmgTransferRelation},
};
use std::{
    path::{Path, PathBuf},
    str::FromStr,
    time::Instant,
};

fn main() -> Result<()> {
    let matches = cli::args(&PROGRAMS).get_matches();

    let log_level = expect_arg(&matches, "verbose");

    init_logger(log_level)?;

    match matches.subcommand() {
        Some(("list", _)) => {
            for name in PROGRAMS {
                if let Some(program) = demos::program(name) {
                    println!("{:<16} {}", program.name, program.description);
                }
            }

            Ok(())
        }
        Some(("run", args)) => {
            let name = expect_arg(args, "program");
            let program =
                demos::program(name).with_context(|| format!("unknown program \"{}\"", name))?;

            let options = SmgOptions {
                machine_model: FromStr::from_str(expect_arg(args, "machine-model"))?,
                runtime_check: FromStr::from_str(expect_arg(args, "runtime-check"))?,
                simulate_malloc_failure: args.get_flag("simulate-malloc-failure"),
                ..Default::default()
            };

            let final_states = explore(&program, options)?;

            report(&program, &final_states);

            if let Some(directory) = args.get_one::<PathBuf>("export-dir") {
                export(&program, &final_states, directory)?;
            }

            Ok(())
        }
        _ => unreachable!(),
    }
}

fn init_logger(level: &str) -> Result<()> {
    if !LOGGING_LEVELS.contains(&level) {
        anyhow::bail!("unknown logging level \"{}\"", level);
    }

    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp(Some(TimestampPrecision::Millis))
        .try_init()
        .context("logger can only be initialized once")
}

/// Depth-first exploration of all paths of `program`. Returns the states
/// reaching the exit location, in the order their paths were completed.
fn explore(program: &Program, options: SmgOptions) -> Result<Vec<SmgState>> {
    let relation = SmgTransferRelation::new(options);
    let initial = relation.initial_state(&program.main)?;

    let mut waiting: Vec<(Location, SmgState)> = vec![(Program::ENTRY, initial)];
    let mut finished = Vec::new();
    let mut transfers = 0_usize;
    let start = Instant::now();

    while let Some((location, state)) = waiting.pop() {
        if program.is_exit(location) {
            debug!("path {} reached the exit", finished.len());
            finished.push(state);
            continue;
        }

        for (edge, target) in program.leaving(location) {
            let successors = relation
                .transfer(&state, edge, &NeverShutdown)
                .with_context(|| format!("transfer along \"{}\" failed", edge))?;

            transfers += 1;

            waiting.extend(successors.into_iter().rev().map(|s| (target, s)));
        }
    }

    info!(
        "explored {} path(s) of {} with {} transfer(s) (took {:?})",
        finished.len(),
        program.name,
        transfers,
        start.elapsed()
    );

    Ok(finished)
}

fn report(program: &Program, states: &[SmgState]) {
    println!("{}: {} path(s)", program.name, states.len());

    for (index, state) in states.iter().enumerate() {
        let bugs = state.bugs();

        if bugs.is_empty() {
            println!("path {}: no memory errors", index);
            continue;
        }

        let leaked: u64 = bugs
            .iter()
            .filter_map(|bug| match bug {
                Bug::MemoryLeak { size, .. } => Some(*size),
                _ => None,
            })
            .sum();

        println!("path {}: {} memory error(s)", index, bugs.len());

        for bug in bugs {
            println!("{}\n", bug);
        }

        if leaked > 0 {
            warn!("path {} leaks {}", index, ByteSize(leaked));
        }
    }
}

fn export(program: &Program, states: &[SmgState], directory: &Path) -> Result<()> {
    std::fs::create_dir_all(directory)
        .with_context(|| format!("can not create {}", directory.display()))?;

    for (index, state) in states.iter().enumerate() {
        let name = format!("{}-{}", program.name, index);
        let path = directory.join(format!("{}.dot", name));

        SmgPlotter::new(state.heap(), &name)
            .write_to_file(&path)
            .with_context(|| format!("can not write {}", path.display()))?;

        info!("memory graph of path {} written to {}", index, path.display());
    }

    Ok(())
}
