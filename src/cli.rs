use clap::{command, value_parser, Arg, ArgAction, ArgMatches, Command};
use smg::{
    config::{defaults, RuntimeCheck},
    machine::MachineModel,
};
use std::path::PathBuf;
use strum::VariantNames;

pub const LOGGING_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

pub fn expect_arg<'a>(m: &'a ArgMatches, arg: &str) -> &'a str {
    m.get_one::<String>(arg)
        .map(String::as_str)
        .unwrap_or_else(|| panic!("argument \"{}\" has to be set in CLI at all times", arg))
}

pub fn args(programs: &'static [&'static str]) -> Command {
    command!()
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("configure logging level to use")
                .value_name("LEVEL")
                .value_parser(LOGGING_LEVELS)
                .default_value(LOGGING_LEVELS[2])
                .global(true),
        )
        .subcommand(Command::new("list").about("List the built-in programs"))
        .subcommand(
            Command::new("run")
                .about("Explore all paths of a built-in program and report memory bugs")
                .arg(
                    Arg::new("program")
                        .help("Program to be analyzed")
                        .value_name("PROGRAM")
                        .value_parser(programs.to_vec())
                        .required(true),
                )
                .arg(
                    Arg::new("machine-model")
                        .help("Data model of the analyzed program")
                        .short('m')
                        .long("machine-model")
                        .value_name("MODEL")
                        .value_parser(MachineModel::VARIANTS.to_vec())
                        .default_value(<&str>::from(defaults::MACHINE_MODEL)),
                )
                .arg(
                    Arg::new("runtime-check")
                        .help("When to verify the invariants of the memory graphs")
                        .short('c')
                        .long("runtime-check")
                        .value_name("LEVEL")
                        .value_parser(RuntimeCheck::VARIANTS.to_vec())
                        .default_value(<&str>::from(defaults::RUNTIME_CHECK)),
                )
                .arg(
                    Arg::new("simulate-malloc-failure")
                        .help("Follow a path on which the allocation failed for every malloc and calloc")
                        .long("simulate-malloc-failure")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("export-dir")
                        .help("Write the memory graphs of all final states as dot files to this directory")
                        .short('o')
                        .long("export-dir")
                        .value_name("DIR")
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
}
