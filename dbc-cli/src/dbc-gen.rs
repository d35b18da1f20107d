/*
 * Copyright (C) 2015-2023 IoT.bzh Company
 * Author: Fulup Ar Foll <fulup@iot.bzh>
 *
 * Redpesk interface code/config use MIT License and can be freely copy/modified even within proprietary code
 * License: $RP_BEGIN_LICENSE$ SPDX:MIT https://opensource.org/licenses/MIT $RP_END_LICENSE$
 *
 */
extern crate dbcgen;

use clap::Parser;
use dbcgen::prelude::*;
use log::info;
use std::process::ExitCode;

/// Compile a DBC file into the Rust encode/decode module of one CAN node.
///
/// Examples:
///   dbc-gen -i etc/sample.dbc -s DRIVER               # module printed on stdout
///   dbc-gen -i etc/sample.dbc -s MOTOR -o motor.rs    # module written to motor.rs
///   dbc-gen -i etc/sample.dbc -s IO --all --dump-model
#[derive(Debug, Parser)]
#[command(name = "dbc-gen", version, about, author)]
struct Args {
    /// DBC input file
    #[arg(short = 'i', long = "input")]
    input: String,

    /// Node the code is generated for (must be listed in BU_)
    #[arg(short = 's', long = "self-node")]
    self_node: String,

    /// Generate every message whatever the node role
    #[arg(short = 'a', long = "all", default_value_t = false)]
    all: bool,

    /// Output file, stdout when missing
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Name of the generated Rust module
    #[arg(short = 'u', long = "uid", default_value = "dbcgen")]
    uid: String,

    /// Print the validated model as JSON instead of generating code
    #[arg(long = "dump-model", default_value_t = false)]
    dump_model: bool,

    /// Increase verbosity (can be repeated: -v, -vv)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env = env_logger::Env::default().default_filter_or(level);
    let _ = env_logger::Builder::from_env(env).format_timestamp_millis().try_init();
}

fn run(args: &Args) -> Result<(), DbcError> {
    if args.dump_model {
        let model = DbcObject::from_file(&args.input, &args.self_node)?;
        println!("{}", model.to_json()?);
        return Ok(());
    }

    // builder keeps the module name for the program lifetime
    let uid: &'static str = Box::leak(args.uid.clone().into_boxed_str());
    let mut compiler = DbcCompiler::new(uid);
    compiler.dbcfile(&args.input).self_node(&args.self_node).gen_all(args.all);
    if let Some(output) = &args.output {
        compiler.outfile(output);
    }
    compiler.generate()?;

    if let Some(output) = &args.output {
        info!("dbc:{} generated into {}", args.input, output);
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("dbc-gen: [{}] {}", error.uid(), error);
            ExitCode::FAILURE
        }
    }
}
