use clap::Parser;
use std::io::{Read, Write};

use safeplan::ir::events::EventStream;
use safeplan::plan::encode;
use safeplan::{DebugMode, Planner, PlannerOptions, Telemetry};

#[derive(Parser)]
#[command(name = "safeplan")]
#[command(about = "Compile shell-orchestration scripts into secret-safe execution plans")]
#[command(version)]
struct Cli {
    /// Target function name (omit for script mode)
    #[arg(long, default_value = "")]
    target: String,

    /// Emit the plan as pretty JSON instead of the binary wire format
    #[arg(long)]
    json: bool,

    /// Print the plan contract hash to stderr
    #[arg(long = "hash")]
    hash: bool,

    /// Log per-pass timing at debug level
    #[arg(long)]
    timing: bool,

    /// Log resolved site paths and the scope graph at trace level
    #[arg(long = "debug-paths")]
    debug_paths: bool,

    /// Input file containing {"tokens": [...], "events": [...]} (stdin if omitted)
    #[arg()]
    input: Option<String>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let raw = match cli.input {
        Some(ref path) => match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("safeplan: cannot read {}: {}", path, e);
                std::process::exit(2);
            }
        },
        None => {
            let mut buf = String::new();
            if let Err(e) = std::io::stdin().read_to_string(&mut buf) {
                eprintln!("safeplan: cannot read stdin: {}", e);
                std::process::exit(2);
            }
            buf
        }
    };

    let stream: EventStream = match serde_json::from_str(&raw) {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("safeplan: invalid input document: {}", e);
            std::process::exit(2);
        }
    };

    let options = PlannerOptions {
        target: cli.target,
        telemetry: if cli.timing { Telemetry::Timing } else { Telemetry::Off },
        debug: if cli.debug_paths { DebugMode::Paths } else { DebugMode::Off },
        vault: None,
    };

    let result = match Planner::default().plan_events(&stream, options) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("safeplan: {}", e);
            std::process::exit(1);
        }
    };

    if cli.hash {
        eprintln!("contract hash: {}", hex::encode(result.plan.contract_hash()));
    }

    if cli.json {
        match serde_json::to_string_pretty(&result.plan) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("safeplan: cannot render plan: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        let bytes = encode::encode(&result.plan);
        if let Err(e) = std::io::stdout().write_all(&bytes) {
            eprintln!("safeplan: cannot write plan: {}", e);
            std::process::exit(1);
        }
    }
}
