//! querycore - compile SQL statements against a catalog file and print
//! their plans.

use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use flexi_logger::Logger;
use querycore::catalog::InMemoryCatalog;
use querycore::optimizer::{CollectingTrace, OptimizerConfig};
use querycore::planner::{CompileOptions, QueryPlanner};

struct Args {
    catalog: Option<PathBuf>,
    config: Option<PathBuf>,
    schema: Option<String>,
    execute: Option<String>,
    trace: bool,
    verbose: bool,
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let mut parsed = Args {
        catalog: None,
        config: None,
        schema: None,
        execute: None,
        trace: false,
        verbose: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-c" | "--catalog" => {
                i += 1;
                if i < args.len() {
                    parsed.catalog = Some(PathBuf::from(&args[i]));
                }
            }
            "--config" => {
                i += 1;
                if i < args.len() {
                    parsed.config = Some(PathBuf::from(&args[i]));
                }
            }
            "-s" | "--schema" => {
                i += 1;
                if i < args.len() {
                    parsed.schema = Some(args[i].clone());
                }
            }
            "-e" | "--execute" => {
                i += 1;
                if i < args.len() {
                    parsed.execute = Some(args[i].clone());
                }
            }
            "--trace" => {
                parsed.trace = true;
            }
            "-v" | "--verbose" => {
                parsed.verbose = true;
            }
            "-h" | "--help" => {
                print_help();
                return ExitCode::SUCCESS;
            }
            "--version" => {
                println!("querycore v{}", env!("CARGO_PKG_VERSION"));
                return ExitCode::SUCCESS;
            }
            arg => {
                // Treat as catalog path if no flag.
                if !arg.starts_with('-') {
                    parsed.catalog = Some(PathBuf::from(arg));
                } else {
                    eprintln!("Unknown option: {}", arg);
                    return ExitCode::FAILURE;
                }
            }
        }
        i += 1;
    }

    match run(parsed) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_help() {
    println!("querycore - SQL query compiler");
    println!();
    println!("Usage: querycore [OPTIONS] [CATALOG]");
    println!();
    println!("Options:");
    println!("  -c, --catalog PATH     JSON catalog document");
    println!("  --config PATH          TOML optimizer configuration");
    println!("  -s, --schema NAME      Current schema (default: APP)");
    println!("  -e, --execute SQL      Compile SQL and exit");
    println!("  --trace                Print the optimizer trace");
    println!("  -v, --verbose          Enable debug logging");
    println!("  -h, --help             Show this help message");
    println!("  --version              Show version");
    println!();
    println!("Without -e, statements are read from stdin, one per line.");
}

/// Compile every requested statement. Returns whether all of them compiled.
fn run(args: Args) -> Result<bool, Box<dyn std::error::Error>> {
    let level = if args.verbose { "debug" } else { "warn" };
    let _logger = Logger::try_with_str(level)?.start()?;

    let catalog = match &args.catalog {
        Some(path) => InMemoryCatalog::load(path)?,
        None => InMemoryCatalog::new(),
    };
    let config = match &args.config {
        Some(path) => OptimizerConfig::load(path)?,
        None => OptimizerConfig::default(),
    };
    let mut options = CompileOptions::new().optimizer(config);
    if let Some(schema) = &args.schema {
        options = options.current_schema(schema.as_str());
    }

    let trace = Arc::new(CollectingTrace::new());
    let mut planner = QueryPlanner::with_options(Arc::new(catalog), options);
    if args.trace {
        planner = planner.with_trace(trace.clone());
    }

    let statements: Vec<String> = match args.execute {
        Some(sql) => vec![sql],
        None => std::io::stdin()
            .lock()
            .lines()
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|line| !line.trim().is_empty())
            .collect(),
    };

    let mut all_ok = true;
    for sql in &statements {
        match planner.compile(sql) {
            Ok(plan) => print!("{}", plan.explain()),
            Err(e) => {
                eprintln!("Error: {}", e);
                all_ok = false;
            }
        }
        if args.trace {
            print!("{}", trace.render());
            trace.take();
        }
    }
    Ok(all_ok)
}
