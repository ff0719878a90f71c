use std::env;
use std::fs;
use std::path::Path;
use std::process;

use skink::repl::Repl;
use skink::runtime::{Config, Interpreter};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone)]
enum ArgCmd {
    Repl { config: Config },
    File { path: String, config: Config },
    Help,
}

fn print_usage() {
    println!("skink v{}\n", VERSION);
    println!("Usage:");
    println!("  skink                     Start the REPL");
    println!("  skink --file <path>       Execute a file");
    println!("  skink --case-sensitive    Keep symbol spellings as written");
    println!("  skink --strict-redefine   Signal a condition on top-level redefinition");
    println!("  skink -h                  Show this help message");
}

fn parse_args(args: Vec<String>) -> Result<ArgCmd, String> {
    let mut config = Config::default();
    let mut file_path: Option<String> = None;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                return Ok(ArgCmd::Help);
            }
            "--case-sensitive" => {
                config.case_sensitive = true;
            }
            "--strict-redefine" => {
                config.strict_redefine = true;
            }
            "--file" => {
                if i + 1 >= args.len() {
                    return Err("Error: --file requires a file path".to_string());
                }
                file_path = Some(args[i + 1].clone());
                i += 1; // Skip the file path
            }
            arg => {
                return Err(format!("Error: Unknown argument '{}'", arg));
            }
        }
        i += 1;
    }

    if let Some(path) = file_path {
        Ok(ArgCmd::File { path, config })
    } else {
        Ok(ArgCmd::Repl { config })
    }
}

fn make_interpreter(config: Config) -> Interpreter {
    match Interpreter::with_defaults(config) {
        Ok(interp) => interp,
        Err(e) => {
            eprintln!("Failed to load bootstrap library: {}", e);
            process::exit(1);
        }
    }
}

fn run_file(file_path: &str, config: Config) -> Result<(), String> {
    let source = fs::read_to_string(Path::new(file_path))
        .map_err(|e| format!("Cannot read {}: {}", file_path, e))?;
    let interp = make_interpreter(config);
    match interp.load_str(&source) {
        Ok(value) => {
            println!("{}", value);
            Ok(())
        }
        Err(e) => Err(e.to_string()),
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let command = match parse_args(args) {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("{}\n", e);
            print_usage();
            process::exit(1);
        }
    };

    match command {
        ArgCmd::Help => {
            print_usage();
        }
        ArgCmd::Repl { config } => {
            let repl = Repl::new(make_interpreter(config));
            repl.run();
        }
        ArgCmd::File { path, config } => {
            if let Err(e) = run_file(&path, config) {
                eprintln!("{}", e);
                process::exit(1);
            }
        }
    }
}
