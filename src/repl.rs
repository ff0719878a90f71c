use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::printer;
use crate::runtime::{Interpreter, LoadError};

const HISTORY_FILE: &str = ".skink-history";

pub struct Repl {
    interp: Interpreter,
}

impl Repl {
    pub fn new(interp: Interpreter) -> Self {
        Repl { interp }
    }

    pub fn run(&self) {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(err) => {
                eprintln!("Failed to start line editor: {:?}", err);
                return;
            }
        };
        if rl.load_history(HISTORY_FILE).is_err() {}

        'repl_loop: loop {
            match rl.readline("> ") {
                Ok(line) => {
                    if let Err(err) = rl.add_history_entry(line.as_str()) {
                        eprintln!("Error adding to history: {:?}", err);
                    }
                    if let Err(err) = rl.save_history(HISTORY_FILE) {
                        eprintln!("Error saving history: {:?}", err);
                    }

                    if !line.is_empty() {
                        // An unhandled condition aborts this input only;
                        // the loop always proceeds to the next line.
                        match self.interp.load_str(&line) {
                            Ok(value) => {
                                println!("{}", printer::write_str(&value))
                            }
                            Err(LoadError::Read(e)) => {
                                println!("{}", e.format_error().red());
                                continue 'repl_loop;
                            }
                            Err(LoadError::Eval(e)) => {
                                println!("{}", e.to_string().red());
                                continue 'repl_loop;
                            }
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => continue 'repl_loop,
                Err(ReadlineError::Eof) => break 'repl_loop,
                Err(err) => {
                    println!("Error: {:?}", err);
                    break 'repl_loop;
                }
            }
        }
    }
}
