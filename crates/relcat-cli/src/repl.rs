//! Interactive REPL implementation.

use crate::commands::{self, CommandResult};
use crate::completer::RelcatHelper;
use crate::executor::Session;
use crate::formatter::{self, OutputFormat};
use rustyline::error::ReadlineError;
use rustyline::history::{DefaultHistory, History};
use rustyline::{Config, Editor};
use std::path::PathBuf;

/// Get the history file path.
fn history_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".relcat_history")
}

fn prompt(session: &Session) -> &'static str {
    if session.is_aborted() {
        "relcat!> "
    } else if session.in_transaction() {
        "relcat*> "
    } else {
        "relcat> "
    }
}

/// Run the interactive REPL.
pub fn run(mut session: Session, initial_format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let mut format = initial_format;

    let rl_config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();

    let mut rl: Editor<RelcatHelper, DefaultHistory> = Editor::with_config(rl_config)?;
    rl.set_helper(Some(RelcatHelper::new()));

    let hist_path = history_path();
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    println!("relcat - Type .help for commands, .exit to quit\n");

    loop {
        match rl.readline(prompt(&session)) {
            Ok(line) => {
                let line = line.trim();

                if line.is_empty() {
                    continue;
                }

                if commands::is_command(line) {
                    match commands::handle_command(line, &session, format) {
                        CommandResult::Exit => {
                            println!("Goodbye!");
                            break;
                        }
                        CommandResult::Output(msg) => {
                            println!("{}", msg);
                        }
                        CommandResult::SetFormat(fmt) => {
                            format = fmt;
                            println!("Output format set to {}", format);
                        }
                        CommandResult::ShowHistory => {
                            let history = rl.history();
                            let len = history.len();
                            let start = len.saturating_sub(20);
                            for (i, entry) in history.iter().skip(start).enumerate() {
                                println!("{:4}  {}", start + i + 1, entry);
                            }
                        }
                        CommandResult::Clear => {
                            // ANSI clear screen
                            print!("\x1B[2J\x1B[1;1H");
                        }
                    }
                    continue;
                }

                let formatter = formatter::create_formatter(format);
                for statement in crate::statement::split_statements(line) {
                    match session.execute(&statement, &*formatter) {
                        Ok(output) => {
                            if !output.is_empty() {
                                println!("{}", output);
                            }
                        }
                        Err(e) => {
                            println!("{}", formatter.format_error(&e.to_string()));
                        }
                    }
                }

                if let Some(helper) = rl.helper_mut() {
                    helper.set_objects(session.object_names());
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    let _ = rl.save_history(&hist_path);

    Ok(())
}
