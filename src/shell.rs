use rustyline::{Editor, Helper, Config, error::ReadlineError, Context};
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use std::sync::Arc;

use crate::registry::ProcessRegistry;

/*
    @@@
    @CmdCompleter;
    . Drops CmdCompleter into 'rl.set_helper(Some(...))' and get instant, prefix-based command completion.
    . Plugs into rustyline to provide simple tab-completion based on a fixed list of command names.
*/
struct CmdCompleter {
    commands: Vec<String>,
}
impl Helper for CmdCompleter {}
impl Hinter for CmdCompleter {
    type Hint = String;
}
impl Highlighter for CmdCompleter {}
impl Validator for CmdCompleter {}
impl Completer for CmdCompleter {
    type Candidate = Pair;
    fn complete(&self, line: &str, _pos: usize, _ctx: &Context<'_>) -> Result<(usize, Vec<Pair>), ReadlineError> {
        let mut matches = Vec::new();
        for cmd in &self.commands {
            if cmd.starts_with(line) {
                matches.push(Pair {
                    display: cmd.clone(),
                    replacement: cmd.clone(),
                });
            }
        }
        Ok((0, matches))
    }
}

/*
    @@@
    @run_console();
    . Console mode: drives a live registry interactively, outside the service host.
    . 'status' lists each watcher with its PID and liveness, 'purge' stops everything.
    . 'exit' (or Ctrl-C / Ctrl-D) purges the registry before returning, so no child is left behind.
*/
pub async fn run_console(registry: Arc<ProcessRegistry>) -> rustyline::Result<()> {
    let config = Config::builder().build();
    let mut rl = Editor::with_config(config)?;
    rl.set_helper(Some(CmdCompleter {
        commands: vec!["status", "purge", "exit"].into_iter().map(String::from).collect(),
    }));
    let _ = rl.load_history("logs/history.txt");

    loop {
        let line = rl.readline("warden> ");
        match line {
            Ok(line) => {
                let input = line.trim();
                rl.add_history_entry(input)?;
                match input {
                    "status" => {
                        let mut count = 0;
                        registry
                            .for_each(|watcher| {
                                println!(
                                    "[{}] pid={} running={} command=`{}`",
                                    count,
                                    watcher.pid().unwrap_or(0),
                                    watcher.is_running(),
                                    watcher.config().map(|c| c.command.as_str()).unwrap_or(""),
                                );
                                count += 1;
                            })
                            .await;
                        if count == 0 {
                            println!("no managed processes");
                        }
                    }
                    "purge" => {
                        registry.purge_all().await;
                        println!("all processes stopped");
                    }
                    "exit" => break,
                    "" => {}
                    other => println!("Unknown command: {}", other),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    registry.purge_all().await;
    rl.save_history("logs/history.txt")?;
    Ok(())
}
