//! Interactive REPL loop driven from the CLI boundary.
//!
//! [`cruntime_runtime::repl::ReplSession`] is the pure per-turn state
//! machine; this module owns the terminal — reading lines, printing
//! output, and dispatching meta-commands — keeping session state and
//! the interactive command separate.

use cruntime_runtime::context::RuntimeContext;
use cruntime_runtime::repl::{parse_meta_command, MetaCommand, ReplSession, TurnOutcome};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

const PROMPT: &str = "cruntime> ";

pub fn run(ctx: &RuntimeContext) -> i32 {
    let mut session = ReplSession::new(ctx.symbols.clone(), ctx.loader_config.clone(), ctx.prologue.clone());

    let mut editor = match DefaultEditor::new() {
        Ok(e) => e,
        Err(e) => {
            eprintln!("cruntime: failed to start the REPL line editor: {e}");
            return 1;
        }
    };

    println!("cruntime REPL — type :help for commands, :quit to exit");

    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(&line);

                if let Some(meta) = parse_meta_command(trimmed) {
                    if handle_meta(meta, &mut session) {
                        break;
                    }
                    continue;
                }

                match session.accept_line(trimmed) {
                    Ok(TurnOutcome::DefinitionAccepted) => println!("added to global scope"),
                    Ok(TurnOutcome::StatementExecuted(_)) => {}
                    Ok(TurnOutcome::Meta(_)) => {}
                    Err(e) => eprintln!("cruntime: {e}"),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("\n(To exit, type :quit or press Ctrl-D)");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("cruntime: {e}");
                break;
            }
        }
    }

    0
}

/// Returns `true` if the REPL should exit.
fn handle_meta(meta: MetaCommand, session: &mut ReplSession) -> bool {
    match meta {
        MetaCommand::Quit => true,
        MetaCommand::Reset => {
            session.reset();
            println!("session reset");
            false
        }
        MetaCommand::Show => {
            println!("-- global declarations --\n{}", session.global_buffer());
            println!("-- statements --\n{}", session.statement_buffer());
            false
        }
        MetaCommand::Help => {
            println!("Meta-commands:");
            println!("  :quit   exit the REPL");
            println!("  :reset  discard all accumulated declarations and statements");
            println!("  :show   print the current global and statement buffers");
            println!("  :help   show this message");
            false
        }
    }
}
