//! Administrative console on standard input.
//!
//! Reads operator commands line by line and translates them into control
//! channel messages. Console output goes straight to stdout rather than
//! through the logging layer, so the operator sees answers under the
//! prompt they typed at.

use std::io::Write as _;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use starhold_server::{ControlHandle, SessionId, SessionRegistry};

const CONSOLE_HELP: &str = "Console commands:\n\
    \x20 help          show this text\n\
    \x20 wall <text>   broadcast a message to every session\n\
    \x20 pause         pause command handling\n\
    \x20 resume        resume command handling\n\
    \x20 kick <id>     disconnect the session with the given hex id\n\
    \x20 stats         list connected sessions\n\
    \x20 quit          shut the server down";

enum ConsoleAction {
    Continue,
    Quit,
}

/// Run the console until the operator quits.
///
/// Sends Terminate before returning, so the caller only has to join the
/// server task. When stdin closes (detached or piped-in input ran out)
/// the console parks forever instead: shutdown then belongs to the
/// signal handlers.
pub async fn run(control: ControlHandle, registry: Arc<SessionRegistry>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt();
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Console detached (stdin closed)");
                return std::future::pending::<()>().await;
            }
            Err(e) => {
                error!("Console read failed: {}", e);
                return std::future::pending::<()>().await;
            }
        };

        match handle_line(&control, &registry, line.trim()).await {
            Ok(ConsoleAction::Continue) => {}
            Ok(ConsoleAction::Quit) => return,
            Err(e) => {
                // A dead control channel means the server is gone too
                error!("Console command failed: {}", e);
                return;
            }
        }
    }
}

fn prompt() {
    print!("console> ");
    let _ = std::io::stdout().flush();
}

async fn handle_line(
    control: &ControlHandle,
    registry: &SessionRegistry,
    line: &str,
) -> Result<ConsoleAction, starhold_server::ServerError> {
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match command {
        "" => {}
        "help" => println!("{}", CONSOLE_HELP),
        "wall" => {
            if rest.is_empty() {
                println!("Usage: wall <text>");
            } else {
                control.broadcast(rest).await?;
            }
        }
        "pause" => control.pause().await?,
        "resume" => control.resume().await?,
        "kick" => match SessionId::parse_hex(rest) {
            Some(id) => control.remove_session(id).await?,
            None => println!("Usage: kick <hex session id>"),
        },
        "stats" => {
            let sessions = registry.snapshot_info().await;
            println!("{} session(s) connected", sessions.len());
            for info in sessions {
                println!("  [{}] {}", info.id, info.peer);
            }
        }
        "quit" | "shutdown" => {
            control.terminate().await?;
            return Ok(ConsoleAction::Quit);
        }
        _ => println!("Unknown command or syntax error. Try 'help'."),
    }

    Ok(ConsoleAction::Continue)
}
