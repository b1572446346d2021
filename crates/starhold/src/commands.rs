//! Game command interpreter.
//!
//! Implements the player-facing commands on top of the network core's
//! [`CommandHandler`] trait. Handlers run on a worker thread, so the
//! registry is read through its blocking snapshot accessor.

use std::fmt::Write;
use std::sync::Arc;
use std::time::Instant;

use starhold_server::{CommandHandler, CommandReply, SessionId, SessionRegistry};

const HELP_TEXT: &str = "Available commands:\n\
    \x20 help          show this text\n\
    \x20 who           list everyone online\n\
    \x20 say <text>    send a message to everyone online\n\
    \x20 stats         show server statistics\n\
    \x20 quit          disconnect";

pub struct GameCommands {
    registry: Arc<SessionRegistry>,
    started: Instant,
}

impl GameCommands {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            started: Instant::now(),
        }
    }

    fn who(&self) -> CommandReply {
        let sessions = self.registry.blocking_snapshot_info();
        if sessions.is_empty() {
            return CommandReply::text("Nobody is online.");
        }

        let mut listing = format!("{} online:\n", sessions.len());
        for info in &sessions {
            let _ = writeln!(listing, "  [{}] {}", info.id, info.peer);
        }
        CommandReply::text(listing.trim_end().to_string())
    }

    fn say(&self, session: SessionId, text: &str) -> CommandReply {
        if text.is_empty() {
            return CommandReply::text("Say what?");
        }
        CommandReply::with_broadcast(
            "You say it out loud.",
            format!("[{}] says: {}", session, text),
        )
    }

    fn stats(&self) -> CommandReply {
        let uptime = self.started.elapsed().as_secs();
        let online = self.registry.blocking_snapshot_info().len();
        CommandReply::text(format!(
            "Uptime: {:02}:{:02}:{:02}\nSessions online: {}",
            uptime / 3600,
            (uptime % 3600) / 60,
            uptime % 60,
            online
        ))
    }
}

impl CommandHandler for GameCommands {
    fn execute(&self, session: SessionId, line: &str) -> CommandReply {
        let trimmed = line.trim();
        let (command, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (trimmed, ""),
        };

        match command {
            "help" => CommandReply::text(HELP_TEXT),
            "who" => self.who(),
            "say" => self.say(session, rest),
            "stats" => self.stats(),
            "quit" => CommandReply::closing("Goodbye."),
            _ => CommandReply::text("Unknown command or syntax error. Try 'help'."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commands() -> GameCommands {
        GameCommands::new(Arc::new(SessionRegistry::new()))
    }

    fn caller() -> SessionId {
        SessionId::from_u64(0xa1)
    }

    #[test]
    fn test_help_lists_every_command() {
        let reply = commands().execute(caller(), "help");
        for name in ["help", "who", "say", "stats", "quit"] {
            assert!(reply.text.contains(name), "help is missing {}", name);
        }
        assert!(!reply.disconnect);
    }

    #[test]
    fn test_quit_disconnects() {
        let reply = commands().execute(caller(), "quit");
        assert!(reply.disconnect);
        assert_eq!(reply.text, "Goodbye.");
    }

    #[test]
    fn test_say_broadcasts_with_the_speaker_id() {
        let reply = commands().execute(caller(), "say hello there");
        let broadcast = reply.broadcast.expect("say must broadcast");
        assert_eq!(broadcast, "[a1] says: hello there");
        assert!(!reply.disconnect);
    }

    #[test]
    fn test_say_without_text_asks_for_some() {
        let reply = commands().execute(caller(), "say");
        assert_eq!(reply.text, "Say what?");
        assert!(reply.broadcast.is_none());
    }

    #[test]
    fn test_who_with_nobody_online() {
        let reply = commands().execute(caller(), "who");
        assert_eq!(reply.text, "Nobody is online.");
    }

    #[test]
    fn test_stats_reports_uptime_and_sessions() {
        let reply = commands().execute(caller(), "stats");
        assert!(reply.text.contains("Uptime:"));
        assert!(reply.text.contains("Sessions online: 0"));
    }

    #[test]
    fn test_unknown_command() {
        let reply = commands().execute(caller(), "dance wildly");
        assert!(reply.text.contains("Unknown command"));
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        let reply = commands().execute(caller(), "  quit  ");
        assert!(reply.disconnect);
    }
}
