//! Operator commands typed on the server's stdin.

use std::str::FromStr;
use std::time::Instant;

use protocol::{GameType, Replica, Request, SERVER_PEER_ID};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::SessionCommand;
use crate::scheduler::TimerKind;
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Help,
    List,
    Status,
    /// Open the voting window.
    Start,
    EndVoting,
    EndGame,
    /// Vote as the host player.
    Vote(GameType),
    Say(String),
}

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim().trim_start_matches('/');
        let parts: Vec<&str> = line.splitn(2, ' ').collect();
        let cmd = parts.first().map(|s| s.to_lowercase()).unwrap_or_default();
        let args = parts.get(1).map(|s| s.trim()).unwrap_or("");

        match cmd.as_str() {
            "help" => Ok(ConsoleCommand::Help),
            "list" => Ok(ConsoleCommand::List),
            "status" => Ok(ConsoleCommand::Status),
            "start" => Ok(ConsoleCommand::Start),
            "endvote" | "end-voting" => Ok(ConsoleCommand::EndVoting),
            "endgame" | "end-game" => Ok(ConsoleCommand::EndGame),
            "vote" => args.parse().map(ConsoleCommand::Vote),
            "say" if !args.is_empty() => Ok(ConsoleCommand::Say(args.to_string())),
            "say" => Err("Usage: say <message>".to_string()),
            _ => Err(format!("Unknown command: {cmd}. Type help for help.")),
        }
    }
}

/// Forward stdin lines to the session task until stdin closes.
pub async fn run(commands: mpsc::UnboundedSender<SessionCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match line.parse::<ConsoleCommand>() {
                Ok(command) => {
                    if commands.send(SessionCommand::Console(command)).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("{}", e),
            },
            Ok(None) => break,
            Err(e) => {
                warn!("Console read failed: {}", e);
                break;
            }
        }
    }
}

/// Run one command against the session.
pub fn execute(session: &mut Session, host: &Replica, command: ConsoleCommand, now: Instant) {
    let request = match command {
        ConsoleCommand::Help => {
            info!("Commands: help, list, status, start, endvote, endgame, vote <game>, say <message>");
            return;
        }
        ConsoleCommand::List => {
            for record in session.registry().records() {
                info!(
                    "[{}] {}{}{}",
                    record.peer_id,
                    record.name,
                    if record.in_game { "" } else { " (waiting)" },
                    if record.spawned { "" } else { " (not spawned)" },
                );
            }
            return;
        }
        ConsoleCommand::Status => {
            let tally: Vec<String> = host
                .tally()
                .iter()
                .map(|(game_type, count)| format!("{game_type}: {count}"))
                .collect();
            info!(
                "Phase: {} | Game: {} | Players: {} | Tagger: {:?} | Votes: [{}]",
                session.phase(),
                session.game_type(),
                session.registry().len(),
                host.tagger(),
                tally.join(", ")
            );
            if let Some(left) = session.scheduler().remaining(TimerKind::VotingWindow, now) {
                info!("Voting closes in {}s", left.as_secs());
            }
            return;
        }
        ConsoleCommand::Say(text) => {
            session.announce(text);
            return;
        }
        ConsoleCommand::Start => Request::StartVoting,
        ConsoleCommand::EndVoting => Request::EndVotingEarly,
        ConsoleCommand::EndGame => Request::EndGame,
        ConsoleCommand::Vote(game_type) => Request::CastVote { game_type },
    };

    if let Err(e) = session.handle_request(SERVER_PEER_ID, request, now) {
        warn!("Command failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("start".parse(), Ok(ConsoleCommand::Start));
        assert_eq!("/EndGame".parse(), Ok(ConsoleCommand::EndGame));
        assert_eq!(
            "vote hide-and-seek".parse(),
            Ok(ConsoleCommand::Vote(GameType::HideAndSeek))
        );
        assert_eq!(
            "say  hello there ".parse(),
            Ok(ConsoleCommand::Say("hello there".into()))
        );
        assert!("say".parse::<ConsoleCommand>().is_err());
        assert!("vote none".parse::<ConsoleCommand>().is_err());
        assert!("fly".parse::<ConsoleCommand>().is_err());
    }
}
