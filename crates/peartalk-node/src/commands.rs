//! Line commands read from stdin.

use thiserror::Error;

use peartalk_core::{ChatCore, CoreError};
use peartalk_shared::{Message, OutgoingMessage};

pub const HELP: &str = "\
/join <peer>            join the conversation with <peer>
/leave <peer>           leave the conversation with <peer>
/send <peer> <text>     send a text message
/history <peer> [n]     show the last n messages
/peers                  list peers with a live session
/quit                   disconnect and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join(String),
    Leave(String),
    Send { to: String, text: String },
    History { peer: String, limit: Option<usize> },
    Peers,
    Quit,
    Help,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: {0} (try /help)")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Not a number: {0}")]
    InvalidNumber(String),
}

/// Whether the input loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

impl Command {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word {
            "/join" => Command::Join(single_arg(rest, "/join <peer>")?),
            "/leave" => Command::Leave(single_arg(rest, "/leave <peer>")?),
            "/send" => {
                let usage = "/send <peer> <text>";
                let (to, text) = rest
                    .split_once(char::is_whitespace)
                    .ok_or(CommandError::Usage(usage))?;
                let text = text.trim();
                if text.is_empty() {
                    return Err(CommandError::Usage(usage));
                }
                Command::Send {
                    to: to.to_string(),
                    text: text.to_string(),
                }
            }
            "/history" => {
                let mut args = rest.split_whitespace();
                let peer = args
                    .next()
                    .ok_or(CommandError::Usage("/history <peer> [n]"))?;
                let limit = match args.next() {
                    Some(n) => Some(
                        n.parse::<usize>()
                            .map_err(|_| CommandError::InvalidNumber(n.to_string()))?,
                    ),
                    None => None,
                };
                Command::History {
                    peer: peer.to_string(),
                    limit,
                }
            }
            "/peers" => Command::Peers,
            "/quit" | "/exit" => Command::Quit,
            "/help" => Command::Help,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

fn single_arg(rest: &str, usage: &'static str) -> Result<String, CommandError> {
    let mut args = rest.split_whitespace();
    match (args.next(), args.next()) {
        (Some(arg), None) => Ok(arg.to_string()),
        _ => Err(CommandError::Usage(usage)),
    }
}

pub fn format_message(message: &Message) -> String {
    format!(
        "[{}] {} -> {}: {}",
        message.timestamp,
        message.sender,
        message.recipient,
        message.body.content()
    )
}

/// Run `command` against `core`, printing its result.
pub fn execute(core: &mut ChatCore, command: Command) -> Result<Flow, CoreError> {
    match command {
        Command::Join(peer) => {
            let topic = core.join_chat(&peer)?;
            println!("joined conversation with {peer} ({})", topic.short());
        }
        Command::Leave(peer) => {
            if core.leave_chat(&peer)? {
                println!("left conversation with {peer}");
            } else {
                println!("not in a conversation with {peer}");
            }
        }
        Command::Send { to, text } => {
            let message = core.send_message(OutgoingMessage::text(to, text))?;
            if !core.is_peer_connected(&message.recipient) {
                println!(
                    "{} is offline, message queued ({} pending)",
                    message.recipient,
                    core.pending_for(&message.recipient)
                );
            }
        }
        Command::History { peer, limit } => {
            let messages = core.get_messages(&peer, limit)?;
            if messages.is_empty() {
                println!("no messages with {peer}");
            }
            for message in &messages {
                println!("{}", format_message(message));
            }
        }
        Command::Peers => {
            let peers = core.connected_peers();
            if peers.is_empty() {
                println!("no live sessions");
            }
            for peer in peers {
                println!("{}", peer.short());
            }
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}
