//! Chat command grammar: prefix matching, classification, argument parsing.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CommandError;

/// Rows listed by `queue` and `next` when no count is given.
pub const DEFAULT_LIST_LIMIT: usize = 5;
/// Upper bound on rows listed by `queue` and `next`.
pub const MAX_LIST_LIMIT: usize = 20;

static SEQUENCE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex"));

/// Who may run a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Anyone in a permitted channel.
    ReadOnly,
    /// Allow-listed operators only.
    Mutating,
}

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Status,
    Queue { limit: usize },
    Row { sequence: String },
    Next { limit: usize },
    Approve(Vec<String>),
    Reject(Vec<String>),
    Unlock(Vec<String>),
    Lock(Vec<String>),
    RunSend { dry_run: bool },
    RunReplies,
}

/// Command name and raw arguments of one prefixed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Lowercased.
    pub name: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// Split the text after the prefix. `None` for a bare prefix.
    pub fn parse(rest: &str) -> Option<Self> {
        let mut tokens = rest.split_whitespace();
        let name = tokens.next()?.to_lowercase();
        Some(Self {
            name,
            args: tokens.map(str::to_string).collect(),
        })
    }
}

/// Text after `prefix` if `content` is a command.
///
/// The prefix matches case-insensitively and must be followed by whitespace
/// or the end of the message, so `!outreachx` is not a command.
pub fn strip_prefix<'a>(content: &'a str, prefix: &str) -> Option<&'a str> {
    let content = content.trim_start();
    let head = content.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    let rest = &content[prefix.len()..];
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() => Some(rest.trim()),
        Some(_) => None,
    }
}

/// Access class of a command name, or `None` if the name is unknown.
pub fn access(name: &str) -> Option<Access> {
    match name {
        "help" | "status" | "queue" | "row" | "show" | "next" => Some(Access::ReadOnly),
        "approve" | "reject" | "unlock" | "lock" | "run-send" | "send" | "run-replies"
        | "replies" => Some(Access::Mutating),
        _ => None,
    }
}

impl Command {
    /// Parse the arguments of a known command.
    pub fn parse(invocation: &Invocation, prefix: &str) -> Result<Self, CommandError> {
        let name = invocation.name.as_str();
        let args = invocation.args.as_slice();
        let parse_error = |reason: String| CommandError::Parse {
            reason,
            usage: usage(name, prefix),
        };

        match name {
            "help" => Ok(Self::Help),
            "status" => Ok(Self::Status),
            "queue" => Ok(Self::Queue {
                limit: parse_limit(args).map_err(parse_error)?,
            }),
            "next" => Ok(Self::Next {
                limit: parse_limit(args).map_err(parse_error)?,
            }),
            "row" | "show" => {
                let Some(sequence) = args.first() else {
                    return Err(parse_error("Missing sequence id".into()));
                };
                if !SEQUENCE_TOKEN.is_match(sequence) {
                    return Err(parse_error(format!("Invalid sequence id `{sequence}`")));
                }
                Ok(Self::Row {
                    sequence: sequence.clone(),
                })
            }
            "approve" => Ok(Self::Approve(parse_sequences(args).map_err(parse_error)?)),
            "reject" => Ok(Self::Reject(parse_sequences(args).map_err(parse_error)?)),
            "unlock" => Ok(Self::Unlock(parse_sequences(args).map_err(parse_error)?)),
            "lock" => Ok(Self::Lock(parse_sequences(args).map_err(parse_error)?)),
            "run-send" | "send" => match args.first().map(|a| a.to_lowercase()).as_deref() {
                None => Ok(Self::RunSend { dry_run: false }),
                Some("dry" | "dry-run" | "--dry-run") => Ok(Self::RunSend { dry_run: true }),
                Some(other) => Err(parse_error(format!("Unexpected argument `{other}`"))),
            },
            "run-replies" | "replies" => Ok(Self::RunReplies),
            other => Err(CommandError::UnknownCommand(other.to_string())),
        }
    }

    /// Canonical command name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Status => "status",
            Self::Queue { .. } => "queue",
            Self::Row { .. } => "row",
            Self::Next { .. } => "next",
            Self::Approve(_) => "approve",
            Self::Reject(_) => "reject",
            Self::Unlock(_) => "unlock",
            Self::Lock(_) => "lock",
            Self::RunSend { .. } => "run-send",
            Self::RunReplies => "run-replies",
        }
    }
}

fn parse_limit(args: &[String]) -> Result<usize, String> {
    let Some(raw) = args.first() else {
        return Ok(DEFAULT_LIST_LIMIT);
    };
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n.min(MAX_LIST_LIMIT)),
        _ => Err(format!("`{raw}` is not a positive number")),
    }
}

/// Comma-separated ids, possibly spread over several arguments. Order kept, duplicates dropped.
fn parse_sequences(args: &[String]) -> Result<Vec<String>, String> {
    let joined = args.join(",");
    let mut sequences: Vec<String> = Vec::new();
    for token in joined.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if !SEQUENCE_TOKEN.is_match(token) {
            return Err(format!("Invalid sequence id `{token}`"));
        }
        if !sequences.iter().any(|s| s == token) {
            sequences.push(token.to_string());
        }
    }
    if sequences.is_empty() {
        return Err("No sequence ids given".into());
    }
    Ok(sequences)
}

/// Usage line for one command.
pub fn usage(name: &str, prefix: &str) -> String {
    let args = match name {
        "queue" | "next" => " [N]",
        "row" | "show" => " <sequence>",
        "approve" | "reject" | "unlock" | "lock" => " <seq,seq,...>",
        "run-send" | "send" => " [dry]",
        _ => "",
    };
    format!("`{prefix} {name}{args}`")
}

/// The `help` reply.
pub fn help_text(prefix: &str) -> String {
    format!(
        "**Outreach commands**\n\
         Read-only:\n\
         `{prefix} status` roster counts\n\
         `{prefix} queue [N]` first N rows by sequence (default {DEFAULT_LIST_LIMIT}, max {MAX_LIST_LIMIT})\n\
         `{prefix} row <sequence>` one row in detail\n\
         `{prefix} next [N]` approved, unlocked rows waiting on a send\n\
         Operators only:\n\
         `{prefix} approve <seq,seq,...>` / `reject` / `unlock` / `lock`\n\
         `{prefix} run-send [dry]` run the send engine now\n\
         `{prefix} run-replies` run reply sync now"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(text: &str) -> Invocation {
        Invocation::parse(text).unwrap()
    }

    fn parse(text: &str) -> Result<Command, CommandError> {
        Command::parse(&invocation(text), "!outreach")
    }

    #[test]
    fn prefix_is_case_insensitive_and_word_bounded() {
        assert_eq!(strip_prefix("!outreach status", "!outreach"), Some("status"));
        assert_eq!(strip_prefix("  !OUTREACH   queue 3 ", "!outreach"), Some("queue 3"));
        assert_eq!(strip_prefix("!outreach", "!outreach"), Some(""));
        assert_eq!(strip_prefix("!outreachx status", "!outreach"), None);
        assert_eq!(strip_prefix("hello !outreach status", "!outreach"), None);
        assert_eq!(strip_prefix("!out", "!outreach"), None);
    }

    #[test]
    fn invocation_lowercases_name_only() {
        let inv = invocation("APPROVE A1,b2");
        assert_eq!(inv.name, "approve");
        assert_eq!(inv.args, vec!["A1,b2"]);
        assert!(Invocation::parse("   ").is_none());
    }

    #[test]
    fn classification() {
        assert_eq!(access("status"), Some(Access::ReadOnly));
        assert_eq!(access("show"), Some(Access::ReadOnly));
        assert_eq!(access("approve"), Some(Access::Mutating));
        assert_eq!(access("replies"), Some(Access::Mutating));
        assert_eq!(access("delete"), None);
    }

    #[test]
    fn list_limits_default_and_cap() {
        assert_eq!(parse("queue").unwrap(), Command::Queue { limit: 5 });
        assert_eq!(parse("queue 7").unwrap(), Command::Queue { limit: 7 });
        assert_eq!(parse("next 500").unwrap(), Command::Next { limit: 20 });

        let err = parse("queue zero").unwrap_err();
        assert_eq!(
            err.to_string(),
            "`zero` is not a positive number. Usage: `!outreach queue [N]`"
        );
        assert!(parse("next 0").is_err());
    }

    #[test]
    fn batch_ids_join_split_and_dedupe() {
        assert_eq!(
            parse("approve 3,7,99").unwrap(),
            Command::Approve(vec!["3".into(), "7".into(), "99".into()])
        );
        assert_eq!(
            parse("lock 3, 7 3,,").unwrap(),
            Command::Lock(vec!["3".into(), "7".into()])
        );
    }

    #[test]
    fn malformed_batch_is_parse_error() {
        let err = parse("unlock 3,7;drop").unwrap_err();
        assert!(matches!(err, CommandError::Parse { .. }));
        assert!(err.to_string().contains("Invalid sequence id `7;drop`"));

        let err = parse("reject").unwrap_err();
        assert!(err.to_string().starts_with("No sequence ids given"));
    }

    #[test]
    fn row_needs_an_id() {
        assert_eq!(
            parse("show 12").unwrap(),
            Command::Row {
                sequence: "12".into()
            }
        );
        assert!(parse("row").is_err());
    }

    #[test]
    fn run_send_dry_flag() {
        assert_eq!(parse("run-send").unwrap(), Command::RunSend { dry_run: false });
        assert_eq!(parse("send DRY").unwrap(), Command::RunSend { dry_run: true });
        assert!(parse("run-send now").is_err());
        assert_eq!(parse("replies").unwrap(), Command::RunReplies);
    }

    #[test]
    fn help_mentions_prefix() {
        let help = help_text("!ops");
        assert!(help.contains("`!ops status`"));
        assert!(help.contains("`!ops run-replies`"));
    }
}
