//! Minimal IMAP over TLS, just enough to count replies in a thread.
//!
//! Blocking; callers run it inside `spawn_blocking`.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};

/// Error type for the blocking IMAP session.
pub type ImapError = Box<dyn std::error::Error + Send + Sync>;

type TlsStream = StreamOwned<ClientConnection, TcpStream>;

/// An authenticated IMAP session. Command tags are generated in sequence.
pub struct ImapSession {
    tls: TlsStream,
    next_tag: u32,
}

impl ImapSession {
    /// Connect, read the greeting, and log in.
    pub fn login(host: &str, port: u16, username: &str, password: &str) -> Result<Self, ImapError> {
        let tcp = TcpStream::connect((host, port))?;
        tcp.set_read_timeout(Some(Duration::from_secs(30)))?;

        let mut root_store = RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = ServerName::try_from(host.to_string())?;
        let conn = ClientConnection::new(tls_config, server_name)?;

        let mut session = Self {
            tls: StreamOwned::new(conn, tcp),
            next_tag: 1,
        };
        let _greeting = session.read_line()?;

        let resp = session.command(&format!("LOGIN {} {}", quote(username), quote(password)))?;
        if !is_ok(&resp) {
            return Err("IMAP login failed".into());
        }
        Ok(session)
    }

    fn read_line(&mut self) -> Result<String, ImapError> {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.tls.read(&mut byte) {
                Ok(0) => return Err("IMAP connection closed".into()),
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).to_string());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Send one tagged command and collect every line up to its tagged status.
    pub fn command(&mut self, cmd: &str) -> Result<Vec<String>, ImapError> {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;

        self.tls.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        self.tls.flush()?;

        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            let done = line.starts_with(&format!("{tag} "));
            lines.push(line);
            if done {
                return Ok(lines);
            }
        }
    }

    /// Open INBOX read-only. Required once before [`Self::count_references`].
    pub fn examine_inbox(&mut self) -> Result<(), ImapError> {
        let select = self.command("EXAMINE \"INBOX\"")?;
        if !is_ok(&select) {
            return Err("IMAP EXAMINE INBOX failed".into());
        }
        Ok(())
    }

    /// Number of INBOX messages whose threading headers name `message_id`.
    pub fn count_references(&mut self, message_id: &str) -> Result<usize, ImapError> {
        let resp = self.command(&search_command(message_id))?;
        if !is_ok(&resp) {
            return Err("IMAP SEARCH failed".into());
        }
        Ok(parse_search_ids(&resp).len())
    }

    pub fn logout(mut self) {
        let _ = self.command("LOGOUT");
    }
}

/// Quote a string as an IMAP quoted literal.
pub fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// `SEARCH` matching either threading header.
pub fn search_command(message_id: &str) -> String {
    let id = quote(message_id);
    format!("SEARCH OR HEADER \"References\" {id} HEADER \"In-Reply-To\" {id}")
}

/// Sequence numbers from the untagged `* SEARCH` lines of a response.
pub fn parse_search_ids(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| line.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace().map(str::to_string))
        .collect()
}

/// Whether the tagged status line (the last one) reports OK.
fn is_ok(lines: &[String]) -> bool {
    lines
        .last()
        .and_then(|l| l.split_whitespace().nth(1))
        .is_some_and(|status| status.eq_ignore_ascii_case("OK"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|l| format!("{l}\r\n")).collect()
    }

    #[test]
    fn quote_escapes_specials() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote(r#"pa"ss\word"#), r#""pa\"ss\\word""#);
    }

    #[test]
    fn search_names_both_headers() {
        let cmd = search_command("<abc@example.com>");
        assert_eq!(
            cmd,
            "SEARCH OR HEADER \"References\" \"<abc@example.com>\" HEADER \"In-Reply-To\" \"<abc@example.com>\""
        );
    }

    #[test]
    fn parse_search_collects_ids() {
        let resp = lines(&["* SEARCH 4 9 12", "A3 OK SEARCH completed"]);
        assert_eq!(parse_search_ids(&resp), vec!["4", "9", "12"]);
    }

    #[test]
    fn parse_search_empty_result() {
        let resp = lines(&["* SEARCH", "A3 OK SEARCH completed"]);
        assert!(parse_search_ids(&resp).is_empty());
    }

    #[test]
    fn tagged_status_detection() {
        assert!(is_ok(&lines(&["* OK hi", "A1 OK LOGIN completed"])));
        assert!(!is_ok(&lines(&["A1 NO [AUTHENTICATIONFAILED] bad"])));
        assert!(!is_ok(&[]));
    }
}
