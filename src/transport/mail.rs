//! Outbound mail over SMTP (lettre) and thread inspection over IMAP.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{ImapConfig, SmtpConfig};
use crate::error::TransportError;
use crate::transport::imap::ImapSession;
use crate::transport::{MailTransport, OutboundMail, SentMail, ThreadInfo};

/// SMTP sender plus optional IMAP reader sharing the same credentials.
#[derive(Debug, Clone)]
pub struct MailClient {
    smtp: SmtpConfig,
    imap: Option<ImapConfig>,
}

impl MailClient {
    pub fn new(smtp: SmtpConfig, imap: Option<ImapConfig>) -> Self {
        Self { smtp, imap }
    }

    fn send_blocking(smtp: &SmtpConfig, message: Message) -> Result<(), TransportError> {
        let creds = Credentials::new(
            smtp.username.clone(),
            smtp.password.expose_secret().to_string(),
        );

        // 465 is implicit TLS; anything else upgrades with STARTTLS.
        let builder = if smtp.port == 465 {
            SmtpTransport::relay(&smtp.host)
        } else {
            SmtpTransport::starttls_relay(&smtp.host)
        }
        .map_err(|e| send_failed(format!("SMTP relay error: {e}")))?;

        let transport = builder.port(smtp.port).credentials(creds).build();
        transport
            .send(&message)
            .map_err(|e| send_failed(format!("SMTP send failed: {e}")))?;
        Ok(())
    }
}

fn send_failed(reason: String) -> TransportError {
    TransportError::SendFailed {
        transport: "smtp".into(),
        reason,
    }
}

fn fetch_failed(reason: String) -> TransportError {
    TransportError::FetchFailed {
        transport: "imap".into(),
        reason,
    }
}

/// A fresh RFC 5322 Message-ID in the sender's domain.
pub fn new_message_id(from_address: &str) -> String {
    let domain = from_address
        .rsplit_once('@')
        .map(|(_, d)| d.trim_end_matches('>'))
        .filter(|d| !d.is_empty())
        .unwrap_or("localhost");
    format!("<{}@{}>", Uuid::new_v4(), domain)
}

/// Build the outbound message. Follow-up touches thread onto `thread_reference`.
pub fn build_message(
    from_address: &str,
    mail: &OutboundMail,
    message_id: &str,
) -> Result<Message, TransportError> {
    let from = from_address
        .parse()
        .map_err(|e| send_failed(format!("Invalid from address: {e}")))?;
    let reply_to = from_address
        .parse()
        .map_err(|e| send_failed(format!("Invalid from address: {e}")))?;
    let to = mail
        .to
        .parse()
        .map_err(|e| send_failed(format!("Invalid to address: {e}")))?;

    let mut builder = Message::builder()
        .from(from)
        .reply_to(reply_to)
        .to(to)
        .subject(mail.subject.clone())
        .message_id(Some(message_id.to_string()))
        .header(ContentType::TEXT_PLAIN);

    if let Some(thread) = mail.thread_reference.as_deref().filter(|t| !t.is_empty()) {
        builder = builder
            .in_reply_to(thread.to_string())
            .references(thread.to_string());
    }

    builder
        .body(mail.body.clone())
        .map_err(|e| send_failed(format!("Failed to build email: {e}")))
}

#[async_trait]
impl MailTransport for MailClient {
    async fn send(&self, mail: OutboundMail) -> Result<SentMail, TransportError> {
        let message_id = new_message_id(&self.smtp.from_address);
        let message = build_message(&self.smtp.from_address, &mail, &message_id)?;
        let thread_id = mail
            .thread_reference
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| message_id.clone());

        let smtp = self.smtp.clone();
        tokio::task::spawn_blocking(move || Self::send_blocking(&smtp, message))
            .await
            .map_err(|e| send_failed(format!("SMTP task panicked: {e}")))??;

        info!(to = %mail.to, message_id = %message_id, "Email sent");
        Ok(SentMail {
            message_id,
            thread_id,
        })
    }

    /// Count = the outbound message plus every INBOX message referencing it.
    ///
    /// This cannot tell an inbound reply from a second outbound message that
    /// lands in the INBOX with the same references.
    async fn fetch_thread(&self, thread_id: &str) -> Result<ThreadInfo, TransportError> {
        self.fetch_threads(&[thread_id.to_string()])
            .await
            .pop()
            .unwrap_or_else(|| Err(fetch_failed("no result for thread".into())))
    }

    /// Every thread is counted over one IMAP session. A failed login fails
    /// every thread; a failed search fails only its own.
    async fn fetch_threads(&self, thread_ids: &[String]) -> Vec<Result<ThreadInfo, TransportError>> {
        if thread_ids.is_empty() {
            return Vec::new();
        }
        let Some(imap) = self.imap.clone() else {
            return thread_ids
                .iter()
                .map(|_| {
                    Err(TransportError::Disabled {
                        transport: "imap".into(),
                        reason: "IMAP_HOST is not configured".into(),
                    })
                })
                .collect();
        };
        let username = self.smtp.username.clone();
        let password = self.smtp.password.expose_secret().to_string();
        let threads = thread_ids.to_vec();

        let outcome = tokio::task::spawn_blocking(move || {
            let mut session = ImapSession::login(&imap.host, imap.port, &username, &password)
                .map_err(|e| e.to_string())?;
            session.examine_inbox().map_err(|e| e.to_string())?;
            let hits: Vec<Result<usize, String>> = threads
                .iter()
                .map(|thread| session.count_references(thread).map_err(|e| e.to_string()))
                .collect();
            session.logout();
            Ok::<_, String>(hits)
        })
        .await
        .map_err(|e| format!("IMAP task panicked: {e}"))
        .and_then(|inner| inner);

        match outcome {
            Ok(hits) => thread_ids
                .iter()
                .zip(hits)
                .map(|(thread, hits)| {
                    let hits = hits.map_err(fetch_failed)?;
                    debug!(thread = %thread, replies = hits, "Thread inspected");
                    Ok(ThreadInfo {
                        message_count: 1 + hits,
                    })
                })
                .collect(),
            Err(reason) => thread_ids
                .iter()
                .map(|_| Err(fetch_failed(reason.clone())))
                .collect(),
        }
    }
}
