//! Discord REST client for the command bridge.
//!
//! Only two endpoints are used: list channel messages and create message.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};

use crate::config::{CHAT_MESSAGE_LIMIT, DiscordConfig};
use crate::error::TransportError;
use crate::transport::{ChatMessage, ChatTransport};
use crate::util::{split_message, truncate};

const TRANSPORT: &str = "discord";

pub struct DiscordClient {
    client: reqwest::Client,
    api_base: String,
    token: SecretString,
}

impl DiscordClient {
    pub fn new(config: &DiscordConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.clone(),
            token: config.token.clone(),
        }
    }

    fn messages_url(&self, channel_id: &str) -> String {
        format!("{}/channels/{channel_id}/messages", self.api_base)
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.token.expose_secret())
    }
}

/// Map a non-success response onto the transport taxonomy.
async fn status_error(resp: reqwest::Response, fetching: bool) -> TransportError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let reason = format!("{status}: {}", truncate(&body, 300));
    match status {
        StatusCode::TOO_MANY_REQUESTS => TransportError::RateLimited {
            transport: TRANSPORT.into(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TransportError::AuthFailed {
            transport: TRANSPORT.into(),
            reason,
        },
        _ if fetching => TransportError::FetchFailed {
            transport: TRANSPORT.into(),
            reason,
        },
        _ => TransportError::SendFailed {
            transport: TRANSPORT.into(),
            reason,
        },
    }
}

#[async_trait]
impl ChatTransport for DiscordClient {
    async fn fetch_messages(
        &self,
        channel_id: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, TransportError> {
        let mut query = vec![("limit", limit.clamp(1, 100).to_string())];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }

        let resp = self
            .client
            .get(self.messages_url(channel_id))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .query(&query)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(status_error(resp, true).await);
        }

        resp.json::<Vec<ChatMessage>>()
            .await
            .map_err(|e| TransportError::FetchFailed {
                transport: TRANSPORT.into(),
                reason: format!("invalid message list: {e}"),
            })
    }

    /// Long content is split at the platform limit, newline first.
    async fn post_message(&self, channel_id: &str, content: &str) -> Result<(), TransportError> {
        for chunk in split_message(content, CHAT_MESSAGE_LIMIT) {
            let resp = self
                .client
                .post(self.messages_url(channel_id))
                .header(reqwest::header::AUTHORIZATION, self.auth_header())
                .json(&serde_json::json!({ "content": chunk }))
                .send()
                .await?;

            if !resp.status().is_success() {
                return Err(status_error(resp, false).await);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::stub::StubServer;

    fn client(server: &StubServer) -> DiscordClient {
        DiscordClient::new(&DiscordConfig {
            token: SecretString::from("test-token"),
            api_base: server.base.clone(),
        })
    }

    #[tokio::test]
    async fn fetch_passes_cursor_and_parses_authors() {
        let page = serde_json::json!([
            {
                "id": "1152921504606846978",
                "author": {"id": "7", "username": "ops"},
                "content": "!outreach status",
                "timestamp": "2026-02-10T09:00:00+00:00"
            },
            {
                "id": "1152921504606846977",
                "author": {"id": "9", "bot": true},
                "content": "Outreach status"
            }
        ])
        .to_string();
        let server = StubServer::start(&[("/channels/42/messages", 200, &page)]).await;

        let messages = client(&server)
            .fetch_messages("42", Some("1152921504606846976"), 50)
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "1152921504606846978");
        assert!(!messages[0].author.bot);
        assert!(messages[1].author.bot);

        let requests = server.requests().await;
        assert_eq!(requests[0].method, "GET");
        assert!(requests[0].query.contains("after=1152921504606846976"));
        assert!(requests[0].query.contains("limit=50"));
        assert_eq!(requests[0].authorization.as_deref(), Some("Bot test-token"));
    }

    #[tokio::test]
    async fn fetch_maps_rate_limit_and_auth() {
        let server = StubServer::start(&[
            ("/channels/1/messages", 429, "{}"),
            ("/channels/2/messages", 401, r#"{"message": "401: Unauthorized"}"#),
        ])
        .await;

        let discord = client(&server);
        assert!(matches!(
            discord.fetch_messages("1", None, 1).await,
            Err(TransportError::RateLimited { .. })
        ));
        assert!(matches!(
            discord.fetch_messages("2", None, 1).await,
            Err(TransportError::AuthFailed { .. })
        ));
    }

    #[tokio::test]
    async fn post_splits_long_content() {
        let server = StubServer::start(&[]).await;
        let long = format!("{}\n{}", "a".repeat(1500), "b".repeat(1500));
        client(&server).post_message("42", &long).await.unwrap();

        let requests = server.requests().await;
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.method == "POST" && r.path == "/channels/42/messages"));
    }

    #[tokio::test]
    async fn post_sends_content_field() {
        let server = StubServer::start(&[]).await;
        client(&server).post_message("42", "hello").await.unwrap();

        let requests = server.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].json(), serde_json::json!({"content": "hello"}));
    }

    #[tokio::test]
    async fn post_failure_is_send_failed() {
        let server = StubServer::start(&[("/channels/42/messages", 500, "{}")]).await;
        let err = client(&server).post_message("42", "hello").await.unwrap_err();
        assert!(matches!(err, TransportError::SendFailed { .. }));
    }
}
