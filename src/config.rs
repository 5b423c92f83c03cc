//! Process configuration, built once at start and passed to every component.
//!
//! Nothing below `main` reads the environment; [`OutreachConfig::from_lookup`]
//! takes the key/value source explicitly so tests can supply their own.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;

/// Discord's per-message character limit.
pub const CHAT_MESSAGE_LIMIT: usize = 2000;

const DEFAULT_PREFIX: &str = "!outreach";
const DEFAULT_DISCORD_API: &str = "https://discord.com/api/v10";

/// Outbound SMTP settings. Credentials are shared with IMAP.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

/// IMAP settings used to inspect outbound threads.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
}

/// Chat platform bot settings.
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub token: SecretString,
    pub api_base: String,
}

/// Cron expressions for the built-in daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedules {
    pub send: String,
    pub replies: String,
    pub poll: String,
}

impl Default for Schedules {
    fn default() -> Self {
        Self {
            send: "0 0 * * * *".to_string(),
            replies: "0 30 */3 * * *".to_string(),
            poll: "0 */2 * * * *".to_string(),
        }
    }
}

/// Everything the engines and the bridge need to know.
#[derive(Debug, Clone)]
pub struct OutreachConfig {
    pub db_path: PathBuf,
    /// Attempts per send invocation.
    pub max_sends: usize,
    /// Pause between two send attempts.
    pub send_delay: Duration,
    /// When false, every send run is a dry run.
    pub send_enabled: bool,
    pub smtp: Option<SmtpConfig>,
    pub imap: Option<ImapConfig>,
    pub discord: Option<DiscordConfig>,
    pub command_prefix: String,
    /// Channels the bridge polls. Snowflake ids, kept as text.
    pub admin_channel_ids: Vec<String>,
    /// Operators allowed to run mutating commands. Empty means nobody.
    pub allowed_user_ids: Vec<String>,
    pub page_size: usize,
    pub notify_webhook_url: Option<String>,
    pub responsible_user_id: Option<String>,
    pub schedules: Schedules,
}

impl Default for OutreachConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/outreach.db"),
            max_sends: 10,
            send_delay: Duration::from_millis(1500),
            send_enabled: false,
            smtp: None,
            imap: None,
            discord: None,
            command_prefix: DEFAULT_PREFIX.to_string(),
            admin_channel_ids: Vec::new(),
            allowed_user_ids: Vec::new(),
            page_size: 50,
            notify_webhook_url: None,
            responsible_user_id: None,
            schedules: Schedules::default(),
        }
    }
}

impl OutreachConfig {
    /// Build from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key/value source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let smtp = match get("SMTP_HOST") {
            Some(host) => {
                let username = get("SMTP_USER").ok_or_else(|| missing("SMTP_USER", "required when SMTP_HOST is set"))?;
                let password = get("SMTP_PASSWORD")
                    .ok_or_else(|| missing("SMTP_PASSWORD", "required when SMTP_HOST is set"))?;
                Some(SmtpConfig {
                    port: parse_or("SMTP_PORT", get("SMTP_PORT"), 465)?,
                    from_address: get("SENDER_EMAIL").unwrap_or_else(|| username.clone()),
                    host,
                    username,
                    password: SecretString::from(password),
                })
            }
            None => None,
        };

        let imap = match get("IMAP_HOST").or_else(|| {
            smtp.as_ref()
                .map(|s| s.host.replace("smtp", "imap"))
        }) {
            Some(host) => Some(ImapConfig {
                host,
                port: parse_or("IMAP_PORT", get("IMAP_PORT"), 993)?,
            }),
            None => None,
        };

        let discord = get("DISCORD_TOKEN").map(|token| DiscordConfig {
            token: SecretString::from(token),
            api_base: get("DISCORD_API_BASE")
                .unwrap_or_else(|| DEFAULT_DISCORD_API.to_string())
                .trim_end_matches('/')
                .to_string(),
        });

        let page_size: usize = parse_or("BRIDGE_PAGE_SIZE", get("BRIDGE_PAGE_SIZE"), defaults.page_size)?;
        if !(1..=100).contains(&page_size) {
            return Err(ConfigError::InvalidValue {
                key: "BRIDGE_PAGE_SIZE".into(),
                message: format!("{page_size} is outside 1..=100"),
            });
        }

        let schedules = Schedules {
            send: cron_or("SEND_CRON", get("SEND_CRON"), defaults.schedules.send)?,
            replies: cron_or("REPLIES_CRON", get("REPLIES_CRON"), defaults.schedules.replies)?,
            poll: cron_or("POLL_CRON", get("POLL_CRON"), defaults.schedules.poll)?,
        };

        Ok(Self {
            db_path: get("OUTREACH_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            max_sends: parse_or("OUTREACH_MAX_SENDS", get("OUTREACH_MAX_SENDS"), defaults.max_sends)?,
            send_delay: Duration::from_millis(parse_or(
                "OUTREACH_SEND_DELAY_MS",
                get("OUTREACH_SEND_DELAY_MS"),
                1500u64,
            )?),
            send_enabled: parse_bool("OUTREACH_SEND_ENABLED", get("OUTREACH_SEND_ENABLED"), false)?,
            smtp,
            imap,
            discord,
            command_prefix: get("BOT_COMMAND_PREFIX").unwrap_or(defaults.command_prefix),
            admin_channel_ids: parse_id_csv("ADMIN_CHANNEL_IDS", get("ADMIN_CHANNEL_IDS"))?,
            allowed_user_ids: parse_id_csv("ALLOWED_USER_IDS", get("ALLOWED_USER_IDS"))?,
            page_size,
            notify_webhook_url: get("NOTIFY_WEBHOOK_URL"),
            responsible_user_id: get("RESPONSIBLE_USER_ID"),
            schedules,
        })
    }

    /// SMTP settings, or the error naming what is missing.
    pub fn require_smtp(&self) -> Result<&SmtpConfig, ConfigError> {
        self.smtp
            .as_ref()
            .ok_or_else(|| missing("SMTP_HOST", "set SMTP_HOST/SMTP_USER/SMTP_PASSWORD to send mail"))
    }

    /// Chat settings, or the error naming what is missing.
    pub fn require_discord(&self) -> Result<&DiscordConfig, ConfigError> {
        self.discord
            .as_ref()
            .ok_or_else(|| missing("DISCORD_TOKEN", "the command bridge needs a bot token"))
    }

    pub fn is_permitted_channel(&self, channel_id: &str) -> bool {
        self.admin_channel_ids.iter().any(|c| c == channel_id)
    }

    /// Empty allow-list denies everyone.
    pub fn is_allowed_user(&self, user_id: &str) -> bool {
        self.allowed_user_ids.iter().any(|u| u == user_id)
    }

    /// Human-readable summary with credentials reduced to yes/no.
    pub fn summary(&self) -> String {
        let yes_no = |b: bool| if b { "yes" } else { "no" };
        let smtp_ok = self
            .smtp
            .as_ref()
            .is_some_and(|s| !s.password.expose_secret().is_empty());
        let list = |ids: &[String], empty: &str| {
            if ids.is_empty() {
                empty.to_string()
            } else {
                ids.join(",")
            }
        };

        format!(
            "Outreach config\n\
             db_path={}\n\
             sender_email={}\n\
             smtp_configured={} imap_configured={} send_enabled={}\n\
             max_sends={} send_delay_ms={}\n\
             discord_configured={} command_prefix={}\n\
             admin_channels={}\n\
             allowed_users={}\n\
             notify_webhook={} responsible_user={}\n\
             schedules: send=`{}` replies=`{}` poll=`{}`",
            self.db_path.display(),
            self.smtp.as_ref().map_or("missing", |s| s.from_address.as_str()),
            yes_no(smtp_ok),
            yes_no(self.imap.is_some()),
            yes_no(self.send_enabled),
            self.max_sends,
            self.send_delay.as_millis(),
            yes_no(self.discord.is_some()),
            self.command_prefix,
            list(&self.admin_channel_ids, "NONE"),
            list(&self.allowed_user_ids, "NONE"),
            yes_no(self.notify_webhook_url.is_some()),
            self.responsible_user_id.as_deref().unwrap_or("none"),
            self.schedules.send,
            self.schedules.replies,
            self.schedules.poll,
        )
    }
}

fn missing(key: &str, hint: &str) -> ConfigError {
    ConfigError::MissingRequired {
        key: key.to_string(),
        hint: hint.to_string(),
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("`{value}`: {e}"),
        }),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = raw else {
        return Ok(default);
    };
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("`{value}` is not a boolean"),
        }),
    }
}

/// Comma-separated snowflake ids. Kept as text; only digits are accepted.
fn parse_id_csv(key: &str, raw: Option<String>) -> Result<Vec<String>, ConfigError> {
    let Some(value) = raw else {
        return Ok(Vec::new());
    };
    let mut ids = Vec::new();
    for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !item.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("invalid numeric id `{item}`"),
            });
        }
        if !ids.iter().any(|id| id == item) {
            ids.push(item.to_string());
        }
    }
    Ok(ids)
}

fn cron_or(key: &str, raw: Option<String>, default: String) -> Result<String, ConfigError> {
    let expr = raw.unwrap_or(default);
    cron::Schedule::from_str(&expr).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("invalid cron `{expr}`: {e}"),
    })?;
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = OutreachConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.max_sends, 10);
        assert_eq!(config.command_prefix, "!outreach");
        assert!(!config.send_enabled);
        assert!(config.smtp.is_none());
        assert!(config.imap.is_none());
        assert!(config.notify_webhook_url.is_none());
        assert!(config.allowed_user_ids.is_empty());
        assert_eq!(config.schedules, Schedules::default());
    }

    #[test]
    fn smtp_and_derived_imap() {
        let config = OutreachConfig::from_lookup(lookup(&[
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_USER", "ops@example.com"),
            ("SMTP_PASSWORD", "hunter2"),
        ]))
        .unwrap();
        let smtp = config.require_smtp().unwrap();
        assert_eq!(smtp.port, 465);
        assert_eq!(smtp.from_address, "ops@example.com");
        let imap = config.imap.unwrap();
        assert_eq!(imap.host, "imap.example.com");
        assert_eq!(imap.port, 993);
    }

    #[test]
    fn smtp_host_without_password_is_missing_required() {
        let err = OutreachConfig::from_lookup(lookup(&[
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_USER", "ops@example.com"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "SMTP_PASSWORD"));
    }

    #[test]
    fn id_lists_are_validated_and_deduplicated() {
        let config = OutreachConfig::from_lookup(lookup(&[
            ("ALLOWED_USER_IDS", " 111, 222 ,111,"),
            ("ADMIN_CHANNEL_IDS", "1152921504606846977"),
        ]))
        .unwrap();
        assert_eq!(config.allowed_user_ids, vec!["111", "222"]);
        assert!(config.is_allowed_user("222"));
        assert!(!config.is_allowed_user("333"));
        assert!(config.is_permitted_channel("1152921504606846977"));

        let err = OutreachConfig::from_lookup(lookup(&[("ALLOWED_USER_IDS", "111,abc")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "ALLOWED_USER_IDS"));
    }

    #[test]
    fn empty_allow_list_denies_everyone() {
        let config = OutreachConfig::default();
        assert!(!config.is_allowed_user("111"));
    }

    #[test]
    fn invalid_numbers_and_booleans_are_rejected() {
        assert!(OutreachConfig::from_lookup(lookup(&[("OUTREACH_MAX_SENDS", "ten")])).is_err());
        assert!(OutreachConfig::from_lookup(lookup(&[("OUTREACH_SEND_ENABLED", "maybe")])).is_err());
        assert!(OutreachConfig::from_lookup(lookup(&[("BRIDGE_PAGE_SIZE", "500")])).is_err());

        let config = OutreachConfig::from_lookup(lookup(&[("OUTREACH_SEND_ENABLED", "YES")])).unwrap();
        assert!(config.send_enabled);
    }

    #[test]
    fn invalid_cron_is_rejected() {
        let err = OutreachConfig::from_lookup(lookup(&[("POLL_CRON", "every minute")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "POLL_CRON"));
    }

    #[test]
    fn summary_hides_secrets() {
        let config = OutreachConfig::from_lookup(lookup(&[
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_USER", "ops@example.com"),
            ("SMTP_PASSWORD", "hunter2"),
            ("DISCORD_TOKEN", "bot-token-value"),
        ]))
        .unwrap();
        let summary = config.summary();
        assert!(summary.contains("smtp_configured=yes"));
        assert!(summary.contains("discord_configured=yes"));
        assert!(!summary.contains("hunter2"));
        assert!(!summary.contains("bot-token-value"));
    }

    #[test]
    fn missing_discord_is_reported() {
        let err = OutreachConfig::default().require_discord().unwrap_err();
        assert!(err.to_string().contains("DISCORD_TOKEN"));
    }

    #[test]
    fn missing_smtp_is_reported() {
        let err = OutreachConfig::default().require_smtp().unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "SMTP_HOST"));
    }
}
