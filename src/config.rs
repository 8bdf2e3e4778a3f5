use anyhow::{bail, Context, Result};
use lettre::message::Mailbox;
use std::path::PathBuf;

const DEFAULT_MAIL_COMMAND: &str = "msmtp";

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub mail: MailConfig,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub api_id: i32,
    pub api_hash: String,
    pub session_name: String,
    pub target_chat_ids: Vec<i64>,
    /// Only consulted when the stored session is not logged in yet.
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    /// Used as both From and To.
    pub address: Mailbox,
    pub command: String,
}

impl TelegramConfig {
    /// Session file on disk, `<SESSION_NAME>.session`.
    pub fn session_path(&self) -> PathBuf {
        if self.session_name.ends_with(".session") {
            PathBuf::from(&self.session_name)
        } else {
            PathBuf::from(format!("{}.session", self.session_name))
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key).with_context(|| format!("Environment variable {} is not set", key))
        };

        let api_id = required("API_ID")?;
        let api_id: i32 = api_id
            .trim()
            .parse()
            .with_context(|| format!("API_ID must be an integer, got {:?}", api_id))?;

        let api_hash = required("API_HASH")?;
        let session_name = required("SESSION_NAME")?;
        if session_name.trim().is_empty() {
            bail!("SESSION_NAME must not be empty");
        }

        let target_chat_ids = parse_chat_ids(&required("TARGET_CHAT_IDS")?)?;

        let to_email = required("TO_EMAIL")?;
        let address: Mailbox = to_email
            .trim()
            .parse()
            .with_context(|| format!("TO_EMAIL is not a valid email address: {:?}", to_email))?;

        let command = lookup("MAIL_COMMAND")
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MAIL_COMMAND.to_string());

        Ok(Config {
            telegram: TelegramConfig {
                api_id,
                api_hash,
                session_name,
                target_chat_ids,
                phone_number: lookup("PHONE_NUMBER").filter(|p| !p.trim().is_empty()),
            },
            mail: MailConfig { address, command },
        })
    }
}

fn parse_chat_ids(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(|entry| {
            let entry = entry.trim();
            entry.parse::<i64>().with_context(|| {
                format!("TARGET_CHAT_IDS entry {:?} is not an integer chat id", entry)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn base() -> HashMap<String, String> {
        env(&[
            ("API_ID", "123456"),
            ("API_HASH", "0123456789abcdef"),
            ("SESSION_NAME", "relay"),
            ("TARGET_CHAT_IDS", "-1001234567890, 42"),
            ("TO_EMAIL", "me@example.com"),
        ])
    }

    fn load(vars: &HashMap<String, String>) -> Result<Config> {
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_loads_all_fields() {
        let config = load(&base()).unwrap();
        assert_eq!(config.telegram.api_id, 123456);
        assert_eq!(config.telegram.api_hash, "0123456789abcdef");
        assert_eq!(config.telegram.session_name, "relay");
        assert_eq!(config.telegram.target_chat_ids, vec![-1001234567890, 42]);
        assert_eq!(config.mail.address.email.to_string(), "me@example.com");
        assert_eq!(config.mail.command, "msmtp");
        assert!(config.telegram.phone_number.is_none());
    }

    #[test]
    fn test_missing_variables_are_named() {
        for key in ["API_ID", "API_HASH", "SESSION_NAME", "TARGET_CHAT_IDS", "TO_EMAIL"] {
            let mut vars = base();
            vars.remove(key);
            let err = load(&vars).unwrap_err();
            assert!(
                format!("{:#}", err).contains(key),
                "error for missing {} was: {:#}",
                key,
                err
            );
        }
    }

    #[test]
    fn test_non_integer_api_id_fails() {
        let mut vars = base();
        vars.insert("API_ID".into(), "abc".into());
        let err = load(&vars).unwrap_err();
        assert!(format!("{:#}", err).contains("API_ID"));
    }

    #[test]
    fn test_malformed_chat_id_list_fails() {
        for bad in ["1,two,3", "", "1,,2", "1,2,"] {
            let mut vars = base();
            vars.insert("TARGET_CHAT_IDS".into(), bad.into());
            let err = load(&vars).unwrap_err();
            assert!(format!("{:#}", err).contains("TARGET_CHAT_IDS"), "input {:?}", bad);
        }
    }

    #[test]
    fn test_invalid_email_fails() {
        let mut vars = base();
        vars.insert("TO_EMAIL".into(), "not an address".into());
        let err = load(&vars).unwrap_err();
        assert!(format!("{:#}", err).contains("TO_EMAIL"));
    }

    #[test]
    fn test_optional_overrides() {
        let mut vars = base();
        vars.insert("MAIL_COMMAND".into(), "/usr/sbin/sendmail".into());
        vars.insert("PHONE_NUMBER".into(), "+15550000000".into());
        let config = load(&vars).unwrap();
        assert_eq!(config.mail.command, "/usr/sbin/sendmail");
        assert_eq!(config.telegram.phone_number.as_deref(), Some("+15550000000"));
    }

    #[test]
    fn test_session_path() {
        let mut config = load(&base()).unwrap();
        assert_eq!(config.telegram.session_path(), PathBuf::from("relay.session"));
        config.telegram.session_name = "data/relay.session".into();
        assert_eq!(
            config.telegram.session_path(),
            PathBuf::from("data/relay.session")
        );
    }
}
