use std::{collections::HashMap, env, path::PathBuf, time::Duration};

use crate::messages::{Lang, Messages, lang_tag, load_messages_file, parse_lang};

/// Runtime configuration (from environment with sensible defaults)
#[derive(Clone, Debug)]
pub struct Config {
    pub lang: Lang,
    pub messages: HashMap<String, Messages>,
    /// directory holding `accounts.json` and `history.jsonl`
    pub data_dir: PathBuf,
    pub txn_timeout: Duration,
    pub session_ttl: Duration,
    /// when set, /start replies with `{web_base_url}/game?token=...`
    pub web_base_url: Option<String>,
    pub bot_owner_id: Option<u64>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build and validate a config from any variable source.
    pub fn from_vars<F>(var: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lang = var("DEFAULT_LANG")
            .and_then(|v| v.get(..2).and_then(parse_lang))
            .unwrap_or(Lang::En);

        let txn_timeout_ms: i64 = parse_or(&var, "TXN_TIMEOUT_MS", 5_000)?;
        if txn_timeout_ms <= 0 {
            anyhow::bail!(
                "Invalid configuration: TXN_TIMEOUT_MS ({}) must be a positive integer.",
                txn_timeout_ms
            );
        }
        let session_ttl_secs: i64 = parse_or(&var, "SESSION_TTL_SECS", 60 * 60 * 24)?;
        if session_ttl_secs <= 0 {
            anyhow::bail!(
                "Invalid configuration: SESSION_TTL_SECS ({}) must be a positive integer.",
                session_ttl_secs
            );
        }

        Ok(Config {
            lang,
            messages: HashMap::new(),
            data_dir: var("DATA_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            txn_timeout: Duration::from_millis(txn_timeout_ms as u64),
            session_ttl: Duration::from_secs(session_ttl_secs as u64),
            web_base_url: var("WEB_BASE_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .filter(|v| !v.is_empty()),
            bot_owner_id: var("BOT_OWNER_ID").and_then(|v| v.trim().parse().ok()),
        })
    }

    /// Install loaded messages, making sure English and the default language
    /// are always present.
    pub fn with_messages(mut self, mut messages: HashMap<String, Messages>) -> Self {
        if !messages.contains_key("en") {
            messages.insert("en".to_string(), load_messages_file("messages/en.json"));
        }
        let tag = lang_tag(&self.lang);
        if !messages.contains_key(tag) {
            if let Some(en) = messages.get("en").cloned() {
                messages.insert(tag.to_string(), en);
            }
        }
        self.messages = messages;
        self
    }

    /// Messages for `lang`, falling back to the default language and then English.
    pub fn messages_for(&self, lang: Lang) -> Option<&Messages> {
        self.messages
            .get(lang_tag(&lang))
            .or_else(|| self.messages.get(lang_tag(&self.lang)))
            .or_else(|| self.messages.get("en"))
    }
}

fn parse_or<F>(var: &F, key: &str, default: i64) -> anyhow::Result<i64>
where
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(v) if !v.trim().is_empty() => v.trim().parse().map_err(|_| {
            anyhow::anyhow!("Invalid configuration: {} ({}) is not an integer.", key, v)
        }),
        _ => Ok(default),
    }
}
