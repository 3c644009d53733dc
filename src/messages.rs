use serde::Deserialize;
use std::{collections::HashMap, fs, path::Path};

/// Messages container loaded from JSON files per language
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Messages {
    pub welcome: String,
    pub welcome_back: String,
    pub share_phone_prompt: String,
    pub share_phone_button: String,
    pub web_link: String,
    pub phone_saved: String,
    pub phone_mismatch: String,
    pub cannot_identify: String,
    pub round_win: String,
    pub round_lose: String,
    pub round_draw: String,
    pub stats: String,
    pub history_header: String,
    pub history_line: String,
    pub history_empty: String,
    pub unknown_user: String,
    pub blocked: String,
    pub phone_not_verified: String,
    pub daily_limit_reached: String,
    pub store_unavailable: String,
    pub not_authorized: String,
    pub reset_done: String,
    pub reset_failed: String,
    pub block_done: String,
    pub unblock_done: String,
    pub admin_usage: String,
    pub help: String,
    pub pong: String,
}

/// Supported languages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lang {
    En,
    Zh,
}

/// Parse a short language tag into `Lang`.
pub fn parse_lang(s: &str) -> Option<Lang> {
    match s.to_lowercase().as_str() {
        "en" => Some(Lang::En),
        "zh" => Some(Lang::Zh),
        _ => None,
    }
}

/// Return the short tag for a Lang variant (e.g. Lang::En -> "en").
pub fn lang_tag(l: &Lang) -> &'static str {
    match l {
        Lang::En => "en",
        Lang::Zh => "zh",
    }
}

/// Pick a language from a Telegram `language_code` ("zh", "zh-hans", "en-US"),
/// falling back to `default`.
pub fn lang_from_code(code: Option<&str>, default: Lang) -> Lang {
    let Some(code) = code else {
        return default;
    };
    if let Some(parsed) = parse_lang(code) {
        return parsed;
    }
    // locale-style codes: try the two-letter prefix
    code.get(..2).and_then(parse_lang).unwrap_or(default)
}

/// Load a Messages struct from a given JSON file path, falling back to defaults
pub fn load_messages_file(path: &str) -> Messages {
    match fs::read_to_string(path) {
        Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
            tracing::warn!("failed to parse {}: {}. Falling back to defaults.", path, e);
            default_messages()
        }),
        Err(e) => {
            tracing::warn!("failed to read {}: {}. Falling back to defaults.", path, e);
            default_messages()
        }
    }
}

/// Built-in English messages; every language falls back to these.
pub fn default_messages() -> Messages {
    Messages {
        welcome: "Welcome {name}! Share your phone number to unlock the dice game.".to_string(),
        welcome_back: "Welcome back {name}! Send /play to roll.".to_string(),
        share_phone_prompt: "Tap the button below to share your phone number.".to_string(),
        share_phone_button: "📱 Share phone number".to_string(),
        web_link: "Play in the browser: {url}".to_string(),
        phone_saved: "✅ Phone number verified. Send /play to roll!".to_string(),
        phone_mismatch: "Please share your own contact, not someone else's.".to_string(),
        cannot_identify: "I can't play without knowing who you are.".to_string(),
        round_win: "🎲 You rolled {user_roll}, the bot rolled {bot_roll}. You win! +{points_change} points. Total: {total}".to_string(),
        round_lose: "🎲 You rolled {user_roll}, the bot rolled {bot_roll}. You lose... {points_change} points. Total: {total}".to_string(),
        round_draw: "🎲 You rolled {user_roll}, the bot rolled {bot_roll}. Draw! Total: {total}".to_string(),
        stats: "Points: {points}. Rounds today: {plays} / {limit}".to_string(),
        history_header: "Your last rounds:".to_string(),
        history_line: "{date}: {user_roll} vs {bot_roll} ({points_change})".to_string(),
        history_empty: "You haven't played yet.".to_string(),
        unknown_user: "I don't know you yet. Send /start first.".to_string(),
        blocked: "Your account is blocked.".to_string(),
        phone_not_verified: "Please share your phone number before playing.".to_string(),
        daily_limit_reached: "You've used all {limit} rounds for today. Come back tomorrow!".to_string(),
        store_unavailable: "The game is busy right now, please try again in a moment.".to_string(),
        not_authorized: "Not authorized.".to_string(),
        reset_done: "Daily play counters were reset.".to_string(),
        reset_failed: "Daily reset failed, check the logs.".to_string(),
        block_done: "User {user_id} blocked.".to_string(),
        unblock_done: "User {user_id} unblocked.".to_string(),
        admin_usage: "Usage: /block <user_id> or /unblock <user_id>".to_string(),
        help: "/play roll the dice\n/stats your points\n/history your last rounds".to_string(),
        pong: "pong".to_string(),
    }
}

/// Load every `*.json` file from the `messages/` directory and return a map
/// from language tag to parsed `Messages` value. Files which fail to parse
/// fall back to defaults for that language.
pub fn load_all_messages(dir: &str) -> HashMap<String, Messages> {
    let mut map = HashMap::new();
    let p = Path::new(dir);
    if let Ok(entries) = p.read_dir() {
        for entry in entries.flatten() {
            if let Ok(fname) = entry.file_name().into_string() {
                if fname.to_lowercase().ends_with(".json") {
                    let stem = fname.trim_end_matches(".json");
                    if let Some(lang) = parse_lang(stem) {
                        let path = format!("{}/{}", dir, fname);
                        let msgs = load_messages_file(&path);
                        map.insert(lang_tag(&lang).to_string(), msgs);
                    } else {
                        tracing::warn!("skipping unknown language file: {}", fname);
                    }
                }
            }
        }
    }
    map
}

/// Simple template formatter: replace `{key}` with `value` for each pair in `pairs`.
pub fn format_with(template: &str, pairs: &[(&str, &str)]) -> String {
    let mut s = template.to_string();
    for (k, v) in pairs {
        s = s.replace(&format!("{{{}}}", k), v);
    }
    s
}
