use std::sync::Arc;

use anyhow::Result;
use teloxide::{
    prelude::*,
    types::{ButtonRequest, KeyboardButton, KeyboardMarkup, KeyboardRemove, User},
};

use crate::config::Config;
use crate::error::{GameError, StoreError};
use crate::game::GameService;
use crate::messages::{Messages, format_with, lang_from_code};
use crate::model::{DAILY_PLAY_LIMIT, HistoryRecord, Outcome, Profile, RoundOutcome};
use crate::session::SessionStore;

const HISTORY_LEN: usize = 5;

pub type SharedConfig = Arc<Config>;

/// Everything a message handler needs
#[derive(Clone)]
pub struct BotContext {
    pub service: GameService,
    pub sessions: Arc<SessionStore>,
    pub config: SharedConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Play,
    Stats,
    History,
    Help,
    Ping,
    ResetDaily,
    Block(u64),
    Unblock(u64),
    AdminUsage,
}

/// Parse a message text into a command. `/cmd@BotName` is accepted and the
/// dice emoji counts as `/play`.
pub fn parse_command(text: &str) -> Option<Command> {
    let text = text.trim();
    if text == "🎲" {
        return Some(Command::Play);
    }
    let mut parts = text.split_whitespace();
    let head = parts.next()?;
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    let arg = parts.next();
    let cmd = match name.as_str() {
        "/start" => Command::Start,
        "/play" => Command::Play,
        "/stats" => Command::Stats,
        "/history" => Command::History,
        "/help" => Command::Help,
        "/ping" => Command::Ping,
        "/reset_daily" => Command::ResetDaily,
        "/block" | "/unblock" => match arg.and_then(|a| a.parse().ok()) {
            Some(id) if name == "/block" => Command::Block(id),
            Some(id) => Command::Unblock(id),
            None => Command::AdminUsage,
        },
        _ => return None,
    };
    Some(cmd)
}

/// User-facing text for a failed round. Every error gets its own message.
pub fn game_error_text(messages: &Messages, err: &GameError) -> String {
    match err {
        GameError::UnknownUser => messages.unknown_user.clone(),
        GameError::Blocked => messages.blocked.clone(),
        GameError::PhoneNotVerified => messages.phone_not_verified.clone(),
        GameError::DailyLimitReached => format_with(
            &messages.daily_limit_reached,
            &[("limit", &DAILY_PLAY_LIMIT.to_string())],
        ),
        GameError::StoreUnavailable(_) => messages.store_unavailable.clone(),
    }
}

pub fn round_text(messages: &Messages, round: &RoundOutcome) -> String {
    let template = match round.outcome {
        Outcome::Win => &messages.round_win,
        Outcome::Lose => &messages.round_lose,
        Outcome::Draw => &messages.round_draw,
    };
    format_with(
        template,
        &[
            ("user_roll", &round.user_roll.to_string()),
            ("bot_roll", &round.bot_roll.to_string()),
            ("points_change", &round.points_change.to_string()),
            ("total", &round.new_total_points.to_string()),
        ],
    )
}

pub fn history_text(messages: &Messages, records: &[HistoryRecord]) -> String {
    if records.is_empty() {
        return messages.history_empty.clone();
    }
    let mut reply = messages.history_header.clone();
    for r in records {
        reply.push('\n');
        reply.push_str(&format_with(
            &messages.history_line,
            &[
                ("date", &r.created_at.format("%Y-%m-%d %H:%M").to_string()),
                ("user_roll", &r.user_roll.to_string()),
                ("bot_roll", &r.bot_roll.to_string()),
                ("points_change", &format!("{:+}", r.points_change)),
            ],
        ));
    }
    reply
}

fn profile_of(user: &User) -> Profile {
    Profile {
        first_name: Some(user.first_name.clone()),
        last_name: user.last_name.clone(),
        username: user.username.clone(),
    }
}

fn share_phone_keyboard(messages: &Messages) -> KeyboardMarkup {
    let button =
        KeyboardButton::new(messages.share_phone_button.clone()).request(ButtonRequest::Contact);
    KeyboardMarkup::new(vec![vec![button]])
        .resize_keyboard()
        .one_time_keyboard()
}

/// Handle an incoming message and send the reply.
pub async fn handle_message(bot: &Bot, msg: &Message, ctx: &BotContext) -> Result<()> {
    let lang = lang_from_code(
        msg.from.as_ref().and_then(|u| u.language_code.as_deref()),
        ctx.config.lang,
    );
    let messages = ctx
        .config
        .messages_for(lang)
        .expect("there should always be at least English messages available");

    let Some(user) = msg.from.as_ref() else {
        bot.send_message(msg.chat.id, messages.cannot_identify.clone())
            .await?;
        return Ok(());
    };
    let user_id = user.id.0;

    if let Some(contact) = msg.contact() {
        // only the sender's own contact counts as verification
        if contact.user_id != Some(user.id) {
            bot.send_message(msg.chat.id, messages.phone_mismatch.clone())
                .await?;
            return Ok(());
        }
        let saved = ctx
            .service
            .verify_phone(user_id, profile_of(user), contact.phone_number.clone())
            .await;
        match saved {
            Ok(()) => {
                bot.send_message(msg.chat.id, messages.phone_saved.clone())
                    .reply_markup(KeyboardRemove::new())
                    .await?;
            }
            Err(err) => {
                tracing::warn!("could not save phone for user {}: {}", user_id, err);
                bot.send_message(msg.chat.id, game_error_text(messages, &err))
                    .await?;
            }
        }
        return Ok(());
    }

    let Some(command) = msg.text().and_then(parse_command) else {
        return Ok(());
    };
    let is_owner = ctx.config.bot_owner_id == Some(user_id);

    match command {
        Command::Start => {
            let account = match ctx.service.onboard(user_id, profile_of(user)).await {
                Ok(account) => account,
                Err(err) => {
                    tracing::warn!("could not onboard user {}: {}", user_id, err);
                    bot.send_message(msg.chat.id, game_error_text(messages, &err))
                        .await?;
                    return Ok(());
                }
            };
            let verified = account.has_phone();
            let name = user.first_name.as_str();
            if verified {
                let reply = format_with(&messages.welcome_back, &[("name", name)]);
                bot.send_message(msg.chat.id, reply).await?;
            } else {
                let reply = format!(
                    "{}\n{}",
                    format_with(&messages.welcome, &[("name", name)]),
                    messages.share_phone_prompt
                );
                bot.send_message(msg.chat.id, reply)
                    .reply_markup(share_phone_keyboard(messages))
                    .await?;
            }
            if let Some(base) = ctx.config.web_base_url.as_deref() {
                ctx.sessions.purge_expired().await;
                let token = ctx.sessions.issue(user_id).await;
                let url = format!("{}/game?token={}", base, token);
                bot.send_message(msg.chat.id, format_with(&messages.web_link, &[("url", &url)]))
                    .await?;
            }
        }
        Command::Play => {
            let reply = match ctx.service.play_round(user_id).await {
                Ok(round) => round_text(messages, &round),
                Err(err) => game_error_text(messages, &err),
            };
            bot.send_message(msg.chat.id, reply).await?;
        }
        Command::Stats => {
            let reply = match ctx.service.get_stats(user_id).await {
                Ok(stats) => format_with(
                    &messages.stats,
                    &[
                        ("points", &stats.points.to_string()),
                        ("plays", &stats.plays.to_string()),
                        ("limit", &DAILY_PLAY_LIMIT.to_string()),
                    ],
                ),
                Err(err) => game_error_text(messages, &err),
            };
            bot.send_message(msg.chat.id, reply).await?;
        }
        Command::History => {
            let reply = match ctx.service.recent_history(user_id, HISTORY_LEN).await {
                Ok(records) => history_text(messages, &records),
                Err(err) => game_error_text(messages, &err),
            };
            bot.send_message(msg.chat.id, reply).await?;
        }
        Command::Help => {
            bot.send_message(msg.chat.id, messages.help.clone()).await?;
        }
        Command::Ping => {
            bot.send_message(msg.chat.id, messages.pong.clone()).await?;
        }
        Command::ResetDaily | Command::Block(_) | Command::Unblock(_) | Command::AdminUsage
            if !is_owner =>
        {
            bot.send_message(msg.chat.id, messages.not_authorized.clone())
                .await?;
        }
        Command::ResetDaily => {
            let reply = match ctx.service.run_daily_reset().await {
                Ok(()) => messages.reset_done.clone(),
                Err(_) => messages.reset_failed.clone(),
            };
            bot.send_message(msg.chat.id, reply).await?;
        }
        Command::Block(target) | Command::Unblock(target) => {
            let block = matches!(command, Command::Block(_));
            let reply = match ctx.service.store().set_blocked(target, block).await {
                Ok(()) => {
                    tracing::info!("owner set blocked={} on user {}", block, target);
                    let template = if block {
                        &messages.block_done
                    } else {
                        &messages.unblock_done
                    };
                    format_with(template, &[("user_id", &target.to_string())])
                }
                Err(StoreError::MissingAccount(_)) => messages.unknown_user.clone(),
                Err(err) => {
                    tracing::warn!("could not update user {}: {}", target, err);
                    messages.store_unavailable.clone()
                }
            };
            bot.send_message(msg.chat.id, reply).await?;
        }
        Command::AdminUsage => {
            bot.send_message(msg.chat.id, messages.admin_usage.clone())
                .await?;
        }
    }
    Ok(())
}
