use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;
use teloxide::prelude::*;

pub mod bot;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod game;
pub mod messages;
pub mod model;
pub mod round;
pub mod scheduler;
pub mod session;
pub mod store;

pub use bot::{BotContext, Command, game_error_text, history_text, parse_command, round_text};
pub use config::Config;
pub use eligibility::{Rejection, check_eligibility};
pub use error::{GameError, ResetError, StoreError};
pub use game::GameService;
pub use messages::{
    Lang, Messages, default_messages, format_with, lang_from_code, lang_tag, load_all_messages,
    load_messages_file, parse_lang,
};
pub use model::{
    Account, DAILY_PLAY_LIMIT, HistoryRecord, NewHistoryRecord, Outcome, PlayerStats, Profile,
    RoundOutcome, UserId,
};
pub use round::{DiceSource, Roll, ThreadRngDice, rand_in_range, resolve, roll_round};
pub use scheduler::{next_reset_after, next_reset_at, spawn_daily_reset, wait_until_reset};
pub use session::{SessionStore, SessionToken};
pub use store::{Committed, LedgerStore, LedgerTxn, MemoryLedger};

/// Run the bot: load config and ledger, start the daily reset and poll
/// Telegram. Separated from `main` so integration tests can import the library.
pub async fn run_bot() -> Result<()> {
    tracing_subscriber::fmt::init();
    dotenv().ok();
    let bot = Bot::from_env();

    let config = Config::from_env()?.with_messages(load_all_messages("messages"));
    let ledger = MemoryLedger::open(&config.data_dir)?;
    let service = GameService::new(Arc::new(ledger)).with_txn_timeout(config.txn_timeout);
    let sessions = Arc::new(SessionStore::new(config.session_ttl));

    let _reset = spawn_daily_reset(service.clone());

    let ctx = BotContext {
        service,
        sessions,
        config: Arc::new(config),
    };

    teloxide::repl(bot, move |bot: Bot, msg: Message| {
        let ctx = ctx.clone();
        async move {
            if let Err(err) = bot::handle_message(&bot, &msg, &ctx).await {
                tracing::error!("handler error: {:?}", err);
            }
            respond(())
        }
    })
    .await;

    Ok(())
}
