#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telegram_dice_bot::run_bot().await
}
