use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use lineboom_common::config::AppConfig;
use lineboom_common::error::AppError;
use lineboom_notifier::channel::{DeliveryChannel, TelegramChannel};
use lineboom_notifier::dispatcher::Dispatcher;
use lineboom_notifier::store::QueueStore;
use lineboom_notifier::worker::RetryWorker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lineboom_notifier=info,lineboom_common=info".into()),
        )
        .json()
        .init();

    tracing::info!("LineBoom notifier starting...");

    // Load configuration
    let config = AppConfig::from_env()?;
    let bot_token = config
        .telegram_bot_token
        .clone()
        .ok_or_else(|| anyhow::anyhow!("TELEGRAM_BOT_TOKEN environment variable is required"))?;
    let delivery_timeout = Duration::from_millis(config.delivery_timeout_ms);

    // Recover pending notifications from disk
    let store = Arc::new(QueueStore::open(&config.queue_path).await?);
    let pending = store.len().await;
    tracing::info!(
        path = %store.path().display(),
        pending,
        "Notification queue recovered"
    );

    let channel: Arc<dyn DeliveryChannel> = Arc::new(TelegramChannel::new(
        &config.telegram_api_url,
        &bot_token,
        delivery_timeout,
    )?);

    if let Some(admin_chat) = &config.telegram_admin_chat_id {
        let dispatcher = Dispatcher::new(store.clone(), channel.clone(), delivery_timeout);
        let notice = format!(
            "LineBoom notifier started, {} notification(s) pending retry",
            pending
        );
        let outcome = dispatcher.submit(admin_chat, &notice).await?;
        tracing::info!(
            delivered = outcome.is_delivered(),
            outcome = %outcome,
            "Startup notice submitted"
        );
    }

    let worker = RetryWorker::from_config(store.clone(), channel, &config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    // Run until the worker fails or Ctrl+C is received
    let result = tokio::select! {
        result = &mut handle => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
            let _ = shutdown_tx.send(true);
            handle.await?
        }
    };

    if let Err(e) = result {
        log_worker_failure(&e);
        return Err(e.into());
    }

    match Arc::try_unwrap(store) {
        Ok(store) => store.close().await?,
        Err(_) => tracing::warn!("Notification queue still shared at shutdown, skipping close"),
    }

    tracing::info!("LineBoom notifier stopped.");
    Ok(())
}

fn log_worker_failure(error: &AppError) {
    if error.is_storage() {
        tracing::error!(error = %error, "Notification queue unavailable, pending notifications stay on disk");
    } else {
        tracing::error!(error = %error, "Retry worker failed");
    }
}
