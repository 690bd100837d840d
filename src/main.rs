use dotenvy::dotenv;
use rentflow::{
    config::{
        database::{create_connection, create_tables},
        load_default_config,
    },
    core::{
        AppContext,
        reminder::{run_reminder_loop, stop_reminder_loop},
    },
    errors::Result,
    notify::{DatabaseSink, LogSink, NotificationSink, Notifier, spawn_dispatcher},
};
use std::{env, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Tracing first so configuration problems are visible
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. .env is optional, variables can be set externally
    dotenv().ok();

    // 3. Configuration: config.toml if present, DATABASE_URL overrides
    let config = load_default_config()
        .inspect_err(|e| error!("Failed to load configuration: {e}"))?;

    // 4. Database
    let db = create_connection(&config.database_url)
        .await
        .inspect_err(|e| error!("Failed to connect to database: {e}"))?;
    create_tables(&db)
        .await
        .inspect(|()| info!("Database schema ready."))
        .inspect_err(|e| error!("Failed to create tables: {e}"))?;

    // 5. Notifications are stored for the in-app inbox unless only logging was asked for
    let sink: Arc<dyn NotificationSink> = match env::var("RENTFLOW_NOTIFY_SINK").as_deref() {
        Ok("log") => Arc::new(LogSink),
        _ => Arc::new(DatabaseSink::new(db.clone())),
    };
    let (notifier, receiver) = Notifier::channel(config.notifications.queue_capacity);
    let dispatcher = spawn_dispatcher(receiver, sink, config.notifications.send_timeout());

    // 6. Due-reminder scheduler
    let ctx = AppContext::new(db, notifier);
    let scheduler = tokio::spawn(run_reminder_loop(ctx.clone(), config.reminders.clone()));
    info!("rentflow is running, press Ctrl-C to stop.");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down.");

    // Dropping every notifier lets the dispatcher flush the queue and exit
    stop_reminder_loop(scheduler).await;
    drop(ctx);
    if let Err(e) = dispatcher.await {
        if e.is_panic() {
            error!("Notification dispatcher panicked: {e}");
        }
    }

    Ok(())
}
