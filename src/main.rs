// This is the entry point of the bot core.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (stores, built-in adapters)
//
// This file's job is to:
// 1. Load configuration from the environment
// 2. Initialize services (dependency injection)
// 3. Spawn the schedule poller
// 4. Park until shutdown

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with a pair of mod.rs files that look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::broadcast::{
    ContentLibrary, DeliveryPort, LibraryStats, SchedulePoller, SubscriberService,
};
use crate::core::chats::ChatRegistry;
use crate::core::moderation::{
    ChatTransport, ExceptionRegistry, MessageTemplate, ModerationConfig, ModerationEngine,
    DEFAULT_TEMPLATE_EXAMPLE, DEFAULT_TEMPLATE_PATTERN,
};
use crate::infra::broadcast::{
    FsMediaStore, JsonContentStore, JsonScheduleStore, JsonSubscriberStore,
};
use crate::infra::classifier::SingleCharClassifier;
use crate::infra::moderation::SqliteAuditStore;
use crate::infra::transport::DryRunMessenger;
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;

fn parse_id_list(raw: &str) -> Vec<u64> {
    raw.split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Keep runtime state in a dedicated folder so the repo root stays tidy.
    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string());
    std::fs::create_dir_all(&data_dir).expect("Failed to create data directory");

    let tz: Tz = std::env::var("BOT_TZ")
        .unwrap_or_else(|_| "Asia/Novosibirsk".to_string())
        .parse()
        .expect("BOT_TZ must be a valid IANA timezone name");

    let admin_ids = parse_id_list(&std::env::var("ADMIN_IDS").unwrap_or_default());
    let vote_threshold: usize = env_or("VOTE_THRESHOLD", 2);
    let poll_interval_secs: u64 = env_or("POLL_INTERVAL_SECS", 60);
    let hint_delete_delay_secs: u64 = env_or("HINT_DELETE_DELAY_SECS", 300);

    let template_pattern = std::env::var("TEMPLATE_PATTERN")
        .unwrap_or_else(|_| DEFAULT_TEMPLATE_PATTERN.to_string());
    let template_example = std::env::var("TEMPLATE_EXAMPLE")
        .unwrap_or_else(|_| DEFAULT_TEMPLATE_EXAMPLE.to_string());
    let template = MessageTemplate::new(&template_pattern, template_example)
        .expect("TEMPLATE_PATTERN must be a valid regex");

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Create our services with their dependencies.
    // This is the "composition root" where we wire everything together.

    let subscribers = Arc::new(SubscriberService::new(JsonSubscriberStore::new(format!(
        "{}/subscribers.json",
        data_dir
    ))));

    let library = Arc::new(ContentLibrary::new(
        JsonContentStore::new(format!("{}/content.json", data_dir)),
        JsonScheduleStore::new(format!("{}/schedule.json", data_dir)),
        FsMediaStore::new(format!("{}/content", data_dir)),
    ));

    let chats = Arc::new(ChatRegistry::new());
    let exceptions = Arc::new(ExceptionRegistry::new());

    let audit_pool = sqlx::sqlite::SqlitePoolOptions::new()
        .connect(&format!("sqlite://{}/audit.db?mode=rwc", data_dir))
        .await
        .expect("Failed to connect to audit DB");
    let audit_store = SqliteAuditStore::new(audit_pool);
    audit_store
        .migrate()
        .await
        .expect("Failed to migrate audit DB");

    // The dry-run messenger stands in for the platform transport; a real
    // deployment swaps in an adapter over the platform client here.
    let messenger = Arc::new(DryRunMessenger::new(admin_ids.clone()));
    let classifier = Arc::new(SingleCharClassifier::default());

    let engine = ModerationEngine::new(
        classifier,
        Arc::clone(&messenger) as Arc<dyn ChatTransport>,
        audit_store,
        Arc::clone(&exceptions),
        Arc::clone(&chats),
        ModerationConfig {
            vote_threshold,
            reviewer_ids: admin_ids,
            hint_delete_delay: Duration::from_secs(hint_delete_delay_secs),
            template,
        },
    );

    let poller = Arc::new(SchedulePoller::new(
        Arc::clone(&library),
        Arc::clone(&subscribers),
        Arc::clone(&chats),
        Arc::clone(&messenger) as Arc<dyn DeliveryPort>,
        chrono::Duration::seconds(poll_interval_secs as i64),
        tz,
    ));

    // Background schedule sweep. Runs every tick until shutdown; the tick
    // interval must stay within the one-minute scheduling granularity.
    let sweeper = Arc::clone(&poller);
    tokio::spawn(async move {
        use tokio::time::sleep;

        loop {
            let report = sweeper.sweep(chrono::Utc::now()).await;
            if report.fired > 0 {
                tracing::info!(
                    fired = report.fired,
                    sent = report.sent,
                    failed = report.failed,
                    "sweep finished"
                );
            } else {
                tracing::debug!("sweep finished, nothing due");
            }

            sleep(Duration::from_secs(poll_interval_secs)).await;
        }
    });

    let stats = library.stats().await.unwrap_or(LibraryStats {
        content_count: 0,
        active_schedules: 0,
    });
    tracing::info!(
        %tz,
        vote_threshold = engine.vote_threshold(),
        subscribers = subscribers.active_count().await.unwrap_or(0),
        content = stats.content_count,
        schedules = stats.active_schedules,
        "bot core is up"
    );

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal");
    tracing::info!(open_ballots = engine.open_ballots(), "shutting down");
}
