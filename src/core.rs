//! Command implementations wired from config and environment.

use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{self, AppConfig};
use crate::health::{self, HealthReporter, HealthThresholds};
use crate::lock::InstanceLock;
use crate::plans;
use crate::provider::OpenAiProvider;
use crate::store::PlanStore;
use crate::supervisor::{locator, terminator, Supervisor};
use crate::telegram::BotApi;

/// `supervise`: the long-running daemon. Blocks until the failure cap
/// halts supervision.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    // 1. At-most-one supervisor
    let lock = InstanceLock::acquire(&config.supervisor.lock_path)?;

    // 2. Telegram API client (token is mandatory); getMe validates the
    // token up front but a transient API failure doesn't stop supervision
    let token = config::telegram_token()?;
    let api = BotApi::new(&token, &config.telegram)?;
    match api.get_me().await {
        Ok(me) => info!(
            bot = me["username"].as_str().unwrap_or("?"),
            "Telegram token verified"
        ),
        Err(e) => warn!("getMe failed (continuing, will retry via supervision): {}", e),
    }

    // 3. Health reporter keeps the sentinel fresh while we are alive
    HealthReporter::new(
        config.health.sentinel_path.clone(),
        Duration::from_secs(config.health.report_interval_secs),
    )
    .spawn();

    // 4. Supervision loop (blocks)
    info!("Starting runcoachd v{}", env!("CARGO_PKG_VERSION"));
    let supervisor = Supervisor::new(config.supervisor, &config.health, api, lock);
    supervisor.run().await
}

/// `reset-session`: run the Telegram session reset once and report.
pub async fn run_session_reset(config: AppConfig) -> anyhow::Result<()> {
    let token = config::telegram_token()?;
    let api = BotApi::new(&token, &config.telegram)?;
    if api.reset_session().await {
        println!("Session reset complete.");
    } else {
        println!("Session reset finished with errors (best-effort).");
    }
    Ok(())
}

/// `stop`: terminate every process matching the bot keywords.
pub async fn run_stop(config: AppConfig) -> anyhow::Result<()> {
    // prefer the exact pid recorded by a (possibly dead) supervisor
    let mut targets = locator::find_bot_processes(&config.supervisor.process_keywords);
    if let Ok(Some(lock)) = InstanceLock::read(Path::new(&config.supervisor.lock_path)) {
        if let Some(pid) = lock.child_pid {
            if !targets.contains(&pid) {
                targets.push(pid);
            }
        }
    }

    if targets.is_empty() {
        println!("No bot processes found.");
        return Ok(());
    }

    println!("Terminating {} bot process(es): {:?}", targets.len(), targets);
    let grace = Duration::from_secs(config.supervisor.grace_timeout_secs);
    let gone = terminator::terminate_all(&targets, grace).await;
    if gone == targets.len() {
        println!("All bot processes stopped.");
    } else {
        warn!(gone, total = targets.len(), "Some processes survived");
        println!("Stopped {}/{} processes.", gone, targets.len());
    }
    Ok(())
}

/// `check-health`: classify the sentinel and exit 0/1/2.
pub fn run_check_health(config: &AppConfig) -> ! {
    let thresholds = HealthThresholds::from_config(&config.health);
    let path = Path::new(&config.health.sentinel_path);
    let (status, elapsed) = health::check_sentinel(path, &thresholds);
    match elapsed {
        Some(secs) => println!("{} (sentinel age: {}s)", status.as_str(), secs),
        None => println!("{} (sentinel missing or corrupt)", status.as_str()),
    }
    std::process::exit(status.exit_code());
}

/// `repair-plans`: one-off batch repair of stored training plans.
pub async fn run_repair(_config: AppConfig) -> anyhow::Result<()> {
    let store = PlanStore::connect(&config::database_url()?).await?;
    let stats = plans::repair_all_plans(store.pool()).await?;
    println!("Checked {} plan(s):", stats.total_plans);
    println!("  null training_days:  {}", stats.null_training_days);
    println!("  empty training_days: {}", stats.empty_training_days);
    println!("  nested structure:    {}", stats.nested_structure);
    println!("  repaired:            {}", stats.repaired);
    Ok(())
}

/// `generate-plan <telegram-id>`: generate and store a plan for one user.
pub async fn run_generate_plan(config: AppConfig, telegram_id: i64) -> anyhow::Result<()> {
    let store = PlanStore::connect(&config::database_url()?).await?;
    let user_id = store
        .find_user_by_telegram_id(telegram_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no user with telegram id {}", telegram_id))?;
    let profile = store
        .profile_for_user(user_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("user {} has no runner profile", user_id))?;

    let provider = OpenAiProvider::new(&config::openai_api_key()?, &config.provider)?;
    let plan = plans::generate_plan(&provider, &profile).await?;
    let plan_id = store.insert_plan(profile.user_id, &plan).await?;

    println!(
        "Stored plan {} for user {}: {} ({} training days)",
        plan_id,
        profile.user_id,
        plan.plan_name,
        plan.training_days.len()
    );
    Ok(())
}

/// `webhook-info`: print the current webhook state.
pub async fn run_webhook_info(config: AppConfig) -> anyhow::Result<()> {
    let token = config::telegram_token()?;
    let api = BotApi::new(&token, &config.telegram)?;
    let info = api.get_webhook_info().await?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

/// `setup-webhook <url>`: register a webhook for webhook-mode deployments.
pub async fn run_setup_webhook(config: AppConfig, url: &str) -> anyhow::Result<()> {
    let token = config::telegram_token()?;
    let api = BotApi::new(&token, &config.telegram)?;
    api.set_webhook(url, 40, &["message", "callback_query"]).await?;
    let info = api.get_webhook_info().await?;
    println!("Webhook registered: {}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

/// `show-plan <telegram-id>`: print a user's latest stored plan.
pub async fn run_show_plan(_config: AppConfig, telegram_id: i64) -> anyhow::Result<()> {
    let store = PlanStore::connect(&config::database_url()?).await?;
    let user_id = store
        .find_user_by_telegram_id(telegram_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no user with telegram id {}", telegram_id))?;
    match store.latest_plan(user_id).await? {
        Some((plan_id, plan_data)) => {
            println!("Plan {} for user {}:", plan_id, user_id);
            println!("{}", serde_json::to_string_pretty(&plan_data)?);
        }
        None => println!("User {} has no stored plans.", user_id),
    }
    Ok(())
}
