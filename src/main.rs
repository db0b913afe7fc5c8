mod config;
mod core;
mod health;
mod lock;
mod plans;
mod provider;
mod store;
mod supervisor;
mod telegram;
mod utils;

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("supervise");

    match command {
        "--version" | "-V" => {
            println!("runcoachd {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        "--help" | "-h" => {
            print_help();
            return Ok(());
        }
        _ => {}
    }

    let config_path = PathBuf::from("runcoachd.toml");
    let config = config::AppConfig::load(&config_path)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match command {
        "supervise" => runtime.block_on(core::run(config)),
        "reset-session" => runtime.block_on(core::run_session_reset(config)),
        "stop" => runtime.block_on(core::run_stop(config)),
        "check-health" => core::run_check_health(&config),
        "repair-plans" => runtime.block_on(core::run_repair(config)),
        "generate-plan" => {
            let telegram_id = args
                .get(2)
                .and_then(|raw| raw.parse::<i64>().ok())
                .ok_or_else(|| {
                    anyhow::anyhow!("usage: runcoachd generate-plan <telegram-id>")
                })?;
            runtime.block_on(core::run_generate_plan(config, telegram_id))
        }
        "webhook-info" => runtime.block_on(core::run_webhook_info(config)),
        "setup-webhook" => {
            let url = args
                .get(2)
                .ok_or_else(|| anyhow::anyhow!("usage: runcoachd setup-webhook <url>"))?;
            runtime.block_on(core::run_setup_webhook(config, url))
        }
        "show-plan" => {
            let telegram_id = args
                .get(2)
                .and_then(|raw| raw.parse::<i64>().ok())
                .ok_or_else(|| anyhow::anyhow!("usage: runcoachd show-plan <telegram-id>"))?;
            runtime.block_on(core::run_show_plan(config, telegram_id))
        }
        other => {
            eprintln!("Unknown command: '{}'. See runcoachd --help.", other);
            std::process::exit(2);
        }
    }
}

fn print_help() {
    println!("runcoachd {}", env!("CARGO_PKG_VERSION"));
    println!("{}\n", env!("CARGO_PKG_DESCRIPTION"));
    println!("Usage: runcoachd [COMMAND]\n");
    println!("Commands:");
    println!("  supervise                  Run the supervision daemon (default)");
    println!("  reset-session              Reset the Telegram API session (webhook + update queue)");
    println!("  stop                       Terminate all bot processes");
    println!("  check-health               Classify the health sentinel (exit 0/1/2)");
    println!("  repair-plans               Repair malformed training plans in the database");
    println!("  generate-plan <tg-id>      Generate and store a plan for one user");
    println!("  show-plan <tg-id>          Print a user's latest stored plan");
    println!("  webhook-info               Show the current Telegram webhook state");
    println!("  setup-webhook <url>        Register a webhook (webhook-mode deployments)");
    println!("\nOptions:");
    println!("  -h, --help       Print help");
    println!("  -V, --version    Print version");
    println!("\nEnvironment:");
    println!("  TELEGRAM_TOKEN     Bot API token (supervise, reset-session, webhook-info)");
    println!("  OPENAI_API_KEY     LLM API key (generate-plan)");
    println!("  DATABASE_URL       Postgres connection string (repair-plans, generate-plan)");
    println!("                     or PGHOST/PGPORT/PGDATABASE/PGUSER/PGPASSWORD");
    println!("\nConfiguration is read from runcoachd.toml when present.");
}
