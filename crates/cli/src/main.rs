use std::{path::PathBuf, process::ExitCode};

use {
    anyhow::Result,
    clap::{Args, Parser, Subcommand},
    serde_json::{Value, json},
    tracing::{debug, info},
    tracing_subscriber::EnvFilter,
};

use {
    autoupdate_config::{
        LocalSettings, UpdateContext, UpdateOptions,
        env::{self, EnvLookup},
        paths,
    },
    autoupdate_updater::{
        RunOutcome, Updater,
        history::HistoryLog,
        lock::LockManager,
        now_ms,
        throttle::ThrottleStore,
    },
};

#[derive(Parser)]
#[command(name = "opencode-auto-update", version, about = "Keep opencode plugins up to date")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Directory holding opencode.json (defaults to ~/.config/opencode).
    #[arg(long, global = true, env = "OPENCODE_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Verbose logging.
    #[arg(long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one update pass (default).
    Run(RunArgs),
    /// Show lock holder, throttle state and recent runs as JSON.
    Status,
    /// Remove the update lock file.
    Unlock,
}

#[derive(Args, Default)]
struct RunArgs {
    /// Run even if the last run was within the interval.
    #[arg(long)]
    ignore_throttle: bool,
    /// Minimum hours between runs; 0 disables throttling.
    #[arg(long)]
    interval_hours: Option<f64>,
    /// Leave plugins pinned to a version untouched.
    #[arg(long)]
    preserve_pinned: bool,
    /// Where to record run history.
    #[arg(long)]
    history_file: Option<PathBuf>,
    /// Companion program to run with `update` after plugins are updated.
    #[arg(long)]
    extension_updater: Option<String>,
    /// Never take over a stale lock.
    #[arg(long)]
    no_reclaim_stale: bool,
}

impl Cli {
    /// `--debug` or the debug environment flag.
    fn debug_logging(&self, lookup: &impl EnvLookup) -> bool {
        self.debug || env::flag(lookup, env::DEBUG)
    }

    fn options(&self) -> UpdateOptions {
        let mut options = UpdateOptions {
            config_dir: self.config_dir.clone(),
            debug: self.debug.then_some(true),
            ..Default::default()
        };
        if let Some(Commands::Run(args)) = &self.command {
            options.interval_hours = args.interval_hours;
            options.preserve_pinned = args.preserve_pinned.then_some(true);
            options.ignore_throttle = args.ignore_throttle.then_some(true);
            options.history_path = args.history_file.clone();
            options.extension_updater = args.extension_updater.clone();
            options.reclaim_stale_lock = args.no_reclaim_stale.then_some(false);
        }
        options
    }
}

fn init_logging(debug: bool, json: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(cli.debug_logging(&env::process_env), cli.json_logs);

    let options = cli.options();
    let settings = LocalSettings::load(&paths::settings_path(&options.config_dir()));
    let ctx = options
        .with_local_settings(&settings, &env::process_env)
        .resolve();
    debug!(config_dir = %ctx.config_dir.display(), "resolved update context");

    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(_) => run(ctx).await,
        Commands::Status => {
            println!("{}", serde_json::to_string_pretty(&status(&ctx).await)?);
            Ok(ExitCode::SUCCESS)
        },
        Commands::Unlock => {
            let lock = LockManager::new(&ctx);
            lock.release().await;
            info!(path = %lock.path().display(), "update lock released");
            Ok(ExitCode::SUCCESS)
        },
    }
}

async fn run(ctx: UpdateContext) -> Result<ExitCode> {
    let summary = Updater::new(ctx).run().await;
    println!("{}", summary.report.message());
    Ok(match summary.outcome {
        RunOutcome::Failed(_) => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

async fn status(ctx: &UpdateContext) -> Value {
    let now = now_ms();
    let lock = LockManager::new(ctx).read().await.map(|holder| {
        json!({
            "pid": holder.pid,
            "hostname": holder.hostname,
            "timestamp": holder.timestamp,
            "stale": holder.is_stale(now),
        })
    });
    let throttle = ThrottleStore::new(ctx).read().await;
    let history = HistoryLog::new(&ctx.history_path).read().await;

    json!({
        "configDir": ctx.config_dir,
        "lock": lock,
        "throttle": {
            "lastRun": throttle.last_run,
            "lastSuccess": throttle.last_success,
            "intervalMs": ctx.throttle.interval_ms(),
            "throttled": !ctx.ignore_throttle && ctx.throttle.is_throttled(throttle.last_run, now),
        },
        "history": history.entries,
    })
}
