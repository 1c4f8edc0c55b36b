mod history;
mod run;

use clap::{Parser, Subcommand, ValueEnum};

use stockpulse_config::TriggerMode;
use stockpulse_storage::{DEFAULT_HISTORY_LIMIT, DEFAULT_RECENT_MINUTES};

#[derive(Parser)]
#[command(name = "stockpulse", about = "Background task dispatcher for the inventory client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Read native trigger payloads (JSON, one per line) from stdin
    Native,
    /// Generate triggers from an in-process timer
    Interval,
}

impl From<ModeArg> for TriggerMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Native => TriggerMode::Native,
            ModeArg::Interval => TriggerMode::Interval,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dispatcher until interrupted or the trigger source closes
    Run {
        /// Trigger source (overrides config)
        #[arg(short, long, value_enum)]
        mode: Option<ModeArg>,

        /// Tick length in seconds for the interval source (overrides config)
        #[arg(long)]
        tick_secs: Option<u64>,

        /// Skip the built-in maintenance tasks
        #[arg(long)]
        no_builtins: bool,
    },
    /// Show the most recent task executions
    History {
        /// Number of rows to show
        #[arg(short, long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: u32,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show execution counts per task, trigger source and app state
    Stats {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show executions from the last N minutes
    Recent {
        /// Look-back window in minutes
        #[arg(short, long, default_value_t = DEFAULT_RECENT_MINUTES)]
        minutes: u32,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print the resolved configuration
    Health,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = stockpulse_config::load_config()?;

    match cli.command {
        Commands::Run {
            mode,
            tick_secs,
            no_builtins,
        } => {
            if let Some(mode) = mode {
                config.trigger.mode = mode.into();
            }
            if let Some(secs) = tick_secs {
                config.trigger.tick_secs = secs;
            }
            if no_builtins {
                config.cron.register_builtin_tasks = false;
            }
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run::run_dispatcher(config))?;
        }
        Commands::History { limit, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(history::show_history(&config, limit, json))?;
        }
        Commands::Stats { json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(history::show_stats(&config, json))?;
        }
        Commands::Recent { minutes, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(history::show_recent(&config, minutes, json))?;
        }
        Commands::Health => {
            println!("stockpulse is healthy");
            println!("  trigger mode: {:?}", config.trigger.mode);
            println!("  tick seconds: {}", config.trigger.tick_secs);
            println!("  dedup window: {}s", config.cron.dedup_window_secs);
            println!("  built-in tasks: {}", config.cron.register_builtin_tasks);
            match config.db_path() {
                Ok(path) => println!("  execution log: {}", path.display()),
                Err(e) => println!("  execution log: unavailable ({e})"),
            }
        }
    }

    Ok(())
}
