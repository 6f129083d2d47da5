use clap::{Parser, Subcommand};

mod commands;
mod util;

#[derive(Parser)]
#[command(
    name = "stride",
    version,
    about = "Stride CLI — tasks, focus logging, and progress from the terminal"
)]
struct Cli {
    /// API base URL
    #[arg(long, env = "STRIDE_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check API health
    Health,
    /// Register a new account and receive an API key
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        display_name: Option<String>,
    },
    /// Task operations
    Task {
        #[command(subcommand)]
        command: commands::task::TaskCommands,
    },
    /// Record a focus, pomodoro, or chat completion
    Log {
        /// Completion kind: "focus", "pomodoro", or "chat"
        #[arg(long)]
        kind: String,
        /// Minutes spent (default 0)
        #[arg(long, default_value_t = 0)]
        minutes: i64,
        /// Display title for the history feed
        #[arg(long)]
        title: Option<String>,
        /// Completion timestamp (RFC3339). Defaults to now.
        #[arg(long)]
        at: Option<String>,
        /// Idempotency key (auto-generated if omitted)
        #[arg(long)]
        idempotency_key: Option<String>,
    },
    /// Show the progress snapshot and weekly/monthly summary
    Progress {
        /// Reset progress back to the zero state
        #[arg(long)]
        reset: bool,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Health => commands::health::run(&cli.api_url).await,
        Commands::Register {
            email,
            password,
            display_name,
        } => commands::auth::register(&cli.api_url, &email, &password, display_name).await,
        Commands::Task { command } => commands::task::run(&cli.api_url, command).await,
        Commands::Log {
            kind,
            minutes,
            title,
            at,
            idempotency_key,
        } => commands::log::run(&cli.api_url, &kind, minutes, title, at, idempotency_key).await,
        Commands::Progress { reset } => commands::progress::run(&cli.api_url, reset).await,
    };

    if let Err(e) = result {
        util::exit_error(&e.to_string(), None);
    }
}
