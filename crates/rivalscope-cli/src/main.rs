mod client;
mod commands;

use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "rivalscope-cli")]
#[command(about = "Brand vs competitor comparison client")]
struct Cli {
    /// Base URL of the rivalscope server.
    #[arg(
        long,
        global = true,
        env = "RIVALSCOPE_SERVER_URL",
        default_value = "http://127.0.0.1:3000"
    )]
    server: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start a comparison and wait for its analysis.
    Compare {
        #[arg(long)]
        brand: String,
        #[arg(long)]
        competitor: String,
        #[arg(long)]
        area: String,
        /// Repeat to select several sources; omit for all of them.
        #[arg(long = "source")]
        sources: Vec<String>,
        /// Defaults to a fresh UUID.
        #[arg(long)]
        request_id: Option<String>,
    },
    /// Print the ledger record for a request.
    Status { request_id: String },
    /// Print a stored analysis.
    Result { analysis_job_id: Uuid },
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Apply pending migrations to `DATABASE_URL`.
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("no command given; run with --help for usage");
        return Ok(());
    };

    let config = rivalscope_core::load_app_config()?;
    match command {
        Commands::Compare {
            brand,
            competitor,
            area,
            sources,
            request_id,
        } => {
            let request_id = request_id.unwrap_or_else(|| Uuid::new_v4().to_string());
            let sources = (!sources.is_empty()).then_some(sources.as_slice());
            let request =
                rivalscope_core::ComparisonRequest::new(request_id, brand, competitor, area, sources)?;
            commands::run_compare(&cli.server, &config, &request).await?;
        }
        Commands::Status { request_id } => {
            commands::run_status(&cli.server, &request_id).await?;
        }
        Commands::Result { analysis_job_id } => {
            commands::run_result(&cli.server, analysis_job_id).await?;
        }
        Commands::Db {
            command: DbCommands::Migrate,
        } => commands::run_migrate(&config).await?,
    }

    Ok(())
}
