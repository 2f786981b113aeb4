use clap::{Parser, Subcommand};
use dotenv::dotenv;
use multihop_rs::adk::model::{GenerationConfig, Model};
use multihop_rs::multihop::config::Settings;
use multihop_rs::multihop::runner::{answer_of, BatchOptions, Runner};
use multihop_rs::multihop::server::{self, AppState};
use multihop_rs::multihop::usage::RequestCounter;

use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML settings file (defaults to ./multihop.yaml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer a single multi-hop question
    Single {
        /// The question to answer
        task: String,

        #[arg(long)]
        temperature: Option<f32>,

        #[arg(long)]
        top_p: Option<f32>,

        #[arg(long)]
        top_k: Option<u32>,
    },
    /// Answer every unanswered question in a dataset
    Batch {
        /// JSON array of {id, question, answer}
        #[arg(short, long)]
        dataset: PathBuf,

        /// Answers file, appended to and used to skip finished ids
        #[arg(short, long, default_value = "answers.json")]
        answers: PathBuf,

        /// Directory for per-example execution logs
        #[arg(short, long, default_value = "logs")]
        logs_dir: PathBuf,
    },
    /// Serve the HTTP API
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Inspect or manage the request counter
    Usage {
        #[command(subcommand)]
        action: UsageAction,
    },
}

#[derive(Subcommand, Debug)]
enum UsageAction {
    /// Print current usage statistics
    Show,
    /// Zero the counter and clear its history
    Reset,
    /// Change the request limit
    SetMax { max_requests: u64 },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;

    match args.command {
        Commands::Single {
            task,
            temperature,
            top_p,
            top_k,
        } => {
            let runner = build_runner(&settings)?;
            let defaults = settings.generation;
            let config = GenerationConfig::sampling(
                temperature.unwrap_or(defaults.temperature),
                top_p.unwrap_or(defaults.top_p),
                top_k.unwrap_or(defaults.top_k),
            );

            let state = runner.run_with(&task, config).await?;
            println!("\n=== Execution Log ===");
            for (i, entry) in state.log.iter().enumerate() {
                println!("{}. {}", i + 1, entry);
            }
            println!("\nFinal Answer: {}", answer_of(&state));
            println!("Tokens used: {}", state.tokens_used);
        }
        Commands::Batch {
            dataset,
            answers,
            logs_dir,
        } => {
            let runner = build_runner(&settings)?;
            let summary = runner
                .run_batch(&BatchOptions {
                    dataset,
                    answers,
                    logs_dir,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Serve { port } => {
            if let Some(port) = port {
                settings.server.port = port;
            }
            let status = settings.credentials_status();
            if !status.ok {
                log::warn!("{}", status.message);
            }

            let counter = RequestCounter::from_settings(&settings.usage);
            if counter.initialize(settings.usage.max_requests).await? {
                log::info!("Created request counter at {}", counter.path().display());
            }
            let state = Arc::new(AppState {
                runner: build_runner(&settings)?,
                counter,
                settings,
            });
            server::serve(state).await?;
        }
        Commands::Usage { action } => {
            let counter = RequestCounter::from_settings(&settings.usage);
            match action {
                UsageAction::Show => {
                    let (_, message) = counter.check().await?;
                    println!("{}", message);
                }
                UsageAction::Reset => {
                    counter.reset().await?;
                    println!("Counter reset");
                }
                UsageAction::SetMax { max_requests } => {
                    counter.set_max(max_requests).await?;
                    println!("Request limit set to {}", max_requests);
                }
            }
            println!("{}", serde_json::to_string_pretty(&counter.stats().await?)?);
        }
    }

    Ok(())
}

fn build_runner(settings: &Settings) -> Result<Runner, Box<dyn std::error::Error + Send + Sync>> {
    let model: Arc<dyn Model> = Arc::new(settings.build_model()?);
    log::info!("Using model: {}", model.name());
    Ok(Runner::new(model, settings)?)
}
