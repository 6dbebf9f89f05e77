use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use survey_lens::batch::{run_score_batch, run_translation_batch, BatchFilter};
use survey_lens::config::Config;
use survey_lens::openai::{OpenAiClient, Paced};
use survey_lens::scoring::{ScorePipeline, ScoreSettings};
use survey_lens::store::DataStore;
use survey_lens::transcript::Transcript;
use survey_lens::translation::{TranslationPipeline, TranslationSettings};

#[derive(Parser, Debug)]
#[command(name = "survey-lens")]
#[command(about = "Translate survey questions and collect per-language opinion scores", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate translations, back-translations and quality scores
    Translate(FilterArgs),
    /// Generate opinion scores for translated questions
    Score(FilterArgs),
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Process specific question ID
    #[arg(long)]
    question: Option<String>,

    /// Process specific language code
    #[arg(long)]
    language: Option<String>,

    /// Force regeneration of existing records
    #[arg(long)]
    force: bool,
}

impl From<FilterArgs> for BatchFilter {
    fn from(args: FilterArgs) -> Self {
        BatchFilter {
            question_id: args.question,
            language_code: args.language,
            force: args.force,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored when the variables are already set)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("survey_lens=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli.command).await {
        error!("Error in main function: {:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(command: Command) -> Result<()> {
    let config = Config::from_env()?;
    let store = DataStore::from_config(&config);
    let client = Paced::new(OpenAiClient::from_config(&config), config.rate_limit_delay);
    let transcript = Transcript::create(&config.transcript_file)?;

    match command {
        Command::Translate(args) => {
            let pipeline = TranslationPipeline::new(
                &client,
                &transcript,
                TranslationSettings::from_config(&config),
            );
            run_translation_batch(&store, &pipeline, &config.source_language_code, &args.into())
                .await?;
            info!("Translation process complete!");
        }
        Command::Score(args) => {
            let pipeline =
                ScorePipeline::new(&client, &transcript, ScoreSettings::from_config(&config));
            run_score_batch(&store, &pipeline, &config.source_language_code, &args.into())
                .await?;
            info!("Score generation complete!");
        }
    }

    info!(
        "Detailed logs saved to {}",
        config.transcript_file.display()
    );
    Ok(())
}
