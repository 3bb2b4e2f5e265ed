use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gemini_ai::{parse_message_pairs, AskOptions, ChatConfig, Config, Gemini, OutputShape};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "gemini-ai")]
#[command(about = "Talk to Google's Gemini models from the terminal")]
struct CliArgs {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Ask a single question.
    Ask {
        prompt: String,
        /// Print the full JSON response instead of its text.
        #[arg(long)]
        json: bool,
        /// Print the answer as it streams in.
        #[arg(long)]
        stream: bool,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        temperature: Option<f32>,
        #[arg(long)]
        top_p: Option<f32>,
        #[arg(long)]
        top_k: Option<u32>,
        #[arg(long)]
        max_output_tokens: Option<u32>,
        /// PNG, JPEG or GIF to send along with the prompt.
        #[arg(long = "image", value_name = "PATH")]
        images: Vec<PathBuf>,
    },
    /// Start an interactive chat, one message per line on stdin.
    Chat {
        /// JSON file holding `[["user", "model"], ...]` turns to start from.
        #[arg(long, value_name = "FILE")]
        history: Option<PathBuf>,
        #[arg(long)]
        stream: bool,
    },
    /// Count the tokens in a piece of text.
    Count { text: String },
    /// Print the embedding vector of a piece of text.
    Embed { text: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gemini_ai=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = CliArgs::parse();

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: CliArgs) -> Result<()> {
    let config = Config::from_env()?;
    let gemini = Gemini::from_config(&config)?;

    match args.command {
        CliCommand::Ask {
            prompt,
            json,
            stream,
            model,
            temperature,
            top_p,
            top_k,
            max_output_tokens,
            images,
        } => {
            let mut options = AskOptions::new().output(output_shape(json));
            // Image prompts fall back to the vision model rather than GEMINI_MODEL.
            options.model = model.or_else(|| images.is_empty().then(|| config.model.clone()));
            options.temperature = temperature;
            options.top_p = top_p;
            options.top_k = top_k;
            options.max_output_tokens = max_output_tokens;

            for path in &images {
                let data = std::fs::read(path)
                    .with_context(|| format!("Failed to read image {}", path.display()))?;
                options = options.attachment(data);
            }

            if stream {
                options = options.on_chunk(print_chunk);
            }

            let answer = gemini.ask(&prompt, options).await?;
            if stream {
                println!();
            } else {
                println!("{}", answer);
            }
        }
        CliCommand::Chat { history, stream } => {
            let messages = match history {
                Some(path) => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read history {}", path.display()))?;
                    parse_message_pairs(&raw)?
                }
                None => Vec::new(),
            };

            let chat = gemini.create_chat(ChatConfig {
                messages,
                model: config.model.clone(),
                ..ChatConfig::default()
            });
            info!("Chatting with {} (end input to quit)", chat.config().model);

            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = line?;
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let options = if stream {
                    AskOptions::new().on_chunk(print_chunk)
                } else {
                    AskOptions::new()
                };

                match chat.ask(line, options).await {
                    Ok(_) if stream => println!(),
                    Ok(answer) => println!("{}", answer),
                    // A failed turn leaves the chat usable; report and keep going.
                    Err(e) => error!("{}", e),
                }
            }
        }
        CliCommand::Count { text } => {
            let tokens = gemini.count(&text, Some(&config.model)).await?;
            println!("{}", tokens);
        }
        CliCommand::Embed { text } => {
            let values = gemini.embed(&text, None).await?;
            println!("{}", serde_json::to_string(&values)?);
        }
    }

    Ok(())
}

fn output_shape(json: bool) -> OutputShape {
    if json {
        OutputShape::Json
    } else {
        OutputShape::Text
    }
}

fn print_chunk(chunk: gemini_ai::AskResponse) {
    print!("{}", chunk);
    let _ = std::io::stdout().flush();
}
