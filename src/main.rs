use std::error::Error;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use lmbridge::api::TextOptions;
use lmbridge::core::config::{self, ResolvedConfig};
use lmbridge::inference::{
    AdapterWarning, CompletionProvider, CompletionRequest, Conversation, MessagePart,
    ModelMessage, ModelSettings,
};
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};

#[derive(Parser)]
#[command(name = "lmbridge", about = "Talk to a local LM Studio server")]
struct Args {
    /// LM Studio base URL (overrides config and LM_STUDIO_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Model identifier (overrides config and LMBRIDGE_MODEL)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List models known to the server
    Models,
    /// Show one model's catalog entry
    Model { id: String },
    /// Send a chat conversation through the provider
    Chat {
        prompt: String,
        /// System prompt sent before the user prompt
        #[arg(long)]
        system: Option<String>,
        /// Top-level instructions (sent first, as a system message)
        #[arg(long)]
        instructions: Option<String>,
        #[arg(long)]
        max_tokens: Option<u32>,
        #[arg(long)]
        temperature: Option<f64>,
        /// Stop sequence; repeatable, only the first is sent
        #[arg(long)]
        stop: Vec<String>,
    },
    /// Raw text completion of a prompt
    Complete {
        prompt: String,
        #[arg(long)]
        max_tokens: Option<u32>,
        #[arg(long)]
        temperature: Option<f64>,
        #[arg(long)]
        stop: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    dotenv::dotenv().ok();

    let level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    let log_config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .build();
    let _ = TermLogger::init(level, log_config, TerminalMode::Stderr, ColorChoice::Auto);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let file_config = config::load_config()?;
    let resolved = config::resolve(&file_config, args.base_url.as_deref(), args.model.as_deref());
    log::info!(
        "lmbridge using {} with model {}",
        resolved.base_url,
        resolved.model_name
    );

    match args.command {
        Command::Models => list_models(&resolved).await,
        Command::Model { id } => show_model(&resolved, &id).await,
        Command::Chat {
            prompt,
            system,
            instructions,
            max_tokens,
            temperature,
            stop,
        } => {
            let mut settings = ModelSettings::new();
            if let Some(max_tokens) = max_tokens {
                settings = settings.set("max_tokens", max_tokens);
            }
            if let Some(temperature) = temperature {
                settings = settings.set("temperature", temperature);
            }
            if !stop.is_empty() {
                settings = settings.set("stop_sequences", stop);
            }

            let mut parts = Vec::new();
            if let Some(system) = system {
                parts.push(MessagePart::system(system));
            }
            parts.push(MessagePart::user(prompt));

            let mut conversation = Conversation::new().push(ModelMessage::new(parts));
            conversation.instructions = instructions;

            chat(&resolved, &conversation, &settings).await
        }
        Command::Complete {
            prompt,
            max_tokens,
            temperature,
            stop,
        } => {
            let defaults = TextOptions::default();
            let options = TextOptions {
                temperature: temperature.or(defaults.temperature),
                max_tokens: max_tokens.or(defaults.max_tokens),
                stream: false,
                stop,
            };
            complete(&resolved, &prompt, options).await
        }
    }
}

async fn list_models(config: &ResolvedConfig) -> Result<(), Box<dyn Error>> {
    let models = config.client()?.list_models().await?;
    for model in models.data {
        println!(
            "{:<48} {:<10} {:<11} {:<8} ctx={}",
            model.id,
            format!("{:?}", model.model_type),
            model.state,
            model.quantization,
            model.max_context_length
        );
    }
    Ok(())
}

async fn show_model(config: &ResolvedConfig, id: &str) -> Result<(), Box<dyn Error>> {
    let model = config.client()?.get_model(id).await?;
    println!("{}", serde_json::to_string_pretty(&model)?);
    Ok(())
}

async fn chat(
    config: &ResolvedConfig,
    conversation: &Conversation,
    settings: &ModelSettings,
) -> Result<(), Box<dyn Error>> {
    let provider = config.provider()?;
    let request = CompletionRequest {
        conversation,
        settings: Some(settings),
    };
    let (response, usage) = provider.generate(request).await?;

    for warning in &response.warnings {
        match warning {
            AdapterWarning::StopSequencesTruncated { kept, dropped } => {
                eprintln!("warning: only stop sequence {kept:?} was sent; dropped {dropped:?}");
            }
        }
    }
    println!("{}", response.text());
    eprintln!(
        "[{}] tokens: {} in, {} out, {} total",
        response.model_name, usage.input_tokens, usage.output_tokens, usage.total_tokens
    );
    Ok(())
}

async fn complete(
    config: &ResolvedConfig,
    prompt: &str,
    options: TextOptions,
) -> Result<(), Box<dyn Error>> {
    let response = config
        .client()?
        .create_text_completion(&config.model_name, prompt, options)
        .await?;
    for choice in &response.choices {
        println!("{}", choice.text);
    }
    eprintln!(
        "[{}] tokens: {} total, {:.1} tok/s",
        response.model, response.usage.total_tokens, response.stats.tokens_per_second
    );
    Ok(())
}
