//! Chatwire - send a chat message to any configured provider and stream the reply

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use chatwire::config::Config;
use chatwire::error::Result;
use chatwire::provider::ProviderId;
use chatwire::proxy::{ProxyBridge, ProxyExecutor, link};
use chatwire::session::{Author, ChatSessionController, SendOutcome, SessionSnapshot};
use chatwire::transport::{DirectTransport, Transport};

/// Chatwire - streaming chat client for OpenAI, Anthropic, Google, Mistral, Ollama and OpenRouter
#[derive(Parser)]
#[command(name = "chatwire")]
#[command(about = "Stream chat completions from multiple LLM providers")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Send one message and stream the reply to stdout
    Send(SendArgs),
}

#[derive(Args)]
pub struct SendArgs {
    /// Provider to use (openai, anthropic, google, mistral, ollama, openrouter)
    #[arg(long, short = 'p', default_value = "openai")]
    pub provider: String,

    /// Model name; defaults to the provider's configured model
    #[arg(long, short = 'm')]
    pub model: Option<String>,

    #[arg(long)]
    pub temperature: Option<f32>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// System prompt
    #[arg(long)]
    pub system: Option<String>,

    /// Wait for the whole reply instead of streaming
    #[arg(long)]
    pub no_stream: bool,

    /// Route the request through an in-process proxy channel
    #[arg(long)]
    pub via_proxy: bool,

    /// Message to send
    #[arg(required = true)]
    pub prompt: Vec<String>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Send(args) => send(cli.config, args).await,
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chatwire=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn send(config_path: Option<PathBuf>, args: SendArgs) -> Result<()> {
    let config = Config::load(config_path.as_deref())?;
    tracing::debug!("Config loaded: {:?}", config.session);

    let provider: ProviderId = args.provider.parse()?;
    let direct: Arc<dyn Transport> = Arc::new(DirectTransport::new(&config.proxy)?);

    let transport: Arc<dyn Transport> = if args.via_proxy {
        let (connector, listener) = link();
        let executor = Arc::new(ProxyExecutor::new(direct));
        tokio::spawn(executor.serve(listener));
        tracing::info!("Routing requests through in-process proxy channel");
        Arc::new(ProxyBridge::new(Arc::new(connector)))
    } else {
        direct
    };

    let controller = Arc::new(ChatSessionController::from_config(&config, transport)?);

    let mut options = config.chat_options(provider);
    if let Some(model) = args.model {
        options.model = model;
    }
    if args.temperature.is_some() {
        options.temperature = args.temperature;
    }
    if args.max_tokens.is_some() {
        options.max_tokens = args.max_tokens;
    }
    options.system_prompt = args.system;
    options.stream = !args.no_stream;

    let printer = tokio::spawn(print_reply(controller.subscribe()));

    let stopper = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, stopping stream");
                controller.stop_streaming();
            }
        })
    };

    let prompt = args.prompt.join(" ");
    let outcome = controller.send_message(&prompt, provider, options).await;
    stopper.abort();

    match outcome {
        Ok(SendOutcome::Completed(_)) => {
            let _ = printer.await;
            println!();
            Ok(())
        }
        Ok(SendOutcome::Cancelled) => {
            printer.abort();
            println!();
            eprintln!("(cancelled)");
            Ok(())
        }
        Err(e) => {
            printer.abort();
            Err(e)
        }
    }
}

/// Write the streaming assistant reply to stdout as it grows
async fn print_reply(mut rx: watch::Receiver<SessionSnapshot>) {
    let mut current: Option<Uuid> = None;
    let mut printed = 0usize;

    while rx.changed().await.is_ok() {
        let snapshot = rx.borrow_and_update().clone();
        let Some(last) = snapshot.messages.last() else {
            continue;
        };
        if last.author != Author::Assistant {
            continue;
        }
        if current != Some(last.id) {
            current = Some(last.id);
            printed = 0;
        }

        if let Some(new) = last.content.get(printed..) {
            if !new.is_empty() {
                print!("{new}");
                let _ = std::io::stdout().flush();
                printed = last.content.len();
            }
        }

        if !snapshot.streaming && !last.pending {
            break;
        }
    }
}
