use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::EnvFilter;

use mai::cmd;
use mai::core::Device;
use mai::envconfig::{Host, Settings};

#[derive(Parser)]
#[command(name = "mai")]
#[command(version)]
#[command(about = "Serve local code models behind an OpenAI-compatible API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Default generator for completions and the legacy endpoint
        #[arg(long, env = "DEFAULT_GENERATOR")]
        model: String,
        /// Generator to preload for chat requests
        #[arg(long, env = "CHAT_GENERATOR")]
        chat_model: Option<String>,
        #[arg(long, env = "DEVICE", default_value = "cpu")]
        device: Device,
        /// Overrides MAI_HOST
        #[arg(long)]
        host: Option<String>,
        /// Overrides MAI_PORT
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List the built-in generators
    #[command(alias = "ls")]
    List,
    /// Generate a single completion
    Run {
        model: String,
        prompt: String,
        #[arg(long, env = "DEVICE", default_value = "cpu")]
        device: Device,
    },
    /// Print the embedding of one input
    Embed {
        model: String,
        input: String,
        #[arg(long, env = "DEVICE", default_value = "cpu")]
        device: Device,
    },
    Version,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve {
            model,
            chat_model,
            device,
            host,
            port,
        } => {
            let mut bind = host.as_deref().map(Host::parse).unwrap_or_else(Host::from_env);
            if let Some(port) = port {
                bind.port = port;
            }
            cmd::serve(Settings {
                default_generator: model,
                chat_generator: chat_model,
                device,
                host: bind,
            })
            .await
        }
        Commands::List => cmd::list().await,
        Commands::Run { model, prompt, device } => cmd::run(&model, &prompt, device).await,
        Commands::Embed { model, input, device } => cmd::embed(&model, &input, device).await,
        Commands::Version => cmd::version().await,
    };

    if let Err(e) = result {
        tracing::error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
