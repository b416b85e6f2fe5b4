use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};
use wachat::channels::whatsapp::WhatsAppChannel;
use wachat::{gateway, Config};

/// WaChat — WhatsApp Cloud API webhook bridge with OpenAI-generated replies.
#[derive(Parser, Debug)]
#[command(name = "wachat")]
#[command(version)]
#[command(about = "WhatsApp Cloud API ⇄ OpenAI webhook bridge", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the webhook gateway
    Serve {
        /// Bind address
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Bind port
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },

    /// Check configuration and WhatsApp API reachability
    Doctor,

    /// Send a one-shot text message (smoke test for the send leg)
    Send {
        /// Recipient phone number
        phone_number: String,

        /// Message body
        #[arg(default_value = "Mensaje de prueba")]
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    // Fail fast: every command needs the full secret set.
    let config = Config::from_env()?;

    match cli.command {
        Commands::Serve { host, port } => gateway::run(config, &host, port).await,
        Commands::Doctor => run_doctor(config).await,
        Commands::Send {
            phone_number,
            message,
        } => {
            let channel = WhatsAppChannel::new(Arc::new(config));
            channel.send_text(&phone_number, &message).await?;
            println!("✓ message sent to {phone_number}");
            Ok(())
        }
    }
}

async fn run_doctor(config: Config) -> Result<()> {
    println!("WaChat doctor");
    println!("  messages endpoint: {}", config.messages_url());
    println!("  model: {}", config.model);

    let channel = WhatsAppChannel::new(Arc::new(config));
    if channel.health_check().await {
        println!("  WhatsApp API: ✓ reachable");
        Ok(())
    } else {
        println!("  WhatsApp API: ✗ unreachable or credentials rejected");
        anyhow::bail!("doctor found problems")
    }
}
