use altaira::cli::{Cli, Command};
use altaira::{Config, Gateway};
use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Install default crypto provider for Rustls TLS.
    // This prevents the error: "could not automatically determine the process-level CryptoProvider"
    // when both aws-lc-rs and ring features are available (or neither is explicitly selected).
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("Warning: Failed to install default crypto provider: {e:?}");
    }

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let cli = Cli::parse();
    let config = Config::load_or_init()?;

    match cli.command {
        Some(Command::Run) | None => {
            let gateway = Arc::new(Gateway::from_config(config).await?);
            tokio::select! {
                result = gateway.run() => result,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutting down");
                    Ok(())
                }
            }
        }
        Some(Command::Doctor) => {
            doctor(&config);
            Ok(())
        }
    }
}

fn doctor(config: &Config) {
    let checks = [
        ("bot_token", !config.bot_token.is_empty()),
        ("admin_bot_token", !config.admin_bot_token.is_empty()),
        ("admin_password", !config.admin_password.is_empty()),
        ("openai_api_key", !config.openai_api_key.is_empty()),
    ];

    println!("Altaira configuration ({})", config.config_path.display());
    for (name, ok) in checks {
        println!("  {} {name}", if ok { "✓" } else { "✗" });
    }

    let providers = config.payments.configured_tokens();
    if providers.is_empty() {
        println!("  ✗ payment providers (none configured)");
    } else {
        for (name, _) in providers {
            println!("  ✓ payment provider: {name}");
        }
    }

    match altaira::tiers::validate_plan_table() {
        Ok(()) => println!("  ✓ tier plan table"),
        Err(e) => println!("  ✗ tier plan table: {e}"),
    }
}
