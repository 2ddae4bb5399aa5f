use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod commands;
mod config;
mod core;
mod display;
mod input;
mod providers;
mod system;
mod tools;

use crate::app::Application;
use crate::cli::Args;
use crate::commands::create_command_registry;
use crate::config::{Config, Provider};
use crate::core::error::ChatError;
use crate::providers::factory::{ProviderFactory, ProviderSettings};
use crate::system::SystemInfo;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("TOOLCHAT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run() -> Result<(), ChatError> {
    let args = Args::parse();
    let config = Config::load()?;

    let provider = match args.provider.as_deref() {
        Some(name) => Provider::from_str(name)
            .ok_or_else(|| ChatError::Config(format!("Unknown provider: {}", name)))?,
        None => config.provider(),
    };
    let settings = ProviderSettings::resolve(provider, &config, args.model.as_deref())?;
    let llm = ProviderFactory::new().create(&provider, &settings)?;

    let system_info = SystemInfo::new();
    let mut app = Application::new(
        args,
        config,
        provider.name(),
        llm,
        &system_info,
        create_command_registry(),
    );
    app.run().await
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(e) = run().await {
        display::display_error(&e.to_string());
        std::process::exit(1);
    }
}
