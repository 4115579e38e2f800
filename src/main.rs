use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use stockhand::auth::{CredentialStore, HttpTokenSource};
use stockhand::cli::{Cli, Commands};
use stockhand::config::Config;
use stockhand::dispatch::{ActionDispatcher, HttpEmailSender, HttpSheetClient};
use stockhand::interpret::LlmInterpreter;
use stockhand::session::SessionDeps;
use stockhand::{server, WsRecognitionClient};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::CheckConfig) => {
            config.validate()?;
            println!("Configuration OK.");
            Ok(())
        }
        None => {
            let mut config = config.with_env_overrides();
            if let Some(bind) = cli.bind {
                config.server.bind = bind;
            }
            let deps = build_deps(&config)?;
            server::serve(&config.server.bind, deps)
                .await
                .context("server failed")?;
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => match Config::default_path() {
            Some(path) => Config::load_or_default(&path)?,
            None => Config::default(),
        },
    };
    Ok(config)
}

/// Wire the shared collaborators every session uses.
fn build_deps(config: &Config) -> Result<Arc<SessionDeps>> {
    let recognition = Arc::new(WsRecognitionClient::new(
        &config.recognition.url,
        config.recognition.sample_rate,
    )?);

    let interpreter = Arc::new(LlmInterpreter::new(
        &config.interpreter.base_url,
        &config.interpreter.api_key,
        &config.interpreter.model,
    ));

    let credentials = Arc::new(CredentialStore::new(Arc::new(HttpTokenSource::new(
        &config.credentials.token_url,
        &config.credentials.client_id,
        &config.credentials.client_secret,
        &config.credentials.refresh_token,
    ))));

    let email = Arc::new(HttpEmailSender::new(
        &config.actions.email_endpoint,
        credentials.clone(),
    ));
    let sheets = Arc::new(HttpSheetClient::new(
        &config.actions.sheet_endpoint,
        credentials,
    ));
    let dispatcher = Arc::new(ActionDispatcher::new(
        email,
        sheets,
        &config.actions.email_to,
        &config.actions.inventory_range,
    ));

    Ok(Arc::new(SessionDeps {
        recognition,
        interpreter,
        dispatcher,
        confirmation_window: config.session.confirmation_window()?,
        flush_timeout: config.session.flush_timeout()?,
    }))
}
