//! ToolRelay entry point: load config, wire the components, serve the
//! webhook.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use toolrelay::agent::{AgentLoop, ContextBuilder};
use toolrelay::channel::{router, AppState};
use toolrelay::delivery::TwilioDelivery;
use toolrelay::media::{CloudinaryHost, ImageHost};
use toolrelay::provider::OpenAiClient;
use toolrelay::session::SessionStore;
use toolrelay::tools::{CallerIdentity, RegistryClient};
use toolrelay::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("toolrelay=info")),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;

    let sessions = match &config.session_dir {
        Some(dir) => SessionStore::with_path(dir.clone()).context("creating session store")?,
        None => SessionStore::new_memory(),
    };

    let model = Arc::new(OpenAiClient::new(
        &config.model_base_url,
        &config.model_api_key,
        &config.model_name,
    )?);
    let tools = Arc::new(RegistryClient::new(
        &config.registry_base_url,
        &config.registry_api_key,
    )?);
    let identity = CallerIdentity {
        account_id: config.linked_account_id.clone(),
        allowed_apps: config.allowed_apps.clone(),
    };
    let agent = AgentLoop::new(
        model,
        tools,
        ContextBuilder::default(),
        identity,
        config.max_rounds,
    );

    let delivery = Arc::new(TwilioDelivery::new(
        &config.twilio_account_sid,
        &config.twilio_auth_token,
        &config.twilio_from_number,
    ));

    let image_host: Option<Arc<dyn ImageHost>> =
        match (&config.image_host_cloud, &config.image_host_preset) {
            (Some(cloud), Some(preset)) => Some(Arc::new(CloudinaryHost::new(cloud, preset))),
            _ => None,
        };

    let state = Arc::new(AppState {
        agent: Arc::new(agent),
        sessions,
        delivery,
        image_host,
        request_timeout: config.request_timeout,
    });

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(addr = %addr, model = %config.model_name, "toolrelay listening");

    axum::serve(listener, router(state))
        .await
        .context("server error")?;
    Ok(())
}
