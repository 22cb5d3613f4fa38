use std::sync::Arc;

use axum::Router;
use dotenvy::dotenv;
use log::info;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, Mutex};
use tower_http::cors::CorsLayer;

use forgedesk::config::AppConfig;
use forgedesk::identity::session::SessionManager;
use forgedesk::identity::{CredentialVerifier, DisabledVerifier, HttpCredentialVerifier};
use forgedesk::notifications::push::{DisabledPush, FcmClient, PushTransport};
use forgedesk::shared::migrations::ensure_schema;
use forgedesk::shared::state::AppState;
use forgedesk::shared::utils::create_conn;
use forgedesk::{comments, identity, notifications, tickets};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config = AppConfig::from_env();
    let pool = create_conn(&config)?;
    ensure_schema(&pool)?;

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (change_tx, _) = broadcast::channel(256);

    let push: Arc<dyn PushTransport> = match &config.push.endpoint {
        Some(endpoint) => Arc::new(FcmClient::new(endpoint.clone(), config.push.api_key.clone())),
        None => {
            log::warn!("no push endpoint configured; push delivery disabled");
            Arc::new(DisabledPush)
        }
    };
    let verifier: Arc<dyn CredentialVerifier> = match &config.identity.endpoint {
        Some(endpoint) => Arc::new(HttpCredentialVerifier::new(endpoint.clone())),
        None => {
            log::warn!("no identity endpoint configured; logins disabled");
            Arc::new(DisabledVerifier)
        }
    };

    let state = Arc::new(AppState {
        conn: pool,
        config: config.clone(),
        sessions: Arc::new(Mutex::new(SessionManager::new())),
        verifier,
        push,
        events: event_tx,
        changes: change_tx,
    });

    notifications::spawn_fanout_worker(state.clone(), event_rx);

    let app = Router::new()
        .merge(identity::configure_identity_routes())
        .merge(tickets::configure_tickets_routes())
        .merge(comments::configure_comments_routes())
        .merge(notifications::configure_notifications_routes())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("forgedesk listening on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
