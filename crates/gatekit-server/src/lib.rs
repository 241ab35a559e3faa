//! GateKit Server - the HTTP API over the gateway core
//!
//! Wiring is explicit constructor composition: store and bus at the bottom,
//! registry and pipelines above them, `AppState` on top, no service
//! locator. The route table in `routes::table` declares the contract; the
//! router here mounts the same paths; the auth middleware enforces scopes
//! and rate limits from the table.

pub mod auth;
pub mod error;
pub mod ratelimit;
pub mod routes;
pub mod services;
pub mod state;

use std::sync::Arc;

use axum::http::Method;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use gatekit_core::{GatewayConfig, GatewayError, GatewayResult};
use gatekit_crypto::CredentialCipher;
use gatekit_pipeline::{
    DeliveryConfig, EventBus, InboundProcessor, OutboundConfig, OutboundPipeline,
    WebhookDispatcher,
};
use gatekit_platforms::{
    DiscordProvider, EnvelopeSink, EvolutionProvider, PlatformRegistry, TelegramProvider,
};
use gatekit_store::{MemoryStore, PlatformConfigStore, Store};

use crate::ratelimit::RouteLimiters;
use crate::routes::table::route_table;
use crate::state::AppState;

/// Inbound processing shards; bounds per-thread ordering, not throughput
const INBOUND_SHARDS: usize = 8;

/// The assembled gateway application
pub struct App {
    pub state: AppState,
}

impl App {
    /// Build with the default in-memory store
    pub async fn build(config: GatewayConfig) -> GatewayResult<App> {
        Self::build_with_store(config, Arc::new(MemoryStore::new())).await
    }

    /// Build against any store backend
    pub async fn build_with_store<S>(config: GatewayConfig, store: Arc<S>) -> GatewayResult<App>
    where
        S: Store + 'static,
    {
        let store_dyn: Arc<dyn Store> = store.clone();
        let config_store: Arc<dyn PlatformConfigStore> = store.clone();

        let cipher = CredentialCipher::new(&config.master_key)?;
        let config = Arc::new(config);

        let bus = Arc::new(EventBus::new());
        let sink: Arc<dyn EnvelopeSink> = bus.clone();

        let registry = Arc::new(PlatformRegistry::new(config_store, cipher.clone()));
        registry.register(Arc::new(TelegramProvider::new(
            config.base_url.clone(),
            sink.clone(),
        )));
        registry.register(Arc::new(DiscordProvider::new(sink.clone())));
        registry.register(Arc::new(EvolutionProvider::new(
            config.base_url.clone(),
            sink.clone(),
        )));

        let dispatcher = WebhookDispatcher::start(
            store_dyn.clone(),
            DeliveryConfig {
                workers: config.delivery_workers,
                ..Default::default()
            },
        );

        let outbound = OutboundPipeline::start(
            store_dyn.clone(),
            registry.clone(),
            dispatcher.clone(),
            OutboundConfig {
                workers: config.outbound_workers,
                ..Default::default()
            },
        );

        let inbound = InboundProcessor::new(store_dyn.clone(), dispatcher.clone());
        inbound.start(&bus, INBOUND_SHARDS);

        let limiters = Arc::new(RouteLimiters::new(
            route_table()
                .iter()
                .filter_map(|spec| spec.rate_limit.map(|limit| (spec.key(), limit))),
        ));

        Ok(App {
            state: AppState {
                config,
                store: store_dyn,
                cipher,
                bus,
                registry,
                outbound,
                dispatcher,
                limiters,
            },
        })
    }

    /// The full router, with auth middleware and tracing attached
    pub fn router(&self) -> Router {
        let state = self.state.clone();

        let router: Router<AppState> = Router::new()
            ;
        router
            .layer(middleware::from_fn_with_state(
                state.clone(),
                auth::auth_middleware,
            ))
            .layer(TraceLayer::new_for_http())
            .layer(
                CorsLayer::new()
                    .allow_methods([
                        Method::GET,
                        Method::POST,
                        Method::PATCH,
                        Method::DELETE,
                    ])
                    .allow_origin(tower_http::cors::Any)
                    .allow_headers(tower_http::cors::Any),
            )
            .with_state(state)
    }

    /// Boot the registry (lifecycle replay for active configs), bind, and
    /// serve until ctrl-c; adapters drain on the way out.
    pub async fn serve(self) -> GatewayResult<()> {
        self.state.registry.boot().await?;

        let router = self.router();
        let listener = tokio::net::TcpListener::bind(&self.state.config.bind)
            .await
            .map_err(|e| {
                GatewayError::Config(format!("cannot bind {}: {e}", self.state.config.bind))
            })?;
        info!("gatekit listening on {}", self.state.config.bind);

        let registry = self.state.registry.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("shutdown signal received");
            })
            .await
            .map_err(|e| GatewayError::Internal(format!("server error: {e}")))?;

        registry.shutdown().await;
        Ok(())
    }
}
