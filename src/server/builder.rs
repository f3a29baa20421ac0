//! ServerBuilder for fluent API to build HTTP servers

use super::handlers::ApiState;
use super::router::build_resource_routes;
use crate::config::ApiConfig;
use crate::core::descriptor::ResourceDescriptor;
use crate::core::registry::ResourceRegistry;
use crate::core::service::ResourceService;
use crate::storage::DocumentStore;
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Builder for creating HTTP servers over a set of resource descriptors
///
/// # Example
///
/// ```ignore
/// let app = ServerBuilder::new()
///     .with_store(InMemoryDocumentStore::new())
///     .register(ResourceDescriptor::new("genres").attributes(["title"]))?
///     .build()?;
/// ```
pub struct ServerBuilder {
    config: ApiConfig,
    registry: ResourceRegistry,
    store: Option<Arc<dyn DocumentStore>>,
    custom_routes: Vec<Router>,
    links_from_host: bool,
    cors: bool,
}

impl ServerBuilder {
    /// Create a new ServerBuilder with the default configuration
    pub fn new() -> Self {
        Self {
            config: ApiConfig::default(),
            registry: ResourceRegistry::new(),
            store: None,
            custom_routes: Vec::new(),
            links_from_host: false,
            cors: false,
        }
    }

    pub fn with_config(mut self, config: ApiConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the document store (required)
    pub fn with_store(mut self, store: impl DocumentStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Set an already shared document store (required)
    pub fn with_shared_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Register a resource type
    pub fn register(mut self, descriptor: ResourceDescriptor) -> Result<Self> {
        self.registry.register(descriptor)?;
        Ok(self)
    }

    /// Use a prepared registry, replacing any registered descriptors
    pub fn with_registry(mut self, registry: ResourceRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Add custom routes to the server
    ///
    /// Use this for endpoints outside the resource mapping, such as
    /// authentication or file uploads.
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Build links from each request's `Host` header instead of `base_url`
    pub fn with_links_from_host(mut self) -> Self {
        self.links_from_host = true;
        self
    }

    /// Allow cross-origin requests from any origin
    pub fn with_permissive_cors(mut self) -> Self {
        self.cors = true;
        self
    }

    /// Build the transport-agnostic service
    ///
    /// Validates the configuration and every relationship target.
    pub fn build_service(&mut self) -> Result<ResourceService> {
        let config = self.config.clone().checked()?;
        self.registry.validate()?;
        let store = self
            .store
            .clone()
            .ok_or_else(|| anyhow::anyhow!("DocumentStore is required. Call .with_store()"))?;

        Ok(ResourceService::new(
            config,
            std::mem::take(&mut self.registry),
            store,
        ))
    }

    /// Build the final REST router
    pub fn build(mut self) -> Result<Router> {
        let service = self.build_service()?;
        tracing::debug!(types = ?service.registry().types(), "building resource routes");

        let state = ApiState {
            service,
            links_from_host: self.links_from_host,
        };

        let mut app = Router::new();
        for custom_router in std::mem::take(&mut self.custom_routes) {
            app = app.merge(custom_router);
        }
        app = app.merge(build_resource_routes(state));

        let app = app.layer(TraceLayer::new_for_http());
        Ok(if self.cors {
            app.layer(CorsLayer::permissive())
        } else {
            app
        })
    }

    /// Serve the application with graceful shutdown
    ///
    /// This will:
    /// - Bind to the provided address
    /// - Start serving requests
    /// - Handle SIGTERM and SIGINT (Ctrl+C) for graceful shutdown
    pub async fn serve(self, addr: &str) -> Result<()> {
        let app = self.build()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}
