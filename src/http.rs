use crate::repositories::{AuthorRepository, BookRepository};
use anyhow::Context;
use axum::Router;
use axum::routing::get;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod handler;

#[derive(Debug)]
pub struct AppState<R> {
    repo: Arc<R>,
}

impl<R> AppState<R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo: Arc::new(repo),
        }
    }
}

impl<R> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
        }
    }
}

#[derive(Debug)]
pub struct HttpServerConfig {
    port: u16,
}

impl HttpServerConfig {
    pub const fn new(port: u16) -> Self {
        Self { port }
    }
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new<R>(state: AppState<R>, config: HttpServerConfig) -> anyhow::Result<Self>
    where
        R: AuthorRepository + BookRepository,
    {
        let router = router(state);

        let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port))
            .await
            .with_context(|| format!("Failed to bind to port {}", config.port))?;

        Ok(Self { router, listener })
    }

    /// Serves until Ctrl-C, then lets in-flight requests finish.
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self
            .listener
            .local_addr()
            .context("Failed to read listener address")?;
        info!(%addr, "Listening");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Received error from running server")?;
        Ok(())
    }
}

pub fn router<R>(state: AppState<R>) -> Router
where
    R: AuthorRepository + BookRepository,
{
    Router::new()
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes<R>() -> Router<AppState<R>>
where
    R: AuthorRepository + BookRepository,
{
    Router::new()
        .route(
            "/authors",
            get(handler::list_authors::<R>).post(handler::create_author::<R>),
        )
        .route("/authors/{id}", get(handler::find_author::<R>))
        .route("/authors/{id}/books", get(handler::list_author_books::<R>))
        .route(
            "/books",
            get(handler::list_books::<R>).post(handler::create_book::<R>),
        )
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
