pub mod auth;
pub mod config;
pub mod err;
pub mod models;
pub mod store;
pub mod students;
pub mod token;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use axum::handler::Handler;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderName, StatusCode};
use axum::{middleware, Extension, Json, Router};
use serde::Serialize;

use crate::config::Config;
pub use crate::err::Error;
use crate::store::Stores;
use crate::token::TokenService;

pub type Payload<T> = Result<(StatusCode, Json<T>), Error>;
pub type WithSession<T> = Result<(StatusCode, [(HeaderName, String); 1], Json<T>), Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok((StatusCode::OK, Json(value)))
}

pub fn created<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok((StatusCode::CREATED, Json(value)))
}

pub fn breaks<V>(err: Error) -> Payload<V>
where
    V: Serialize,
{
    Err(err)
}

pub fn with_session<V>(status: StatusCode, cookie: String, value: V) -> WithSession<V>
where
    V: Serialize,
{
    Ok((status, [(SET_COOKIE, cookie)], Json(value)))
}

/// Everything a handler needs, cloned into each request.
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<TokenService>,
    pub stores: Stores,
    pub secure_cookies: bool,
}

impl AppState {
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            tokens: Arc::new(TokenService::new(config.token_secret.as_bytes())),
            stores: Stores::connect(&config.database_url).await?,
            secure_cookies: config.secure_cookies,
        })
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(auth::routes())
        .merge(students::routes().layer(middleware::from_fn(auth::gate)))
        .fallback(err::handler404.into_service())
        .layer(Extension(state))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = Config::from_env()?;
    let state = AppState::from_config(&config).await?;

    log::info!("Starting student registry on http://{}", config.bind_addr);
    axum::Server::bind(&config.bind_addr)
        .serve(app(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
}
