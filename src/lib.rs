pub mod accounts;
pub mod auth;
pub mod backend;
pub mod config;
pub mod index;
pub mod messages;
pub mod profiles;
pub mod res;
pub mod session;
pub mod startups;

use std::{ops::Deref, sync::Arc};

use axum::{extract::{DefaultBodyLimit, FromRef}, http::StatusCode, response::{Html, IntoResponse, Response}, routing::get, Router};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};
use tracing::error;

use backend::{Backend, BlobStore, IdentityProvider};
use config::Config;
use messages::MessageStore;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub backend: Backend,
    pub identities: IdentityProvider,
    pub messages: MessageStore,
    pub clients: auth::Clients,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config) -> AppResult<AppState> {
        let db_pool = backend::connect(&config.database_url).await?;
        let blobs = BlobStore::new(&config.blob_dir, "/blobs");
        let backend = Backend::new(db_pool.clone(), blobs);

        Ok(AppState {
            identities: IdentityProvider::new(db_pool),
            messages: MessageStore::new(backend.clone()),
            clients: auth::Clients::from_config(&config)?,
            backend,
            config: Arc::new(config),
        })
    }
}

/// The whole site, sessions and request tracing included.
pub fn app(app_state: AppState) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(app_state.config.session_minutes)));

    let blobs = ServeDir::new(app_state.backend.blobs().root());
    let upload_limit = app_state.config.upload_limit_bytes;

    Router::new()
        .route("/", get(index::index))
        .route("/about", get(index::about))
        .route("/style.css", get(res::stylesheet))

        .merge(auth::router())
        .merge(accounts::router())
        .merge(profiles::router())
        .nest("/startups", startups::router().merge(messages::router()))
        .nest_service("/blobs", blobs)

        .fallback(res::not_found)
        .with_state(app_state)
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get(field)
            .ok_or(format!("expected {field} in {self}"))?
            .as_str()
            .ok_or(format!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }
}


pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("{:#}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(res::fragment("Something went wrong. Please try again.")),
        )
            .into_response()
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        Self(anyhow::Error::msg(err))
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        Self(anyhow::Error::msg(err.to_owned()))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self(err)
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(backend::BackendError);
apperr_impl!(serde_json::Error);
apperr_impl!(tower_sessions::session::Error);
apperr_impl!(axum::Error);
apperr_impl!(axum::extract::multipart::MultipartError);
apperr_impl!(reqwest::Error);
apperr_impl!(oauth2::url::ParseError);

impl<E: core::error::Error + Send + Sync + 'static, R: oauth2::ErrorResponse + Send + Sync + 'static> From<oauth2::RequestTokenError<E, R>> for AppError {
    fn from(err: oauth2::RequestTokenError<E, R>) -> Self {
        Self(anyhow::Error::from(err))
    }
}

/// Renders Markdown with raw HTML shown as text.
pub struct Markdown<T>(pub T);

impl<T> IntoResponse for Markdown<T>
where
    T: Deref<Target = str>
{
    fn into_response(self) -> axum::response::Response {
        Html(res::render_markdown(&self.0)).into_response()
    }
}
