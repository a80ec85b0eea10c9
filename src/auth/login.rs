use axum::{debug_handler, extract::{Path, Query, State}, http::StatusCode, response::{IntoResponse, Redirect, Response}, Form};
use oauth2::{CsrfToken, PkceCodeChallenge, Scope};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::info;

use crate::{backend::{BackendError, Credentials}, include_res, res, session::{CSRF_STATE, PKCE_VERIFIER, RETURN_URL}, AppResult, AppState};

use super::{clients::ClientProvider, safe_return_url, AuthContext, Clients};

#[derive(Deserialize)]
pub(crate) struct LoginQuery {
    pub(crate) return_url: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct LoginForm {
    email: String,
    password: String,
    return_url: Option<String>,
}

pub(crate) fn render_login(auth: &AuthContext, clients: &Clients, email: &str, return_url: &str, error: Option<&str>) -> Response {
    let google = if clients.enabled(ClientProvider::Google) {
        res::Template::new(include_res!(str, "/pages/google_button.html"))
            .with("return_url", res::escape(return_url))
            .render()
    } else {
        String::new()
    };
    let error_html = error
        .map(|e| format!(r#"<p class="error">{}</p>"#, res::escape(e)))
        .unwrap_or_default();

    let body = res::Template::new(include_res!(str, "/pages/login.html"))
        .with("error", &error_html)
        .with("email", &res::escape(email))
        .with("return_url", &res::escape(return_url))
        .with("google", &google)
        .render();

    let status = if error.is_some() { StatusCode::UNPROCESSABLE_ENTITY } else { StatusCode::OK };
    (status, res::page("Login", auth, &body)).into_response()
}

#[debug_handler(state = AppState)]
pub(crate) async fn login_page(
    Query(LoginQuery { return_url }): Query<LoginQuery>,
    State(clients): State<Clients>,
    auth: AuthContext,
) -> impl IntoResponse {
    render_login(&auth, &clients, "", &safe_return_url(return_url), None)
}

#[debug_handler(state = AppState)]
pub(crate) async fn password_login(
    State(clients): State<Clients>,
    mut auth: AuthContext,
    Form(LoginForm { email, password, return_url }): Form<LoginForm>,
) -> AppResult<Response> {
    let return_url = safe_return_url(return_url);

    match auth.sign_in(Credentials::Password { email: email.trim().to_owned(), password }).await {
        Ok(_) => Ok(Redirect::to(&return_url).into_response()),
        Err(BackendError::InvalidCredentials) => {
            info!("failed login for {email}");
            Ok(render_login(&auth, &clients, &email, &return_url, Some("Failed to log in. Please check your credentials.")))
        }
        Err(e) => Err(e.into()),
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    Path(provider): Path<ClientProvider>,
    Query(LoginQuery { return_url }): Query<LoginQuery>,
    State(clients): State<Clients>,
    session: Session,
) -> AppResult<Response> {
    let client = clients.get_client(provider)?;

    let (pkce_code_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let (authorize_url, csrf_state) = client.authorize_url(CsrfToken::new_random)
        .add_scopes(provider.scopes().iter().map(|s| Scope::new(s.to_string())))
        .set_pkce_challenge(pkce_code_challenge)
        .url();

    session.insert(CSRF_STATE, csrf_state.secret()).await?;
    session.insert(PKCE_VERIFIER, pkce_verifier.secret()).await?;
    session.insert(RETURN_URL, safe_return_url(return_url)).await?;

    Ok(Redirect::to(authorize_url.as_str()).into_response())
}
