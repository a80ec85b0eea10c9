use axum::{debug_handler, extract::State, http::StatusCode, response::{IntoResponse, Redirect, Response}, Form};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    auth::AuthContext,
    backend::{now_millis, Backend, BackendError, Credentials},
    include_res, res, AppState,
};

use super::{put_account, username_taken, Account};

#[derive(Debug, Default, Deserialize)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Error)]
pub enum SignupError {
    #[error("Please fill in every field.")]
    MissingField,

    #[error("Username already exists. Please choose another one.")]
    UsernameTaken,

    #[error("Failed to create an account. Please try again.")]
    Failed(#[from] BackendError),
}

/// Creates the identity and the account record, then signs the new user in.
pub async fn register(backend: &Backend, auth: &mut AuthContext, form: &SignupForm) -> Result<Account, SignupError> {
    let username = form.username.trim();
    let email = form.email.trim();
    if username.is_empty() || email.is_empty() || form.password.is_empty() {
        return Err(SignupError::MissingField);
    }

    if username_taken(backend, username).await? {
        return Err(SignupError::UsernameTaken);
    }

    let identity = auth.identities().create_identity(email, &form.password, None).await?;

    let account = Account {
        uid: identity.id.clone(),
        username: username.to_owned(),
        email: identity.email.clone(),
        display_name: identity.display_name.clone(),
        created_at: now_millis(),
    };
    put_account(backend, &account).await?;

    auth.sign_in(Credentials::Password { email: email.to_owned(), password: form.password.clone() }).await?;

    info!("adding @{}#{}", account.username, account.uid);
    Ok(account)
}

fn render_signup(auth: &AuthContext, form: &SignupForm, error: Option<&SignupError>) -> Response {
    let error_html = error
        .map(|e| format!(r#"<p class="error">{}</p>"#, res::escape(&e.to_string())))
        .unwrap_or_default();

    let body = res::Template::new(include_res!(str, "/pages/signup.html"))
        .with("error", &error_html)
        .with("username", &res::escape(&form.username))
        .with("email", &res::escape(&form.email))
        .render();

    let status = if error.is_some() { StatusCode::UNPROCESSABLE_ENTITY } else { StatusCode::OK };
    (status, res::page("Sign Up", auth, &body)).into_response()
}

#[debug_handler(state = AppState)]
pub(crate) async fn signup_page(auth: AuthContext) -> Response {
    render_signup(&auth, &SignupForm::default(), None)
}

#[debug_handler(state = AppState)]
pub(crate) async fn signup(
    State(backend): State<Backend>,
    mut auth: AuthContext,
    Form(form): Form<SignupForm>,
) -> Response {
    match register(&backend, &mut auth, &form).await {
        Ok(_) => Redirect::to("/").into_response(),
        Err(e) => {
            if let SignupError::Failed(cause) = &e {
                warn!("sign-up for {} failed: {cause}", form.email);
            }
            render_signup(&auth, &form, Some(&e))
        }
    }
}
