use axum::{debug_handler, extract::{Path, Query, State}, response::{IntoResponse, Redirect, Response}};
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeVerifier, TokenResponse};
use serde::Deserialize;
use tracing::warn;

use crate::{backend::Credentials, session::{CSRF_STATE, PKCE_VERIFIER, RETURN_URL}, AppResult, AppState, GetField};

use super::{clients::ClientProvider, login::render_login, safe_return_url, AuthContext, Clients};

#[derive(Deserialize)]
pub struct LockinQuery {
    pub state: Option<String>,
    pub code: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn lockin(
    Path(provider): Path<ClientProvider>,
    Query(query): Query<LockinQuery>,
    State(clients): State<Clients>,
    mut auth: AuthContext,
) -> AppResult<Response> {
    let return_url = safe_return_url(auth.session().remove::<String>(RETURN_URL).await?);

    match exchange(provider, query, &clients, &auth).await {
        Ok(credentials) => {
            auth.sign_in(credentials).await?;
            Ok(Redirect::to(&return_url).into_response())
        }
        Err(e) => {
            warn!("{provider} sign-in failed: {:#}", e.0);
            Ok(render_login(&auth, &clients, "", &return_url, Some("Failed to log in with Google.")))
        }
    }
}

/// Trades the authorization code for the provider's view of the user.
async fn exchange(
    provider: ClientProvider,
    LockinQuery { state, code }: LockinQuery,
    clients: &Clients,
    auth: &AuthContext,
) -> AppResult<Credentials> {
    let state = CsrfToken::new(state.ok_or("OAuth: without state")?);
    let code = AuthorizationCode::new(code.ok_or("OAuth: without code")?);

    let Some(stored_state) = auth.session().remove::<String>(CSRF_STATE).await? else {
        return Err("no csrf_state")?;
    };

    if state.secret().as_str() != stored_state.as_str() {
        return Err("csrf tokens don't match")?;
    }

    let Some(pkce_verifier) = auth.session().remove::<String>(PKCE_VERIFIER).await? else {
        return Err("no pkce_verifier")?;
    };

    let client = clients.get_client(provider)?;
    let http_client = reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let token_result = client
        .exchange_code(code)
        .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
        .request_async(&http_client)
        .await?;

    let access_token = token_result.access_token().secret();
    let body: serde_json::Value = http_client.get(provider.userinfo_url())
        .bearer_auth(access_token)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let email = body.get_str_field("email")?;
    let display_name = body.get_str_field("name").ok();

    Ok(Credentials::Google { email, display_name })
}
