use axum::{debug_handler, extract::Query, response::Redirect};
use serde::Deserialize;

use crate::{AppResult, AppState};

use super::{safe_return_url, AuthContext};

#[derive(Deserialize)]
pub(crate) struct LogoutQuery {
    pub(crate) return_url: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn logout(
    Query(LogoutQuery { return_url }): Query<LogoutQuery>,
    mut auth: AuthContext,
) -> AppResult<Redirect> {
    auth.sign_out().await?;
    Ok(Redirect::to(&safe_return_url(return_url.or(Some("/login".to_owned())))))
}
