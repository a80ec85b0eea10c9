//! Registered users, stored in the `users` collection keyed by username.

mod signup;

use axum::{routing::get, Router};
use serde::{Deserialize, Serialize};

use crate::{backend::{Backend, BackendError}, AppState};

pub use signup::{register, SignupError, SignupForm};

pub const USERS: &str = "users";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", get(signup::signup_page).post(signup::signup))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub uid: String,
    pub username: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub created_at: i64,
}

/// Whether an account already uses `username`. Nothing holds the name
/// between this check and [`put_account`].
pub async fn username_taken(backend: &Backend, username: &str) -> Result<bool, BackendError> {
    Ok(backend.get_record(USERS, username).await?.is_some())
}

/// Writes the account under its username. An existing record with the same username is replaced.
pub async fn put_account(backend: &Backend, account: &Account) -> Result<(), BackendError> {
    backend.set_record(USERS, &account.username, account).await
}

pub async fn get_account(backend: &Backend, username: &str) -> Result<Option<Account>, BackendError> {
    backend.get_record(USERS, username).await?.map(|r| r.decode()).transpose()
}
