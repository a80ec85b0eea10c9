mod clients;
mod login;
mod lockin;
mod logout;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    routing::{get, post},
    Router,
};
use tower_sessions::Session;

use crate::{
    backend::{BackendError, Credentials, Identity, IdentityProvider},
    AppError, AppState,
};

pub use clients::{ClientProvider, Clients};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login::login_page).post(login::password_login))
        .route("/login/{provider}", get(login::login))
        .route("/lockin/{provider}", get(lockin::lockin))
        .route("/logout", post(logout::logout))
}

/// Who is making this request, if anyone.
///
/// Built per request from the session cookie and the process-wide
/// [`IdentityProvider`]; handlers receive it as an extractor instead of
/// reaching for shared auth state.
pub struct AuthContext {
    pub identity: Option<Identity>,
    session: Session,
    identities: IdentityProvider,
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
    IdentityProvider: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| AppError::from(msg))?;
        let identities = IdentityProvider::from_ref(state);
        let identity = identities.current_identity(&session).await?;

        Ok(Self { identity, session, identities })
    }
}

impl AuthContext {
    pub async fn sign_in(&mut self, credentials: Credentials) -> Result<Identity, BackendError> {
        let identity = self.identities.sign_in(&self.session, credentials).await?;
        self.identity = Some(identity.clone());
        Ok(identity)
    }

    pub async fn sign_out(&mut self) -> Result<(), BackendError> {
        self.identities.sign_out(&self.session).await?;
        self.identity = None;
        Ok(())
    }

    pub fn identities(&self) -> &IdentityProvider {
        &self.identities
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    #[cfg(test)]
    pub(crate) fn for_tests(session: Session, identities: IdentityProvider) -> Self {
        Self { identity: None, session, identities }
    }

    #[cfg(test)]
    pub(crate) fn signed_out_for_tests(identities: &IdentityProvider) -> Self {
        let session = Session::new(None, std::sync::Arc::new(tower_sessions::MemoryStore::default()), None);
        Self::for_tests(session, identities.clone())
    }

    /// A fresh session signed in as a new identity with password `pw`.
    #[cfg(test)]
    pub(crate) async fn signed_in_for_tests(identities: &IdentityProvider, email: &str) -> Self {
        identities.create_identity(email, "pw", None).await.unwrap();
        let mut auth = Self::signed_out_for_tests(identities);
        auth.sign_in(Credentials::Password { email: email.to_owned(), password: "pw".to_owned() })
            .await
            .unwrap();
        auth
    }
}

/// Keeps redirects on this site.
pub(crate) fn safe_return_url(return_url: Option<String>) -> String {
    match return_url {
        Some(url) if url.starts_with('/') && !url.starts_with("//") && !url.contains('\\') => url,
        _ => "/".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_urls_stay_local() {
        assert_eq!(safe_return_url(Some("/startups/new".into())), "/startups/new");
        assert_eq!(safe_return_url(Some("//evil.example".into())), "/");
        assert_eq!(safe_return_url(Some("https://evil.example".into())), "/");
        assert_eq!(safe_return_url(None), "/");
    }
}
