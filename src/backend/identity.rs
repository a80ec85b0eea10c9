use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::{broadcast, broadcast::error::RecvError, mpsc};
use tower_sessions::Session;
use tracing::info;
use uuid::Uuid;

use crate::session::{SIGN_IN, USER_ID};

use super::{BackendError, Subscription};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
}

impl Identity {
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.email)
    }
}

pub enum Credentials {
    Password { email: String, password: String },
    /// Already verified by the OAuth provider.
    Google { email: String, display_name: Option<String> },
}

/// Sign-ins and sign-outs, tagged with the sign-in token of the session they happened in.
#[derive(Debug, Clone)]
enum IdentityEvent {
    SignedIn { sign_in: String, identity: Identity },
    SignedOut { sign_in: String },
}

#[derive(Clone)]
pub struct IdentityProvider {
    db_pool: SqlitePool,
    events: broadcast::Sender<IdentityEvent>,
}

impl IdentityProvider {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self {
            db_pool,
            events: broadcast::channel(64).0,
        }
    }

    pub async fn create_identity(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Identity, BackendError> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| BackendError::Hash(e.to_string()))?
            .to_string();

        self.insert(email, Some(password_hash), display_name, "password").await
    }

    async fn insert(
        &self,
        email: &str,
        password_hash: Option<String>,
        display_name: Option<&str>,
        provider: &str,
    ) -> Result<Identity, BackendError> {
        let id = Uuid::now_v7().to_string();
        let result = sqlx::query("INSERT INTO identities (id,email,password_hash,display_name,provider) VALUES (?,?,?,?,?)")
            .bind(&id)
            .bind(email)
            .bind(password_hash)
            .bind(display_name)
            .bind(provider)
            .execute(&self.db_pool)
            .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(BackendError::EmailTaken(email.to_owned()));
            }
            Err(e) => return Err(e.into()),
        }

        info!("new {provider} identity {id} for {email}");
        Ok(Identity {
            id,
            email: email.to_owned(),
            display_name: display_name.map(str::to_owned),
        })
    }

    pub async fn find(&self, id: &str) -> Result<Option<Identity>, BackendError> {
        let row: Option<(String, String, Option<String>)> =
            sqlx::query_as("SELECT id,email,display_name FROM identities WHERE id=?")
                .bind(id)
                .fetch_optional(&self.db_pool)
                .await?;

        Ok(row.map(|(id, email, display_name)| Identity { id, email, display_name }))
    }

    async fn verify(&self, credentials: Credentials) -> Result<Identity, BackendError> {
        match credentials {
            Credentials::Password { email, password } => {
                let row: Option<(String, Option<String>, Option<String>)> =
                    sqlx::query_as("SELECT id,password_hash,display_name FROM identities WHERE email=?")
                        .bind(&email)
                        .fetch_optional(&self.db_pool)
                        .await?;

                let Some((id, Some(password_hash), display_name)) = row else {
                    return Err(BackendError::InvalidCredentials);
                };
                let parsed = PasswordHash::new(&password_hash).map_err(|e| BackendError::Hash(e.to_string()))?;
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .map_err(|_| BackendError::InvalidCredentials)?;

                Ok(Identity { id, email, display_name })
            }
            Credentials::Google { email, display_name } => {
                let row: Option<(String, Option<String>)> =
                    sqlx::query_as("SELECT id,display_name FROM identities WHERE email=?")
                        .bind(&email)
                        .fetch_optional(&self.db_pool)
                        .await?;

                match row {
                    Some((id, stored_name)) => Ok(Identity {
                        id,
                        email,
                        display_name: stored_name.or(display_name),
                    }),
                    None => self.insert(&email, None, display_name.as_deref(), "google").await,
                }
            }
        }
    }

    /// Checks the credentials and binds the identity to the session.
    ///
    /// The session keeps its sign-in token across repeated sign-ins until it
    /// signs out, so watchers of the session see who it switched to.
    pub async fn sign_in(&self, session: &Session, credentials: Credentials) -> Result<Identity, BackendError> {
        let identity = self.verify(credentials).await?;
        let sign_in = match session.get::<String>(SIGN_IN).await? {
            Some(sign_in) => sign_in,
            None => Uuid::now_v7().to_string(),
        };

        session.cycle_id().await?;
        session.insert(USER_ID, &identity.id).await?;
        session.insert(SIGN_IN, &sign_in).await?;

        info!("welcome u/{}", identity.id);
        let _ = self.events.send(IdentityEvent::SignedIn { sign_in, identity: identity.clone() });
        Ok(identity)
    }

    /// Signs this session out. Other sessions of the same identity stay signed in.
    pub async fn sign_out(&self, session: &Session) -> Result<(), BackendError> {
        let user_id = session.get::<String>(USER_ID).await?;
        let sign_in = session.get::<String>(SIGN_IN).await?;
        session.clear().await;

        if let Some(user_id) = user_id {
            info!("goodbye u/{user_id}");
        }
        if let Some(sign_in) = sign_in {
            let _ = self.events.send(IdentityEvent::SignedOut { sign_in });
        }
        Ok(())
    }

    pub async fn current_identity(&self, session: &Session) -> Result<Option<Identity>, BackendError> {
        match session.get::<String>(USER_ID).await? {
            Some(user_id) => self.find(&user_id).await,
            None => Ok(None),
        }
    }

    /// Follows who is signed in on `session`. Yields the new identity when the
    /// session signs in again and `None` once it signs out; sign-outs in other
    /// sessions are not seen. A session that isn't signed in yields `None` straight away.
    pub async fn subscribe_identity(&self, session: &Session) -> Result<Subscription<Option<Identity>>, BackendError> {
        let watched = session.get::<String>(SIGN_IN).await?;
        let mut events = self.events.subscribe();
        let (tx, rx) = mpsc::channel(4);

        let task = tokio::spawn(async move {
            let Some(watched) = watched else {
                let _ = tx.send(None).await;
                return;
            };

            loop {
                let update = match events.recv().await {
                    Ok(IdentityEvent::SignedIn { sign_in, identity }) if sign_in == watched => Some(identity),
                    Ok(IdentityEvent::SignedOut { sign_in }) if sign_in == watched => None,
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return,
                };
                let signed_out = update.is_none();
                if tx.send(update).await.is_err() || signed_out {
                    return;
                }
            }
        });

        Ok(Subscription::new(rx, task))
    }
}
