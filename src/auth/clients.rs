use std::fmt;

use oauth2::{basic::BasicClient, AuthUrl, ClientId, ClientSecret, EndpointNotSet, EndpointSet, RedirectUrl, TokenUrl};
use serde::Deserialize;

use crate::{config::Config, AppResult};

type HappyClient = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientProvider {
    Google,
}

impl ClientProvider {
    pub fn slug(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "google",
        }
    }

    pub fn userinfo_url(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "https://openidconnect.googleapis.com/v1/userinfo",
        }
    }

    pub fn scopes(&self) -> &[&str] {
        use ClientProvider::*;
        match self {
            Google => &["openid", "email", "profile"],
        }
    }
}

impl fmt::Display for ClientProvider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Clone)]
pub struct Clients {
    google_client: Option<HappyClient>,
}

impl Clients {
    pub fn from_config(config: &Config) -> AppResult<Clients> {
        let google_client = match &config.google {
            None => None,
            Some(keys) => {
                let client_id = ClientId::new(keys.client_id.clone());
                let client_secret = ClientSecret::new(keys.client_secret.clone());

                let auth_url = AuthUrl::new("https://accounts.google.com/o/oauth2/auth".to_string())?;
                let token_url = TokenUrl::new("https://oauth2.googleapis.com/token".to_string())?;
                let redirect_url = RedirectUrl::new(format!("{}/lockin/{}", config.public_url, ClientProvider::Google.slug()))?;

                Some(
                    BasicClient::new(client_id)
                    .set_client_secret(client_secret)
                    .set_auth_uri(auth_url)
                    .set_token_uri(token_url)
                    .set_redirect_uri(redirect_url)
                )
            }
        };

        Ok(Clients { google_client })
    }

    pub fn enabled(&self, provider: ClientProvider) -> bool {
        self.get_client(provider).is_ok()
    }

    pub fn get_client(&self, provider: ClientProvider) -> AppResult<HappyClient> {
        use ClientProvider::*;
        match provider {
            Google => self.google_client.clone(),
        }.ok_or(format!("OAuth provider {provider} keys not supplied").into())
    }
}
