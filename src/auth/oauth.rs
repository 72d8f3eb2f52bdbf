use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::config::OAuthConfig;
use crate::utils::error::{AppError, Result};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Google authorization-code flow: consent redirect, code-for-token
/// exchange, profile fetch. Only constructed when both client credentials
/// are configured.
#[derive(Clone)]
pub struct GoogleOAuth {
    client: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    token_url: String,
    userinfo_url: String,
}

impl GoogleOAuth {
    pub fn new(config: &OAuthConfig) -> Option<Self> {
        let client_id = config.google_client_id.clone()?;
        let client_secret = config.google_client_secret.clone()?;

        Some(Self {
            client: Client::new(),
            client_id,
            client_secret,
            redirect_uri: config.redirect_uri.clone(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
        })
    }

    /// URL the browser is redirected to for the consent screen.
    pub fn authorize_url(&self) -> Result<String> {
        let url = Url::parse_with_params(
            GOOGLE_AUTH_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", "profile email"),
            ],
        )
        .map_err(|e| AppError::OAuth(e.to_string()))?;
        Ok(url.to_string())
    }

    pub async fn exchange_code(&self, code: &str) -> Result<String> {
        let params = [
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::OAuth(format!(
                "token exchange failed with status {}",
                response.status()
            )));
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    pub async fn fetch_profile(&self, access_token: &str) -> Result<GoogleProfile> {
        let response = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::OAuth(format!(
                "userinfo request failed with status {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }

    #[cfg(test)]
    pub(crate) fn with_endpoints(mut self, token_url: &str, userinfo_url: &str) -> Self {
        self.token_url = token_url.to_string();
        self.userinfo_url = userinfo_url.to_string();
        self
    }
}
