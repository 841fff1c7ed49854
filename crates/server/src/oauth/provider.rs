use crate::error::UpstreamError;
use crate::oauth::credentials::CredentialState;
use crate::oauth::signing::{OAuthParams, authorization_header, parse_form};
use crate::upstream::{UpstreamClient, UpstreamResponse};
use bytes::Bytes;
use hyper::{Method, header};
use std::collections::BTreeMap;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};

/// Drives the request token and access token legs of the handshake.
#[derive(Clone)]
pub struct OAuthProvider {
    transport: UpstreamClient,
    api_url: String,
}

impl OAuthProvider {
    pub fn new(transport: UpstreamClient, api_url: &str) -> Self {
        Self {
            transport,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn request_token_url(&self) -> String {
        format!("{}/oauth/RequestToken", self.api_url)
    }

    pub fn access_token_url(&self) -> String {
        format!("{}/oauth/AccessToken", self.api_url)
    }

    /// Obtain a fresh, unverified request token.
    #[tracing::instrument(skip(self, consumer_secret))]
    pub async fn request_token(
        &self,
        consumer_key: &str,
        consumer_secret: &str,
        callback_uri: &str,
    ) -> Result<CredentialState, UpstreamError> {
        let url = self.request_token_url();
        let oauth = OAuthParams {
            consumer_key,
            consumer_secret,
            callback: Some(callback_uri),
            ..Default::default()
        };
        let response = self.post_signed(&url, &oauth).await?;
        let form = token_form(&response)?;

        let mut state = CredentialState::new(consumer_key, consumer_secret, Some(callback_uri));
        state.oauth_token = form.get("oauth_token").cloned();
        state.oauth_token_secret = form.get("oauth_token_secret").cloned();
        info!("Obtained request token");
        Ok(state)
    }

    /// Exchange the request token in `state` and the user's verifier for an access token.
    ///
    /// The input state is left untouched; the verified state is returned.
    #[tracing::instrument(skip(self, state, verifier))]
    pub async fn verify(
        &self,
        state: &CredentialState,
        verifier: &str,
    ) -> Result<CredentialState, UpstreamError> {
        let url = self.access_token_url();
        let oauth = OAuthParams {
            verifier: Some(verifier),
            ..state.oauth_params()
        };
        let response = self.post_signed(&url, &oauth).await?;
        let form = token_form(&response)?;

        let now = OffsetDateTime::now_utc();
        let expires_in = |key: &str| {
            form.get(key)
                .and_then(|v| v.parse::<i64>().ok())
                .map(|secs| now + Duration::seconds(secs))
        };

        let mut verified = state.clone();
        verified.oauth_token = form.get("oauth_token").cloned();
        verified.oauth_token_secret = form.get("oauth_token_secret").cloned();
        verified.oauth_verifier = Some(verifier.to_string());
        verified.oauth_expires_at = expires_in("oauth_expires_in");
        verified.oauth_authorization_expires_at = expires_in("oauth_authorization_expires_in");
        verified.verified = true;
        info!("Credentials verified");
        Ok(verified)
    }

    async fn post_signed(
        &self,
        url: &str,
        oauth: &OAuthParams<'_>,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let auth = authorization_header("POST", url, &[], oauth);
        let response = self
            .transport
            .send(
                Method::POST,
                url,
                &[(header::AUTHORIZATION, auth)],
                Bytes::new(),
            )
            .await?;
        debug!(status = %response.status, "token endpoint answered");
        if !response.status.is_success() {
            return Err(UpstreamError::from_response(
                response.status,
                &response.text(),
            ));
        }
        Ok(response)
    }
}

fn token_form(response: &UpstreamResponse) -> Result<BTreeMap<String, String>, UpstreamError> {
    let form = parse_form(response.text().trim());
    if form.get("oauth_token").is_none_or(|t| t.is_empty()) {
        return Err(UpstreamError::InvalidResponse(
            "token response has no oauth_token".to_string(),
        ));
    }
    Ok(form)
}
