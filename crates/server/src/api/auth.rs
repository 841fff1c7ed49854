//! First two legs of the handshake: obtaining a request token and verifying it.

use crate::AppState;
use crate::api::page::redirect;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::oauth::{CredentialState, OAuthProvider};
use axum::{
    Extension,
    extract::{Query, State},
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Query parameters the provider appends to the callback URL.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub oauth_token: Option<String>,
    pub oauth_verifier: Option<String>,
    pub org: Option<String>,
}

impl CallbackParams {
    /// All three parameters, or `None` if any is absent or blank.
    fn required(self) -> Option<(String, String, String)> {
        let present = |v: Option<String>| v.filter(|s| !s.is_empty());
        Some((
            present(self.oauth_token)?,
            present(self.oauth_verifier)?,
            present(self.org)?,
        ))
    }
}

/// `GET /do-auth`: start a new flow and send the user to the provider.
///
/// Overwrites whatever flow was in progress.
#[tracing::instrument(skip_all)]
pub async fn do_auth(
    State(state): State<AppState>,
    Extension(config): Extension<Arc<AppConfig>>,
) -> Result<Response, AppError> {
    let provider = OAuthProvider::new(state.upstream.clone(), &config.api_url);
    let credentials = provider
        .request_token(
            &config.consumer_key,
            &config.consumer_secret,
            &config.callback_url,
        )
        .await
        .map_err(AppError::Authorization)?;

    state.store.update(credentials.to_map()).await;

    let url = credentials.authorization_url(&config.api_url)?;
    info!("Redirecting to authorization url");
    Ok(redirect(&url))
}

/// `GET /oauth`: the provider's callback carrying the user's verifier.
#[tracing::instrument(skip_all)]
pub async fn oauth_callback(
    State(state): State<AppState>,
    Extension(config): Extension<Arc<AppConfig>>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, AppError> {
    let (token, verifier, org) = params.required().ok_or(AppError::MissingParameters)?;

    let stored = CredentialState::from_map(&state.store.read().await)?;
    if stored.oauth_token.as_deref() != Some(token.as_str()) {
        warn!("Callback token does not match the stored request token");
    }

    let provider = OAuthProvider::new(state.upstream.clone(), &config.api_url);
    let mut verified = provider
        .verify(&stored, &verifier)
        .await
        .map_err(AppError::Authorization)?;
    verified.org = Some(org);

    state.store.update(verified.to_map()).await;
    info!(org = ?verified.org, "Authorization verified");
    Ok(redirect("/verified"))
}
