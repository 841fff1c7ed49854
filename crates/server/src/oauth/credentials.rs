use crate::error::CredentialStateError;
use crate::oauth::signing::{OAuthParams, percent_encode};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// State of one OAuth handshake, round-tripped through the token store between requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CredentialState {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub callback_uri: Option<String>,
    /// Request token before verification, access token afterwards.
    pub oauth_token: Option<String>,
    pub oauth_token_secret: Option<String>,
    pub oauth_verifier: Option<String>,
    pub verified: bool,
    pub oauth_expires_at: Option<OffsetDateTime>,
    pub oauth_authorization_expires_at: Option<OffsetDateTime>,
    /// Organisation short code the user granted access to.
    pub org: Option<String>,
}

const CONSUMER_KEY: &str = "consumer_key";
const CONSUMER_SECRET: &str = "consumer_secret";
const CALLBACK_URI: &str = "callback_uri";
const OAUTH_TOKEN: &str = "oauth_token";
const OAUTH_TOKEN_SECRET: &str = "oauth_token_secret";
const OAUTH_VERIFIER: &str = "oauth_verifier";
const VERIFIED: &str = "verified";
const OAUTH_EXPIRES_AT: &str = "oauth_expires_at";
const OAUTH_AUTHORIZATION_EXPIRES_AT: &str = "oauth_authorization_expires_at";
const ORG: &str = "org";

impl CredentialState {
    pub fn new(consumer_key: &str, consumer_secret: &str, callback_uri: Option<&str>) -> Self {
        Self {
            consumer_key: consumer_key.to_string(),
            consumer_secret: consumer_secret.to_string(),
            callback_uri: callback_uri.map(str::to_string),
            ..Default::default()
        }
    }

    /// Serialize every field. Absent values become empty strings so that a
    /// merge into the token store replaces whatever the previous flow left.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        fn opt(value: &Option<String>) -> String {
            value.clone().unwrap_or_default()
        }
        fn ts(value: &Option<OffsetDateTime>) -> String {
            value
                .map(|t| t.unix_timestamp().to_string())
                .unwrap_or_default()
        }

        BTreeMap::from([
            (CONSUMER_KEY.to_string(), self.consumer_key.clone()),
            (CONSUMER_SECRET.to_string(), self.consumer_secret.clone()),
            (CALLBACK_URI.to_string(), opt(&self.callback_uri)),
            (OAUTH_TOKEN.to_string(), opt(&self.oauth_token)),
            (OAUTH_TOKEN_SECRET.to_string(), opt(&self.oauth_token_secret)),
            (OAUTH_VERIFIER.to_string(), opt(&self.oauth_verifier)),
            (VERIFIED.to_string(), self.verified.to_string()),
            (OAUTH_EXPIRES_AT.to_string(), ts(&self.oauth_expires_at)),
            (
                OAUTH_AUTHORIZATION_EXPIRES_AT.to_string(),
                ts(&self.oauth_authorization_expires_at),
            ),
            (ORG.to_string(), opt(&self.org)),
        ])
    }

    /// Rebuild a credential state from a stored mapping.
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self, CredentialStateError> {
        let get = |key: &str| map.get(key).filter(|v| !v.is_empty()).cloned();
        let timestamp = |field: &'static str| -> Result<Option<OffsetDateTime>, CredentialStateError> {
            get(field)
                .map(|raw| {
                    raw.parse::<i64>()
                        .ok()
                        .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
                        .ok_or(CredentialStateError::InvalidField { field, value: raw })
                })
                .transpose()
        };

        let verified = match get(VERIFIED).as_deref() {
            None | Some("false") => false,
            Some("true") => true,
            Some(other) => {
                return Err(CredentialStateError::InvalidField {
                    field: VERIFIED,
                    value: other.to_string(),
                });
            }
        };

        Ok(Self {
            consumer_key: get(CONSUMER_KEY).ok_or(CredentialStateError::MissingField(CONSUMER_KEY))?,
            consumer_secret: get(CONSUMER_SECRET)
                .ok_or(CredentialStateError::MissingField(CONSUMER_SECRET))?,
            callback_uri: get(CALLBACK_URI),
            oauth_token: get(OAUTH_TOKEN),
            oauth_token_secret: get(OAUTH_TOKEN_SECRET),
            oauth_verifier: get(OAUTH_VERIFIER),
            verified,
            oauth_expires_at: timestamp(OAUTH_EXPIRES_AT)?,
            oauth_authorization_expires_at: timestamp(OAUTH_AUTHORIZATION_EXPIRES_AT)?,
            org: get(ORG),
        })
    }

    /// URL the user is sent to in order to grant access.
    pub fn authorization_url(&self, api_url: &str) -> Result<String, CredentialStateError> {
        let token = self
            .oauth_token
            .as_deref()
            .ok_or(CredentialStateError::MissingField(OAUTH_TOKEN))?;
        Ok(format!(
            "{api_url}/oauth/Authorize?oauth_token={}",
            percent_encode(token)
        ))
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.oauth_expires_at.is_some_and(|at| at <= now)
    }

    /// Signing parameters for requests made with this state's token.
    pub fn oauth_params(&self) -> OAuthParams<'_> {
        OAuthParams {
            consumer_key: &self.consumer_key,
            consumer_secret: &self.consumer_secret,
            token: self.oauth_token.as_deref(),
            token_secret: self.oauth_token_secret.as_deref(),
            callback: None,
            verifier: None,
        }
    }
}
