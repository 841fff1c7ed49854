//! Authorized client for the accounting API's resource collections.

use crate::error::UpstreamError;
use crate::oauth::CredentialState;
use crate::oauth::signing::authorization_header;
use crate::upstream::UpstreamClient;
use bytes::Bytes;
use hyper::{Method, header};
use serde_json::Value;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tracing::info;

const API_PATH: &str = "api.xro/2.0";

pub struct ResourceClient {
    credentials: CredentialState,
    transport: UpstreamClient,
    api_url: String,
}

impl ResourceClient {
    /// Build a client from stored credentials. Fails unless the handshake completed.
    pub fn new(
        credentials: CredentialState,
        transport: UpstreamClient,
        api_url: &str,
    ) -> Result<Self, UpstreamError> {
        if !credentials.verified || credentials.oauth_token.is_none() {
            return Err(UpstreamError::NotVerified);
        }
        if credentials.is_expired(OffsetDateTime::now_utc()) {
            return Err(UpstreamError::Unauthorized(
                "token_expired: access token has expired".to_string(),
            ));
        }
        Ok(Self {
            credentials,
            transport,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Contacts flagged as suppliers.
    #[tracing::instrument(skip(self))]
    pub async fn vendors(&self) -> Result<Vec<Value>, UpstreamError> {
        self.collection("Contacts", Some("where=IsSupplier%3D%3Dtrue"))
            .await
    }

    /// The full chart of accounts.
    #[tracing::instrument(skip(self))]
    pub async fn accounts(&self) -> Result<Vec<Value>, UpstreamError> {
        self.collection("Accounts", None).await
    }

    async fn collection(
        &self,
        resource: &str,
        query: Option<&str>,
    ) -> Result<Vec<Value>, UpstreamError> {
        let mut url = format!("{}/{API_PATH}/{resource}", self.api_url);
        if let Some(query) = query {
            url.push('?');
            url.push_str(query);
        }

        let auth = authorization_header("GET", &url, &[], &self.credentials.oauth_params());
        let response = self
            .transport
            .send(
                Method::GET,
                &url,
                &[
                    (header::AUTHORIZATION, auth),
                    (header::ACCEPT, "application/json".to_string()),
                ],
                Bytes::new(),
            )
            .await?;
        if !response.status.is_success() {
            return Err(UpstreamError::from_response(
                response.status,
                &response.text(),
            ));
        }

        let mut body: Value = serde_json::from_slice(&response.body)
            .map_err(|e| UpstreamError::InvalidResponse(format!("{resource}: {e}")))?;
        let items = match body.get_mut(resource).map(Value::take) {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(UpstreamError::InvalidResponse(format!(
                    "{resource} is not a list: {other}"
                )));
            }
        };
        info!(resource, count = items.len(), "Fetched collection");
        Ok(items.into_iter().map(coerce_value).collect())
    }
}

/// Replace date strings in upstream payloads by their plain text rendering.
///
/// The API encodes timestamps as `/Date(<millis>[+-]hhmm)/` and dates as
/// `YYYY-MM-DDTHH:MM:SS`; both become `YYYY-MM-DD HH:MM:SS[.ffffff]`.
pub fn coerce_value(value: Value) -> Value {
    match value {
        Value::String(s) => match parse_date(&s) {
            Some(dt) => Value::String(format_datetime(dt)),
            None => Value::String(s),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(coerce_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, coerce_value(v)))
                .collect(),
        ),
        other => other,
    }
}

fn parse_date(s: &str) -> Option<PrimitiveDateTime> {
    if let Some(inner) = s.strip_prefix("/Date(").and_then(|r| r.strip_suffix(")/")) {
        return parse_ms_date(inner);
    }
    let iso = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    let iso_fraction =
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]");
    PrimitiveDateTime::parse(s, iso)
        .or_else(|_| PrimitiveDateTime::parse(s, iso_fraction))
        .ok()
}

fn parse_ms_date(inner: &str) -> Option<PrimitiveDateTime> {
    // The sign of the millisecond count is part of the number; an offset sign
    // can only follow at least one digit.
    let split = inner
        .char_indices()
        .skip(1)
        .find(|(_, c)| *c == '+' || *c == '-')
        .map(|(i, _)| i);
    let (millis, offset) = match split {
        Some(i) => (&inner[..i], Some(&inner[i..])),
        None => (inner, None),
    };
    let millis: i128 = millis.parse().ok()?;
    let utc = OffsetDateTime::from_unix_timestamp_nanos(millis.checked_mul(1_000_000)?).ok()?;

    let offset = match offset {
        Some(raw) if raw.len() == 5 && raw[1..].bytes().all(|b| b.is_ascii_digit()) => {
            let sign = if raw.starts_with('-') { -1 } else { 1 };
            let hours: i8 = raw.get(1..3)?.parse().ok()?;
            let minutes: i8 = raw.get(3..5)?.parse().ok()?;
            UtcOffset::from_hms(sign * hours, sign * minutes, 0).ok()?
        }
        Some(_) => return None,
        None => UtcOffset::UTC,
    };
    let local = utc.checked_add(Duration::seconds(offset.whole_seconds().into()))?;
    Some(PrimitiveDateTime::new(local.date(), local.time()))
}

fn format_datetime(dt: PrimitiveDateTime) -> String {
    let base = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let mut out = dt
        .format(base)
        .expect("four digit years always fit the date format");
    let micros = dt.microsecond();
    if micros != 0 {
        out.push_str(&format!(".{micros:06}"));
    }
    out
}
