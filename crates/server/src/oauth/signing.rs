//! OAuth 1.0a HMAC-SHA1 signatures (RFC 5849, section 3.4).

use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::collections::BTreeMap;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";

/// Credentials and protocol parameters that go into the `Authorization` header.
#[derive(Debug, Clone, Copy, Default)]
pub struct OAuthParams<'a> {
    pub consumer_key: &'a str,
    pub consumer_secret: &'a str,
    pub token: Option<&'a str>,
    pub token_secret: Option<&'a str>,
    pub callback: Option<&'a str>,
    pub verifier: Option<&'a str>,
}

/// RFC 3986 percent-encoding: everything except `ALPHA / DIGIT / - . _ ~`.
pub fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Decode an `application/x-www-form-urlencoded` string into a map.
///
/// Undecodable pairs are kept raw rather than dropped.
pub fn parse_form(body: &str) -> BTreeMap<String, String> {
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(spaced)
}

/// Split a URL into its base (scheme, authority, path) and decoded query pairs.
pub fn split_url(url: &str) -> (&str, Vec<(String, String)>) {
    match url.split_once('?') {
        Some((base, query)) => (base, parse_form(query).into_iter().collect()),
        None => (url, Vec::new()),
    }
}

/// Compute the base64 HMAC-SHA1 signature over the signature base string.
pub fn signature(
    method: &str,
    base_url: &str,
    params: &[(String, String)],
    consumer_secret: &str,
    token_secret: Option<&str>,
) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();
    let normalized = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let base_string = format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode(base_url),
        percent_encode(&normalized)
    );
    tracing::trace!("signature base string: {base_string}");

    let key = format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret.unwrap_or(""))
    );
    let mut mac = HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(base_string.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// Build the `Authorization` header value for a request with a fixed nonce and timestamp.
pub fn authorization_header_with(
    method: &str,
    url: &str,
    extra: &[(String, String)],
    oauth: &OAuthParams<'_>,
    nonce: &str,
    timestamp: i64,
) -> String {
    let mut protocol: Vec<(String, String)> = vec![
        ("oauth_consumer_key".into(), oauth.consumer_key.into()),
        ("oauth_nonce".into(), nonce.into()),
        ("oauth_signature_method".into(), SIGNATURE_METHOD.into()),
        ("oauth_timestamp".into(), timestamp.to_string()),
        ("oauth_version".into(), "1.0".into()),
    ];
    if let Some(token) = oauth.token {
        protocol.push(("oauth_token".into(), token.into()));
    }
    if let Some(callback) = oauth.callback {
        protocol.push(("oauth_callback".into(), callback.into()));
    }
    if let Some(verifier) = oauth.verifier {
        protocol.push(("oauth_verifier".into(), verifier.into()));
    }

    let (base_url, query) = split_url(url);
    let mut signed = protocol.clone();
    signed.extend(query);
    signed.extend(extra.iter().cloned());
    let sig = signature(
        method,
        base_url,
        &signed,
        oauth.consumer_secret,
        oauth.token_secret,
    );
    protocol.push(("oauth_signature".into(), sig));
    protocol.sort();

    let fields = protocol
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("OAuth {fields}")
}

/// Build the `Authorization` header value with a fresh nonce and the current time.
pub fn authorization_header(
    method: &str,
    url: &str,
    extra: &[(String, String)],
    oauth: &OAuthParams<'_>,
) -> String {
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    let timestamp = time::OffsetDateTime::now_utc().unix_timestamp();
    authorization_header_with(method, url, extra, oauth, &nonce, timestamp)
}
