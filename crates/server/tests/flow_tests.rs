//! End-to-end tests of the three request stages.
//!
//! The accounting API is replaced by a wiremock server and the router is
//! driven through axum-test.

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use wiremock::matchers::{header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use xero_export::{AppState, api, oauth::TokenStore};

struct Harness {
    server: TestServer,
    store: TokenStore,
    upstream: MockServer,
    dir: TempDir,
}

impl Harness {
    fn out(&self, name: &str) -> PathBuf {
        self.dir.path().join("out").join(name)
    }
}

fn config_ini(api_url: &str, dir: &TempDir) -> String {
    format!(
        "[APP]\n\
         XERO_CONSUMER_KEY = consumer-key\n\
         XERO_CONSUMER_SECRET = consumer-secret\n\
         CALLBACK_URL = http://localhost:8000/oauth\n\
         ACCOUNTS_AND_VENDORS_FILES_PATH = {}\n\
         VENDORS_FILE_NAME = vendors.json\n\
         ACCOUNTS_FILE_NAME = accounts.json\n\
         XERO_API_URL = {}\n\
         STATIC_ROOT = {}\n",
        dir.path().join("out").display(),
        api_url,
        dir.path().join("static").display(),
    )
}

async fn harness_with_config(build: impl FnOnce(&str, &TempDir) -> String) -> Harness {
    let upstream = MockServer::start().await;
    let dir = tempfile::tempdir().expect("tempdir");
    fs::create_dir_all(dir.path().join("out")).expect("out dir");
    fs::create_dir_all(dir.path().join("static")).expect("static dir");

    let config_path = dir.path().join("config.ini");
    fs::write(&config_path, build(&upstream.uri(), &dir)).expect("write config");

    let state = AppState::new(config_path).expect("state");
    let store = state.store.clone();
    let server = TestServer::new(api::router(state)).expect("create test server");

    Harness {
        server,
        store,
        upstream,
        dir,
    }
}

async fn harness() -> Harness {
    harness_with_config(config_ini).await
}

async fn mount_request_token(upstream: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/oauth/RequestToken"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "oauth_token={token}&oauth_token_secret={token}-secret&oauth_callback_confirmed=true"
        )))
        .up_to_n_times(1)
        .mount(upstream)
        .await;
}

/// Accept only the given request token and verifier; reject everything else.
async fn mount_access_token(upstream: &MockServer, token: &str, verifier: &str) {
    Mock::given(method("POST"))
        .and(path("/oauth/AccessToken"))
        .and(header_regex(
            "Authorization",
            &format!(r#"oauth_token="{token}""#),
        ))
        .and(header_regex(
            "Authorization",
            &format!(r#"oauth_verifier="{verifier}""#),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "oauth_token=access-token&oauth_token_secret=access-secret&oauth_expires_in=1800&oauth_authorization_expires_in=31536000",
        ))
        .mount(upstream)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth/AccessToken"))
        .respond_with(ResponseTemplate::new(401).set_body_string(
            "oauth_problem=token_rejected&oauth_problem_advice=Token%20does%20not%20match%20an%20expected%20REQUEST%20token",
        ))
        .with_priority(10)
        .mount(upstream)
        .await;
}

async fn mount_collections(upstream: &MockServer, vendors: Value, accounts: Value) {
    Mock::given(method("GET"))
        .and(path("/api.xro/2.0/Contacts"))
        .and(query_param("where", "IsSupplier==true"))
        .and(header_regex("Authorization", r#"oauth_token="access-token""#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Contacts": vendors })))
        .mount(upstream)
        .await;

    Mock::given(method("GET"))
        .and(path("/api.xro/2.0/Accounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Accounts": accounts })))
        .mount(upstream)
        .await;
}

fn sample_vendors() -> Value {
    json!([{
        "Name": "ACME Supplies",
        "IsSupplier": true,
        "ContactID": "bd2270c3-8706-4c11-9cfb-000b551c3f51",
        "UpdatedDateUTC": "/Date(1326296356560+0000)/"
    }])
}

fn sample_accounts() -> Value {
    json!([
        {"Code": "200", "Name": "Sales", "Type": "REVENUE"},
        {"Code": "400", "Name": "Advertising", "Type": "EXPENSE"}
    ])
}

/// Run `/do-auth` and `/oauth` with matching token and verifier.
async fn authorize(h: &Harness) {
    let start = h.server.get("/do-auth").await;
    start.assert_status(StatusCode::FOUND);

    let callback = h
        .server
        .get("/oauth")
        .add_query_param("oauth_token", "req-a")
        .add_query_param("oauth_verifier", "verifier-a")
        .add_query_param("org", "!x7Kp2")
        .await;
    callback.assert_status(StatusCode::FOUND);
}

#[tokio::test]
async fn full_flow_writes_both_files() {
    let h = harness().await;
    mount_request_token(&h.upstream, "req-a").await;
    mount_access_token(&h.upstream, "req-a", "verifier-a").await;
    mount_collections(&h.upstream, sample_vendors(), sample_accounts()).await;

    let start = h.server.get("/do-auth").await;
    start.assert_status(StatusCode::FOUND);
    let location = start.header("location");
    assert_eq!(
        location.to_str().unwrap(),
        format!("{}/oauth/Authorize?oauth_token=req-a", h.upstream.uri())
    );

    let callback = h
        .server
        .get("/oauth")
        .add_query_param("oauth_token", "req-a")
        .add_query_param("oauth_verifier", "verifier-a")
        .add_query_param("org", "!x7Kp2")
        .await;
    callback.assert_status(StatusCode::FOUND);
    assert_eq!(callback.header("location").to_str().unwrap(), "/verified");

    let stored = h.store.read().await;
    assert_eq!(stored.get("verified").map(String::as_str), Some("true"));
    assert_eq!(
        stored.get("oauth_token").map(String::as_str),
        Some("access-token")
    );
    assert_eq!(stored.get("org").map(String::as_str), Some("!x7Kp2"));

    let page = h.server.get("/verified").await;
    page.assert_status_ok();
    let body = page.text();
    assert!(body.contains("Downloading vendor and account files"));
    assert!(body.contains(&format!(
        "Check vendors list in {}",
        h.out("vendors.json").display()
    )));
    assert!(body.contains(&format!(
        "Check account list in {}",
        h.out("accounts.json").display()
    )));

    let vendors_text = fs::read_to_string(h.out("vendors.json")).expect("vendors written");
    let vendors: Value = serde_json::from_str(&vendors_text).unwrap();
    assert_eq!(vendors[0]["Name"], "ACME Supplies");
    assert_eq!(vendors[0]["UpdatedDateUTC"], "2012-01-11 15:39:16.560000");
    // Sorted keys, four space indent.
    let contact_id = vendors_text.find("\"ContactID\"").unwrap();
    let name = vendors_text.find("\"Name\"").unwrap();
    assert!(contact_id < name);
    assert!(vendors_text.contains("\n        \"ContactID\""));

    let accounts: Value =
        serde_json::from_str(&fs::read_to_string(h.out("accounts.json")).unwrap()).unwrap();
    assert_eq!(accounts, sample_accounts());
}

#[tokio::test]
async fn empty_vendor_list_writes_only_accounts() {
    let h = harness().await;
    mount_request_token(&h.upstream, "req-a").await;
    mount_access_token(&h.upstream, "req-a", "verifier-a").await;
    mount_collections(&h.upstream, json!([]), sample_accounts()).await;

    authorize(&h).await;

    let page = h.server.get("/verified").await;
    page.assert_status_ok();
    let body = page.text();
    assert!(body.contains("No vendors"));
    assert!(body.contains("Check account list in"));

    assert!(!h.out("vendors.json").exists());
    assert!(h.out("accounts.json").exists());
}

#[tokio::test]
async fn verified_is_idempotent() {
    let h = harness().await;
    mount_request_token(&h.upstream, "req-a").await;
    mount_access_token(&h.upstream, "req-a", "verifier-a").await;
    mount_collections(&h.upstream, sample_vendors(), sample_accounts()).await;

    authorize(&h).await;

    h.server.get("/verified").await.assert_status_ok();
    let first = (
        fs::read(h.out("vendors.json")).unwrap(),
        fs::read(h.out("accounts.json")).unwrap(),
    );

    h.server.get("/verified").await.assert_status_ok();
    let second = (
        fs::read(h.out("vendors.json")).unwrap(),
        fs::read(h.out("accounts.json")).unwrap(),
    );

    assert_eq!(first, second);
}

#[tokio::test]
async fn callback_missing_parameters_is_500_and_store_untouched() {
    let h = harness().await;
    mount_request_token(&h.upstream, "req-a").await;
    h.server
        .get("/do-auth")
        .await
        .assert_status(StatusCode::FOUND);
    let before = h.store.read().await;

    let all = [
        ("oauth_token", "req-a"),
        ("oauth_verifier", "verifier-a"),
        ("org", "!x7Kp2"),
    ];
    // Every subset that lacks at least one of the three parameters.
    for mask in 0u8..7 {
        let mut request = h.server.get("/oauth");
        for (i, (key, value)) in all.iter().enumerate() {
            if mask & (1 << i) != 0 {
                request = request.add_query_param(key, value);
            }
        }
        let response = request.await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.text().contains("Missing parameters required."));
        assert_eq!(h.store.read().await, before, "mask {mask:03b}");
    }
}

#[tokio::test]
async fn failed_verification_reports_class_and_keeps_store() {
    let h = harness().await;
    mount_request_token(&h.upstream, "req-a").await;
    mount_access_token(&h.upstream, "req-a", "verifier-a").await;

    h.server
        .get("/do-auth")
        .await
        .assert_status(StatusCode::FOUND);
    let before = h.store.read().await;

    let response = h
        .server
        .get("/oauth")
        .add_query_param("oauth_token", "req-a")
        .add_query_param("oauth_verifier", "wrong")
        .add_query_param("org", "!x7Kp2")
        .await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.text().contains("Unauthorized: token_rejected"));
    assert_eq!(h.store.read().await, before);
}

#[tokio::test]
async fn overlapping_flows_leave_only_the_later_token() {
    let h = harness().await;
    mount_request_token(&h.upstream, "req-a").await;
    mount_request_token(&h.upstream, "req-b").await;
    mount_access_token(&h.upstream, "req-b", "verifier-b").await;

    h.server
        .get("/do-auth")
        .await
        .assert_status(StatusCode::FOUND);
    h.server
        .get("/do-auth")
        .await
        .assert_status(StatusCode::FOUND);

    assert_eq!(
        h.store.read().await.get("oauth_token").map(String::as_str),
        Some("req-b")
    );

    // The first flow's callback is verified against the second flow's token and fails.
    let stale = h
        .server
        .get("/oauth")
        .add_query_param("oauth_token", "req-a")
        .add_query_param("oauth_verifier", "verifier-a")
        .add_query_param("org", "!x7Kp2")
        .await;
    stale.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        h.store.read().await.get("verified").map(String::as_str),
        Some("false")
    );

    let current = h
        .server
        .get("/oauth")
        .add_query_param("oauth_token", "req-b")
        .add_query_param("oauth_verifier", "verifier-b")
        .add_query_param("org", "!x7Kp2")
        .await;
    current.assert_status(StatusCode::FOUND);
}

#[tokio::test]
async fn verified_before_authorization_is_500() {
    let h = harness().await;
    mount_request_token(&h.upstream, "req-a").await;

    // Empty store: nothing to rebuild credentials from.
    let empty = h.server.get("/verified").await;
    empty.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

    // Request token only: the client refuses to be built.
    h.server
        .get("/do-auth")
        .await
        .assert_status(StatusCode::FOUND);
    let unverified = h.server.get("/verified").await;
    unverified.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert!(unverified.text().contains("NotVerified"));
}

#[tokio::test]
async fn upstream_failure_on_do_auth_is_500() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path("/oauth/RequestToken"))
        .respond_with(
            ResponseTemplate::new(401).set_body_string("oauth_problem=consumer_key_unknown"),
        )
        .mount(&h.upstream)
        .await;

    let response = h.server.get("/do-auth").await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.text().contains("Unauthorized: consumer_key_unknown"));
    assert!(h.store.read().await.is_empty());
}

#[tokio::test]
async fn missing_config_key_fails_every_path_before_routing() {
    let h = harness_with_config(|api_url, dir| {
        config_ini(api_url, dir).replace("ACCOUNTS_FILE_NAME = accounts.json\n", "")
    })
    .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.upstream)
        .await;
    fs::write(h.dir.path().join("static").join("index.html"), "hello").unwrap();

    for route in ["/do-auth", "/oauth", "/verified", "/index.html"] {
        let response = h.server.get(route).await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert!(
            response
                .text()
                .contains("Please define Account and Vendors file names and paths"),
            "{route}"
        );
    }
    assert_eq!(h.store.read().await, BTreeMap::new());
}

#[tokio::test]
async fn other_paths_are_served_from_static_root() {
    let h = harness().await;
    fs::write(h.dir.path().join("static").join("hello.txt"), "hi there").unwrap();

    let found = h.server.get("/hello.txt").await;
    found.assert_status_ok();
    found.assert_text("hi there");

    let missing = h.server.get("/missing.txt").await;
    missing.assert_status_not_found();
}

#[tokio::test]
async fn malformed_upstream_dates_are_written_verbatim() {
    let h = harness().await;
    mount_request_token(&h.upstream, "req-a").await;
    mount_access_token(&h.upstream, "req-a", "verifier-a").await;
    let vendors = json!([
        {"Name": "Odd Offset", "UpdatedDateUTC": "/Date(123+1é2)/"},
        {"Name": "Huge", "UpdatedDateUTC": "/Date(170141183460469231731687303715884105)/"}
    ]);
    mount_collections(&h.upstream, vendors.clone(), sample_accounts()).await;

    authorize(&h).await;

    h.server.get("/verified").await.assert_status_ok();
    let written: Value =
        serde_json::from_str(&fs::read_to_string(h.out("vendors.json")).unwrap()).unwrap();
    assert_eq!(written, vendors);
}
