use crate::AppState;
use crate::api::page::page;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::export::write_collection;
use crate::oauth::CredentialState;
use crate::resources::ResourceClient;
use axum::{Extension, extract::State, response::Response};
use std::sync::Arc;

pub const PAGE_TITLE: &str = "Downloading vendor and account files";

/// `GET /verified`: download vendors and accounts with the verified token and write them out.
///
/// Both collections are fetched before anything is written; any failure aborts the stage.
#[tracing::instrument(skip_all)]
pub async fn verified(
    State(state): State<AppState>,
    Extension(config): Extension<Arc<AppConfig>>,
) -> Result<Response, AppError> {
    let credentials = CredentialState::from_map(&state.store.read().await)?;
    let client = ResourceClient::new(credentials, state.upstream.clone(), &config.api_url)
        .map_err(AppError::Authorization)?;

    let vendors = client.vendors().await.map_err(AppError::Upstream)?;
    let accounts = client.accounts().await.map_err(AppError::Upstream)?;

    let mut lines = Vec::with_capacity(2);

    if vendors.is_empty() {
        lines.push("No vendors.".to_string());
    } else {
        let path = config.vendors_file();
        write_collection(&path, &vendors).await?;
        lines.push(format!("Check vendors list in {path}"));
    }

    if accounts.is_empty() {
        lines.push("No accounts.".to_string());
    } else {
        let path = config.accounts_file();
        write_collection(&path, &accounts).await?;
        lines.push(format!("Check account list in {path}"));
    }

    Ok(page(PAGE_TITLE, &lines))
}
