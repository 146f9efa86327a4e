//! [`LinkerBackend`] over the `accountLinker` Apex REST resource.

use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::config::LinkerConfig;
use crate::error::AppError;
use crate::salesforce::backend::{
    AccountOption, BackendFuture, BatchStatusInfo, LinkerBackend, LoadResponse,
};
use crate::salesforce::client::{decode_json, SalesforceClient};
use crate::salesforce::redact_id;
use crate::table::record::{AggregateRow, RawAggregate};

/// Account type reported when the backend omits one.
const DEFAULT_ACCOUNT_TYPE: &str = "Account";

// ─────────────────────────────────────────────────────────────────────────────
// Internal Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct StartBatchRequest<'a> {
    mode: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartBatchResponse {
    job_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateMappingsRequest<'a> {
    account_id: &'a str,
    records: &'a [RawAggregate],
}

#[derive(Debug, Serialize)]
struct DeleteMappingsRequest<'a> {
    records: &'a [RawAggregate],
}

// ─────────────────────────────────────────────────────────────────────────────
// ApexLinkerClient
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP implementation of the linker backend.
#[derive(Clone)]
pub struct ApexLinkerClient {
    client: SalesforceClient,
    prefix: String,
    min_search_chars: usize,
    max_search_results: usize,
}

impl ApexLinkerClient {
    pub fn new(client: SalesforceClient, config: &LinkerConfig) -> Self {
        Self {
            client,
            prefix: config.apex_prefix.trim_end_matches('/').to_string(),
            min_search_chars: config.min_search_chars,
            max_search_results: config.max_search_results,
        }
    }

    async fn url(&self, resource: &str) -> Result<Url, AppError> {
        self.client
            .build_url(&format!("{}{}", self.prefix, resource))
            .await
    }

    async fn url_with_query(
        &self,
        resource: &str,
        key: &str,
        value: &str,
    ) -> Result<Url, AppError> {
        let mut url = self.url(resource).await?;
        url.query_pairs_mut().append_pair(key, value);
        Ok(url)
    }

    async fn search(&self, term: &str) -> Result<Vec<AccountOption>, AppError> {
        let term = term.trim();
        if term.chars().count() < self.min_search_chars {
            return Ok(Vec::new());
        }

        let url = self.url_with_query("/accounts", "term", term).await?;
        let accounts: Vec<AccountOption> = self.client.get_json(url).await?;

        let results: Vec<AccountOption> = accounts
            .into_iter()
            .take(self.max_search_results)
            .map(|mut acct| {
                if acct.account_type.as_deref().map_or(true, str::is_empty) {
                    acct.account_type = Some(DEFAULT_ACCOUNT_TYPE.to_string());
                }
                acct
            })
            .collect();

        info!("[APEX] Account search returned {} result(s)", results.len());
        Ok(results)
    }

    async fn unlinked(&self) -> Result<LoadResponse, AppError> {
        let url = self.url("/trace-sales/unlinked").await?;
        let response: LoadResponse = self.client.get_json(url).await?;

        match &response {
            LoadResponse::Ready { data, source } => info!(
                "[APEX] Unlinked load ready: {} row(s) from {}",
                data.len(),
                source.as_deref().unwrap_or("unknown source")
            ),
            LoadResponse::NeedsBatch => info!("[APEX] Unlinked load requires a batch run"),
        }
        Ok(response)
    }

    async fn linked(&self, account_id: &str) -> Result<Vec<AggregateRow>, AppError> {
        let url = self
            .url_with_query("/trace-sales/linked", "accountId", account_id)
            .await?;
        let rows: Vec<AggregateRow> = self.client.get_json(url).await?;

        info!(
            "[APEX] Linked load for {}: {} row(s)",
            redact_id(account_id),
            rows.len()
        );
        Ok(rows)
    }

    async fn start_batch(&self, mode: &str) -> Result<String, AppError> {
        let url = self.url("/batch").await?;
        let response = self
            .client
            .post_json(url, &StartBatchRequest { mode })
            .await?;
        let started: StartBatchResponse = decode_json(response).await?;

        info!("[BATCH] Started job {} (mode: {})", redact_id(&started.job_id), mode);
        Ok(started.job_id)
    }

    async fn batch_status(&self, job_id: &str) -> Result<BatchStatusInfo, AppError> {
        let mut url = self.url("/batch").await?;
        url.path_segments_mut()
            .map_err(|_| AppError::Internal("Instance URL cannot carry a path".into()))?
            .push(job_id);
        self.client.get_json(url).await
    }

    async fn create(&self, records: &[RawAggregate], account_id: &str) -> Result<(), AppError> {
        let url = self.url("/mappings").await?;
        self.client
            .post_json(
                url,
                &CreateMappingsRequest {
                    account_id,
                    records,
                },
            )
            .await?;

        info!(
            "[APEX] Linked {} record(s) to {}",
            records.len(),
            redact_id(account_id)
        );
        Ok(())
    }

    async fn delete(&self, records: &[RawAggregate]) -> Result<(), AppError> {
        let url = self.url("/mappings/delete").await?;
        self.client
            .post_json(url, &DeleteMappingsRequest { records })
            .await?;

        info!("[APEX] Unlinked {} record(s)", records.len());
        Ok(())
    }
}

impl LinkerBackend for ApexLinkerClient {
    fn search_accounts<'a>(&'a self, term: &'a str) -> BackendFuture<'a, Vec<AccountOption>> {
        Box::pin(self.search(term))
    }

    fn load_unlinked(&self) -> BackendFuture<'_, LoadResponse> {
        Box::pin(self.unlinked())
    }

    fn load_linked<'a>(&'a self, account_id: &'a str) -> BackendFuture<'a, Vec<AggregateRow>> {
        Box::pin(self.linked(account_id))
    }

    fn start_batch_job<'a>(&'a self, mode: &'a str) -> BackendFuture<'a, String> {
        Box::pin(self.start_batch(mode))
    }

    fn check_batch_status<'a>(&'a self, job_id: &'a str) -> BackendFuture<'a, BatchStatusInfo> {
        Box::pin(self.batch_status(job_id))
    }

    fn create_mappings<'a>(
        &'a self,
        records: &'a [RawAggregate],
        account_id: &'a str,
    ) -> BackendFuture<'a, ()> {
        Box::pin(self.create(records, account_id))
    }

    fn delete_mappings<'a>(&'a self, records: &'a [RawAggregate]) -> BackendFuture<'a, ()> {
        Box::pin(self.delete(records))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
