//! SearchService RPC implementations.

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::{debug, warn};

use kvsearch_index::IndexEngine;
use kvsearch_store::KvStore;
use kvsearch_sync::{ScanResult, SyncStatus, WatcherState as DomainWatcherState};
use kvsearch_types::{SearchHit as DomainSearchHit, SearchSettings};

use crate::handler::{HandlerError, SearchHandler};
use crate::pb::search_service_server::SearchService;
use crate::pb::{
    Entry, GetSyncStatusRequest, GetSyncStatusResponse, ListEntriesRequest, ListEntriesResponse,
    ScanResultStatus, SearchHit as ProtoSearchHit, SearchRequest, SearchResponse,
    WatcherState as ProtoWatcherState,
};

fn domain_to_proto_hit(hit: DomainSearchHit) -> ProtoSearchHit {
    ProtoSearchHit {
        id: hit.id,
        score: hit.score,
        revision: hit.revision,
        fields: hit.fields.into_iter().collect(),
    }
}

fn domain_to_proto_watcher_state(state: DomainWatcherState) -> ProtoWatcherState {
    match state {
        DomainWatcherState::Starting => ProtoWatcherState::Starting,
        DomainWatcherState::Streaming => ProtoWatcherState::Streaming,
        DomainWatcherState::Recovering => ProtoWatcherState::Recovering,
        DomainWatcherState::Stopped => ProtoWatcherState::Stopped,
    }
}

fn scan_result_to_proto(result: Option<&ScanResult>) -> (ScanResultStatus, Option<String>) {
    match result {
        Some(ScanResult::Success) => (ScanResultStatus::Success, None),
        Some(ScanResult::Failed(msg)) => (ScanResultStatus::Failed, Some(msg.clone())),
        Some(ScanResult::Skipped) => (ScanResultStatus::Skipped, None),
        None => (ScanResultStatus::Unspecified, None),
    }
}

impl From<HandlerError> for Status {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::BadRequest(msg) => Status::invalid_argument(msg),
            HandlerError::Index(e) => Status::internal(format!("Index error: {}", e)),
        }
    }
}

/// gRPC front for the search handler, the store passthrough and sync status.
pub struct SearchServiceImpl {
    handler: SearchHandler,
    engine: Arc<IndexEngine>,
    store: Arc<dyn KvStore>,
    status: Arc<SyncStatus>,
    prefix: String,
}

impl SearchServiceImpl {
    pub fn new(
        engine: Arc<IndexEngine>,
        store: Arc<dyn KvStore>,
        status: Arc<SyncStatus>,
        prefix: impl Into<String>,
        settings: &SearchSettings,
    ) -> Self {
        Self {
            handler: SearchHandler::new(engine.clone(), settings),
            engine,
            store,
            status,
            prefix: prefix.into(),
        }
    }
}

#[tonic::async_trait]
impl SearchService for SearchServiceImpl {
    async fn search(
        &self,
        request: Request<SearchRequest>,
    ) -> Result<Response<SearchResponse>, Status> {
        let req = request.into_inner();
        debug!(query = %req.query, limit = req.limit, "Search request");

        let hits = self.handler.search(&req.query, req.limit as usize)?;

        Ok(Response::new(SearchResponse {
            hits: hits.into_iter().map(domain_to_proto_hit).collect(),
        }))
    }

    async fn list_entries(
        &self,
        request: Request<ListEntriesRequest>,
    ) -> Result<Response<ListEntriesResponse>, Status> {
        let req = request.into_inner();
        let prefix = if req.prefix.is_empty() {
            self.prefix.as_str()
        } else {
            req.prefix.as_str()
        };

        let snapshot = self.store.get_prefix(prefix).await.map_err(|e| {
            warn!(prefix, error = %e, "ListEntries store read failed");
            Status::unavailable(format!("Store error: {}", e))
        })?;

        let entries = snapshot
            .entries
            .into_iter()
            .map(|entry| Entry {
                value: String::from_utf8_lossy(&entry.value).into_owned(),
                key: entry.key,
                revision: entry.revision,
            })
            .collect();

        Ok(Response::new(ListEntriesResponse {
            entries,
            revision: snapshot.revision,
        }))
    }

    async fn get_sync_status(
        &self,
        _request: Request<GetSyncStatusRequest>,
    ) -> Result<Response<GetSyncStatusResponse>, Status> {
        let report = self.status.snapshot();
        let stats = self.engine.stats();
        let (last_scan_result, last_scan_error) =
            scan_result_to_proto(report.last_scan_result.as_ref());

        Ok(Response::new(GetSyncStatusResponse {
            prefix: self.prefix.clone(),
            documents: stats.documents as u64,
            tombstones: stats.tombstones as u64,
            last_scan_ms: report
                .last_scan_at
                .map(|t| t.timestamp_millis())
                .unwrap_or(0),
            last_scan_duration_ms: report.last_scan_duration_ms.unwrap_or(0),
            last_scan_result: last_scan_result as i32,
            last_scan_error,
            scan_count: report.scan_count,
            skipped_scans: report.skipped_scans,
            failed_scans: report.failed_scans,
            watcher_state: domain_to_proto_watcher_state(report.watcher_state) as i32,
            watch_restarts: report.watch_restarts,
            last_revision: report.last_revision,
            applied: report.applied,
            stale: report.stale,
            malformed: report.malformed,
            deleted: report.deleted,
        }))
    }
}
