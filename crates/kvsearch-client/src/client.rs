//! Search client for connecting to the daemon.

use tonic::transport::Channel;
use tracing::{debug, info};

use kvsearch_service::pb::{
    search_service_client::SearchServiceClient, Entry, GetSyncStatusRequest,
    GetSyncStatusResponse, ListEntriesRequest, SearchHit, SearchRequest,
};

use crate::error::ClientError;

/// Default endpoint for the kvsearch daemon.
pub const DEFAULT_ENDPOINT: &str = "http://[::1]:50051";

/// Client for querying the kvsearch daemon.
pub struct SearchClient {
    inner: SearchServiceClient<Channel>,
}

impl SearchClient {
    /// Connect to the daemon at `endpoint` (e.g. `http://localhost:50051`).
    pub async fn connect(endpoint: &str) -> Result<Self, ClientError> {
        info!("Connecting to kvsearch daemon at {}", endpoint);
        let inner = SearchServiceClient::connect(endpoint.to_string()).await?;
        Ok(Self { inner })
    }

    /// Connect to the default endpoint.
    pub async fn connect_default() -> Result<Self, ClientError> {
        Self::connect(DEFAULT_ENDPOINT).await
    }

    /// Ranked search. A `limit` of 0 uses the server default.
    pub async fn search(&mut self, query: &str, limit: u32) -> Result<Vec<SearchHit>, ClientError> {
        debug!(query, limit, "Search request");
        let request = tonic::Request::new(SearchRequest {
            query: query.to_string(),
            limit,
        });
        let response = self.inner.search(request).await?;
        Ok(response.into_inner().hits)
    }

    /// Raw store entries under `prefix`; empty means the daemon's prefix.
    pub async fn list_entries(&mut self, prefix: &str) -> Result<Vec<Entry>, ClientError> {
        debug!(prefix, "ListEntries request");
        let request = tonic::Request::new(ListEntriesRequest {
            prefix: prefix.to_string(),
        });
        let response = self.inner.list_entries(request).await?;
        Ok(response.into_inner().entries)
    }

    pub async fn sync_status(&mut self) -> Result<GetSyncStatusResponse, ClientError> {
        let response = self
            .inner
            .get_sync_status(tonic::Request::new(GetSyncStatusRequest {}))
            .await?;
        Ok(response.into_inner())
    }
}
