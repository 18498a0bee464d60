//! HTTP ledger client.
//!
//! Endpoints:
//!
//! ```text
//! GET  /fdb/health
//! POST /fdb/new-db                  {"db/id": "<network>/<name>"}
//! POST /fdb/<db>/transact?wait=false -> "<tx id>"
//! POST /fdb/<db>/transact           -> committed record
//! POST /fdb/<db>/query              -> [record, ...]
//! ```

use crate::{LedgerClient, LedgerConnection};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tessera_core::{DatabaseId, KeyDescriptor, LedgerError, LedgerSettings, TxId};

/// What a signer sees of an outgoing request.
#[derive(Debug, Clone, Copy)]
pub struct SignableRequest<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    pub body: &'a [u8],
}

/// Produces the authentication headers for a request made on behalf of a key.
pub trait RequestSigner: Send + Sync {
    fn sign(
        &self,
        key: &KeyDescriptor,
        request: SignableRequest<'_>,
    ) -> Result<HeaderMap, LedgerError>;
}

/// Sends requests without authentication headers. Suitable for ledgers
/// running with open API access.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsignedRequests;

impl RequestSigner for UnsignedRequests {
    fn sign(
        &self,
        _key: &KeyDescriptor,
        _request: SignableRequest<'_>,
    ) -> Result<HeaderMap, LedgerError> {
        Ok(HeaderMap::new())
    }
}

#[derive(Clone)]
struct Transport {
    client: reqwest::Client,
    base_url: String,
    signer: Arc<dyn RequestSigner>,
}

impl Transport {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        key: Option<&KeyDescriptor>,
    ) -> Result<Value, LedgerError> {
        let bytes = match body {
            Some(body) => serde_json::to_vec(body).map_err(|e| LedgerError::InvalidResponse {
                reason: format!("unserializable request body: {}", e),
            })?,
            None => Vec::new(),
        };

        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method.clone(), url);
        if let Some(key) = key {
            let headers = self.signer.sign(
                key,
                SignableRequest {
                    method: &method,
                    path,
                    body: &bytes,
                },
            )?;
            request = request.headers(headers);
        }
        if body.is_some() {
            request = request.header(CONTENT_TYPE, "application/json").body(bytes);
        }

        tracing::debug!(%method, path, "Ledger request");
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(LedgerError::Rejected {
                status: status.as_u16(),
                message: text,
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| LedgerError::InvalidResponse {
            reason: format!("{} (body: {})", e, text),
        })
    }
}

fn transport_error(error: reqwest::Error) -> LedgerError {
    LedgerError::Transport {
        reason: error.to_string(),
    }
}

// ============================================================================
// CLIENT
// ============================================================================

#[derive(Clone)]
pub struct HttpLedgerClient {
    transport: Transport,
}

impl HttpLedgerClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(transport_error)?;
        Ok(Self {
            transport: Transport {
                client,
                base_url: endpoint.trim_end_matches('/').to_string(),
                signer: Arc::new(UnsignedRequests),
            },
        })
    }

    pub fn from_settings(settings: &LedgerSettings) -> Result<Self, LedgerError> {
        Self::new(&settings.endpoint, settings.request_timeout())
    }

    pub fn with_signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
        self.transport.signer = signer;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.transport.base_url
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    type Connection = HttpConnection;

    async fn health(&self) -> Result<(), LedgerError> {
        self.transport
            .send(Method::GET, "/fdb/health", None, None)
            .await
            .map(|_| ())
    }

    async fn create_database(&self, database: &DatabaseId) -> Result<(), LedgerError> {
        let body = json!({ "db/id": database.as_str() });
        self.transport
            .send(Method::POST, "/fdb/new-db", Some(&body), None)
            .await?;
        tracing::info!(database = %database, "Created database");
        Ok(())
    }

    async fn open(
        &self,
        database: &DatabaseId,
        key: &KeyDescriptor,
    ) -> Result<HttpConnection, LedgerError> {
        Ok(HttpConnection {
            transport: self.transport.clone(),
            database: database.clone(),
            key: key.clone(),
        })
    }
}

// ============================================================================
// CONNECTION
// ============================================================================

pub struct HttpConnection {
    transport: Transport,
    database: DatabaseId,
    key: KeyDescriptor,
}

impl HttpConnection {
    fn path(&self, action: &str) -> String {
        format!("/fdb/{}/{}", self.database, action)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, LedgerError> {
        self.transport
            .send(Method::POST, path, Some(body), Some(&self.key))
            .await
    }
}

#[async_trait]
impl LedgerConnection for HttpConnection {
    fn identity(&self) -> &str {
        &self.key.account_id
    }

    fn database(&self) -> &DatabaseId {
        &self.database
    }

    async fn submit(&self, transaction: &Value) -> Result<TxId, LedgerError> {
        let path = format!("{}?wait=false", self.path("transact"));
        match self.post(&path, transaction).await? {
            Value::String(id) => Ok(TxId::new(id)),
            other => Err(LedgerError::InvalidResponse {
                reason: format!("expected a transaction id, got {}", other),
            }),
        }
    }

    async fn submit_and_wait(&self, transaction: &Value) -> Result<Value, LedgerError> {
        self.post(&self.path("transact"), transaction).await
    }

    async fn query(&self, query: &Value) -> Result<Vec<Value>, LedgerError> {
        let result = self.post(&self.path("query"), query).await?;
        Ok(records(result))
    }

    async fn query_by_tx_id(&self, tx_id: &TxId) -> Result<Vec<Value>, LedgerError> {
        self.query(&tx_lookup_query(tx_id)).await
    }
}

/// Query selecting a transaction's record by id.
pub fn tx_lookup_query(tx_id: &TxId) -> Value {
    json!({
        "select": ["*"],
        "from": ["_tx/id", tx_id.as_str()]
    })
}

/// A list result is the records; `null` is none; anything else is one record.
fn records(result: Value) -> Vec<Value> {
    match result {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trims_trailing_slash() {
        let client = HttpLedgerClient::new("http://localhost:8090/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8090");
    }

    #[test]
    fn test_tx_lookup_query_shape() {
        let query = tx_lookup_query(&TxId::new("abc"));
        assert_eq!(query, json!({"select": ["*"], "from": ["_tx/id", "abc"]}));
    }

    #[test]
    fn test_records_normalization() {
        assert!(records(Value::Null).is_empty());
        assert_eq!(records(json!([1, 2])).len(), 2);
        assert_eq!(records(json!({"_id": 1})), vec![json!({"_id": 1})]);
    }

    #[test]
    fn test_unsigned_requests_add_no_headers() {
        let key = KeyDescriptor::new("k", "acct");
        let headers = UnsignedRequests
            .sign(
                &key,
                SignableRequest {
                    method: &Method::POST,
                    path: "/fdb/dev/x/query",
                    body: b"{}",
                },
            )
            .unwrap();
        assert!(headers.is_empty());
    }

    #[tokio::test]
    async fn test_open_scopes_connection_to_key() {
        let client = HttpLedgerClient::new("http://localhost:8090", Duration::from_secs(1)).unwrap();
        let db = DatabaseId::new("dev", "stage-1");
        let conn = client.open(&db, &KeyDescriptor::new("k", "acct7")).await.unwrap();
        assert_eq!(conn.identity(), "acct7");
        assert_eq!(conn.path("query"), "/fdb/dev/stage-1/query");
    }
}
