use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::content_backend::{
    normalize_path, BackendError, ContentBackend, DeleteResult, EntryKind, RemoteEntry, Result,
    VersionToken, WriteResult,
};

const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";

/// Settings for an `HttpBackend`.
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// Repository API root, e.g. `https://api.github.com/repos/owner/name`.
    pub base_url: String,
    /// Branch that reads and writes target.
    pub branch: String,
    /// Bearer token, if the repository requires authentication.
    pub token: Option<String>,
    /// User-Agent header sent with every request.
    pub user_agent: String,
    /// Upper bound on in-flight requests, or `None` for unbounded.
    pub max_concurrent_requests: Option<u32>,
}

/// An HTTP-based implementation of `ContentBackend`.
///
/// Speaks the hosted "repository contents" protocol: each path is addressed as
/// `{base_url}/contents/{path}`, files carry a `sha` that acts as the version
/// token, and writes send base64 bodies with a commit message.
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    branch: String,
    token: Option<String>,
    permits: Option<Arc<Semaphore>>,
}

/// One item of a contents listing, or the single item describing a file.
#[derive(Debug, Deserialize)]
struct ContentItem {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    download_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct WriteBody<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct DeleteBody<'a> {
    message: &'a str,
    sha: &'a str,
    branch: &'a str,
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    content: WrittenContent,
}

#[derive(Debug, Deserialize)]
struct WrittenContent {
    sha: String,
}

impl HttpBackend {
    /// Create a new HTTP backend from its settings.
    pub fn new(config: HttpBackendConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_MEDIA_TYPE));

        let client = Client::builder()
            .user_agent(config.user_agent)
            .default_headers(headers)
            .build()?;

        Self::with_client(client, &config.base_url, config.branch, config.token)
            .map(|backend| backend.with_max_concurrent_requests(config.max_concurrent_requests))
    }

    /// Create a new HTTP backend with a custom reqwest client.
    pub fn with_client(
        client: Client,
        base_url: &str,
        branch: impl Into<String>,
        token: Option<String>,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| BackendError::Other(format!("invalid base url '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::Other(format!(
                "invalid base url '{}'",
                base_url
            )));
        }

        Ok(Self {
            client,
            base_url,
            branch: branch.into(),
            token,
            permits: None,
        })
    }

    /// Bound the number of requests in flight at once.
    pub fn with_max_concurrent_requests(mut self, limit: Option<u32>) -> Self {
        self.permits = limit.map(|n| Arc::new(Semaphore::new(n.max(1) as usize)));
        self
    }

    fn contents_url(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("contents");
            segments.extend(path.split('/').filter(|s| !s.is_empty()));
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let request = self
            .client
            .get(self.contents_url(path))
            .query(&[("ref", self.branch.as_str())]);
        self.authorize(request)
    }

    async fn permit(&self) -> Option<OwnedSemaphorePermit> {
        match &self.permits {
            Some(permits) => Arc::clone(permits).acquire_owned().await.ok(),
            None => None,
        }
    }

    /// Fetch the JSON description of a path, or `None` if it does not exist.
    async fn describe(&self, path: &str) -> Result<Option<Value>> {
        let _permit = self.permit().await;
        let response = self.get(path).send().await?;

        match response.status() {
            StatusCode::OK => {
                let value = response.json::<Value>().await.map_err(|e| {
                    BackendError::InvalidResponse(format!("failed to parse contents: {}", e))
                })?;
                Ok(Some(value))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(unexpected_status(status)),
        }
    }
}

fn unexpected_status(status: StatusCode) -> BackendError {
    BackendError::Http(format!("unexpected status code: {}", status))
}

fn is_conflict(status: StatusCode) -> bool {
    status == StatusCode::CONFLICT || status == StatusCode::UNPROCESSABLE_ENTITY
}

fn to_entry(item: ContentItem) -> RemoteEntry {
    let kind = if item.kind == "dir" {
        EntryKind::Directory
    } else {
        EntryKind::File
    };
    RemoteEntry {
        name: item.name,
        path: item.path,
        kind,
        version_token: item.sha,
        size: match kind {
            EntryKind::File => item.size,
            EntryKind::Directory => None,
        },
        source_url: item.download_url,
    }
}

#[async_trait]
impl ContentBackend for HttpBackend {
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let path = normalize_path(path);
        let value = self.describe(&path).await?.ok_or(BackendError::NotFound)?;

        match value {
            Value::Array(_) => {
                let items: Vec<ContentItem> = serde_json::from_value(value).map_err(|e| {
                    BackendError::InvalidResponse(format!("failed to parse listing: {}", e))
                })?;
                Ok(items.into_iter().map(to_entry).collect())
            }
            _ => Err(BackendError::NotADirectory(path)),
        }
    }

    async fn fetch_content(&self, path: &str) -> Result<Vec<u8>> {
        let _permit = self.permit().await;
        let response = self
            .get(path)
            .header(ACCEPT, RAW_MEDIA_TYPE)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.bytes().await?.to_vec()),
            StatusCode::NOT_FOUND => Err(BackendError::NotFound),
            status => Err(unexpected_status(status)),
        }
    }

    async fn get_version_token(&self, path: &str) -> Result<Option<VersionToken>> {
        let value = match self.describe(path).await? {
            Some(value @ Value::Object(_)) => value,
            // Directories describe as arrays and have no file version
            _ => return Ok(None),
        };

        let item: ContentItem = serde_json::from_value(value)
            .map_err(|e| BackendError::InvalidResponse(format!("failed to parse item: {}", e)))?;
        if item.kind == "dir" {
            return Ok(None);
        }
        Ok(Some(item.sha))
    }

    async fn write(
        &self,
        path: &str,
        content: &[u8],
        expected: Option<&VersionToken>,
        message: &str,
    ) -> Result<WriteResult> {
        let body = WriteBody {
            message,
            content: BASE64.encode(content),
            branch: &self.branch,
            sha: expected.map(String::as_str),
        };

        let response = {
            let _permit = self.permit().await;
            let request = self.client.put(self.contents_url(path)).json(&body);
            self.authorize(request).send().await?
        };

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                let written: WriteResponse = response.json().await.map_err(|e| {
                    BackendError::InvalidResponse(format!("failed to parse write result: {}", e))
                })?;
                Ok(WriteResult::Success(written.content.sha))
            }
            status if is_conflict(status) => {
                let current = self.get_version_token(path).await?;
                Ok(WriteResult::Mismatch(current))
            }
            status => Err(unexpected_status(status)),
        }
    }

    async fn delete(
        &self,
        path: &str,
        expected: &VersionToken,
        message: &str,
    ) -> Result<DeleteResult> {
        let body = DeleteBody {
            message,
            sha: expected,
            branch: &self.branch,
        };

        let response = {
            let _permit = self.permit().await;
            let request = self.client.delete(self.contents_url(path)).json(&body);
            self.authorize(request).send().await?
        };

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(DeleteResult::Success),
            StatusCode::NOT_FOUND => Err(BackendError::NotFound),
            status if is_conflict(status) => {
                let current = self.get_version_token(path).await?;
                Ok(DeleteResult::Mismatch(current))
            }
            status => Err(unexpected_status(status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::{HeaderMap as AxumHeaderMap, StatusCode as AxumStatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, put};
    use axum::{Json, Router};
    use serde_json::json;

    use super::*;
    use crate::sync::{MutationCoordinator, SyncContext, SyncError, TreeReader};

    fn backend(base: &str) -> HttpBackend {
        HttpBackend::with_client(Client::new(), base, "main", None).unwrap()
    }

    #[test]
    fn test_contents_url() {
        let backend = backend("https://api.example.com/repos/acme/site/");
        assert_eq!(
            backend.contents_url("docs/a b.txt").as_str(),
            "https://api.example.com/repos/acme/site/contents/docs/a%20b.txt"
        );
        assert_eq!(
            backend.contents_url("").as_str(),
            "https://api.example.com/repos/acme/site/contents"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(HttpBackend::with_client(Client::new(), "not a url", "main", None).is_err());
        assert!(HttpBackend::with_client(Client::new(), "mailto:x@y", "main", None).is_err());
    }

    #[test]
    fn test_listing_item_conversion() {
        let items: Vec<ContentItem> = serde_json::from_str(
            r#"[
                {"name": "a.txt", "path": "docs/a.txt", "type": "file", "sha": "s1",
                 "size": 5, "download_url": "https://raw.example.com/docs/a.txt"},
                {"name": "sub", "path": "docs/sub", "type": "dir", "sha": "s2",
                 "size": 0, "download_url": null}
            ]"#,
        )
        .unwrap();

        let entries: Vec<_> = items.into_iter().map(to_entry).collect();
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[0].size, Some(5));
        assert_eq!(entries[0].version_token, "s1");
        assert_eq!(entries[1].kind, EntryKind::Directory);
        assert_eq!(entries[1].size, None);
        assert_eq!(entries[1].source_url, None);
    }

    // A stand-in contents API: the root holds `f.txt`, whose current sha is
    // `cur`. Writes and deletes of `f.txt` are rejected as stale.
    async fn fake_contents_api() -> String {
        async fn root_listing() -> Json<Value> {
            Json(json!([{
                "name": "f.txt", "path": "f.txt", "type": "file", "sha": "cur",
                "size": 2, "download_url": null
            }]))
        }

        async fn describe_file(headers: AxumHeaderMap) -> Response {
            let raw = headers
                .get(ACCEPT)
                .is_some_and(|value| value.as_bytes() == RAW_MEDIA_TYPE.as_bytes());
            if raw {
                return "hi".into_response();
            }
            Json(json!({
                "name": "f.txt", "path": "f.txt", "type": "file", "sha": "cur", "size": 2
            }))
            .into_response()
        }

        async fn create_file(Json(body): Json<Value>) -> Response {
            if body["content"] != "aGk=" || body.get("sha").is_some() {
                return AxumStatusCode::BAD_REQUEST.into_response();
            }
            (AxumStatusCode::CREATED, Json(json!({"content": {"sha": "n1"}}))).into_response()
        }

        let router = Router::new()
            .route("/repos/acme/site/contents", get(root_listing))
            .route(
                "/repos/acme/site/contents/f.txt",
                get(describe_file)
                    .put(|| async { AxumStatusCode::CONFLICT })
                    .delete(|| async { AxumStatusCode::UNPROCESSABLE_ENTITY }),
            )
            .route("/repos/acme/site/contents/new.txt", put(create_file))
            .route(
                "/repos/acme/site/contents/broken",
                get(|| async { AxumStatusCode::INTERNAL_SERVER_ERROR }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{}/repos/acme/site", addr)
    }

    fn live_backend(base_url: String) -> HttpBackend {
        HttpBackend::new(HttpBackendConfig {
            base_url,
            branch: "main".to_string(),
            token: None,
            user_agent: "tree-mirror-test".to_string(),
            max_concurrent_requests: Some(2),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let backend = live_backend(fake_contents_api().await);

        let entries = backend.list("").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "f.txt");
        assert_eq!(entries[0].version_token, "cur");

        assert!(matches!(
            backend.list("f.txt").await,
            Err(BackendError::NotADirectory(ref path)) if path == "f.txt"
        ));
        assert!(matches!(backend.list("missing").await, Err(BackendError::NotFound)));
        assert!(matches!(backend.list("broken").await, Err(BackendError::Http(_))));

        assert_eq!(backend.fetch_content("f.txt").await.unwrap(), b"hi".to_vec());
        assert!(matches!(
            backend.fetch_content("missing").await,
            Err(BackendError::NotFound)
        ));

        assert_eq!(
            backend.get_version_token("f.txt").await.unwrap(),
            Some("cur".to_string())
        );
        assert_eq!(backend.get_version_token("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_conflicting_writes_report_current_token() {
        let backend = live_backend(fake_contents_api().await);
        let stale = "old".to_string();

        assert_eq!(
            backend.write("f.txt", b"hi", Some(&stale), "m").await.unwrap(),
            WriteResult::Mismatch(Some("cur".to_string()))
        );
        assert_eq!(
            backend.delete("f.txt", &stale, "m").await.unwrap(),
            DeleteResult::Mismatch(Some("cur".to_string()))
        );
        assert!(matches!(
            backend.delete("missing", &stale, "m").await,
            Err(BackendError::NotFound)
        ));

        assert_eq!(
            backend.write("new.txt", b"hi", None, "m").await.unwrap(),
            WriteResult::Success("n1".to_string())
        );
    }

    #[tokio::test]
    async fn test_status_mapping_surfaces_as_sync_errors() {
        let backend: Arc<dyn ContentBackend> = Arc::new(live_backend(fake_contents_api().await));

        let reader = TreeReader::new(Arc::clone(&backend));
        assert!(matches!(
            reader.read("f.txt").await,
            Err(SyncError::RemoteList { ref path, source: BackendError::NotADirectory(_) })
                if path == "f.txt"
        ));

        let context = SyncContext::new(Arc::clone(&backend), Duration::from_secs(30));
        let coordinator = MutationCoordinator::new(backend, context);
        assert!(matches!(
            coordinator.save("f.txt", b"hi", "m").await,
            Err(SyncError::RemoteWriteConflict(ref path)) if path == "f.txt"
        ));
    }

    #[test]
    fn test_write_body_omits_missing_sha() {
        let body = WriteBody {
            message: "m",
            content: BASE64.encode(b"hello"),
            branch: "main",
            sha: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["content"], "aGVsbG8=");
        assert!(json.get("sha").is_none());
    }
}
