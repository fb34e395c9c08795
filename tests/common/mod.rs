// Shared fixtures for integration tests
#![allow(dead_code)]

use context_sync::config::{AnalyticsConfig, Config};
use context_sync::error::{DiscoveryError, GatewayError};
use context_sync::gateway::{AnalyticsApi, ApiResult};
use context_sync::types::{
    CodeLocation, CodeObjectError, CodeObjectId, CodeObjectInsight, CodeObjectSummary,
    DocumentInfo, FileUri, MethodInfo, MethodUnderCaret,
};
use context_sync::{DiscoveryProvider, EditorHost, EngineEvent, SourceFile};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

// ===== HTTP responder =====

/// Canned reply of the mock server
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl MockResponse {
    pub fn json(body: &str) -> Self {
        Self::status(200, body)
    }

    /// 200 without a body
    pub fn no_content() -> Self {
        Self::status(200, "")
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path including the query string
    pub target: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

/// Minimal HTTP/1.1 server answering with queued responses, one per connection
pub struct MockServer {
    url: String,
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    shutdown: CancellationToken,
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let responses = Arc::new(Mutex::new(VecDeque::new()));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let shutdown = CancellationToken::new();

        let (queue, log, stop) = (responses.clone(), requests.clone(), shutdown.clone());
        tokio::spawn(async move {
            loop {
                let stream = tokio::select! {
                    _ = stop.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => stream,
                        Err(_) => break,
                    },
                };
                let (queue, log) = (queue.clone(), log.clone());
                tokio::spawn(async move {
                    let _ = serve(stream, queue, log).await;
                });
            }
        });

        Self {
            url,
            responses,
            requests,
            shutdown,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Queue a response; once the queue is empty the server answers `[]`
    pub fn push(&self, response: MockResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn analytics_config(&self) -> AnalyticsConfig {
        AnalyticsConfig {
            base_url: self.url.clone(),
            api_token: Some("secret".to_string()),
            request_timeout_secs: 2,
            max_attempts: 1,
            retry_backoff_ms: 10,
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn serve(
    stream: TcpStream,
    queue: Arc<Mutex<VecDeque<MockResponse>>>,
    log: Arc<Mutex<Vec<RecordedRequest>>>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }

    let length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = vec![0; length];
    reader.read_exact(&mut body).await?;

    log.lock().unwrap().push(RecordedRequest {
        method,
        target,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    let response = queue
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| MockResponse::json("[]"));
    tokio::time::sleep(response.delay).await;

    let reply = format!(
        "HTTP/1.1 {} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        response.status,
        response.body.len(),
        response.body
    );
    let mut stream = reader.into_inner();
    stream.write_all(reply.as_bytes()).await?;
    stream.shutdown().await
}

// ===== Scripted analytics API =====

/// In-memory backend: environments and per-id summaries, optional scripted failures
#[derive(Default)]
pub struct ScriptedApi {
    pub environments: Mutex<Vec<String>>,
    pub scores: Mutex<HashMap<CodeObjectId, i32>>,
    pub failures: Mutex<VecDeque<GatewayError>>,
    pub summary_calls: AtomicUsize,
}

impl ScriptedApi {
    pub fn new(environments: &[&str]) -> Arc<Self> {
        let api = Self::default();
        *api.environments.lock().unwrap() = environments.iter().map(|e| e.to_string()).collect();
        Arc::new(api)
    }

    pub fn set_score(&self, id: &CodeObjectId, score: i32) {
        self.scores.lock().unwrap().insert(id.clone(), score);
    }

    /// Next calls fail with these errors, in order
    pub fn fail_with(&self, errors: impl IntoIterator<Item = GatewayError>) {
        self.failures.lock().unwrap().extend(errors);
    }

    pub fn summary_calls(&self) -> usize {
        self.summary_calls.load(Ordering::SeqCst)
    }

    fn next_failure(&self) -> Option<GatewayError> {
        self.failures.lock().unwrap().pop_front()
    }
}

#[async_trait::async_trait]
impl AnalyticsApi for ScriptedApi {
    async fn list_environments(&self) -> ApiResult<String> {
        if let Some(error) = self.next_failure() {
            return Err(error);
        }
        Ok(Some(self.environments.lock().unwrap().clone()))
    }

    async fn fetch_summaries(
        &self,
        _environment: &str,
        ids: &[CodeObjectId],
    ) -> ApiResult<CodeObjectSummary> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.next_failure() {
            return Err(error);
        }
        let scores = self.scores.lock().unwrap();
        Ok(Some(
            ids.iter()
                .filter_map(|id| {
                    scores.get(id).map(|score| CodeObjectSummary::Method {
                        code_object_id: id.clone(),
                        insights_count: 0,
                        errors_count: 0,
                        score: *score,
                    })
                })
                .collect(),
        ))
    }

    async fn fetch_insights(
        &self,
        _environment: &str,
        _ids: &[CodeObjectId],
    ) -> ApiResult<CodeObjectInsight> {
        if let Some(error) = self.next_failure() {
            return Err(error);
        }
        Ok(Some(Vec::new()))
    }

    async fn fetch_errors_for_code_object(
        &self,
        _environment: &str,
        _id: &CodeObjectId,
    ) -> ApiResult<CodeObjectError> {
        Ok(Some(Vec::new()))
    }
}

// ===== Discovery =====

/// A method spanning `range` in the file text
#[derive(Debug, Clone)]
pub struct FakeMethod {
    pub name: &'static str,
    pub range: std::ops::Range<usize>,
}

impl FakeMethod {
    pub fn id(&self) -> CodeObjectId {
        CodeObjectId::method(&format!("app$_$App$_${}", self.name))
    }
}

/// Python provider with a fixed method layout and a call log
pub struct FakePythonProvider {
    pub methods: Vec<FakeMethod>,
    pub detections: Mutex<Vec<(FileUri, usize)>>,
    pub builds: AtomicUsize,
    /// Offset whose caret detection blocks for a while
    pub slow_offset: Option<(usize, Duration)>,
}

impl FakePythonProvider {
    pub fn new(methods: Vec<FakeMethod>) -> Arc<Self> {
        Arc::new(Self::with_slow_offset(methods, None))
    }

    pub fn with_slow_offset(methods: Vec<FakeMethod>, slow: Option<(usize, Duration)>) -> Self {
        Self {
            methods,
            detections: Mutex::new(Vec::new()),
            builds: AtomicUsize::new(0),
            slow_offset: slow,
        }
    }

    pub fn detected_offsets(&self) -> Vec<usize> {
        self.detections
            .lock()
            .unwrap()
            .iter()
            .map(|(_, offset)| *offset)
            .collect()
    }

    fn method_info(&self, method: &FakeMethod, file: &FileUri) -> MethodInfo {
        MethodInfo {
            id: method.id(),
            name: method.name.to_string(),
            containing_class: "App".to_string(),
            containing_namespace: "app".to_string(),
            containing_file_uri: file.clone(),
            source_offset: method.range.start,
            spans: Vec::new(),
        }
    }
}

impl DiscoveryProvider for FakePythonProvider {
    fn name(&self) -> &str {
        "fake-python"
    }

    fn handles_language(&self, language_id: &str) -> bool {
        language_id == "python"
    }

    fn is_supported_file(&self, file: &SourceFile) -> bool {
        file.uri.as_str().ends_with(".py")
    }

    fn detect_method_under_caret(
        &self,
        file: &SourceFile,
        offset: usize,
    ) -> Result<MethodUnderCaret, DiscoveryError> {
        self.detections
            .lock()
            .unwrap()
            .push((file.uri.clone(), offset));
        if let Some((slow, delay)) = self.slow_offset
            && slow == offset
        {
            std::thread::sleep(delay);
        }

        Ok(match self.methods.iter().find(|m| m.range.contains(&offset)) {
            Some(method) => MethodUnderCaret {
                id: method.id(),
                name: method.name.to_string(),
                containing_class_name: "App".to_string(),
                file_uri: file.uri.clone(),
                is_supported_file: true,
            },
            None => MethodUnderCaret::outside_method(file.uri.clone()),
        })
    }

    fn build_document_info(&self, file: &SourceFile) -> Result<DocumentInfo, DiscoveryError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(DocumentInfo::new(
            file.uri.clone(),
            self.methods.iter().map(|m| self.method_info(m, &file.uri)),
        ))
    }

    fn find_locations_for_code_object_ids(
        &self,
        ids: &[CodeObjectId],
    ) -> Result<HashMap<CodeObjectId, CodeLocation>, DiscoveryError> {
        Ok(self
            .methods
            .iter()
            .filter(|m| ids.contains(&m.id()))
            .map(|m| {
                (
                    m.id(),
                    CodeLocation {
                        file_uri: FileUri::new("file:///src/a.py"),
                        offset: m.range.start,
                    },
                )
            })
            .collect())
    }
}

// ===== Editor host =====

/// Open files with their text and caret
#[derive(Default)]
pub struct FakeHost {
    files: Mutex<HashMap<FileUri, (String, usize)>>,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self, file: &FileUri, text: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(file.clone(), (text.to_string(), 0));
    }

    pub fn close(&self, file: &FileUri) {
        self.files.lock().unwrap().remove(file);
    }

    pub fn move_caret(&self, file: &FileUri, offset: usize) {
        if let Some(entry) = self.files.lock().unwrap().get_mut(file) {
            entry.1 = offset;
        }
    }
}

impl EditorHost for FakeHost {
    fn snapshot(&self, file: &FileUri) -> Option<SourceFile> {
        self.files
            .lock()
            .unwrap()
            .get(file)
            .map(|(text, caret)| SourceFile::new(file.clone(), "", text, *caret))
    }
}

// ===== Helpers =====

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.analytics.max_attempts = 3;
    config.analytics.retry_backoff_ms = 10;
    config.context.debounce_ms = 50;
    config.context.refresh_interval_secs = 3600;
    config
}

/// Wait for the first event matching `predicate`
pub async fn wait_for<F>(events: &mut broadcast::Receiver<EngineEvent>, mut predicate: F) -> EngineEvent
where
    F: FnMut(&EngineEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event stream closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Poll `condition` until it holds
pub async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..250 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met in time");
}
