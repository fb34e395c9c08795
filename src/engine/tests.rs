use super::*;
use crate::error::GatewayError;
use crate::gateway::ApiResult;
use crate::language::SourceFile;
use crate::types::{CodeObjectSummary, MethodInfo};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

struct NoHost;

impl EditorHost for NoHost {
    fn snapshot(&self, _file: &FileUri) -> Option<SourceFile> {
        None
    }
}

#[derive(Default)]
struct CountingApi {
    offline: AtomicBool,
    environment_calls: AtomicUsize,
    insight_ids: Mutex<Vec<CodeObjectId>>,
    error_calls: AtomicUsize,
}

#[async_trait::async_trait]
impl AnalyticsApi for CountingApi {
    async fn list_environments(&self) -> ApiResult<String> {
        self.environment_calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(GatewayError::Network("connection refused".into()));
        }
        Ok(Some(vec!["prod".to_string(), "staging".to_string()]))
    }

    async fn fetch_summaries(&self, _: &str, _: &[CodeObjectId]) -> ApiResult<CodeObjectSummary> {
        Ok(Some(Vec::new()))
    }

    async fn fetch_insights(
        &self,
        _: &str,
        ids: &[CodeObjectId],
    ) -> ApiResult<CodeObjectInsight> {
        self.insight_ids.lock().unwrap().extend_from_slice(ids);
        Ok(Some(Vec::new()))
    }

    async fn fetch_errors_for_code_object(
        &self,
        _: &str,
        _: &CodeObjectId,
    ) -> ApiResult<CodeObjectError> {
        self.error_calls.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.analytics.max_attempts = 1;
    config
}

fn engine(api: Arc<CountingApi>) -> ContextEngine {
    ContextEngine::with_api(test_config(), Arc::new(NoHost), LanguageRegistry::new(), api).unwrap()
}

fn context(linked: bool) -> MethodContext {
    MethodContext {
        method: MethodInfo {
            id: CodeObjectId::method("app$_$App$_$foo"),
            name: "foo".to_string(),
            containing_class: "App".to_string(),
            containing_namespace: "app".to_string(),
            containing_file_uri: FileUri::new("file:///src/app.py"),
            source_offset: 0,
            spans: Vec::new(),
        },
        linked,
    }
}

#[tokio::test]
async fn test_rejects_invalid_config() {
    let mut config = Config::default();
    config.analytics.base_url = String::new();
    let result = ContextEngine::with_api(
        config,
        Arc::new(NoHost),
        LanguageRegistry::new(),
        Arc::new(CountingApi::default()),
    );
    assert!(result.is_err());
}

#[tokio::test]
async fn test_refresh_environments_publishes_change() {
    let api = Arc::new(CountingApi::default());
    let engine = engine(api.clone());
    let mut events = engine.subscribe();

    let environment = engine.refresh_environments().await.unwrap();
    assert_eq!(environment.current, "prod");
    assert_eq!(
        events.try_recv().unwrap(),
        EngineEvent::EnvironmentsChanged(environment.clone())
    );

    // nothing changed the second time
    engine.refresh_environments().await.unwrap();
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_switch_environment() {
    let engine = engine(Arc::new(CountingApi::default()));
    engine.refresh_environments().await;

    engine.switch_environment("staging").await.unwrap();
    assert_eq!(engine.environment().current, "staging");

    let err = engine.switch_environment("qa").await.unwrap_err();
    assert!(err.is_user_error());
    assert_eq!(engine.environment().current, "staging");
}

#[tokio::test]
async fn test_insights_refused_for_unlinked_method() {
    let api = Arc::new(CountingApi::default());
    let engine = engine(api.clone());
    engine.refresh_environments().await;

    let err = engine.insights_for(&context(false)).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::Validation(ValidationError::UnlinkedMethod(_))
    ));
    assert!(engine.errors_for(&context(false)).await.is_err());
    assert!(api.insight_ids.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_insights_query_method_and_spans() {
    let api = Arc::new(CountingApi::default());
    let engine = engine(api.clone());
    engine.refresh_environments().await;

    let mut linked = context(true);
    linked.method.spans.push(crate::types::SpanInfo {
        id: CodeObjectId::span("app$_$work"),
        name: "work".to_string(),
        containing_method_id: linked.method.id.clone(),
        containing_file_uri: linked.method.containing_file_uri.clone(),
        source_offset: 0,
    });

    assert!(engine.insights_for(&linked).await.unwrap().is_empty());
    assert_eq!(*api.insight_ids.lock().unwrap(), linked.method.code_object_ids());

    // "no result" from the backend reads as no errors
    assert!(engine.errors_for(&linked).await.unwrap().is_empty());
    assert_eq!(api.error_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_queries_without_environment_are_empty() {
    let api = Arc::new(CountingApi::default());
    let engine = engine(api.clone());

    assert!(engine.insights_for(&context(true)).await.unwrap().is_empty());
    assert!(api.insight_ids.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_refresh_tick_probes_while_lost() {
    let api = Arc::new(CountingApi::default());
    api.offline.store(true, Ordering::SeqCst);
    let engine = engine(api.clone());

    for _ in 0..3 {
        engine.refresh_environments().await;
    }
    assert_eq!(engine.connection_state(), ConnectionState::Lost);
    assert!(engine.last_error().is_some());

    api.offline.store(false, Ordering::SeqCst);
    engine.refresh_tick().await;
    assert_eq!(api.environment_calls.load(Ordering::SeqCst), 4);
    assert_eq!(engine.connection_state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_apply_config_hot_swaps() {
    let engine = engine(Arc::new(CountingApi::default()));
    let generation = engine.gateway.generation();

    let mut config = test_config();
    config.context.debounce_ms = 50;
    engine.apply_config(config.clone()).await.unwrap();
    assert_eq!(engine.coordinator.quiet_period(), Duration::from_millis(50));
    assert_eq!(engine.gateway.generation(), generation);
    assert_eq!(*engine.config(), config);

    config.analytics.base_url = "http://127.0.0.1:9".to_string();
    config.analytics.request_timeout_secs = 1;
    engine.apply_config(config.clone()).await.unwrap();
    assert!(engine.gateway.generation() > generation);
    assert_eq!(engine.config().analytics.base_url, "http://127.0.0.1:9");
}

#[tokio::test]
async fn test_apply_invalid_config_keeps_previous() {
    let engine = engine(Arc::new(CountingApi::default()));
    let mut config = test_config();
    config.context.debounce_ms = 0;

    assert!(engine.apply_config(config).await.is_err());
    assert_eq!(*engine.config(), test_config());
}

#[tokio::test]
async fn test_selection_cleared_shows_no_file() {
    let engine = engine(Arc::new(CountingApi::default()));
    let mut events = engine.subscribe();
    engine.start();

    engine.selection_changed(None, Some(&FileUri::new("file:///src/app.py")));

    let state = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(EngineEvent::StateChanged(state)) = events.recv().await {
                return state;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(state, ContextState::NoFile);
    assert_eq!(engine.current_state(), Some(ContextState::NoFile));

    engine.shutdown().await;
}

#[tokio::test]
async fn test_start_twice_and_shutdown() {
    let api = Arc::new(CountingApi::default());
    let engine = engine(api.clone());
    engine.start();
    engine.start();

    tokio::time::timeout(Duration::from_secs(5), engine.shutdown())
        .await
        .unwrap();
    assert!(engine.tasks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_find_code_locations_without_providers() {
    let engine = engine(Arc::new(CountingApi::default()));
    let found = engine
        .find_code_locations(&[CodeObjectId::method("app$_$foo")])
        .await;
    assert!(found.is_empty());
}
