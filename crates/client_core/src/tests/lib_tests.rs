use super::*;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json,
};
use serde_json::{json, Value};
use shared::{
    domain::{FlowId, Theme},
    error::DiagnosticScope,
    protocol::Route,
};
use storage::{KeyValueStore, MemoryStore, ProgressStore, DEFAULT_NAMESPACE};
use tokio::{net::TcpListener, time::Instant};

struct StaticFlowSource {
    catalog: Value,
    flows: HashMap<String, Value>,
    flow_fetches: AtomicUsize,
}

impl StaticFlowSource {
    fn new(catalog: Value) -> Self {
        Self {
            catalog,
            flows: HashMap::new(),
            flow_fetches: AtomicUsize::new(0),
        }
    }

    fn with_flow(mut self, id: &str, document: Value) -> Self {
        self.flows.insert(id.to_string(), document);
        self
    }

    fn flow_fetches(&self) -> usize {
        self.flow_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FlowSource for StaticFlowSource {
    async fn fetch_catalog(&self) -> Result<Value> {
        if self.catalog.is_null() {
            return Err(anyhow!("HTTP status client error (404 Not Found)"));
        }
        Ok(self.catalog.clone())
    }

    async fn fetch_flow(&self, id: &FlowId) -> Result<Value> {
        self.flow_fetches.fetch_add(1, Ordering::SeqCst);
        self.flows
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| anyhow!("HTTP status client error (404 Not Found)"))
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}

#[derive(Default)]
struct RecordingClipboard {
    writes: Vec<String>,
    fail: bool,
}

impl Clipboard for RecordingClipboard {
    fn write_text(&mut self, text: &str) -> Result<()> {
        if self.fail {
            return Err(anyhow!("clipboard unavailable"));
        }
        self.writes.push(text.to_string());
        Ok(())
    }
}

fn create_user_source() -> StaticFlowSource {
    StaticFlowSource::new(json!([
        {"id": "a", "title": "Create User", "tags": ["users"]},
        {"id": "b", "title": "Rotate Keys", "tags": ["security"]}
    ]))
    .with_flow(
        "a",
        json!({"id": "a", "title": "Create User", "steps": [{"label": "Open console"}]}),
    )
    .with_flow(
        "b",
        json!({
            "id": "b",
            "title": "Rotate Keys",
            "steps": [
                {"label": "Find key", "where": "IAM > Keys", "inputs": {"user": "svc-deploy"}},
                {"label": "Create new key"}
            ]
        }),
    )
}

fn viewer(
    source: Arc<StaticFlowSource>,
    store: MemoryStore,
) -> FlowViewer<StaticFlowSource, MemoryStore> {
    FlowViewer::new(
        source,
        ProgressStore::new(store, DEFAULT_NAMESPACE).expect("progress store"),
    )
}

fn checkbox_states(view: &ViewNode) -> Vec<bool> {
    view.elements()
        .into_iter()
        .filter(|element| matches!(element.intent, Some(Intent::ToggleStep { .. })))
        .map(|element| element.attr_value("checked").is_some())
        .collect()
}

#[tokio::test]
async fn end_to_end_check_persists_and_survives_navigation() {
    let store = MemoryStore::new();
    let mut viewer = viewer(Arc::new(create_user_source()), store.clone());
    let mut clipboard = RecordingClipboard::default();

    assert_eq!(viewer.start("#flow=a").await, NavigationStatus::Applied);
    assert_eq!(viewer.content(), &ContentView::Flow(FlowId::from("a")));
    let titles = viewer.content_view().find_by_class("step-title");
    assert_eq!(titles.len(), 1);
    assert_eq!(
        ViewNode::Element(titles[0].clone()).text_content(),
        "1. Open console"
    );
    assert_eq!(checkbox_states(viewer.content_view()), vec![false]);

    viewer
        .toggle_step(0, true, &mut clipboard)
        .await
        .expect("check step");
    assert_eq!(
        store.get("flow-progress:a").await.expect("get").as_deref(),
        Some(r#"{"0":true}"#)
    );

    viewer.navigate("#").await;
    assert_eq!(viewer.content(), &ContentView::Home);
    viewer.navigate("#flow=a").await;
    assert_eq!(checkbox_states(viewer.content_view()), vec![true]);
}

#[tokio::test]
async fn missing_flow_renders_not_found_and_keeps_storage() {
    let store = MemoryStore::new();
    let source = Arc::new(create_user_source());
    let mut viewer = viewer(Arc::clone(&source), store.clone());
    let mut clipboard = RecordingClipboard::default();

    viewer.start("#flow=a").await;
    viewer
        .toggle_step(0, true, &mut clipboard)
        .await
        .expect("check step");
    let fetches_before = source.flow_fetches();

    viewer.navigate("#flow=missing").await;

    let ContentView::Diagnostic(diagnostic) = viewer.content() else {
        panic!("expected diagnostic, got {:?}", viewer.content());
    };
    assert_eq!(diagnostic.title, "Flow not found");
    assert_eq!(diagnostic.scope, DiagnosticScope::Flow(FlowId::from("missing")));
    assert!(viewer.content_view().to_html().contains("Flow not found"));
    assert_eq!(source.flow_fetches(), fetches_before);
    assert_eq!(
        store.get("flow-progress:a").await.expect("get").as_deref(),
        Some(r#"{"0":true}"#)
    );
    assert_eq!(
        viewer.state().current_flow.document().map(|doc| doc.id.clone()),
        Some(FlowId::from("a"))
    );
}

#[tokio::test]
async fn stale_navigation_result_is_dropped() {
    let mut viewer = viewer(Arc::new(create_user_source()), MemoryStore::new());
    viewer.start("#").await;

    let slow = viewer.begin_navigation("#flow=a");
    let fast = viewer.begin_navigation("#flow=b");

    let fast = fast.resolve().await;
    assert_eq!(viewer.finish_navigation(fast).await, NavigationStatus::Applied);

    let slow = slow.resolve().await;
    assert_eq!(viewer.finish_navigation(slow).await, NavigationStatus::Stale);

    assert_eq!(viewer.content(), &ContentView::Flow(FlowId::from("b")));
    assert_eq!(
        viewer.state().current_flow.document().map(|doc| doc.title.as_str()),
        Some("Rotate Keys")
    );
}

#[tokio::test]
async fn catalog_that_is_not_an_array_shows_catalog_diagnostic() {
    let source = Arc::new(StaticFlowSource::new(json!({"flows": []})));
    let mut viewer = viewer(source, MemoryStore::new());

    viewer.start("#flow=a").await;

    assert!(matches!(viewer.state().catalog, CatalogState::Failed(_)));
    let ContentView::Diagnostic(diagnostic) = viewer.content() else {
        panic!("expected catalog diagnostic");
    };
    assert_eq!(diagnostic.scope, DiagnosticScope::Catalog);
    assert!(diagnostic.message.contains("not a JSON array"));

    viewer.navigate("#flow=a").await;
    assert!(matches!(viewer.content(), ContentView::Diagnostic(_)));
    assert!(viewer.sidebar_view().find_by_class("empty-hint").len() == 1);
}

#[tokio::test]
async fn unreachable_catalog_never_yields_partial_state() {
    let source = Arc::new(StaticFlowSource::new(Value::Null));
    let mut viewer = viewer(source, MemoryStore::new());

    viewer.start("#").await;

    assert!(viewer.state().catalog.catalog().is_none());
    assert!(viewer
        .content_view()
        .find_by_class("diagnostic catalog-error")
        .len()
        == 1);

    let error = viewer.require_catalog().expect_err("no catalog");
    assert!(error.to_string().contains("Could not load the flow catalog"));
    assert!(viewer.export_progress_json().await.is_err());
    let mut asked = false;
    assert!(viewer
        .reset_progress(|_| {
            asked = true;
            true
        })
        .await
        .is_err());
    assert!(!asked);
}

#[tokio::test]
async fn malformed_catalog_entry_fails_the_whole_load() {
    let source = Arc::new(StaticFlowSource::new(json!([
        {"id": "a", "title": "Create User", "tags": []},
        {"title": "no id"}
    ])));
    let loader = CatalogLoader::new(source);
    assert!(matches!(
        loader.load().await,
        Err(shared::error::ViewerError::CatalogLoad(_))
    ));
}

#[tokio::test]
async fn flow_document_with_other_id_is_rejected() {
    let source = StaticFlowSource::new(json!([{"id": "a", "title": "Create User", "tags": []}]))
        .with_flow("a", json!({"id": "b", "title": "Imposter", "steps": []}));
    let mut viewer = viewer(Arc::new(source), MemoryStore::new());

    viewer.start("#flow=a").await;

    let ContentView::Diagnostic(diagnostic) = viewer.content() else {
        panic!("expected flow diagnostic");
    };
    assert_eq!(diagnostic.title, "Could not load flow");
    assert_eq!(viewer.state().current_flow, CurrentFlow::NotLoaded);
}

#[tokio::test]
async fn unparseable_flow_document_is_a_load_error() {
    let source = StaticFlowSource::new(json!([{"id": "a", "title": "Create User", "tags": []}]))
        .with_flow("a", json!(["not", "an", "object"]));
    let mut viewer = viewer(Arc::new(source), MemoryStore::new());

    viewer.start("#flow=a").await;

    assert!(matches!(
        viewer.content(),
        ContentView::Diagnostic(d) if d.scope == DiagnosticScope::Flow(FlowId::from("a"))
    ));
}

#[tokio::test]
async fn malformed_progress_renders_unchecked() {
    let store = MemoryStore::new();
    store
        .set("flow-progress:a", "[garbage")
        .await
        .expect("seed");
    let mut viewer = viewer(Arc::new(create_user_source()), store);

    viewer.start("#flow=a").await;

    assert_eq!(checkbox_states(viewer.content_view()), vec![false]);
}

#[tokio::test]
async fn search_keeps_active_highlight_and_hints_when_empty() {
    let mut viewer = viewer(Arc::new(create_user_source()), MemoryStore::new());
    viewer.start("#flow=b").await;

    let all = viewer.set_search_term("");
    assert_eq!(all.find_by_class("flow-link").len(), 2);
    assert_eq!(all.find_by_class("active").len(), 1);

    let filtered = viewer.set_search_term("SECURITY");
    assert_eq!(filtered.find_by_class("flow-link").len(), 1);
    assert_eq!(filtered.find_by_class("active").len(), 1);

    let none = viewer.set_search_term("payroll");
    assert_eq!(none.find_by_class("empty-hint").len(), 1);
    assert_eq!(none.elements().len(), 2);
    assert_eq!(viewer.content(), &ContentView::Flow(FlowId::from("b")));
}

#[tokio::test]
async fn sidebar_navigation_intent_routes_to_flow() {
    let mut viewer = viewer(Arc::new(create_user_source()), MemoryStore::new());
    let mut clipboard = RecordingClipboard::default();
    viewer.start("").await;

    let intent = Intent::Navigate {
        route: Route::Flow(FlowId::from("b")),
    };
    let outcome = viewer
        .handle(&intent, Interaction::Activated, &mut clipboard, Instant::now())
        .await
        .expect("navigate");

    let DispatchOutcome::Navigate(route) = outcome else {
        panic!("expected navigation, got {outcome:?}");
    };
    assert_eq!(route, Route::Flow(FlowId::from("b")));
    assert_eq!(viewer.active_flow(), None);

    let pending = viewer.begin_navigation(&route.to_fragment());
    let resolved = pending.resolve().await;
    assert_eq!(viewer.finish_navigation(resolved).await, NavigationStatus::Applied);
    assert_eq!(viewer.active_flow(), Some(&FlowId::from("b")));
}

#[tokio::test]
async fn step_changes_apply_while_a_navigation_is_pending() {
    let store = MemoryStore::new();
    let mut viewer = viewer(Arc::new(create_user_source()), store.clone());
    let mut clipboard = RecordingClipboard::default();
    viewer.start("#flow=b").await;

    let pending = viewer.begin_navigation("#flow=a");
    viewer
        .flip_step(1, &mut clipboard)
        .await
        .expect("toggle during load");
    assert_eq!(checkbox_states(viewer.content_view()), vec![false, true]);
    assert_eq!(
        store.get("flow-progress:b").await.expect("get").as_deref(),
        Some(r#"{"1":true}"#)
    );

    let resolved = pending.resolve().await;
    assert_eq!(viewer.finish_navigation(resolved).await, NavigationStatus::Applied);
    assert_eq!(viewer.content(), &ContentView::Flow(FlowId::from("a")));
    assert_eq!(
        store.get("flow-progress:b").await.expect("get").as_deref(),
        Some(r#"{"1":true}"#)
    );
}

#[tokio::test]
async fn steps_outside_the_displayed_flow_are_rejected() {
    let store = MemoryStore::new();
    let mut viewer = viewer(Arc::new(create_user_source()), store.clone());
    let mut clipboard = RecordingClipboard::default();
    viewer.start("#flow=a").await;

    assert!(viewer.flip_step(98, &mut clipboard).await.is_err());
    assert!(viewer.toggle_step(1, true, &mut clipboard).await.is_err());
    assert_eq!(store.get("flow-progress:a").await.expect("get"), None);

    viewer.flip_step(0, &mut clipboard).await.expect("flip");
    assert_eq!(checkbox_states(viewer.content_view()), vec![true]);
}

#[tokio::test]
async fn copy_writes_literal_text_and_acknowledges_button() {
    let mut viewer = viewer(Arc::new(create_user_source()), MemoryStore::new());
    let mut clipboard = RecordingClipboard::default();
    viewer.start("#flow=b").await;

    let intents: Vec<Intent> = viewer
        .content_view()
        .intents()
        .into_iter()
        .filter(|intent| matches!(intent, Intent::CopyText { .. }))
        .cloned()
        .collect();
    assert_eq!(intents.len(), 2);

    let now = Instant::now();
    for intent in &intents {
        viewer
            .handle(intent, Interaction::Activated, &mut clipboard, now)
            .await
            .expect("copy");
    }

    assert_eq!(
        clipboard.writes,
        vec![
            "IAM > Keys".to_string(),
            "{\n  \"user\": \"svc-deploy\"\n}".to_string()
        ]
    );
    let presented = viewer.present_content(now + Duration::from_millis(100));
    assert_eq!(presented.to_text().matches("[Copied]").count(), 2);
    let reverted = viewer.present_content(now + COPY_ACK_DURATION);
    assert_eq!(reverted.to_text().matches("[Copied]").count(), 0);
}

#[tokio::test]
async fn failed_clipboard_write_is_not_acknowledged() {
    let mut viewer = viewer(Arc::new(create_user_source()), MemoryStore::new());
    let mut clipboard = RecordingClipboard {
        fail: true,
        ..RecordingClipboard::default()
    };
    viewer.start("#flow=b").await;
    let intent = viewer
        .content_view()
        .intents()
        .into_iter()
        .find(|intent| matches!(intent, Intent::CopyText { .. }))
        .cloned()
        .expect("copy intent");

    let now = Instant::now();
    assert!(viewer
        .handle(&intent, Interaction::Activated, &mut clipboard, now)
        .await
        .is_err());
    assert!(!viewer.present_content(now).to_text().contains("[Copied]"));
}

#[tokio::test]
async fn toggle_twice_restores_record_through_the_view() {
    let store = MemoryStore::new();
    let mut viewer = viewer(Arc::new(create_user_source()), store.clone());
    let mut clipboard = RecordingClipboard::default();
    viewer.start("#flow=b").await;
    viewer
        .toggle_step(1, true, &mut clipboard)
        .await
        .expect("seed");
    let before = viewer.progress().snapshot(&FlowId::from("b")).await;

    let intent = Intent::ToggleStep {
        flow_id: FlowId::from("b"),
        step_index: 0,
    };
    for _ in 0..2 {
        viewer
            .handle(&intent, Interaction::Activated, &mut clipboard, Instant::now())
            .await
            .expect("toggle");
    }

    assert_eq!(viewer.progress().snapshot(&FlowId::from("b")).await, before);
    assert_eq!(checkbox_states(viewer.content_view()), vec![false, true]);
}

#[tokio::test]
async fn export_and_confirmed_reset_cover_catalog_flows() {
    let store = MemoryStore::new();
    let mut viewer = viewer(Arc::new(create_user_source()), store.clone());
    let mut clipboard = RecordingClipboard::default();
    viewer.start("#flow=a").await;
    viewer
        .toggle_step(0, true, &mut clipboard)
        .await
        .expect("check");

    let export = viewer.export_progress().await.expect("export");
    assert_eq!(export.keys().cloned().collect::<Vec<_>>(), vec![FlowId::from("a")]);
    let exported: Value =
        serde_json::from_str(&viewer.export_progress_json().await.expect("json")).expect("parse");
    assert_eq!(exported, json!({"a": {"0": true}}));

    let declined = viewer.reset_progress(|_| false).await.expect("declined");
    assert_eq!(declined, None);
    assert!(store.get("flow-progress:a").await.expect("get").is_some());

    let mut prompt = String::new();
    let removed = viewer
        .reset_progress(|message| {
            prompt = message.to_string();
            true
        })
        .await
        .expect("reset");
    assert_eq!(removed, Some(1));
    assert!(prompt.contains("2 flows"));
    assert!(store.get("flow-progress:a").await.expect("get").is_none());
    assert_eq!(checkbox_states(viewer.content_view()), vec![false]);
}

#[tokio::test]
async fn theme_toggle_persists_across_sessions() {
    let store = MemoryStore::new();
    let source = Arc::new(create_user_source());

    let mut first = viewer(Arc::clone(&source), store.clone());
    first.start("#").await;
    assert_eq!(first.state().theme, Theme::Light);
    assert_eq!(first.toggle_theme().await.expect("toggle"), Theme::Dark);

    let mut second = viewer(source, store);
    second.start("#").await;
    assert_eq!(second.state().theme, Theme::Dark);
}

#[derive(Clone)]
struct FixtureState {
    files: Arc<HashMap<String, Value>>,
    cache_headers: Arc<Mutex<Vec<String>>>,
}

async fn serve_flow_file(
    State(state): State<FixtureState>,
    Path(file): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    if let Some(value) = headers
        .get("cache-control")
        .and_then(|value| value.to_str().ok())
    {
        state
            .cache_headers
            .lock()
            .expect("lock")
            .push(value.to_string());
    }
    state
        .files
        .get(&file)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn spawn_flow_server(files: HashMap<String, Value>) -> Result<(String, FixtureState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = FixtureState {
        files: Arc::new(files),
        cache_headers: Arc::new(Mutex::new(Vec::new())),
    };
    let app = axum::Router::new()
        .route("/flows/:file", get(serve_flow_file))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), state))
}

#[tokio::test]
async fn http_source_loads_catalog_and_flows() {
    let mut files = HashMap::new();
    files.insert(
        "index.json".to_string(),
        json!([{"id": "a", "title": "Create User", "tags": ["users"]}]),
    );
    files.insert(
        "a.json".to_string(),
        json!({"id": "a", "title": "Create User", "steps": [{"label": "Open console"}]}),
    );
    let (server_url, fixture) = spawn_flow_server(files).await.expect("spawn server");

    let source = Arc::new(HttpFlowSource::new(&server_url).expect("source"));
    let catalog = CatalogLoader::new(Arc::clone(&source))
        .load()
        .await
        .expect("catalog");
    assert_eq!(catalog.ids(), vec![FlowId::from("a")]);

    let document = FlowLoader::new(Arc::clone(&source), Arc::new(catalog))
        .load(&FlowId::from("a"))
        .await
        .expect("flow");
    assert_eq!(document.steps[0].label, "Open console");

    let headers = fixture.cache_headers.lock().expect("lock").clone();
    assert_eq!(headers, vec!["no-cache".to_string(), "no-cache".to_string()]);
}

#[tokio::test]
async fn http_error_status_becomes_flow_load_error() {
    let mut files = HashMap::new();
    files.insert(
        "index.json".to_string(),
        json!([{"id": "gone", "title": "Listed but not hosted", "tags": []}]),
    );
    let (server_url, _fixture) = spawn_flow_server(files).await.expect("spawn server");
    let source: Arc<dyn FlowSource> = Arc::new(HttpFlowSource::new(&server_url).expect("source"));
    let mut viewer = FlowViewer::new(
        source,
        ProgressStore::new(MemoryStore::new(), DEFAULT_NAMESPACE).expect("progress"),
    );

    viewer.start("#flow=gone").await;

    let ContentView::Diagnostic(diagnostic) = viewer.content() else {
        panic!("expected flow diagnostic");
    };
    assert_eq!(diagnostic.scope, DiagnosticScope::Flow(FlowId::from("gone")));
    assert!(diagnostic.message.contains("404"));
}

#[tokio::test]
async fn directory_source_serves_local_flows() {
    let root = tempfile::tempdir().expect("tempdir");
    let flows_dir = root.path().join("flows");
    std::fs::create_dir_all(&flows_dir).expect("flows dir");
    std::fs::write(
        flows_dir.join("index.json"),
        r#"[{"id":"a","title":"Create User","tags":["users"]}]"#,
    )
    .expect("index");
    std::fs::write(
        flows_dir.join("a.json"),
        r#"{"id":"a","title":"Create User","steps":[{"label":"Open console"}]}"#,
    )
    .expect("flow");

    let source = source_for_location(&root.path().to_string_lossy()).expect("source");
    let mut viewer = FlowViewer::new(
        source,
        ProgressStore::new(MemoryStore::new(), DEFAULT_NAMESPACE).expect("progress"),
    );
    viewer.start("#flow=a").await;
    assert_eq!(viewer.content(), &ContentView::Flow(FlowId::from("a")));

    let report = probe_source(&DirectoryFlowSource::new(root.path())).await;
    assert_eq!(report.catalog_is_array, Some(true));
    assert_eq!(report.flow_ids, vec!["a".to_string()]);
    assert_eq!(
        report.first_flow_keys,
        Some(Ok(vec![
            "id".to_string(),
            "steps".to_string(),
            "title".to_string()
        ]))
    );
}

#[tokio::test]
async fn probe_reports_unreachable_catalog() {
    let report = probe_source(&StaticFlowSource::new(Value::Null)).await;
    assert!(report.error.is_some());
    assert!(report.lines().iter().any(|line| line.starts_with("catalog error:")));
}
