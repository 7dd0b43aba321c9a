//! Application controller: owns the session state and wires the loaders,
//! router, renderer, search filter and dispatcher together.

use std::sync::Arc;

use anyhow::{bail, Result};
use shared::{
    domain::{Catalog, FlowDocument, FlowId, ProgressExport, Theme},
    error::{Diagnostic, ViewerError},
    protocol::Route,
};
use storage::{load_theme, save_theme, KeyValueStore, ProgressStore};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::{
    dispatch::{Clipboard, DispatchOutcome, Dispatcher, Interaction},
    loader::{CatalogLoader, FlowLoader},
    render::{render_diagnostic, render_flow, render_home, render_sidebar},
    router::{NavigationToken, RouteRequest, Router},
    search::filter_catalog,
    source::FlowSource,
    view::{Intent, ViewNode},
};

#[derive(Debug, Clone, Default, PartialEq)]
pub enum CatalogState {
    #[default]
    NotLoaded,
    Loaded(Arc<Catalog>),
    Failed(Diagnostic),
}

impl CatalogState {
    pub fn catalog(&self) -> Option<&Arc<Catalog>> {
        match self {
            CatalogState::Loaded(catalog) => Some(catalog),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum CurrentFlow {
    #[default]
    NotLoaded,
    Loaded(FlowDocument),
}

impl CurrentFlow {
    pub fn document(&self) -> Option<&FlowDocument> {
        match self {
            CurrentFlow::Loaded(document) => Some(document),
            CurrentFlow::NotLoaded => None,
        }
    }
}

/// What currently occupies the content area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentView {
    Home,
    Flow(FlowId),
    Diagnostic(Diagnostic),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub catalog: CatalogState,
    pub current_flow: CurrentFlow,
    pub theme: Theme,
}

/// A navigation that has been issued but not yet resolved. Resolving does not
/// borrow the viewer, so a newer navigation may start while this one loads.
pub struct PendingNavigation<S: ?Sized> {
    request: RouteRequest,
    loader: Option<FlowLoader<S>>,
}

impl<S: FlowSource + ?Sized> PendingNavigation<S> {
    pub fn token(&self) -> NavigationToken {
        self.request.token
    }

    pub async fn resolve(self) -> ResolvedNavigation {
        let outcome = match (&self.request.route, &self.loader) {
            (Route::Home, _) => RouteOutcome::Home,
            (Route::Flow(_), None) => RouteOutcome::CatalogUnavailable,
            (Route::Flow(id), Some(loader)) => RouteOutcome::Flow(loader.load(id).await),
        };
        ResolvedNavigation {
            token: self.request.token,
            outcome,
        }
    }
}

#[derive(Debug)]
pub enum RouteOutcome {
    Home,
    Flow(Result<FlowDocument, ViewerError>),
    CatalogUnavailable,
}

#[derive(Debug)]
pub struct ResolvedNavigation {
    pub token: NavigationToken,
    pub outcome: RouteOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationStatus {
    Applied,
    Stale,
}

pub struct FlowViewer<S: ?Sized, K> {
    source: Arc<S>,
    dispatcher: Dispatcher<K>,
    router: Router,
    state: SessionState,
    content: ContentView,
    content_view: ViewNode,
    search_term: String,
}

impl<S, K> FlowViewer<S, K>
where
    S: FlowSource + ?Sized,
    K: KeyValueStore,
{
    pub fn new(source: Arc<S>, progress: ProgressStore<K>) -> Self {
        Self {
            source,
            dispatcher: Dispatcher::new(progress),
            router: Router::new(),
            state: SessionState::default(),
            content: ContentView::Home,
            content_view: render_home(0),
            search_term: String::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn content(&self) -> &ContentView {
        &self.content
    }

    pub fn content_view(&self) -> &ViewNode {
        &self.content_view
    }

    /// Content view with copy buttons relabelled for the given instant.
    pub fn present_content(&self, now: Instant) -> ViewNode {
        self.content_view
            .clone()
            .with_acknowledgements(self.dispatcher.acknowledgements(), now)
    }

    pub fn progress(&self) -> &ProgressStore<K> {
        self.dispatcher.progress()
    }

    /// The flow shown in the content area, if any. Drives the sidebar highlight.
    pub fn active_flow(&self) -> Option<&FlowId> {
        match &self.content {
            ContentView::Flow(id) => Some(id),
            _ => None,
        }
    }

    /// Restores the theme, loads the catalog and routes the initial fragment.
    pub async fn start(&mut self, fragment: &str) -> NavigationStatus {
        self.state.theme = load_theme(self.progress().store()).await;
        if !self.reload_catalog().await {
            return NavigationStatus::Applied;
        }
        self.navigate(fragment).await
    }

    /// Replaces the catalog wholesale. On failure the whole content area shows
    /// the catalog diagnostic.
    pub async fn reload_catalog(&mut self) -> bool {
        match CatalogLoader::new(Arc::clone(&self.source)).load().await {
            Ok(catalog) => {
                self.state.catalog = CatalogState::Loaded(Arc::new(catalog));
                true
            }
            Err(err) => {
                error!(error = %err, "catalog load failed");
                let diagnostic = err.to_diagnostic();
                self.content_view = render_diagnostic(&diagnostic);
                self.content = ContentView::Diagnostic(diagnostic.clone());
                self.state.catalog = CatalogState::Failed(diagnostic);
                false
            }
        }
    }

    pub fn begin_navigation(&mut self, fragment: &str) -> PendingNavigation<S> {
        let request = self.router.issue(fragment);
        let loader = self
            .state
            .catalog
            .catalog()
            .map(|catalog| FlowLoader::new(Arc::clone(&self.source), Arc::clone(catalog)));
        PendingNavigation { request, loader }
    }

    /// Applies a resolved navigation unless a newer one has been issued since.
    pub async fn finish_navigation(&mut self, resolved: ResolvedNavigation) -> NavigationStatus {
        if !self.router.is_current(resolved.token) {
            debug!(token = resolved.token.0, "dropping superseded navigation result");
            return NavigationStatus::Stale;
        }

        match resolved.outcome {
            RouteOutcome::Home => {
                let count = self.state.catalog.catalog().map_or(0, |c| c.len());
                self.content = ContentView::Home;
                self.content_view = render_home(count);
            }
            RouteOutcome::CatalogUnavailable => {
                warn!("navigation ignored while the catalog is unavailable");
            }
            RouteOutcome::Flow(Ok(document)) => {
                let snapshot = self.progress().snapshot(&document.id).await;
                self.dispatcher.acknowledgements_mut().clear();
                self.content_view = render_flow(&document, &snapshot);
                self.content = ContentView::Flow(document.id.clone());
                self.state.current_flow = CurrentFlow::Loaded(document);
            }
            RouteOutcome::Flow(Err(err)) => {
                warn!(error = %err, "flow load failed");
                let diagnostic = err.to_diagnostic();
                self.content_view = render_diagnostic(&diagnostic);
                self.content = ContentView::Diagnostic(diagnostic);
            }
        }
        NavigationStatus::Applied
    }

    /// Full load for a fragment; re-entering the same fragment reloads.
    pub async fn navigate(&mut self, fragment: &str) -> NavigationStatus {
        let pending = self.begin_navigation(fragment);
        let resolved = pending.resolve().await;
        self.finish_navigation(resolved).await
    }

    pub fn set_search_term(&mut self, term: &str) -> ViewNode {
        self.search_term = term.to_string();
        self.sidebar_view()
    }

    pub fn sidebar_view(&self) -> ViewNode {
        match self.state.catalog.catalog() {
            Some(catalog) => {
                let flows = filter_catalog(catalog, &self.search_term);
                render_sidebar(&flows, self.active_flow())
            }
            None => render_sidebar(&[], None),
        }
    }

    /// Runs an activated intent. Progress changes re-render the displayed
    /// flow. A navigation intent is returned for the host to route through
    /// [`FlowViewer::begin_navigation`], so nothing here waits on a load.
    pub async fn handle(
        &mut self,
        intent: &Intent,
        interaction: Interaction,
        clipboard: &mut dyn Clipboard,
        now: Instant,
    ) -> Result<DispatchOutcome> {
        let outcome = self
            .dispatcher
            .dispatch(intent, interaction, clipboard, now)
            .await?;
        if let DispatchOutcome::ProgressUpdated { flow_id, .. } = &outcome {
            if self.active_flow() == Some(flow_id) {
                self.rerender_current_flow().await;
            }
        }
        Ok(outcome)
    }

    /// Sets the completion of a step of the displayed flow, as a checkbox change would.
    pub async fn toggle_step(
        &mut self,
        step_index: usize,
        checked: bool,
        clipboard: &mut dyn Clipboard,
    ) -> Result<DispatchOutcome> {
        let intent = self.step_intent(step_index)?;
        self.handle(&intent, Interaction::Checked(checked), clipboard, Instant::now())
            .await
    }

    /// Flips the completion of a step of the displayed flow.
    pub async fn flip_step(
        &mut self,
        step_index: usize,
        clipboard: &mut dyn Clipboard,
    ) -> Result<DispatchOutcome> {
        let intent = self.step_intent(step_index)?;
        self.handle(&intent, Interaction::Activated, clipboard, Instant::now())
            .await
    }

    /// The checkbox intent the displayed flow renders for a step. Fails for
    /// steps the flow does not have.
    pub fn step_intent(&self, step_index: usize) -> Result<Intent> {
        self.content_view
            .intents()
            .into_iter()
            .find(|intent| {
                matches!(intent, Intent::ToggleStep { step_index: index, .. } if *index == step_index)
            })
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no step {} in the displayed flow", step_index + 1))
    }

    async fn rerender_current_flow(&mut self) {
        if let Some(document) = self.state.current_flow.document() {
            let snapshot = self.dispatcher.progress().snapshot(&document.id).await;
            self.content_view = render_flow(document, &snapshot);
        }
    }

    /// The loaded catalog, or the reason there is none.
    pub fn require_catalog(&self) -> Result<&Arc<Catalog>> {
        match &self.state.catalog {
            CatalogState::Loaded(catalog) => Ok(catalog),
            CatalogState::Failed(diagnostic) => {
                bail!("{}: {}", diagnostic.title, diagnostic.message)
            }
            CatalogState::NotLoaded => bail!("the flow catalog has not been loaded"),
        }
    }

    fn known_flow_ids(&self) -> Result<Vec<FlowId>> {
        Ok(self.require_catalog()?.ids())
    }

    pub async fn export_progress(&self) -> Result<ProgressExport> {
        let ids = self.known_flow_ids()?;
        Ok(self.progress().export_all(&ids).await)
    }

    pub async fn export_progress_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.export_progress().await?)?)
    }

    /// Deletes every stored record for the catalog's flows after `confirm`
    /// accepts the prompt. Returns `None` when the user declines.
    pub async fn reset_progress<F>(&mut self, confirm: F) -> Result<Option<usize>>
    where
        F: FnOnce(&str) -> bool,
    {
        let ids = self.known_flow_ids()?;
        let prompt = format!(
            "Reset progress for all {} flows? This cannot be undone.",
            ids.len()
        );
        if !confirm(&prompt) {
            info!("progress reset declined");
            return Ok(None);
        }
        let removed = self.progress().reset_all(&ids).await?;
        info!(removed, "progress reset");
        if self.active_flow().is_some() {
            self.rerender_current_flow().await;
        }
        Ok(Some(removed))
    }

    pub async fn toggle_theme(&mut self) -> Result<Theme> {
        self.set_theme(self.state.theme.toggled()).await
    }

    pub async fn set_theme(&mut self, theme: Theme) -> Result<Theme> {
        save_theme(self.progress().store(), theme).await?;
        self.state.theme = theme;
        Ok(theme)
    }
}
