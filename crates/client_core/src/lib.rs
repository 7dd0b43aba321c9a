//! Flow state and rendering engine for the checklist viewer.

pub mod controller;
pub mod dispatch;
pub mod loader;
pub mod render;
pub mod router;
pub mod search;
pub mod source;
pub mod view;

pub use controller::{
    CatalogState, ContentView, CurrentFlow, FlowViewer, NavigationStatus, PendingNavigation,
    ResolvedNavigation, RouteOutcome, SessionState,
};
pub use dispatch::{
    Clipboard, CopyAcknowledgements, DispatchOutcome, Dispatcher, Interaction, COPY_ACK_DURATION,
};
pub use loader::{probe_source, CatalogLoader, FlowLoader, SourceReport};
pub use render::{render_diagnostic, render_flow, render_home, render_sidebar, EMPTY_LISTING_HINT};
pub use router::{NavigationToken, RouteRequest, Router};
pub use search::filter_catalog;
pub use source::{source_for_location, DirectoryFlowSource, FlowSource, HttpFlowSource};
pub use view::{escape_html, CopyField, CopyTarget, Element, Intent, ViewNode};

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
