//! Pure derivations from domain state to view trees. Every flow change
//! re-renders the whole flow view; nothing is patched in place.

use serde_json::Value;
use shared::{
    domain::{FlowDocument, FlowId, FlowSummary, ProgressRecord, Resource, Step},
    error::{Diagnostic, DiagnosticScope},
    protocol::{flow_fragment, Route},
};
use url::Url;

use crate::view::{el, CopyField, CopyTarget, Element, Intent, ViewNode, COPY_LABEL};

pub const EMPTY_LISTING_HINT: &str = "No flows match your search.";

pub fn render_flow(flow: &FlowDocument, progress: &ProgressRecord) -> ViewNode {
    let mut header = el("header")
        .class("flow-header")
        .child(el("h2").class("flow-title").text(&flow.title));
    if let Some(level) = &flow.level {
        header = header.child(el("span").class("flow-level").text(level));
    }
    if let Some(summary) = &flow.summary {
        header = header.child(el("p").class("flow-summary").text(summary));
    }

    let steps = flow.steps.iter().enumerate().map(|(index, step)| {
        let completed = progress.get(&index).copied().unwrap_or(false);
        render_step(&flow.id, index, step, completed)
    });

    let mut view = el("section")
        .class("flow")
        .attr("data-flow-id", flow.id.as_str())
        .child(header)
        .child(el("ol").class("steps").children(steps));

    if !flow.resources.is_empty() {
        view = view.child(
            el("section")
                .class("resources")
                .child(el("h3").text("Resources"))
                .child(
                    el("ul").children(
                        flow.resources
                            .iter()
                            .map(|resource| el("li").child(render_resource(resource)).into()),
                    ),
                ),
        );
    }

    view.into()
}

fn render_step(flow_id: &FlowId, index: usize, step: &Step, completed: bool) -> ViewNode {
    let mut item = el("li")
        .class("step")
        .attr("data-step", index.to_string())
        .child(
            el("h3")
                .class("step-title")
                .text(format!("{}. {}", index + 1, step.label)),
        );

    if let Some(location) = &step.location {
        item = item.child(
            el("div")
                .class("field where")
                .child(el("span").class("field-label").text("Where"))
                .child(el("code").text(location))
                .child(copy_button(index, CopyField::Where, location.clone())),
        );
    }

    if let Some(action) = &step.action {
        item = item.child(
            el("div")
                .class("field action")
                .child(el("span").class("field-label").text("Do"))
                .child(el("span").text(action)),
        );
    }

    if let Some(inputs) = &step.inputs {
        let text = inputs_text(inputs);
        item = item.child(
            el("details")
                .class("field inputs")
                .child(el("summary").text("Inputs"))
                .child(el("pre").text(text.clone()))
                .child(copy_button(index, CopyField::Inputs, text)),
        );
    }

    if let Some(verify) = &step.verify {
        item = item.child(
            el("div")
                .class("field verify")
                .child(el("span").class("field-label").text("Verify"))
                .child(el("span").text(verify)),
        );
    }

    if !step.notes.is_empty() {
        item = item.child(
            el("ul")
                .class("notes")
                .children(step.notes.iter().map(|note| el("li").text(note).into())),
        );
    }

    let mut checkbox = el("input")
        .attr("type", "checkbox")
        .intent(Intent::ToggleStep {
            flow_id: flow_id.clone(),
            step_index: index,
        });
    if completed {
        checkbox = checkbox.attr("checked", "");
    }
    item.child(el("label").class("done").child(checkbox).text(" Done"))
        .into()
}

fn copy_button(step_index: usize, field: CopyField, text: String) -> Element {
    el("button")
        .class("copy")
        .attr("type", "button")
        .intent(Intent::CopyText {
            target: CopyTarget { step_index, field },
            text,
        })
        .text(COPY_LABEL)
}

/// Text shown in the inputs panel and written by its copy button. JSON
/// strings are used as-is so they are not quoted a second time.
pub fn inputs_text(inputs: &Value) -> String {
    match inputs {
        Value::String(raw) => raw.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn render_resource(resource: &Resource) -> ViewNode {
    if is_safe_href(&resource.href) {
        el("a")
            .attr("href", resource.href.as_str())
            .attr("target", "_blank")
            .attr("rel", "noopener")
            .text(&resource.label)
            .into()
    } else {
        el("span")
            .class("resource-unlinked")
            .text(format!("{} ({})", resource.label, resource.href))
            .into()
    }
}

/// Relative links and http(s)/mailto URLs are linkable; other schemes such
/// as `javascript:` are shown as text.
fn is_safe_href(href: &str) -> bool {
    match Url::parse(href) {
        Ok(url) => matches!(url.scheme(), "http" | "https" | "mailto"),
        Err(_) => !href.contains(':') || href.starts_with('/') || href.starts_with('#'),
    }
}

/// Sidebar listing. `active` highlights the displayed flow; an empty listing
/// renders a single non-interactive hint.
pub fn render_sidebar(flows: &[&FlowSummary], active: Option<&FlowId>) -> ViewNode {
    let list = el("ul").class("flow-list");
    if flows.is_empty() {
        return list
            .child(el("li").class("empty-hint").text(EMPTY_LISTING_HINT))
            .into();
    }

    list.children(flows.iter().map(|flow| {
        let mut link = el("a")
            .class("flow-link")
            .attr("href", flow_fragment(&flow.id))
            .intent(Intent::Navigate {
                route: Route::Flow(flow.id.clone()),
            })
            .child(el("strong").text(&flow.title));
        for tag in &flow.tags {
            link = link.child(el("span").class("tag").text(tag));
        }
        let item = if active == Some(&flow.id) {
            el("li").class("active")
        } else {
            el("li")
        };
        item.child(link).into()
    }))
    .into()
}

pub fn render_home(flow_count: usize) -> ViewNode {
    el("section")
        .class("home")
        .child(el("h2").text("Select a flow"))
        .child(el("p").text(format!(
            "Pick one of the {flow_count} checklists from the list, or search by title or tag."
        )))
        .into()
}

pub fn render_diagnostic(diagnostic: &Diagnostic) -> ViewNode {
    let (class, scope_attr) = match &diagnostic.scope {
        DiagnosticScope::Catalog => ("diagnostic catalog-error", None),
        DiagnosticScope::Flow(id) => ("diagnostic flow-error", Some(id.as_str())),
    };
    let mut section = el("section").class(class).attr("role", "alert");
    if let Some(id) = scope_attr {
        section = section.attr("data-flow-id", id);
    }
    section
        .child(el("h2").text(&diagnostic.title))
        .child(el("p").text(&diagnostic.message))
        .into()
}
