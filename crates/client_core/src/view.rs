//! Declarative view tree. Interactive elements carry an [`Intent`] instead of
//! callbacks; hosts hand activated intents to the dispatcher.

use shared::{domain::FlowId, protocol::Route};
use tokio::time::Instant;

use crate::dispatch::CopyAcknowledgements;

pub const COPY_LABEL: &str = "Copy";
pub const COPIED_LABEL: &str = "Copied";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopyField {
    Where,
    Inputs,
}

impl CopyField {
    pub fn as_str(self) -> &'static str {
        match self {
            CopyField::Where => "where",
            CopyField::Inputs => "inputs",
        }
    }
}

/// Identifies one copy button within the displayed flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CopyTarget {
    pub step_index: usize,
    pub field: CopyField,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    ToggleStep { flow_id: FlowId, step_index: usize },
    CopyText { target: CopyTarget, text: String },
    Navigate { route: Route },
}

impl Intent {
    fn name(&self) -> &'static str {
        match self {
            Intent::ToggleStep { .. } => "toggle-step",
            Intent::CopyText { .. } => "copy-text",
            Intent::Navigate { .. } => "navigate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewNode {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: &'static str,
    pub class: Option<&'static str>,
    /// Attributes in render order. An empty value renders as a bare boolean attribute.
    pub attrs: Vec<(&'static str, String)>,
    pub intent: Option<Intent>,
    pub children: Vec<ViewNode>,
}

pub fn el(tag: &'static str) -> Element {
    Element {
        tag,
        class: None,
        attrs: Vec::new(),
        intent: None,
        children: Vec::new(),
    }
}

impl Element {
    pub fn class(mut self, class: &'static str) -> Self {
        self.class = Some(class);
        self
    }

    pub fn attr(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.attrs.push((name, value.into()));
        self
    }

    pub fn intent(mut self, intent: Intent) -> Self {
        self.intent = Some(intent);
        self
    }

    pub fn child(mut self, child: impl Into<ViewNode>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = ViewNode>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn text(self, text: impl Into<String>) -> Self {
        self.child(ViewNode::Text(text.into()))
    }

    pub fn attr_value(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }
}

impl From<Element> for ViewNode {
    fn from(value: Element) -> Self {
        ViewNode::Element(value)
    }
}

fn is_void(tag: &str) -> bool {
    matches!(tag, "input" | "br" | "hr")
}

impl ViewNode {
    /// Depth-first walk over every element in the tree.
    pub fn elements(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        collect_elements(self, &mut out);
        out
    }

    pub fn find_by_class(&self, class: &str) -> Vec<&Element> {
        self.elements()
            .into_iter()
            .filter(|element| element.class == Some(class))
            .collect()
    }

    pub fn intents(&self) -> Vec<&Intent> {
        self.elements()
            .into_iter()
            .filter_map(|element| element.intent.as_ref())
            .collect()
    }

    /// Concatenated text content, without markup.
    pub fn text_content(&self) -> String {
        match self {
            ViewNode::Text(text) => text.clone(),
            ViewNode::Element(element) => element
                .children
                .iter()
                .map(ViewNode::text_content)
                .collect(),
        }
    }

    /// Relabels copy buttons that are still inside their acknowledgement window.
    pub fn with_acknowledgements(mut self, acks: &CopyAcknowledgements, now: Instant) -> Self {
        relabel_copy_buttons(&mut self, acks, now);
        self
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        write_html(self, &mut out);
        out
    }

    pub fn to_text(&self) -> String {
        let mut writer = TextWriter::default();
        writer.node(self, 0);
        writer.finish()
    }
}

fn collect_elements<'a>(node: &'a ViewNode, out: &mut Vec<&'a Element>) {
    if let ViewNode::Element(element) = node {
        out.push(element);
        for child in &element.children {
            collect_elements(child, out);
        }
    }
}

fn relabel_copy_buttons(node: &mut ViewNode, acks: &CopyAcknowledgements, now: Instant) {
    let ViewNode::Element(element) = node else {
        return;
    };
    if let Some(Intent::CopyText { target, .. }) = &element.intent {
        let label = if acks.is_acknowledged(target, now) {
            COPIED_LABEL
        } else {
            COPY_LABEL
        };
        element.children = vec![ViewNode::Text(label.to_string())];
        return;
    }
    for child in &mut element.children {
        relabel_copy_buttons(child, acks, now);
    }
}

/// Escapes text for use in HTML content and quoted attribute values.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn write_html(node: &ViewNode, out: &mut String) {
    let element = match node {
        ViewNode::Text(text) => {
            out.push_str(&escape_html(text));
            return;
        }
        ViewNode::Element(element) => element,
    };

    out.push('<');
    out.push_str(element.tag);
    if let Some(class) = element.class {
        push_attr(out, "class", class);
    }
    for (name, value) in &element.attrs {
        if value.is_empty() {
            out.push(' ');
            out.push_str(name);
        } else {
            push_attr(out, name, value);
        }
    }
    if let Some(intent) = &element.intent {
        push_attr(out, "data-intent", intent.name());
        match intent {
            Intent::ToggleStep { step_index, .. } => {
                push_attr(out, "data-step", &step_index.to_string());
            }
            Intent::CopyText { target, .. } => {
                push_attr(out, "data-step", &target.step_index.to_string());
                push_attr(out, "data-field", target.field.as_str());
            }
            Intent::Navigate { .. } => {}
        }
    }
    out.push('>');

    if is_void(element.tag) {
        return;
    }
    for child in &element.children {
        write_html(child, out);
    }
    out.push_str("</");
    out.push_str(element.tag);
    out.push('>');
}

fn push_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&escape_html(value));
    out.push('"');
}

#[derive(Default)]
struct TextWriter {
    lines: Vec<String>,
    current: String,
}

impl TextWriter {
    fn break_line(&mut self) {
        if !self.current.trim().is_empty() {
            let line = std::mem::take(&mut self.current);
            self.lines.push(line.trim_end().to_string());
        }
        self.current.clear();
    }

    fn blank_line(&mut self) {
        self.break_line();
        if self.lines.last().is_some_and(|line| !line.is_empty()) {
            self.lines.push(String::new());
        }
    }

    fn indent(&mut self, depth: usize) {
        if self.current.is_empty() {
            self.current.push_str(&"  ".repeat(depth));
        }
    }

    fn node(&mut self, node: &ViewNode, depth: usize) {
        let element = match node {
            ViewNode::Text(text) => {
                self.indent(depth);
                self.current.push_str(text);
                return;
            }
            ViewNode::Element(element) => element,
        };

        match element.tag {
            "h1" | "h2" | "h3" => {
                self.blank_line();
                self.children(element, depth);
                self.break_line();
            }
            "li" => {
                self.break_line();
                self.indent(depth);
                self.current.push_str("- ");
                self.children(element, depth);
                self.break_line();
            }
            "input" => {
                self.indent(depth);
                let checked = element.attr_value("checked").is_some();
                self.current.push_str(if checked { "[x]" } else { "[ ]" });
            }
            "button" => {
                self.indent(depth);
                self.current.push_str(" [");
                self.children(element, depth);
                self.current.push(']');
            }
            "pre" => {
                self.break_line();
                for line in element.children.iter().map(ViewNode::text_content) {
                    for raw in line.lines() {
                        self.lines.push(format!("{}{raw}", "    ".repeat(depth + 1)));
                    }
                }
            }
            "summary" | "span" | "code" | "a" | "strong" | "em" => {
                self.children(element, depth);
                if element.tag == "summary" {
                    self.current.push(':');
                }
                if element.class == Some("field-label") || element.class == Some("tag") {
                    self.current.push(' ');
                }
            }
            "ul" | "ol" => {
                self.break_line();
                self.children(element, depth + 1);
                self.break_line();
            }
            _ => {
                self.break_line();
                self.children(element, depth);
                self.break_line();
            }
        }
    }

    fn children(&mut self, element: &Element, depth: usize) {
        for child in &element.children {
            self.node(child, depth);
        }
    }

    fn finish(mut self) -> String {
        self.break_line();
        while self.lines.last().is_some_and(|line| line.is_empty()) {
            self.lines.pop();
        }
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }
}
