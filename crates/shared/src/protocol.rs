//! Navigable fragment protocol: `#flow=<url-encoded id>` selects a flow,
//! anything else selects the home view.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::domain::FlowId;

const FLOW_PREFIX: &str = "flow=";

/// Everything except the characters a URI component may carry unescaped.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Flow(FlowId),
}

impl Route {
    /// Parses a location fragment, with or without its leading `#`. The id is
    /// percent-decoded; `+` is literal.
    pub fn from_fragment(fragment: &str) -> Self {
        fragment
            .trim()
            .trim_start_matches('#')
            .split('&')
            .find_map(|part| part.strip_prefix(FLOW_PREFIX))
            .map(|encoded| percent_decode_str(encoded).decode_utf8_lossy().into_owned())
            .filter(|id| !id.is_empty())
            .map(|id| Route::Flow(FlowId(id)))
            .unwrap_or(Route::Home)
    }

    pub fn to_fragment(&self) -> String {
        match self {
            Route::Home => "#".to_string(),
            Route::Flow(id) => flow_fragment(id),
        }
    }
}

pub fn flow_fragment(id: &FlowId) -> String {
    format!("#{FLOW_PREFIX}{}", utf8_percent_encode(id.as_str(), COMPONENT))
}
