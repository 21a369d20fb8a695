//! Label derivation.
//!
//! Turns one observed request (method, path, optional route template, query,
//! captured status) into the ordered label values of the request series.
//! The label-name list is fixed when the schema is built; every derived
//! `LabelValues` has exactly that arity and order.

use serde::Deserialize;

use crate::error::{MetricsError, Result};

/// Version reported when the query parameter is absent or empty.
pub const DEFAULT_VERSION: &str = "0.0.0";
/// Query parameter read for the version label.
pub const DEFAULT_VERSION_PARAM: &str = "version";
/// Status label when the handler neither set a status nor wrote a body.
pub const UNKNOWN_STATUS: &str = "unknown";
/// Label set used when none is configured.
pub const DEFAULT_LABELS: [LabelName; 3] = [LabelName::Status, LabelName::Method, LabelName::Path];

/// Recognized label names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelName {
    Status,
    Method,
    Path,
    Version,
}

impl LabelName {
    pub fn as_str(self) -> &'static str {
        match self {
            LabelName::Status => "status",
            LabelName::Method => "method",
            LabelName::Path => "path",
            LabelName::Version => "version",
        }
    }
}

/// Source of the `path` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathLabel {
    /// Matched route template, falling back to the literal path.
    #[default]
    Route,
    /// Literal request path. Cardinality grows with distinct URLs.
    Raw,
}

/// What the instrumentation needs to know about an inbound request.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    /// Raw HTTP method, any case.
    pub method: String,
    /// Literal request path.
    pub path: String,
    /// Route template the router matched, if any (e.g. `/items/:id`).
    pub route: Option<String>,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
}

impl RequestMeta {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            route: None,
            query: None,
        }
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }
}

/// Immutable label configuration shared by all requests.
#[derive(Debug, Clone)]
pub struct LabelSchema {
    names: Vec<LabelName>,
    path_label: PathLabel,
    version_param: String,
    default_version: String,
}

impl Default for LabelSchema {
    fn default() -> Self {
        Self {
            names: DEFAULT_LABELS.to_vec(),
            path_label: PathLabel::Route,
            version_param: DEFAULT_VERSION_PARAM.to_string(),
            default_version: DEFAULT_VERSION.to_string(),
        }
    }
}

impl LabelSchema {
    /// Build a schema over `names`. An empty list selects `DEFAULT_LABELS`.
    pub fn new(names: &[LabelName]) -> Result<Self> {
        let names = if names.is_empty() {
            DEFAULT_LABELS.to_vec()
        } else {
            names.to_vec()
        };
        for (i, n) in names.iter().enumerate() {
            if names[..i].contains(n) {
                return Err(MetricsError::Config(format!(
                    "duplicate label name: {}",
                    n.as_str()
                )));
            }
        }
        Ok(Self {
            names,
            ..Self::default()
        })
    }

    pub fn with_path_label(mut self, path_label: PathLabel) -> Self {
        self.path_label = path_label;
        self
    }

    pub fn with_version_param(mut self, param: impl Into<String>) -> Self {
        self.version_param = param.into();
        self
    }

    pub fn with_default_version(mut self, version: impl Into<String>) -> Self {
        self.default_version = version.into();
        self
    }

    pub fn names(&self) -> &[LabelName] {
        &self.names
    }

    /// Label names in series order, as registered with the metrics client.
    pub fn label_names(&self) -> Vec<&'static str> {
        self.names.iter().map(|n| n.as_str()).collect()
    }

    pub fn path_label(&self) -> PathLabel {
        self.path_label
    }

    /// Derive the label values for one request.
    pub fn derive(&self, req: &RequestMeta, status: Option<u16>) -> LabelValues {
        let values = self
            .names
            .iter()
            .map(|&name| {
                let v = match name {
                    LabelName::Status => status_label(status),
                    LabelName::Method => sanitize_method(&req.method),
                    LabelName::Path => self.path_value(req).to_string(),
                    LabelName::Version => version_from_query(
                        req.query.as_deref(),
                        &self.version_param,
                        &self.default_version,
                    ),
                };
                (name, v)
            })
            .collect();
        LabelValues { values }
    }

    fn path_value<'a>(&self, req: &'a RequestMeta) -> &'a str {
        match self.path_label {
            PathLabel::Route => req.route.as_deref().unwrap_or(&req.path),
            PathLabel::Raw => &req.path,
        }
    }
}

/// Ordered label values for one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelValues {
    values: Vec<(LabelName, String)>,
}

impl LabelValues {
    /// Values in schema order, ready for `with_label_values`-style calls.
    pub fn as_strs(&self) -> Vec<&str> {
        self.values.iter().map(|(_, v)| v.as_str()).collect()
    }

    pub fn get(&self, name: LabelName) -> Option<&str> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Lowercase the HTTP method (`GET` -> `get`).
pub fn sanitize_method(method: &str) -> String {
    method.to_ascii_lowercase()
}

/// Decimal status code, or `UNKNOWN_STATUS` when nothing was written.
pub fn status_label(status: Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => UNKNOWN_STATUS.to_string(),
    }
}

/// First value of `param` in `query`, or `default` when absent or empty.
pub fn version_from_query(query: Option<&str>, param: &str, default: &str) -> String {
    query
        .and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(k, _)| k == param)
                .map(|(_, v)| v.into_owned())
        })
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
