//! Core data model shared by the cache, the gateway and the orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identity of an open file as reported by the host editor
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileUri(String);

impl FileUri {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lowercased extension of the last path segment, if any
    pub fn extension(&self) -> Option<String> {
        let last = self.0.rsplit(['/', '\\']).next()?;
        let (stem, ext) = last.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_lowercase())
    }
}

impl fmt::Display for FileUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileUri {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for FileUri {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Kind prefix of a [`CodeObjectId`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeObjectKind {
    Method,
    Span,
}

impl CodeObjectKind {
    pub fn prefix(self) -> &'static str {
        match self {
            CodeObjectKind::Method => "method",
            CodeObjectKind::Span => "span",
        }
    }
}

/// Opaque code object key of the form `<kind>:<location>`
///
/// Generated by discovery providers. The engine never looks inside apart
/// from the kind prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeObjectId(String);

impl CodeObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn method(location: &str) -> Self {
        Self(format!("{}:{}", CodeObjectKind::Method.prefix(), location))
    }

    pub fn span(location: &str) -> Self {
        Self(format!("{}:{}", CodeObjectKind::Span.prefix(), location))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn kind(&self) -> Option<CodeObjectKind> {
        let (prefix, _) = self.0.split_once(':')?;
        match prefix {
            "method" => Some(CodeObjectKind::Method),
            "span" => Some(CodeObjectKind::Span),
            _ => None,
        }
    }
}

impl fmt::Display for CodeObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CodeObjectId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Result of resolving the caret position in a file
///
/// Compared by value so the orchestrator can drop repeated resolutions
/// while the caret moves inside the same method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodUnderCaret {
    /// Empty when the caret is not on a method
    pub id: CodeObjectId,
    pub name: String,
    pub containing_class_name: String,
    /// Empty when there is no file
    pub file_uri: FileUri,
    pub is_supported_file: bool,
}

impl MethodUnderCaret {
    /// No file is focused
    pub fn no_file() -> Self {
        Self::default()
    }

    /// The file cannot be handled by any discovery provider
    pub fn unsupported(file_uri: FileUri) -> Self {
        Self {
            file_uri,
            is_supported_file: false,
            ..Self::default()
        }
    }

    /// Supported file, caret outside of any method
    pub fn outside_method(file_uri: FileUri) -> Self {
        Self {
            file_uri,
            is_supported_file: true,
            ..Self::default()
        }
    }
}

/// A named unit of execution found lexically inside a method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanInfo {
    pub id: CodeObjectId,
    pub name: String,
    pub containing_method_id: CodeObjectId,
    pub containing_file_uri: FileUri,
    pub source_offset: usize,
}

/// Discovery result for a single method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodInfo {
    pub id: CodeObjectId,
    pub name: String,
    pub containing_class: String,
    pub containing_namespace: String,
    pub containing_file_uri: FileUri,
    pub source_offset: usize,
    #[serde(default)]
    pub spans: Vec<SpanInfo>,
}

impl MethodInfo {
    /// Method id followed by the ids of its spans
    pub fn code_object_ids(&self) -> Vec<CodeObjectId> {
        std::iter::once(self.id.clone())
            .chain(self.spans.iter().map(|s| s.id.clone()))
            .collect()
    }

    /// Minimal method built from a caret resolution when discovery has no entry
    pub fn placeholder(caret: &MethodUnderCaret) -> Self {
        Self {
            id: caret.id.clone(),
            name: caret.name.clone(),
            containing_class: caret.containing_class_name.clone(),
            containing_namespace: String::new(),
            containing_file_uri: caret.file_uri.clone(),
            source_offset: 0,
            spans: Vec::new(),
        }
    }
}

/// Discovery result for a whole file
///
/// A new generation replaces the previous one wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    pub file_uri: FileUri,
    pub methods: HashMap<CodeObjectId, MethodInfo>,
}

impl DocumentInfo {
    pub fn new(file_uri: FileUri, methods: impl IntoIterator<Item = MethodInfo>) -> Self {
        Self {
            file_uri,
            methods: methods.into_iter().map(|m| (m.id.clone(), m)).collect(),
        }
    }

    /// Every method and span id in the file, sorted for stable requests
    pub fn code_object_ids(&self) -> Vec<CodeObjectId> {
        let mut ids: Vec<CodeObjectId> = self
            .methods
            .values()
            .flat_map(MethodInfo::code_object_ids)
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn contains_code_object(&self, id: &CodeObjectId) -> bool {
        self.methods.contains_key(id)
            || self
                .methods
                .values()
                .any(|m| m.spans.iter().any(|s| &s.id == id))
    }
}

/// Backend aggregate for one code object in one environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum CodeObjectSummary {
    #[serde(rename = "MethodSummary")]
    Method {
        code_object_id: CodeObjectId,
        #[serde(default)]
        insights_count: u32,
        #[serde(default)]
        errors_count: u32,
        #[serde(default)]
        score: i32,
    },
    #[serde(rename = "SpanSummary")]
    Span {
        code_object_id: CodeObjectId,
        #[serde(default)]
        insights_count: u32,
        #[serde(default)]
        p50_ms: Option<f64>,
        #[serde(default)]
        p95_ms: Option<f64>,
    },
    #[serde(rename = "EndpointSummary")]
    Endpoint {
        code_object_id: CodeObjectId,
        route: String,
        #[serde(default)]
        insights_count: u32,
        #[serde(default)]
        high_usage: bool,
        #[serde(default)]
        max_calls_in_1_min: u32,
    },
}

impl CodeObjectSummary {
    pub fn code_object_id(&self) -> &CodeObjectId {
        match self {
            CodeObjectSummary::Method { code_object_id, .. }
            | CodeObjectSummary::Span { code_object_id, .. }
            | CodeObjectSummary::Endpoint { code_object_id, .. } => code_object_id,
        }
    }

    pub fn insights_count(&self) -> u32 {
        match self {
            CodeObjectSummary::Method { insights_count, .. }
            | CodeObjectSummary::Span { insights_count, .. }
            | CodeObjectSummary::Endpoint { insights_count, .. } => *insights_count,
        }
    }
}

/// A single backend finding about a code object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum CodeObjectInsight {
    HotSpot {
        code_object_id: CodeObjectId,
        score: i32,
    },
    Errors {
        code_object_id: CodeObjectId,
        error_count: u32,
        #[serde(default)]
        unhandled_count: u32,
    },
    SpanUsages {
        code_object_id: CodeObjectId,
        #[serde(default)]
        flows: Vec<String>,
    },
    SlowEndpoint {
        code_object_id: CodeObjectId,
        route: String,
        median_ms: f64,
    },
    /// Insight types this client does not know about yet
    #[serde(other)]
    Unknown,
}

impl CodeObjectInsight {
    pub fn code_object_id(&self) -> Option<&CodeObjectId> {
        match self {
            CodeObjectInsight::HotSpot { code_object_id, .. }
            | CodeObjectInsight::Errors { code_object_id, .. }
            | CodeObjectInsight::SpanUsages { code_object_id, .. }
            | CodeObjectInsight::SlowEndpoint { code_object_id, .. } => Some(code_object_id),
            CodeObjectInsight::Unknown => None,
        }
    }
}

/// An error the backend observed while executing a code object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeObjectError {
    pub uid: String,
    pub name: String,
    pub code_object_id: CodeObjectId,
    #[serde(default)]
    pub source_code_object_id: Option<CodeObjectId>,
    #[serde(default)]
    pub score: i32,
    #[serde(rename = "firstOccurenceTime")]
    pub first_occurrence_time: DateTime<Utc>,
    #[serde(rename = "lastOccurenceTime")]
    pub last_occurrence_time: DateTime<Utc>,
}

/// Location of a code object in the workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeLocation {
    pub file_uri: FileUri,
    pub offset: usize,
}

/// Deployment environments known to the backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Empty until the backend has reported at least one environment
    pub current: String,
    pub all: Vec<String>,
}

/// Reachability of the analytics backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Unknown,
    Connected,
    Lost,
}
