//! Log analysis data models
//!
//! These models represent the structured data extracted from Apex debug logs.
//! They are designed to be serializable for API responses; wire field names are
//! camelCase and must stay stable for existing consumers.

use serde::{Deserialize, Serialize};
use serde::de::Deserializer;
use serde::ser::Serializer;
use std::fmt;

// ============================================================================
// Event Types
// ============================================================================

/// Event type of a single debug log line.
///
/// Known kinds get a dedicated variant; anything else keeps its raw type token
/// in `Other`. Lines that do not match the structured grammar at all become
/// `Continuation` events.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    MethodEntry,
    MethodExit,
    SoqlExecuteBegin,
    SoqlExecuteEnd,
    DmlBegin,
    DmlEnd,
    UserDebug,
    ExceptionThrown,
    CodeUnitStarted,
    CodeUnitFinished,
    Continuation,
    Other(String),
}

impl EventType {
    /// Map a raw type token to an event type
    pub fn from_token(token: &str) -> Self {
        match token {
            "METHOD_ENTRY" => EventType::MethodEntry,
            "METHOD_EXIT" => EventType::MethodExit,
            "SOQL_EXECUTE_BEGIN" => EventType::SoqlExecuteBegin,
            "SOQL_EXECUTE_END" => EventType::SoqlExecuteEnd,
            "DML_BEGIN" => EventType::DmlBegin,
            "DML_END" => EventType::DmlEnd,
            "USER_DEBUG" => EventType::UserDebug,
            "EXCEPTION_THROWN" => EventType::ExceptionThrown,
            "CODE_UNIT_STARTED" => EventType::CodeUnitStarted,
            "CODE_UNIT_FINISHED" => EventType::CodeUnitFinished,
            "CONTINUATION" => EventType::Continuation,
            other => EventType::Other(other.to_string()),
        }
    }

    /// Raw type token as it appeared in the log
    pub fn token(&self) -> &str {
        match self {
            EventType::MethodEntry => "METHOD_ENTRY",
            EventType::MethodExit => "METHOD_EXIT",
            EventType::SoqlExecuteBegin => "SOQL_EXECUTE_BEGIN",
            EventType::SoqlExecuteEnd => "SOQL_EXECUTE_END",
            EventType::DmlBegin => "DML_BEGIN",
            EventType::DmlEnd => "DML_END",
            EventType::UserDebug => "USER_DEBUG",
            EventType::ExceptionThrown => "EXCEPTION_THROWN",
            EventType::CodeUnitStarted => "CODE_UNIT_STARTED",
            EventType::CodeUnitFinished => "CODE_UNIT_FINISHED",
            EventType::Continuation => "CONTINUATION",
            EventType::Other(token) => token,
        }
    }

    /// Whether this type opens a nesting level (the depth counter rule:
    /// the type token contains `ENTRY` or `BEGIN`)
    pub fn is_opening(&self) -> bool {
        let t = self.token();
        t.contains("ENTRY") || t.contains("BEGIN")
    }

    /// Whether this type closes a nesting level (token contains `EXIT` or `END`)
    pub fn is_closing(&self) -> bool {
        let t = self.token();
        t.contains("EXIT") || t.contains("END")
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.token())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        Ok(EventType::from_token(&token))
    }
}

// ============================================================================
// Event Details
// ============================================================================

/// Type-specific key/value extraction from a log line.
///
/// Serialized untagged so the wire shape is the plain detail object the
/// frontend already consumes (e.g. `{"class": "...", "method": "..."}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum EventDetails {
    Method {
        class: String,
        method: String,
        #[serde(rename = "depthHint", skip_serializing_if = "Option::is_none")]
        depth_hint: Option<u32>,
    },
    Query {
        #[serde(skip_serializing_if = "Option::is_none")]
        aggregations: Option<u32>,
        query: String,
    },
    QueryResult {
        rows: u64,
    },
    Dml {
        operation: String,
        #[serde(rename = "objectType")]
        object_type: String,
    },
    Debug {
        line: Option<u32>,
        level: String,
        message: String,
    },
    Exception {
        #[serde(rename = "exceptionType")]
        exception_type: String,
        message: String,
    },
    #[default]
    Empty,
}

impl EventDetails {
    pub fn is_empty(&self) -> bool {
        matches!(self, EventDetails::Empty)
    }
}

// ============================================================================
// Log Events
// ============================================================================

/// One parsed log line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    /// 0-based position, dense, matches input order
    pub index: usize,
    #[serde(rename = "timestampMillis")]
    pub timestamp_millis: Option<u64>,
    /// The bracketed `(n)` token following the timestamp
    #[serde(rename = "durationField")]
    pub duration_field: Option<u64>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Trailing text after the type token
    pub content: String,
    #[serde(skip_serializing_if = "EventDetails::is_empty", default)]
    pub details: EventDetails,
    /// Nesting depth, never negative (post-update counter value)
    pub depth: u32,
    /// Original line text
    pub raw: String,
}

// ============================================================================
// Log Metadata
// ============================================================================

/// Metadata accompanying a raw log, as returned by the log retrieval API.
///
/// Every field is optional; absent fields resolve to `null` on the wire and
/// to `"Unknown"` in display projections.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LogMetadata {
    #[serde(alias = "Id")]
    pub id: Option<String>,
    #[serde(rename = "userId", alias = "LogUserId")]
    pub user_id: Option<String>,
    #[serde(rename = "startTime", alias = "StartTime")]
    pub start_time: Option<String>,
    #[serde(rename = "durationMillis", alias = "DurationMilliseconds")]
    pub duration_millis: Option<u64>,
    #[serde(alias = "Operation")]
    pub operation: Option<String>,
    #[serde(alias = "Status")]
    pub status: Option<String>,
    #[serde(alias = "Application")]
    pub application: Option<String>,
    #[serde(rename = "logLength", alias = "LogLength")]
    pub log_length: Option<u64>,
}

// ============================================================================
// Statistics
// ============================================================================

/// Governor limit usage counters, paired with their maxima.
///
/// Populated incrementally during the line pass, then overwritten by the
/// authoritative `CUMULATIVE_LIMIT_USAGE` section when present.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LimitUsage {
    #[serde(rename = "soqlQueries")]
    pub soql_queries: u64,
    #[serde(rename = "maxSoqlQueries")]
    pub max_soql_queries: u64,
    #[serde(rename = "dmlStatements")]
    pub dml_statements: u64,
    #[serde(rename = "maxDmlStatements")]
    pub max_dml_statements: u64,
    #[serde(rename = "cpuTimeMs")]
    pub cpu_time_ms: u64,
    #[serde(rename = "maxCpuTimeMs")]
    pub max_cpu_time_ms: u64,
    #[serde(rename = "heapSizeBytes")]
    pub heap_size_bytes: u64,
    #[serde(rename = "maxHeapSizeBytes")]
    pub max_heap_size_bytes: u64,
}

/// Per-method call statistics, deduplicated by (class, method)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodStat {
    pub class: String,
    pub method: String,
    pub calls: u32,
    /// Line index of the first METHOD_ENTRY for this method
    #[serde(rename = "firstCall")]
    pub first_call: usize,
}

/// One EXCEPTION_THROWN occurrence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    pub timestamp: Option<u64>,
    /// Innermost open method at the moment the exception was thrown
    pub method: Option<String>,
    pub depth: u32,
}

/// One SOQL_EXECUTE_BEGIN occurrence; `rows` attached by the matching END
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    pub query: String,
    pub timestamp: Option<u64>,
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
}

/// One DML_BEGIN occurrence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DmlRecord {
    pub operation: String,
    #[serde(rename = "objectType")]
    pub object_type: String,
    pub timestamp: Option<u64>,
}

/// Aggregate statistics collected in a single pass over the event sequence
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LogStats {
    pub limits: LimitUsage,
    pub methods: Vec<MethodStat>,
    pub errors: Vec<ErrorRecord>,
    pub queries: Vec<QueryRecord>,
    #[serde(rename = "dmlOperations")]
    pub dml_operations: Vec<DmlRecord>,
}

// ============================================================================
// Parsed Log
// ============================================================================

/// A fully parsed debug log: ordered event sequence plus aggregate statistics.
///
/// Owned exclusively by the caller that requested the parse; immutable once
/// returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedLog {
    #[serde(rename = "rawContent")]
    pub raw_content: String,
    pub metadata: LogMetadata,
    pub lines: Vec<LogEvent>,
    pub stats: LogStats,
    pub parsed: bool,
}

/// Display-ready projection of a parsed log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSummary {
    #[serde(rename = "soqlQueries")]
    pub soql_queries: String,
    #[serde(rename = "dmlStatements")]
    pub dml_statements: String,
    #[serde(rename = "cpuTime")]
    pub cpu_time: String,
    #[serde(rename = "heapSize")]
    pub heap_size: String,
    #[serde(rename = "totalLines")]
    pub total_lines: usize,
    #[serde(rename = "methodCount")]
    pub method_count: usize,
    #[serde(rename = "errorCount")]
    pub error_count: usize,
    #[serde(rename = "hasErrors")]
    pub has_errors: bool,
}

impl ParsedLog {
    /// Derive the display-ready summary projection
    pub fn summary(&self) -> LogSummary {
        let limits = &self.stats.limits;
        LogSummary {
            soql_queries: format!("{}/{}", limits.soql_queries, limits.max_soql_queries),
            dml_statements: format!("{}/{}", limits.dml_statements, limits.max_dml_statements),
            cpu_time: format!("{}/{}", limits.cpu_time_ms, limits.max_cpu_time_ms),
            heap_size: format!("{}/{}", limits.heap_size_bytes, limits.max_heap_size_bytes),
            total_lines: self.lines.len(),
            method_count: self.stats.methods.len(),
            error_count: self.stats.errors.len(),
            has_errors: !self.stats.errors.is_empty(),
        }
    }

    /// Operation for display, `"Unknown"` when metadata omitted it
    pub fn operation_display(&self) -> &str {
        self.metadata.operation.as_deref().unwrap_or("Unknown")
    }

    /// Status for display, `"Unknown"` when metadata omitted it
    pub fn status_display(&self) -> &str {
        self.metadata.status.as_deref().unwrap_or("Unknown")
    }
}

// ============================================================================
// Call Tree (flat arena, children referenced by index)
// ============================================================================

/// Node id within a call tree arena
pub type NodeId = usize;

/// A node in the reconstructed call tree.
///
/// The tree is stored as a flat arena: `children` and `parent` are indices
/// into `CallTree::nodes`, never owning edges, so traversal needs no native
/// recursion even for pathologically deep logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallTreeNode {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub depth: u32,
    /// Duration in ms; 0 when no timestamps were available
    pub duration: u64,
    /// True if any EXCEPTION_THROWN fell within this node's span
    #[serde(rename = "hasError")]
    pub has_error: bool,
    /// SOQL count aggregated over the subtree
    #[serde(rename = "soqlCount")]
    pub soql_count: u32,
    /// DML count aggregated over the subtree
    #[serde(rename = "dmlCount")]
    pub dml_count: u32,
    /// Entry line index, for reverse navigation into the log
    #[serde(rename = "logLineIndex")]
    pub log_line_index: usize,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
}

/// One of the slowest nodes in a tree, for quick performance overview
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlowNode {
    pub id: NodeId,
    pub name: String,
    pub duration: u64,
}

/// Aggregate tree metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeMetadata {
    #[serde(rename = "totalNodes")]
    pub total_nodes: usize,
    #[serde(rename = "deepestDepth")]
    pub deepest_depth: u32,
    /// At most 5 non-root nodes, sorted by duration descending; ties keep
    /// construction order
    #[serde(rename = "topSlowNodes")]
    pub top_slow_nodes: Vec<SlowNode>,
}

/// The reconstructed hierarchy of nested begin/end events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallTree {
    /// Index of the synthetic ROOT node (always 0)
    pub root: NodeId,
    pub nodes: Vec<CallTreeNode>,
    pub metadata: TreeMetadata,
    /// Build wall time in ms
    #[serde(rename = "buildDuration")]
    pub build_duration: u64,
}

// ============================================================================
// Analysis Results
// ============================================================================

/// Severity of a detected anti-pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    /// Sort rank: critical first
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::Warning => 1,
            Severity::Info => 2,
        }
    }
}

/// Anti-pattern kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    SoqlInLoop,
    DmlInLoop,
    NPlusOne,
    Recursion,
    TriggerRecursion,
    SoqlWithoutLimit,
    TooManyFields,
    SoqlWithoutWhere,
    NonSelectiveQuery,
    ExcessiveSoql,
    ExcessiveDml,
    ExcessiveCpu,
    ExcessiveHeap,
    DeepCallStack,
    MultipleCallouts,
    ExcessiveAsync,
    MixedDml,
    HardcodedIds,
    ValidationFailures,
    ExcessiveDebug,
    CalloutAfterDml,
    LargeQueryResults,
}

/// A single detected anti-pattern with its supporting evidence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub pattern_type: PatternType,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    /// Affected line indices
    pub lines: Vec<usize>,
    pub occurrences: u32,
    /// Example query/operation text, when one exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
    pub suggestion: String,
    pub impact: String,
}

/// Counts and health score over a finding set
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalysisSummary {
    pub critical: usize,
    pub warnings: usize,
    pub info: usize,
    pub total: usize,
    /// 0-100 composite health score
    pub score: u32,
}

/// Sorted, explainable findings report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Findings sorted by severity rank, ties in detection order
    pub patterns: Vec<Finding>,
    pub summary: AnalysisSummary,
    #[serde(rename = "hasCritical")]
    pub has_critical: bool,
    #[serde(rename = "hasWarning")]
    pub has_warning: bool,
    #[serde(rename = "totalCount")]
    pub total_count: usize,
    /// Deduplicated suggestions across all findings, in finding order
    pub suggestions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_round_trips_raw_tokens() {
        let t = EventType::from_token("SOQL_EXECUTE_BEGIN");
        assert_eq!(t, EventType::SoqlExecuteBegin);
        assert_eq!(t.token(), "SOQL_EXECUTE_BEGIN");

        let other = EventType::from_token("LIMIT_USAGE_FOR_NS");
        assert_eq!(other.token(), "LIMIT_USAGE_FOR_NS");
    }

    #[test]
    fn opening_and_closing_follow_token_names() {
        assert!(EventType::MethodEntry.is_opening());
        assert!(EventType::SoqlExecuteBegin.is_opening());
        assert!(EventType::MethodExit.is_closing());
        assert!(EventType::DmlEnd.is_closing());
        // CODE_UNIT tokens carry neither marker word
        assert!(!EventType::CodeUnitStarted.is_opening());
        assert!(!EventType::CodeUnitFinished.is_closing());
        // unknown tokens follow the same substring rule
        assert!(EventType::from_token("SYSTEM_METHOD_ENTRY").is_opening());
        assert!(EventType::from_token("CUMULATIVE_LIMIT_USAGE_END").is_closing());
    }

    #[test]
    fn severity_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"critical\"");
    }

    #[test]
    fn pattern_type_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&PatternType::ExcessiveSoql).unwrap(),
            "\"excessive_soql\""
        );
        assert_eq!(serde_json::to_string(&PatternType::MixedDml).unwrap(), "\"mixed_dml\"");
    }

    #[test]
    fn metadata_accepts_api_field_names() {
        let meta: LogMetadata = serde_json::from_str(
            r#"{"Id":"07L000","LogUserId":"005000","DurationMilliseconds":1234,"Operation":"Api"}"#,
        )
        .unwrap();
        assert_eq!(meta.id.as_deref(), Some("07L000"));
        assert_eq!(meta.user_id.as_deref(), Some("005000"));
        assert_eq!(meta.duration_millis, Some(1234));
    }
}
