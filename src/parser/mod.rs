//! Debug log parser
//!
//! Turns raw log text plus metadata into a [`ParsedLog`]: an ordered event
//! sequence with aggregate statistics. Pure, synchronous and total over any
//! string input; malformed lines degrade to `CONTINUATION` events.

pub mod line;

use crate::models::{
    DmlRecord, ErrorRecord, EventDetails, EventType, LogEvent, LogMetadata, LogStats, MethodStat,
    ParsedLog, QueryRecord,
};
use once_cell::sync::Lazy;
use regex::Regex;

/// Marker line opening the authoritative limit usage section
const CUMULATIVE_LIMIT_MARKER: &str = "CUMULATIVE_LIMIT_USAGE";

static SOQL_LIMIT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Number of SOQL queries:\s*(\d+)\s+out of\s+(\d+)").expect("regex"));
static DML_LIMIT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Number of DML statements:\s*(\d+)\s+out of\s+(\d+)").expect("regex"));
static CPU_LIMIT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Maximum CPU time:\s*(\d+)\s+out of\s+(\d+)").expect("regex"));
static HEAP_LIMIT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Maximum heap size:\s*(\d+)\s+out of\s+(\d+)").expect("regex"));

/// Debug log parser
pub struct LogParser;

impl LogParser {
    /// Parse a raw debug log. Never fails: any line that does not match the
    /// structured grammar becomes a `CONTINUATION` event carrying the raw text.
    pub fn parse(raw_log: &str, metadata: LogMetadata) -> ParsedLog {
        let mut events: Vec<LogEvent> = Vec::new();
        let mut stats = LogStats::default();

        // Transient call stack; its content is not part of the returned snapshot.
        let mut method_stack: Vec<String> = Vec::new();
        // FIFO cursor pairing SOQL_EXECUTE_END rows with begin-order records.
        let mut next_open_query: usize = 0;
        // Running nesting counter; updated before each line's depth is assigned.
        let mut depth: u32 = 0;

        for raw_line in raw_log.lines() {
            if raw_line.trim().is_empty() {
                continue;
            }
            let index = events.len();

            let event = match line::match_line(raw_line) {
                Some(structured) => {
                    if structured.event_type.is_opening() {
                        depth += 1;
                    } else if structured.event_type.is_closing() {
                        depth = depth.saturating_sub(1);
                    }

                    let details = line::extract_details(&structured.event_type, &structured.content);

                    LogEvent {
                        index,
                        timestamp_millis: Some(structured.timestamp_millis),
                        duration_field: Some(structured.duration_field),
                        event_type: structured.event_type,
                        content: structured.content,
                        details,
                        depth,
                        raw: raw_line.to_string(),
                    }
                },
                None => LogEvent {
                    index,
                    timestamp_millis: None,
                    duration_field: None,
                    event_type: EventType::Continuation,
                    content: raw_line.to_string(),
                    details: EventDetails::Empty,
                    depth,
                    raw: raw_line.to_string(),
                },
            };

            Self::collect_stats(&event, &mut stats, &mut method_stack, &mut next_open_query);
            events.push(event);
        }

        Self::apply_cumulative_limits(&events, &mut stats);

        tracing::debug!(
            lines = events.len(),
            methods = stats.methods.len(),
            queries = stats.queries.len(),
            errors = stats.errors.len(),
            "parsed debug log"
        );

        ParsedLog { raw_content: raw_log.to_string(), metadata, lines: events, stats, parsed: true }
    }

    /// Per-event statistics collection, executed once per event in line order
    fn collect_stats(
        event: &LogEvent,
        stats: &mut LogStats,
        method_stack: &mut Vec<String>,
        next_open_query: &mut usize,
    ) {
        match &event.event_type {
            EventType::SoqlExecuteBegin => {
                stats.limits.soql_queries += 1;
                let query = match &event.details {
                    EventDetails::Query { query, .. } => query.clone(),
                    _ => event.content.clone(),
                };
                stats.queries.push(QueryRecord {
                    query,
                    timestamp: event.timestamp_millis,
                    index: event.index,
                    rows: None,
                });
            },
            EventType::SoqlExecuteEnd => {
                // FIFO pairing; assumes queries end in the order they began.
                // Not validated against nesting.
                if let EventDetails::QueryResult { rows } = &event.details
                    && let Some(record) = stats.queries.get_mut(*next_open_query)
                {
                    record.rows = Some(*rows);
                    *next_open_query += 1;
                }
            },
            EventType::DmlBegin => {
                stats.limits.dml_statements += 1;
                if let EventDetails::Dml { operation, object_type } = &event.details {
                    stats.dml_operations.push(DmlRecord {
                        operation: operation.clone(),
                        object_type: object_type.clone(),
                        timestamp: event.timestamp_millis,
                    });
                }
            },
            EventType::MethodEntry => {
                if let EventDetails::Method { class, method, .. } = &event.details {
                    match stats
                        .methods
                        .iter_mut()
                        .find(|m| m.class == *class && m.method == *method)
                    {
                        Some(stat) => stat.calls += 1,
                        None => stats.methods.push(MethodStat {
                            class: class.clone(),
                            method: method.clone(),
                            calls: 1,
                            first_call: event.index,
                        }),
                    }
                    method_stack.push(format!("{}.{}", class, method));
                }
            },
            EventType::MethodExit => {
                method_stack.pop();
            },
            EventType::ExceptionThrown => {
                let (error_type, message) = match &event.details {
                    EventDetails::Exception { exception_type, message } => {
                        (exception_type.clone(), message.clone())
                    },
                    _ => ("Exception".to_string(), event.content.clone()),
                };
                stats.errors.push(ErrorRecord {
                    error_type,
                    message,
                    timestamp: event.timestamp_millis,
                    method: method_stack.last().cloned(),
                    depth: event.depth,
                });
            },
            _ => {},
        }
    }

    /// Overwrite running limit counters with the authoritative used/max pairs
    /// from the `CUMULATIVE_LIMIT_USAGE` section, when one exists
    fn apply_cumulative_limits(events: &[LogEvent], stats: &mut LogStats) {
        let Some(start) = events
            .iter()
            .position(|e| e.raw.contains(CUMULATIVE_LIMIT_MARKER))
        else {
            return;
        };

        for event in &events[start..] {
            if let Some(caps) = SOQL_LIMIT_REGEX.captures(&event.raw) {
                stats.limits.soql_queries = caps[1].parse().unwrap_or(stats.limits.soql_queries);
                stats.limits.max_soql_queries = caps[2].parse().unwrap_or(0);
            }
            if let Some(caps) = DML_LIMIT_REGEX.captures(&event.raw) {
                stats.limits.dml_statements = caps[1].parse().unwrap_or(stats.limits.dml_statements);
                stats.limits.max_dml_statements = caps[2].parse().unwrap_or(0);
            }
            if let Some(caps) = CPU_LIMIT_REGEX.captures(&event.raw) {
                stats.limits.cpu_time_ms = caps[1].parse().unwrap_or(0);
                stats.limits.max_cpu_time_ms = caps[2].parse().unwrap_or(0);
            }
            if let Some(caps) = HEAP_LIMIT_REGEX.captures(&event.raw) {
                stats.limits.heap_size_bytes = caps[1].parse().unwrap_or(0);
                stats.limits.max_heap_size_bytes = caps[2].parse().unwrap_or(0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn soql(ts: &str, query: &str) -> String {
        format!("{} (1)|SOQL_EXECUTE_BEGIN|[1]|Aggregations:0|{}", ts, query)
    }

    #[test]
    fn parse_is_total_over_arbitrary_input() {
        for garbage in ["", "\n\n\n", "not a log", "\u{0}\u{1}\u{2}|||", "06:31:15"] {
            let parsed = LogParser::parse(garbage, LogMetadata::default());
            assert!(parsed.parsed);
            let non_blank = garbage.lines().filter(|l| !l.trim().is_empty()).count();
            assert_eq!(parsed.lines.len(), non_blank);
        }
    }

    #[test]
    fn malformed_lines_become_continuations() {
        let raw = "06:31:15.1 (1)|USER_DEBUG|[5]|DEBUG|hello\n  continuation text here\n";
        let parsed = LogParser::parse(raw, LogMetadata::default());
        assert_eq!(parsed.lines.len(), 2);
        assert_eq!(parsed.lines[1].event_type, EventType::Continuation);
        assert_eq!(parsed.lines[1].content, "  continuation text here");
        assert!(parsed.lines[1].timestamp_millis.is_none());
        assert!(parsed.lines[1].details.is_empty());
    }

    #[test]
    fn entry_depth_equals_child_depth() {
        let raw = "\
06:31:15.1 (1)|METHOD_ENTRY|[1]|01p|Outer.run()
06:31:15.2 (2)|USER_DEBUG|[2]|DEBUG|inside
06:31:15.3 (3)|METHOD_EXIT|[1]|01p|Outer.run()";
        let parsed = LogParser::parse(raw, LogMetadata::default());
        // post-update counter: an ENTRY line's own depth equals its children's
        assert_eq!(parsed.lines[0].depth, 1);
        assert_eq!(parsed.lines[1].depth, 1);
        assert_eq!(parsed.lines[2].depth, 0);
    }

    #[test]
    fn depth_never_goes_negative() {
        let raw = "\
06:31:15.1 (1)|METHOD_EXIT|[1]|01p|A.b()
06:31:15.2 (2)|METHOD_EXIT|[1]|01p|A.b()
06:31:15.3 (3)|USER_DEBUG|[1]|DEBUG|x";
        let parsed = LogParser::parse(raw, LogMetadata::default());
        for event in &parsed.lines {
            assert_eq!(event.depth, 0);
        }
    }

    #[test]
    fn indices_are_dense_and_increasing() {
        let raw = "a\n\nb\n06:31:15.1 (1)|USER_DEBUG|[1]|DEBUG|x\n\nc";
        let parsed = LogParser::parse(raw, LogMetadata::default());
        let indices: Vec<usize> = parsed.lines.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn soql_rows_pair_in_begin_order() {
        let raw = format!(
            "{}\n{}\n06:31:15.3 (3)|SOQL_EXECUTE_END|[1]|Rows:7\n06:31:15.4 (4)|SOQL_EXECUTE_END|[1]|Rows:9",
            soql("06:31:15.1", "SELECT Id FROM Account"),
            soql("06:31:15.2", "SELECT Id FROM Contact"),
        );
        let parsed = LogParser::parse(&raw, LogMetadata::default());
        assert_eq!(parsed.stats.queries.len(), 2);
        assert_eq!(parsed.stats.queries[0].rows, Some(7));
        assert_eq!(parsed.stats.queries[1].rows, Some(9));
    }

    #[test]
    fn methods_deduplicate_by_class_and_method() {
        let raw = "\
06:31:15.1 (1)|METHOD_ENTRY|[1]|01p|OrderService.submit()
06:31:15.2 (2)|METHOD_EXIT|[1]|01p|OrderService.submit()
06:31:15.3 (3)|METHOD_ENTRY|[1]|01p|OrderService.submit()
06:31:15.4 (4)|METHOD_EXIT|[1]|01p|OrderService.submit()";
        let parsed = LogParser::parse(raw, LogMetadata::default());
        assert_eq!(parsed.stats.methods.len(), 1);
        assert_eq!(parsed.stats.methods[0].calls, 2);
        assert_eq!(parsed.stats.methods[0].first_call, 0);
    }

    #[test]
    fn exception_records_enclosing_method() {
        let raw = "\
06:31:15.1 (1)|METHOD_ENTRY|[1]|01p|OrderService.submit()
06:31:15.2 (2)|EXCEPTION_THROWN|[3]|System.DmlException: bad insert
06:31:15.3 (3)|METHOD_EXIT|[1]|01p|OrderService.submit()
06:31:15.4 (4)|EXCEPTION_THROWN|[9]|System.LimitException: too many";
        let parsed = LogParser::parse(raw, LogMetadata::default());
        assert_eq!(parsed.stats.errors.len(), 2);
        assert_eq!(parsed.stats.errors[0].method.as_deref(), Some("OrderService.submit()"));
        assert_eq!(parsed.stats.errors[0].error_type, "System.DmlException");
        // stack already empty by the second throw
        assert!(parsed.stats.errors[1].method.is_none());
    }

    #[test]
    fn cumulative_section_overrides_running_counters() {
        let raw = format!(
            "{}\n\
06:31:16.1 (1)|CUMULATIVE_LIMIT_USAGE\n\
  Number of SOQL queries: 95 out of 100\n\
  Number of DML statements: 12 out of 150\n\
  Maximum CPU time: 8000 out of 10000\n\
  Maximum heap size: 4000000 out of 6000000\n\
06:31:16.2 (2)|CUMULATIVE_LIMIT_USAGE_END",
            soql("06:31:15.1", "SELECT Id FROM Account"),
        );
        let parsed = LogParser::parse(&raw, LogMetadata::default());
        let limits = &parsed.stats.limits;
        assert_eq!(limits.soql_queries, 95);
        assert_eq!(limits.max_soql_queries, 100);
        assert_eq!(limits.dml_statements, 12);
        assert_eq!(limits.max_dml_statements, 150);
        assert_eq!(limits.cpu_time_ms, 8000);
        assert_eq!(limits.heap_size_bytes, 4_000_000);
    }

    #[test]
    fn running_counters_stand_without_marker() {
        let raw = format!(
            "{}\n{}\n06:31:15.3 (1)|DML_BEGIN|[1]|Op:Insert|Type:Account|Rows:1",
            soql("06:31:15.1", "SELECT Id FROM Account"),
            soql("06:31:15.2", "SELECT Id FROM Contact"),
        );
        let parsed = LogParser::parse(&raw, LogMetadata::default());
        assert_eq!(parsed.stats.limits.soql_queries, 2);
        assert_eq!(parsed.stats.limits.dml_statements, 1);
        assert_eq!(parsed.stats.dml_operations.len(), 1);
        assert_eq!(parsed.stats.dml_operations[0].object_type, "Account");
    }

    #[test]
    fn summary_projects_display_fields() {
        let raw = format!(
            "{}\n06:31:15.2 (2)|EXCEPTION_THROWN|[3]|System.DmlException: x",
            soql("06:31:15.1", "SELECT Id FROM Account"),
        );
        let parsed = LogParser::parse(&raw, LogMetadata::default());
        let summary = parsed.summary();
        assert_eq!(summary.soql_queries, "1/0");
        assert_eq!(summary.total_lines, 2);
        assert_eq!(summary.error_count, 1);
        assert!(summary.has_errors);
        assert_eq!(parsed.operation_display(), "Unknown");
    }
}
