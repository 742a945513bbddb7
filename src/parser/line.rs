//! Debug log line grammar
//!
//! A structured line is `HH:MM:SS.FRACTION (UNIT)|TYPE|REST`. Anything else is
//! a continuation of the previous structured line.

use crate::models::{EventDetails, EventType};
use once_cell::sync::Lazy;
use regex::Regex;

static LINE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{2}):(\d{2}):(\d{2})\.(\d+)\s+\((\d+)\)\|([A-Z0-9_]+)\|?(.*)$")
        .expect("line regex")
});

static DEPTH_HINT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[(\d+)\]").expect("hint regex"));

static AGGREGATIONS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Aggregations:\s*(\d+)").expect("aggregations regex"));

static ROWS_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"Rows:\s*(\d+)").expect("rows regex"));

/// A structured line split into its grammar parts, content left raw
#[derive(Debug, Clone)]
pub struct StructuredLine {
    pub timestamp_millis: u64,
    pub duration_field: u64,
    pub event_type: EventType,
    pub content: String,
}

/// Try to match a line against the structured grammar.
///
/// The fractional digit string is added as its literal decimal value, not
/// scaled by its digit count. Observed behavior of the original parser; only
/// relative ordering within one log is exercised downstream, so it is kept
/// verbatim rather than "fixed".
pub fn match_line(line: &str) -> Option<StructuredLine> {
    let caps = LINE_REGEX.captures(line)?;

    let hours: u64 = caps[1].parse().ok()?;
    let minutes: u64 = caps[2].parse().ok()?;
    let seconds: u64 = caps[3].parse().ok()?;
    let fraction: u64 = caps[4].parse().unwrap_or(0);
    let timestamp_millis = hours * 3_600_000 + minutes * 60_000 + seconds * 1000 + fraction;

    let duration_field: u64 = caps[5].parse().unwrap_or(0);
    let event_type = EventType::from_token(&caps[6]);
    let content = caps.get(7).map(|m| m.as_str()).unwrap_or("").to_string();

    Some(StructuredLine { timestamp_millis, duration_field, event_type, content })
}

/// Extract type-specific details from a structured line's content.
///
/// The dispatch is a `match` over the known event kinds with an explicit
/// fallback arm; unknown types carry no structured details.
pub fn extract_details(event_type: &EventType, content: &str) -> EventDetails {
    match event_type {
        EventType::MethodEntry | EventType::MethodExit => extract_method(content),
        EventType::SoqlExecuteBegin => extract_query(content),
        EventType::SoqlExecuteEnd => match ROWS_REGEX.captures(content) {
            Some(caps) => EventDetails::QueryResult { rows: caps[1].parse().unwrap_or(0) },
            None => EventDetails::Empty,
        },
        EventType::DmlBegin => extract_dml(content),
        EventType::UserDebug => extract_debug(content),
        EventType::ExceptionThrown => extract_exception(content),
        _ => EventDetails::Empty,
    }
}

/// METHOD_ENTRY / METHOD_EXIT: the final pipe field names the method; its last
/// `.`-delimited segment is the method, everything before it the class.
fn extract_method(content: &str) -> EventDetails {
    let depth_hint = DEPTH_HINT_REGEX
        .captures(content)
        .and_then(|caps| caps[1].parse().ok());

    let field = content.rsplit('|').next().unwrap_or("").trim();
    let (class, method) = match field.rfind('.') {
        Some(pos) => (field[..pos].to_string(), field[pos + 1..].to_string()),
        None => (String::new(), field.to_string()),
    };

    EventDetails::Method { class, method, depth_hint }
}

/// SOQL_EXECUTE_BEGIN: bracketed aggregation count plus the trailing query text
fn extract_query(content: &str) -> EventDetails {
    let aggregations = AGGREGATIONS_REGEX
        .captures(content)
        .and_then(|caps| caps[1].parse().ok());
    let query = content.rsplit('|').next().unwrap_or("").trim().to_string();

    EventDetails::Query { aggregations, query }
}

/// DML_BEGIN: `operation` and `objectType` from the first two pipe-delimited
/// fields (the `Op:` / `Type:` prefixes are stripped when present)
fn extract_dml(content: &str) -> EventDetails {
    let mut operation = String::new();
    let mut object_type = String::new();

    for field in content.split('|') {
        let field = field.trim();
        if let Some(op) = field.strip_prefix("Op:") {
            if operation.is_empty() {
                operation = op.trim().to_string();
            }
        } else if let Some(ty) = field.strip_prefix("Type:")
            && object_type.is_empty()
        {
            object_type = ty.trim().to_string();
        }
    }

    // No prefixed fields: fall back to positional extraction past the [n] hint
    if operation.is_empty() || object_type.is_empty() {
        let mut fields = content
            .split('|')
            .map(str::trim)
            .filter(|f| !f.is_empty() && !f.starts_with('['));
        if operation.is_empty() {
            operation = fields.next().unwrap_or("").to_string();
        }
        if object_type.is_empty() {
            object_type = fields.next().unwrap_or("").to_string();
        }
    }

    EventDetails::Dml { operation, object_type }
}

/// USER_DEBUG: `[line]|LEVEL|message`
fn extract_debug(content: &str) -> EventDetails {
    let mut fields = content.splitn(3, '|');
    let line = fields
        .next()
        .and_then(|f| DEPTH_HINT_REGEX.captures(f))
        .and_then(|caps| caps[1].parse().ok());
    let level = fields.next().unwrap_or("").trim().to_string();
    let message = fields.next().unwrap_or("").trim().to_string();

    EventDetails::Debug { line, level, message }
}

/// EXCEPTION_THROWN: the final pipe field is `ExceptionType: message`
fn extract_exception(content: &str) -> EventDetails {
    let field = content.rsplit('|').next().unwrap_or("").trim();
    let (exception_type, message) = match field.split_once(':') {
        Some((ty, msg)) => (ty.trim().to_string(), msg.trim().to_string()),
        None => (field.to_string(), String::new()),
    };

    EventDetails::Exception { exception_type, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_structured_line() {
        let line = "06:31:15.123 (45678901)|METHOD_ENTRY|[12]|01p000000000001|OrderService.submit(Id)";
        let parsed = match_line(line).unwrap();
        assert_eq!(parsed.event_type, EventType::MethodEntry);
        assert_eq!(parsed.duration_field, 45_678_901);
        assert_eq!(parsed.content, "[12]|01p000000000001|OrderService.submit(Id)");
    }

    #[test]
    fn timestamp_adds_literal_fraction() {
        // 06:31:15.123 -> 6h + 31m + 15s + literal 123
        let parsed = match_line("06:31:15.123 (1)|USER_DEBUG|[1]|DEBUG|x").unwrap();
        assert_eq!(parsed.timestamp_millis, 6 * 3_600_000 + 31 * 60_000 + 15_000 + 123);

        // A 6-digit fraction is added as-is, not scaled. Preserved quirk.
        let parsed = match_line("00:00:00.123456 (1)|USER_DEBUG|[1]|DEBUG|x").unwrap();
        assert_eq!(parsed.timestamp_millis, 123_456);
    }

    #[test]
    fn rejects_unstructured_lines() {
        assert!(match_line("").is_none());
        assert!(match_line("Execute Anonymous: System.debug('x');").is_none());
        assert!(match_line("31:15.123 (1)|USER_DEBUG|x").is_none());
    }

    #[test]
    fn method_details_split_class_and_method() {
        let details = extract_details(
            &EventType::MethodEntry,
            "[4]|01p000000000001|OrderService.submit(Id)",
        );
        match details {
            EventDetails::Method { class, method, depth_hint } => {
                assert_eq!(class, "OrderService");
                assert_eq!(method, "submit(Id)");
                assert_eq!(depth_hint, Some(4));
            },
            other => panic!("unexpected details: {:?}", other),
        }
    }

    #[test]
    fn query_details_capture_aggregations_and_text() {
        let details = extract_details(
            &EventType::SoqlExecuteBegin,
            "[7]|Aggregations:0|SELECT Id FROM Account WHERE Name = 'Acme'",
        );
        match details {
            EventDetails::Query { aggregations, query } => {
                assert_eq!(aggregations, Some(0));
                assert_eq!(query, "SELECT Id FROM Account WHERE Name = 'Acme'");
            },
            other => panic!("unexpected details: {:?}", other),
        }
    }

    #[test]
    fn dml_details_strip_prefixes() {
        let details = extract_details(&EventType::DmlBegin, "[2]|Op:Insert|Type:Account|Rows:1");
        assert_eq!(
            details,
            EventDetails::Dml { operation: "Insert".into(), object_type: "Account".into() }
        );
    }

    #[test]
    fn exception_details_split_type_and_message() {
        let details = extract_details(
            &EventType::ExceptionThrown,
            "[31]|System.NullPointerException: Attempt to de-reference a null object",
        );
        assert_eq!(
            details,
            EventDetails::Exception {
                exception_type: "System.NullPointerException".into(),
                message: "Attempt to de-reference a null object".into(),
            }
        );
    }
}
