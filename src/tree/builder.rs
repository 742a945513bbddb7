//! Call tree construction
//!
//! Rebuilds the nesting hierarchy from a parsed log's event sequence with an
//! explicit stack of open nodes. Handles truncated logs by closing any node
//! still open at end of input against the last seen timestamp.

use crate::models::{
    CallTree, CallTreeNode, EventDetails, EventType, LogEvent, NodeId, ParsedLog, SlowNode,
    TreeMetadata,
};
use std::time::Instant;

/// Synthetic root node type
const ROOT_TYPE: &str = "ROOT";

/// Builder for the call tree arena
pub struct TreeBuilder;

impl TreeBuilder {
    /// Build a call tree from a parsed log. Total: any event sequence yields a
    /// tree, possibly just the synthetic root.
    pub fn build(parsed: &ParsedLog) -> CallTree {
        let started = Instant::now();

        let mut nodes: Vec<CallTreeNode> = vec![CallTreeNode {
            id: 0,
            name: "Execution".to_string(),
            node_type: ROOT_TYPE.to_string(),
            depth: 0,
            duration: 0,
            has_error: false,
            soql_count: 0,
            dml_count: 0,
            log_line_index: 0,
            children: Vec::new(),
            parent: None,
        }];
        // Entry timestamps parallel to the arena; not part of the output shape.
        let mut entry_ts: Vec<Option<u64>> = vec![None];

        let mut stack: Vec<NodeId> = vec![0];
        let mut first_ts: Option<u64> = None;
        let mut last_ts: Option<u64> = None;

        for event in &parsed.lines {
            if let Some(ts) = event.timestamp_millis {
                first_ts.get_or_insert(ts);
                last_ts = Some(ts);
            }

            if event.event_type.is_opening() {
                let parent = *stack.last().unwrap_or(&0);
                let id = nodes.len();
                nodes.push(CallTreeNode {
                    id,
                    name: Self::node_name(event),
                    node_type: event.event_type.token().to_string(),
                    depth: nodes[parent].depth + 1,
                    duration: 0,
                    has_error: false,
                    soql_count: 0,
                    dml_count: 0,
                    log_line_index: event.index,
                    children: Vec::new(),
                    parent: Some(parent),
                });
                entry_ts.push(event.timestamp_millis);
                nodes[parent].children.push(id);
                stack.push(id);

                // Database work aggregates transitively: every open node,
                // the new one included, sees this occurrence.
                match event.event_type {
                    EventType::SoqlExecuteBegin => {
                        for &open in &stack {
                            nodes[open].soql_count += 1;
                        }
                    },
                    EventType::DmlBegin => {
                        for &open in &stack {
                            nodes[open].dml_count += 1;
                        }
                    },
                    _ => {},
                }
            } else if event.event_type.is_closing() {
                // The synthetic root never pops.
                if stack.len() > 1
                    && let Some(id) = stack.pop()
                {
                    nodes[id].duration = Self::span(entry_ts[id], event.timestamp_millis);
                }
            } else if event.event_type == EventType::ExceptionThrown {
                for &open in &stack {
                    nodes[open].has_error = true;
                }
            }
        }

        // Truncated log: close anything still open at the last seen timestamp.
        while stack.len() > 1 {
            if let Some(id) = stack.pop() {
                nodes[id].duration = Self::span(entry_ts[id], last_ts);
            }
        }
        nodes[0].duration = Self::span(first_ts, last_ts);

        let metadata = Self::metadata(&nodes);
        let build_duration = started.elapsed().as_millis() as u64;

        tracing::debug!(
            nodes = metadata.total_nodes,
            deepest = metadata.deepest_depth,
            build_ms = build_duration,
            "built call tree"
        );

        CallTree { root: 0, nodes, metadata, build_duration }
    }

    fn span(entry: Option<u64>, exit: Option<u64>) -> u64 {
        match (entry, exit) {
            (Some(entry), Some(exit)) => exit.saturating_sub(entry),
            _ => 0,
        }
    }

    fn node_name(event: &LogEvent) -> String {
        match &event.details {
            EventDetails::Method { class, method, .. } if !class.is_empty() => {
                format!("{}.{}", class, method)
            },
            EventDetails::Method { method, .. } => method.clone(),
            EventDetails::Query { query, .. } => query.clone(),
            EventDetails::Dml { operation, object_type } => {
                format!("{} {}", operation, object_type)
            },
            _ if !event.content.is_empty() => event.content.clone(),
            _ => event.event_type.token().to_string(),
        }
    }

    fn metadata(nodes: &[CallTreeNode]) -> TreeMetadata {
        let deepest_depth = nodes.iter().map(|n| n.depth).max().unwrap_or(0);

        // Stable sort keeps construction order among equal durations. The
        // synthetic root spans the whole log and is left out of the ranking.
        let mut by_duration: Vec<&CallTreeNode> =
            nodes.iter().filter(|n| n.parent.is_some()).collect();
        by_duration.sort_by(|a, b| b.duration.cmp(&a.duration));
        let top_slow_nodes = by_duration
            .iter()
            .take(5)
            .map(|n| SlowNode { id: n.id, name: n.name.clone(), duration: n.duration })
            .collect();

        TreeMetadata { total_nodes: nodes.len(), deepest_depth, top_slow_nodes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogMetadata;
    use crate::parser::LogParser;

    fn build(raw: &str) -> CallTree {
        TreeBuilder::build(&LogParser::parse(raw, LogMetadata::default()))
    }

    #[test]
    fn empty_log_yields_only_the_root() {
        let tree = build("");
        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.nodes[tree.root].node_type, "ROOT");
        assert_eq!(tree.metadata.total_nodes, 1);
        assert_eq!(tree.metadata.deepest_depth, 0);
    }

    #[test]
    fn balanced_pairs_get_exact_durations() {
        let raw = "\
06:31:15.100 (1)|METHOD_ENTRY|[1]|01p|Outer.run()
06:31:15.200 (2)|METHOD_ENTRY|[2]|01p|Inner.step()
06:31:15.350 (3)|METHOD_EXIT|[2]|01p|Inner.step()
06:31:15.600 (4)|METHOD_EXIT|[1]|01p|Outer.run()";
        let tree = build(raw);

        let outer = &tree.nodes[1];
        let inner = &tree.nodes[2];
        assert_eq!(outer.name, "Outer.run()");
        assert_eq!(outer.duration, 500);
        assert_eq!(outer.depth, 1);
        assert_eq!(inner.duration, 150);
        assert_eq!(inner.parent, Some(outer.id));
        assert_eq!(outer.children, vec![inner.id]);
        assert_eq!(inner.log_line_index, 1);
    }

    #[test]
    fn truncated_log_closes_open_nodes_at_last_timestamp() {
        let raw = "\
06:31:15.100 (1)|METHOD_ENTRY|[1]|01p|Outer.run()
06:31:15.200 (2)|METHOD_ENTRY|[2]|01p|Inner.step()
06:31:15.900 (3)|USER_DEBUG|[3]|DEBUG|cut off here";
        let tree = build(raw);

        // both nodes implicitly closed at 900
        assert_eq!(tree.nodes[1].duration, 800);
        assert_eq!(tree.nodes[2].duration, 700);
    }

    #[test]
    fn soql_and_dml_counts_aggregate_up_the_stack() {
        let raw = "\
06:31:15.1 (1)|METHOD_ENTRY|[1]|01p|Outer.run()
06:31:15.2 (2)|SOQL_EXECUTE_BEGIN|[2]|Aggregations:0|SELECT Id FROM Account
06:31:15.3 (3)|SOQL_EXECUTE_END|[2]|Rows:1
06:31:15.4 (4)|DML_BEGIN|[3]|Op:Insert|Type:Account|Rows:1
06:31:15.5 (5)|DML_END|[3]
06:31:15.6 (6)|METHOD_EXIT|[1]|01p|Outer.run()";
        let tree = build(raw);

        let root = &tree.nodes[tree.root];
        let outer = &tree.nodes[1];
        assert_eq!(root.soql_count, 1);
        assert_eq!(root.dml_count, 1);
        assert_eq!(outer.soql_count, 1);
        assert_eq!(outer.dml_count, 1);
        // the SOQL node itself counts its own execution
        assert_eq!(tree.nodes[2].soql_count, 1);
    }

    #[test]
    fn exception_marks_every_open_node() {
        let raw = "\
06:31:15.1 (1)|METHOD_ENTRY|[1]|01p|Outer.run()
06:31:15.2 (2)|METHOD_ENTRY|[2]|01p|Inner.step()
06:31:15.3 (3)|EXCEPTION_THROWN|[3]|System.NullPointerException: boom
06:31:15.4 (4)|METHOD_EXIT|[2]|01p|Inner.step()
06:31:15.5 (5)|METHOD_EXIT|[1]|01p|Outer.run()
06:31:15.6 (6)|METHOD_ENTRY|[1]|01p|After.ok()
06:31:15.7 (7)|METHOD_EXIT|[1]|01p|After.ok()";
        let tree = build(raw);

        assert!(tree.nodes[tree.root].has_error);
        assert!(tree.nodes[1].has_error);
        assert!(tree.nodes[2].has_error);
        // opened after the exception: clean
        assert!(!tree.nodes[3].has_error);
    }

    #[test]
    fn top_slow_nodes_take_five_by_duration() {
        let mut raw = String::new();
        for i in 0..8u64 {
            raw.push_str(&format!(
                "06:31:{:02}.0 (1)|METHOD_ENTRY|[1]|01p|M{}.call()\n\
                 06:31:{:02}.{} (2)|METHOD_EXIT|[1]|01p|M{}.call()\n",
                i * 2,
                i,
                i * 2,
                (i + 1) * 10,
                i,
            ));
        }
        let tree = build(&raw);

        let top = &tree.metadata.top_slow_nodes;
        assert_eq!(top.len(), 5);
        for pair in top.windows(2) {
            assert!(pair[0].duration >= pair[1].duration);
        }
        // the synthetic root spans the whole log but never takes a slot
        assert!(top.iter().all(|n| n.id != tree.root));
        assert_eq!(top[0].name, "M7.call()");
        assert_eq!(top[0].duration, 80);
    }
}
