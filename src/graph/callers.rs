//! Caller fallback scanner.
//!
//! When no CALLS edges exist for a symbol (partial graphs, unresolved
//! dynamic dispatch), call sites are located by scanning stored file text
//! for `name(` and mapping hit lines back to the containing function via
//! ordered line ranges. The whole scan runs inside the store, so file
//! blobs never stream out to the caller.

use crate::graph::GraphStore;
use crate::graph::model::{Node, SymbolKind};

/// Lines starting with one of these are definitions, not call sites.
const DEFINITION_KEYWORDS: &[&str] = &[
    "def ",
    "async def ",
    "function ",
    "function*",
    "fn ",
    "func ",
    "class ",
];

#[derive(Debug, Clone)]
pub struct FallbackCaller {
    pub path: String,
    pub function_name: String,
    pub function_line: u32,
    pub call_line: u32,
    /// Function body reconstructed from the file text line range.
    pub source: String,
}

/// Scan every file of the repository (except the definition file) for
/// textual call sites of `name`, then attribute each hit line to the
/// function whose range contains it.
pub fn scan_callers(
    store: &GraphStore,
    repo: &str,
    name: &str,
    definition_path: Option<&str>,
) -> Vec<FallbackCaller> {
    let max_file_bytes = store.limits().caller_scan_max_file_bytes;
    let needle = format!("{name}(");
    let graph = store.graph();

    let mut result = Vec::new();

    for file_id in graph.files_in_repo(repo) {
        let Some(file) = graph.node(file_id).and_then(Node::as_file) else {
            continue;
        };
        if Some(file.path.as_str()) == definition_path {
            continue;
        }
        let Some(source_code) = &file.source_code else {
            continue;
        };
        if source_code.len() > max_file_bytes {
            continue;
        }
        if !source_code.contains(&needle) {
            continue;
        }

        let hit_lines = call_site_lines(source_code, &needle);
        if hit_lines.is_empty() {
            continue;
        }

        // Ordered function spans: [start, next.start - 1], last one to EOF.
        let functions = function_ranges(&graph, repo, &file.path, file.lines_count);
        let lines: Vec<&str> = source_code.lines().collect();
        let mut emitted: std::collections::HashSet<String> = std::collections::HashSet::new();

        for hit in hit_lines {
            let Some((fn_name, fn_start, fn_end)) = functions
                .iter()
                .find(|(_, start, end)| (*start..=*end).contains(&hit))
                .cloned()
            else {
                continue;
            };
            if !emitted.insert(fn_name.clone()) {
                continue;
            }
            let body = lines
                .get(fn_start as usize - 1..(fn_end as usize).min(lines.len()))
                .map(|slice| slice.join("\n"))
                .unwrap_or_default();
            result.push(FallbackCaller {
                path: file.path.clone(),
                function_name: fn_name,
                function_line: fn_start,
                call_line: hit,
                source: body,
            });
        }
    }

    result
}

/// 1-based lines containing the needle that are not definition lines.
fn call_site_lines(source: &str, needle: &str) -> Vec<u32> {
    source
        .lines()
        .enumerate()
        .filter_map(|(i, line)| {
            if !line.contains(needle) {
                return None;
            }
            let trimmed = line.trim_start();
            if DEFINITION_KEYWORDS.iter().any(|kw| trimmed.starts_with(kw)) {
                return None;
            }
            Some(i as u32 + 1)
        })
        .collect()
}

/// `(name, start, end)` per function, ordered by start line. The end of
/// each span is the line before the next function starts; the last span
/// runs to end of file.
fn function_ranges(
    graph: &crate::graph::store::CodeGraph,
    repo: &str,
    path: &str,
    lines_count: u32,
) -> Vec<(String, u32, u32)> {
    let mut functions: Vec<(String, u32)> = graph
        .symbols_in_file(repo, path)
        .into_iter()
        .filter_map(|id| graph.node(id).and_then(Node::as_symbol))
        .filter(|s| matches!(s.kind, SymbolKind::Function | SymbolKind::Method))
        .map(|s| (s.name.clone(), s.line_number))
        .collect();
    functions.sort_by_key(|(_, line)| *line);

    let mut ranges = Vec::with_capacity(functions.len());
    for i in 0..functions.len() {
        let (name, start) = functions[i].clone();
        let end = functions
            .get(i + 1)
            .map(|(_, next_start)| next_start.saturating_sub(1))
            .unwrap_or(lines_count.max(start));
        ranges.push((name, start, end));
    }
    ranges
}
