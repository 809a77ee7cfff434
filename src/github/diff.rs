//! Unified diff parsing.
//!
//! Turns a PR diff into per-hunk line ranges in new-file coordinates, the
//! form the context builder consumes.

use std::collections::HashMap;

use regex::Regex;

use crate::types::Hunk;

/// Parse a unified diff into one [`Hunk`] per `@@` header, carrying the
/// new-file range.
pub fn parse_unified_diff(diff_text: &str) -> Vec<Hunk> {
    let file_re = Regex::new(r"^\+\+\+ b/(.+)$").expect("static regex");
    let hunk_re = Regex::new(r"^@@ -\d+(?:,\d+)? \+(\d+)(?:,(\d+))? @@").expect("static regex");

    let mut hunks = Vec::new();
    let mut current_file: Option<String> = None;

    for line in diff_text.lines() {
        if let Some(captures) = file_re.captures(line) {
            current_file = Some(captures[1].to_string());
            continue;
        }
        if let (Some(captures), Some(file)) = (hunk_re.captures(line), current_file.as_ref()) {
            let start_line: u32 = captures[1].parse().unwrap_or(1);
            let count: u32 = captures
                .get(2)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(1);
            hunks.push(Hunk {
                file_path: file.clone(),
                start_line,
                end_line: start_line + count.saturating_sub(1),
            });
        }
    }
    hunks
}

/// Group hunks by file path, preserving hunk order within a file.
pub fn group_hunks_by_file(hunks: Vec<Hunk>) -> HashMap<String, Vec<Hunk>> {
    let mut grouped: HashMap<String, Vec<Hunk>> = HashMap::new();
    for hunk in hunks {
        grouped.entry(hunk.file_path.clone()).or_default().push(hunk);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
diff --git a/src/app.py b/src/app.py
index 111..222 100644
--- a/src/app.py
+++ b/src/app.py
@@ -10,4 +10,6 @@ def handler():
 context
+added line
+another
 context
@@ -40 +44 @@
-old
+new
diff --git a/lib/util.py b/lib/util.py
--- a/lib/util.py
+++ b/lib/util.py
@@ -1,3 +1,3 @@
-x
+y
";

    #[test]
    fn parses_hunks_with_ranges() {
        let hunks = parse_unified_diff(SAMPLE);
        assert_eq!(hunks.len(), 3);

        assert_eq!(hunks[0].file_path, "src/app.py");
        assert_eq!(hunks[0].start_line, 10);
        assert_eq!(hunks[0].end_line, 15);

        // Count-less header means a single line.
        assert_eq!(hunks[1].start_line, 44);
        assert_eq!(hunks[1].end_line, 44);

        assert_eq!(hunks[2].file_path, "lib/util.py");
    }

    #[test]
    fn groups_by_file() {
        let grouped = group_hunks_by_file(parse_unified_diff(SAMPLE));
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["src/app.py"].len(), 2);
        assert_eq!(grouped["lib/util.py"].len(), 1);
    }

    #[test]
    fn empty_diff_yields_no_hunks() {
        assert!(parse_unified_diff("").is_empty());
    }
}
