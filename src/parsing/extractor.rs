//! The extractor interface and the extension dispatch table.
//!
//! One extractor variant per language; each owns its tree traversal and
//! none of them touch the graph. The capability set is fixed: imports,
//! functions, classes (and class-like types), calls, variables. A variant
//! implements the capabilities its language has and leaves the rest as the
//! empty default.

use std::collections::HashMap;
use std::path::Path;

use crate::config::LimitsConfig;
use crate::error::{ParseError, ParseResult};
use crate::parsing::record::{FileRecord, FileRecordBuilder};
use crate::parsing::{
    GoExtractor, JavaScriptExtractor, Language, PythonExtractor, TypeScriptExtractor,
};

/// Guard against pathological nesting blowing the stack during tree walks.
pub const MAX_TREE_DEPTH: usize = 400;

/// Common interface for all language extractors.
pub trait LanguageExtractor: Send {
    fn language(&self) -> Language;

    fn find_imports(&mut self, source: &str, out: &mut FileRecordBuilder);

    fn find_functions(&mut self, source: &str, out: &mut FileRecordBuilder);

    fn find_classes(&mut self, source: &str, out: &mut FileRecordBuilder);

    /// Call sites with their caller context, so the deferred resolver can
    /// anchor a precise CALLS edge.
    fn find_calls(&mut self, source: &str, out: &mut FileRecordBuilder);

    fn find_variables(&mut self, _source: &str, _out: &mut FileRecordBuilder) {}
}

/// Per-thread set of extractor instances plus the `extension → variant`
/// dispatch table. Construction is cheap; the parse pool builds one per
/// worker thread.
pub struct ExtractorSet {
    extractors: HashMap<Language, Box<dyn LanguageExtractor>>,
    max_source_bytes: usize,
}

impl ExtractorSet {
    pub fn new(limits: &LimitsConfig) -> ParseResult<Self> {
        let mut extractors: HashMap<Language, Box<dyn LanguageExtractor>> = HashMap::new();
        extractors.insert(Language::Python, Box::new(PythonExtractor::new()?));
        extractors.insert(Language::JavaScript, Box::new(JavaScriptExtractor::new()?));
        extractors.insert(Language::TypeScript, Box::new(TypeScriptExtractor::new()?));
        extractors.insert(Language::Go, Box::new(GoExtractor::new()?));
        Ok(Self {
            extractors,
            max_source_bytes: limits.max_file_source_bytes,
        })
    }

    /// Parse one file into a [`FileRecord`]. `relative_path` is the storage
    /// key; `abs_path` is where the bytes live right now.
    pub fn parse_file(&mut self, relative_path: &str, abs_path: &Path) -> ParseResult<FileRecord> {
        let language = Language::from_path(abs_path).ok_or_else(|| {
            ParseError::UnsupportedExtension {
                path: abs_path.to_path_buf(),
                extension: abs_path
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("")
                    .to_string(),
            }
        })?;

        let source = std::fs::read_to_string(abs_path).map_err(|e| ParseError::FileRead {
            path: abs_path.to_path_buf(),
            source: e,
        })?;

        self.parse_source(relative_path, language, &source)
    }

    /// Parse already-loaded source. Split out so tests and the pre-scanner
    /// can feed text directly.
    pub fn parse_source(
        &mut self,
        relative_path: &str,
        language: Language,
        source: &str,
    ) -> ParseResult<FileRecord> {
        let extractor = self
            .extractors
            .get_mut(&language)
            .expect("every Language variant has a registered extractor");

        let mut builder = FileRecordBuilder::new(relative_path, language);
        builder.source_text(source, self.max_source_bytes);

        extractor.find_imports(source, &mut builder);
        extractor.find_functions(source, &mut builder);
        extractor.find_classes(source, &mut builder);
        extractor.find_variables(source, &mut builder);
        extractor.find_calls(source, &mut builder);

        Ok(builder.finish())
    }
}

/// Line/byte range helpers shared by the extractors.
pub(crate) fn node_lines(node: &tree_sitter::Node) -> (u32, u32) {
    (
        node.start_position().row as u32 + 1,
        node.end_position().row as u32 + 1,
    )
}

pub(crate) fn node_text<'a>(node: &tree_sitter::Node, source: &'a str) -> &'a str {
    &source[node.byte_range()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_source_dispatches_by_language() {
        let mut set = ExtractorSet::new(&LimitsConfig::default()).unwrap();
        let record = set
            .parse_source("pkg/a.py", Language::Python, "def foo():\n    return 1\n")
            .unwrap();
        assert_eq!(record.path, "pkg/a.py");
        assert_eq!(record.language, Language::Python);
        assert_eq!(record.functions.len(), 1);
        assert_eq!(record.functions[0].name, "foo");
    }

    #[test]
    fn oversized_source_still_yields_structure() {
        let mut limits = LimitsConfig::default();
        limits.max_file_source_bytes = 16;
        let mut set = ExtractorSet::new(&limits).unwrap();
        let source = "def foo():\n    return 1\n\n\ndef bar():\n    return 2\n";
        let record = set
            .parse_source("big.py", Language::Python, source)
            .unwrap();
        assert!(record.source_code.is_none());
        assert!(record.source_omitted);
        assert_eq!(record.functions.len(), 2);
    }
}
