//! Language-aware AST extraction.
//!
//! One extractor per language, a language-neutral [`FileRecord`] output, and
//! the extension dispatch table in [`ExtractorSet`]. Extractors never touch
//! the graph.

pub mod extractor;
pub mod go;
pub mod javascript;
pub mod language;
pub mod python;
pub mod record;
pub mod typescript;

pub use extractor::{ExtractorSet, LanguageExtractor};
pub use go::GoExtractor;
pub use javascript::JavaScriptExtractor;
pub use language::Language;
pub use python::PythonExtractor;
pub use record::{
    CallRecord, CallerContext, CallerKind, ClassRecord, FileRecord, FileRecordBuilder,
    FunctionRecord, ImportRecord, ModuleInclusion, VariableRecord,
};
pub use typescript::TypeScriptExtractor;
