//! Language detection and per-language resolution facts.

use serde::{Deserialize, Serialize};

/// Languages with a registered extractor. New languages are added by
/// implementing [`crate::parsing::LanguageExtractor`] and extending the
/// dispatch table in [`crate::parsing::ExtractorSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Go,
}

impl Language {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "py" | "pyi" => Some(Language::Python),
            "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
            "ts" | "tsx" | "mts" | "cts" => Some(Language::TypeScript),
            "go" => Some(Language::Go),
            _ => None,
        }
    }

    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &["py", "pyi"],
            Language::JavaScript => &["js", "jsx", "mjs", "cjs"],
            Language::TypeScript => &["ts", "tsx", "mts", "cts"],
            Language::Go => &["go"],
        }
    }

    /// Lowercase name stored on File nodes.
    pub fn name(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Go => "go",
        }
    }

    /// Receiver keywords that resolve a call back into the defining file
    /// (resolution chain step 1).
    pub fn self_reference_keywords(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &["self", "cls", "super", "super()"],
            Language::JavaScript | Language::TypeScript => &["this", "super"],
            Language::Go => &[],
        }
    }

    /// Every extension with a registered extractor.
    pub fn all_extensions() -> impl Iterator<Item = &'static str> {
        [
            Language::Python,
            Language::JavaScript,
            Language::TypeScript,
            Language::Go,
        ]
        .into_iter()
        .flat_map(|l| l.extensions().iter().copied())
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn extension_dispatch() {
        assert_eq!(Language::from_extension("py"), Some(Language::Python));
        assert_eq!(Language::from_extension("PY"), Some(Language::Python));
        assert_eq!(Language::from_extension("tsx"), Some(Language::TypeScript));
        assert_eq!(Language::from_extension("cjs"), Some(Language::JavaScript));
        assert_eq!(Language::from_extension("go"), Some(Language::Go));
        assert_eq!(Language::from_extension("rb"), None);
    }

    #[test]
    fn path_dispatch() {
        assert_eq!(
            Language::from_path(Path::new("src/app/main.py")),
            Some(Language::Python)
        );
        assert_eq!(Language::from_path(Path::new("README.md")), None);
        assert_eq!(Language::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn self_reference_keywords_cover_python_receivers() {
        let kws = Language::Python.self_reference_keywords();
        assert!(kws.contains(&"self"));
        assert!(kws.contains(&"cls"));
    }
}
