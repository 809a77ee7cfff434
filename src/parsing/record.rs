//! Language-neutral output of the extractors.
//!
//! Each extractor populates a different subset of the record, so construction
//! goes through [`FileRecordBuilder`] rather than a giant literal.

use serde::{Deserialize, Serialize};

use crate::parsing::Language;

/// One import statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecord {
    /// Module path as written (`os.path`, `./util`, `fmt`).
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// The specific name pulled in by a from-style import.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported_name: Option<String>,
    pub line_number: u32,
    pub is_from_import: bool,
}

impl ImportRecord {
    /// The name this import binds locally: alias, else imported name,
    /// else the last segment of the module path.
    pub fn local_name(&self) -> &str {
        if let Some(alias) = &self.alias {
            return alias;
        }
        if let Some(name) = &self.imported_name {
            return name;
        }
        self.module
            .rsplit(['.', '/'])
            .next()
            .unwrap_or(&self.module)
    }

    /// Full dotted name of what was imported (`pkg.mod.symbol`).
    pub fn full_import_name(&self) -> String {
        match &self.imported_name {
            Some(name) => format!("{}.{}", self.module, name),
            None => self.module.clone(),
        }
    }
}

/// A function or method definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub name: String,
    pub line_number: u32,
    pub end_line: u32,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub decorators: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    /// Exact text of the defining span.
    pub source: String,
    /// Enclosing class name when this is a method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_context: Option<String>,
    /// Enclosing function name for nested definitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(default = "default_complexity")]
    pub cyclomatic_complexity: u32,
}

fn default_complexity() -> u32 {
    1
}

/// A class-like type definition (class, interface, struct, enum, union,
/// trait, record). The label it lands under in the graph is decided by which
/// builder method added it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRecord {
    pub name: String,
    pub line_number: u32,
    pub end_line: u32,
    #[serde(default)]
    pub bases: Vec<String>,
    /// Interfaces this type declares it implements (IMPLEMENTS edges).
    #[serde(default)]
    pub implements: Vec<String>,
    #[serde(default)]
    pub decorators: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    pub source: String,
}

/// A module-level variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableRecord {
    pub name: String,
    pub line_number: u32,
    pub end_line: u32,
    pub source: String,
}

/// Where a call was made from: the innermost enclosing function or class,
/// anchored by its defining line so the resolver can pick the exact caller
/// node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    pub name: String,
    pub kind: CallerKind,
    pub line_number: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallerKind {
    Function,
    Class,
}

/// One call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Simple name of the callee (`bar` for `foo.bar()`).
    pub name: String,
    /// The dotted path as written (`foo.bar`).
    pub full_name: String,
    pub line_number: u32,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller: Option<CallerContext>,
    /// Best-effort receiver type guess; the resolver treats it as a hint only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inferred_obj_type: Option<String>,
}

/// A mixin-style inclusion (`include SomeModule` inside a class body).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInclusion {
    pub class: String,
    pub module: String,
}

/// Everything extracted from a single source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Repo-relative path. Never absolute.
    pub path: String,
    pub language: Language,
    pub lines_count: u32,
    /// Full text, or None when the file exceeded the source-size cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_code: Option<String>,
    /// Set when the source cap suppressed text storage.
    #[serde(default)]
    pub source_omitted: bool,

    #[serde(default)]
    pub imports: Vec<ImportRecord>,
    #[serde(default)]
    pub functions: Vec<FunctionRecord>,
    #[serde(default)]
    pub classes: Vec<ClassRecord>,
    #[serde(default)]
    pub interfaces: Vec<ClassRecord>,
    #[serde(default)]
    pub structs: Vec<ClassRecord>,
    #[serde(default)]
    pub enums: Vec<ClassRecord>,
    #[serde(default)]
    pub unions: Vec<ClassRecord>,
    #[serde(default)]
    pub traits: Vec<ClassRecord>,
    #[serde(default)]
    pub macros: Vec<ClassRecord>,
    #[serde(default)]
    pub variables: Vec<VariableRecord>,
    /// Imported-package names this file declares (not files).
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default)]
    pub module_inclusions: Vec<ModuleInclusion>,
    #[serde(default)]
    pub function_calls: Vec<CallRecord>,
}

impl FileRecord {
    /// Names defined at the top level of this file, as the pre-scanner and
    /// the resolvers see them.
    pub fn exported_names(&self) -> impl Iterator<Item = &str> {
        self.functions
            .iter()
            .filter(|f| f.class_context.is_none() && f.function_context.is_none())
            .map(|f| f.name.as_str())
            .chain(self.classes.iter().map(|c| c.name.as_str()))
            .chain(self.interfaces.iter().map(|c| c.name.as_str()))
            .chain(self.structs.iter().map(|c| c.name.as_str()))
            .chain(self.traits.iter().map(|c| c.name.as_str()))
    }

    /// Names defined anywhere in this file (resolution chain step 2).
    pub fn local_names(&self) -> std::collections::HashSet<&str> {
        self.functions
            .iter()
            .map(|f| f.name.as_str())
            .chain(self.classes.iter().map(|c| c.name.as_str()))
            .chain(self.interfaces.iter().map(|c| c.name.as_str()))
            .chain(self.structs.iter().map(|c| c.name.as_str()))
            .chain(self.enums.iter().map(|c| c.name.as_str()))
            .chain(self.traits.iter().map(|c| c.name.as_str()))
            .collect()
    }
}

/// Builder over [`FileRecord`]. Extractors call the `add_*` methods for the
/// capabilities they implement and leave the rest empty.
#[derive(Debug)]
pub struct FileRecordBuilder {
    record: FileRecord,
}

impl FileRecordBuilder {
    pub fn new(path: impl Into<String>, language: Language) -> Self {
        Self {
            record: FileRecord {
                path: path.into(),
                language,
                lines_count: 0,
                source_code: None,
                source_omitted: false,
                imports: Vec::new(),
                functions: Vec::new(),
                classes: Vec::new(),
                interfaces: Vec::new(),
                structs: Vec::new(),
                enums: Vec::new(),
                unions: Vec::new(),
                traits: Vec::new(),
                macros: Vec::new(),
                variables: Vec::new(),
                modules: Vec::new(),
                module_inclusions: Vec::new(),
                function_calls: Vec::new(),
            },
        }
    }

    /// Attach file text, enforcing the storage cap. Counting always uses the
    /// real text so `lines_count` stays correct even when storage is skipped.
    pub fn source_text(&mut self, source: &str, max_bytes: usize) -> &mut Self {
        self.record.lines_count = source.matches('\n').count() as u32 + 1;
        if source.len() <= max_bytes {
            self.record.source_code = Some(source.to_string());
        } else {
            self.record.source_omitted = true;
        }
        self
    }

    pub fn add_import(&mut self, import: ImportRecord) -> &mut Self {
        self.record.imports.push(import);
        self
    }

    pub fn add_function(&mut self, function: FunctionRecord) -> &mut Self {
        self.record.functions.push(function);
        self
    }

    pub fn add_class(&mut self, class: ClassRecord) -> &mut Self {
        self.record.classes.push(class);
        self
    }

    pub fn add_interface(&mut self, interface: ClassRecord) -> &mut Self {
        self.record.interfaces.push(interface);
        self
    }

    pub fn add_struct(&mut self, s: ClassRecord) -> &mut Self {
        self.record.structs.push(s);
        self
    }

    pub fn add_enum(&mut self, e: ClassRecord) -> &mut Self {
        self.record.enums.push(e);
        self
    }

    pub fn add_union(&mut self, u: ClassRecord) -> &mut Self {
        self.record.unions.push(u);
        self
    }

    pub fn add_trait(&mut self, t: ClassRecord) -> &mut Self {
        self.record.traits.push(t);
        self
    }

    pub fn add_macro(&mut self, m: ClassRecord) -> &mut Self {
        self.record.macros.push(m);
        self
    }

    pub fn add_variable(&mut self, variable: VariableRecord) -> &mut Self {
        self.record.variables.push(variable);
        self
    }

    pub fn add_module(&mut self, name: impl Into<String>) -> &mut Self {
        self.record.modules.push(name.into());
        self
    }

    pub fn add_module_inclusion(&mut self, inclusion: ModuleInclusion) -> &mut Self {
        self.record.module_inclusions.push(inclusion);
        self
    }

    pub fn add_call(&mut self, call: CallRecord) -> &mut Self {
        self.record.function_calls.push(call);
        self
    }

    pub fn finish(self) -> FileRecord {
        self.record
    }
}
