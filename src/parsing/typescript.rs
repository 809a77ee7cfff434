//! TypeScript extractor.
//!
//! Shares the ECMAScript walk helpers with the JavaScript variant and adds
//! interfaces, enums, heritage clauses (`extends` vs `implements`), and
//! type-only import filtering. The TSX grammar is used so `.tsx` sources
//! parse too.

use tree_sitter::{Node, Parser};

use crate::error::{ParseError, ParseResult};
use crate::parsing::extractor::{MAX_TREE_DEPTH, node_lines, node_text};
use crate::parsing::javascript::{
    collect_calls, collect_functions, collect_imports, collect_top_level_variables, leading_jsdoc,
};
use crate::parsing::record::{ClassRecord, FileRecordBuilder};
use crate::parsing::{Language, LanguageExtractor};

pub struct TypeScriptExtractor {
    parser: Parser,
}

impl TypeScriptExtractor {
    pub fn new() -> ParseResult<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_typescript::LANGUAGE_TSX.into())
            .map_err(|e| ParseError::GrammarInit {
                language: "typescript".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { parser })
    }
}

impl LanguageExtractor for TypeScriptExtractor {
    fn language(&self) -> Language {
        Language::TypeScript
    }

    fn find_imports(&mut self, source: &str, out: &mut FileRecordBuilder) {
        let Some(tree) = self.parser.parse(source, None) else {
            return;
        };
        // Reuse the ESM/require walk, then drop type-only imports: they
        // vanish at runtime and would fabricate CALLS resolution targets.
        let mut staging = FileRecordBuilder::new("staging", Language::TypeScript);
        collect_imports(tree.root_node(), source, &mut staging, 0);
        let type_only_lines = type_only_import_lines(tree.root_node(), source);
        for import in staging.finish().imports {
            if !type_only_lines.contains(&import.line_number) {
                out.add_import(import);
            }
        }
    }

    fn find_functions(&mut self, source: &str, out: &mut FileRecordBuilder) {
        if let Some(tree) = self.parser.parse(source, None) {
            collect_functions(tree.root_node(), source, out, None, None, 0);
        }
    }

    fn find_classes(&mut self, source: &str, out: &mut FileRecordBuilder) {
        let Some(tree) = self.parser.parse(source, None) else {
            return;
        };
        collect_types(tree.root_node(), source, out, 0);
    }

    fn find_calls(&mut self, source: &str, out: &mut FileRecordBuilder) {
        if let Some(tree) = self.parser.parse(source, None) {
            collect_calls(tree.root_node(), source, out, 0);
        }
    }

    fn find_variables(&mut self, source: &str, out: &mut FileRecordBuilder) {
        if let Some(tree) = self.parser.parse(source, None) {
            collect_top_level_variables(tree.root_node(), source, out);
        }
    }
}

/// Lines holding `import type …` statements.
fn type_only_import_lines(root: Node, source: &str) -> std::collections::HashSet<u32> {
    let mut lines = std::collections::HashSet::new();
    collect_type_only(root, source, &mut lines, 0);
    lines
}

fn collect_type_only(
    node: Node,
    source: &str,
    lines: &mut std::collections::HashSet<u32>,
    depth: usize,
) {
    if depth > MAX_TREE_DEPTH {
        return;
    }
    if node.kind() == "import_statement" {
        let text = node_text(&node, source);
        if text.starts_with("import type") {
            lines.insert(node.start_position().row as u32 + 1);
        }
        return;
    }
    for child in node.children(&mut node.walk()) {
        collect_type_only(child, source, lines, depth + 1);
    }
}

fn collect_types(node: Node, source: &str, out: &mut FileRecordBuilder, depth: usize) {
    if depth > MAX_TREE_DEPTH {
        return;
    }
    match node.kind() {
        "class_declaration" | "abstract_class_declaration" => {
            if let Some(record) = class_record(&node, source) {
                out.add_class(record);
            }
        }
        "interface_declaration" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let (line_number, end_line) = node_lines(&node);
                let mut bases = Vec::new();
                for child in node.children(&mut node.walk()) {
                    if child.kind() == "extends_type_clause" {
                        for base in child.named_children(&mut child.walk()) {
                            if matches!(
                                base.kind(),
                                "type_identifier" | "nested_type_identifier" | "generic_type"
                            ) {
                                bases.push(base_name(node_text(&base, source)));
                            }
                        }
                    }
                }
                out.add_interface(ClassRecord {
                    name: node_text(&name_node, source).to_string(),
                    line_number,
                    end_line,
                    bases,
                    implements: Vec::new(),
                    decorators: Vec::new(),
                    docstring: leading_jsdoc(&node, source),
                    source: node_text(&node, source).to_string(),
                });
            }
        }
        "enum_declaration" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let (line_number, end_line) = node_lines(&node);
                out.add_enum(ClassRecord {
                    name: node_text(&name_node, source).to_string(),
                    line_number,
                    end_line,
                    bases: Vec::new(),
                    implements: Vec::new(),
                    decorators: Vec::new(),
                    docstring: leading_jsdoc(&node, source),
                    source: node_text(&node, source).to_string(),
                });
            }
        }
        _ => {}
    }
    for child in node.children(&mut node.walk()) {
        collect_types(child, source, out, depth + 1);
    }
}

fn class_record(node: &Node, source: &str) -> Option<ClassRecord> {
    let name_node = node.child_by_field_name("name")?;
    let (line_number, end_line) = node_lines(node);
    let mut bases = Vec::new();
    let mut implements = Vec::new();

    for child in node.children(&mut node.walk()) {
        if child.kind() != "class_heritage" {
            continue;
        }
        for clause in child.children(&mut child.walk()) {
            match clause.kind() {
                "extends_clause" => {
                    for base in clause.named_children(&mut clause.walk()) {
                        if matches!(
                            base.kind(),
                            "identifier" | "member_expression" | "generic_type" | "type_identifier"
                        ) {
                            bases.push(base_name(node_text(&base, source)));
                        }
                    }
                }
                "implements_clause" => {
                    for iface in clause.named_children(&mut clause.walk()) {
                        if matches!(
                            iface.kind(),
                            "type_identifier" | "nested_type_identifier" | "generic_type"
                        ) {
                            implements.push(base_name(node_text(&iface, source)));
                        }
                    }
                }
                _ => {}
            }
        }
    }

    Some(ClassRecord {
        name: node_text(&name_node, source).to_string(),
        line_number,
        end_line,
        bases,
        implements,
        decorators: Vec::new(),
        docstring: leading_jsdoc(node, source),
        source: node_text(node, source).to_string(),
    })
}

/// `Base<T>` → `Base`.
fn base_name(raw: &str) -> String {
    raw.split('<').next().unwrap_or(raw).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitsConfig;
    use crate::parsing::ExtractorSet;

    fn parse(source: &str) -> crate::parsing::FileRecord {
        let mut set = ExtractorSet::new(&LimitsConfig::default()).unwrap();
        set.parse_source("m.ts", Language::TypeScript, source)
            .unwrap()
    }

    #[test]
    fn interface_and_implements() {
        let record = parse(
            "interface Store {\n  get(key: string): string;\n}\n\nclass MemoryStore implements Store {\n  get(key: string) { return ''; }\n}\n",
        );
        assert_eq!(record.interfaces.len(), 1);
        assert_eq!(record.interfaces[0].name, "Store");
        assert_eq!(record.classes.len(), 1);
        assert_eq!(record.classes[0].implements, vec!["Store"]);
    }

    #[test]
    fn extends_with_generics() {
        let record = parse("class Cache extends Map<string, number> {}\n");
        assert_eq!(record.classes[0].bases, vec!["Map"]);
    }

    #[test]
    fn type_only_imports_dropped() {
        let record = parse(
            "import type { Config } from './config';\nimport { loadConfig } from './config';\n",
        );
        assert_eq!(record.imports.len(), 1);
        assert_eq!(record.imports[0].imported_name.as_deref(), Some("loadConfig"));
    }

    #[test]
    fn typed_function_parameters() {
        let record = parse("function add(a: number, b: number): number { return a + b; }\n");
        assert_eq!(record.functions[0].args, vec!["a", "b"]);
    }

    #[test]
    fn enums_extracted() {
        let record = parse("enum Color { Red, Green }\n");
        assert_eq!(record.enums.len(), 1);
        assert_eq!(record.enums[0].name, "Color");
    }

    #[test]
    fn tsx_component_parses() {
        let record = parse(
            "export function App() {\n  return <div onClick={() => handle()}>hi</div>;\n}\nfunction handle() {}\n",
        );
        assert!(record.functions.iter().any(|f| f.name == "App"));
        assert!(record.function_calls.iter().any(|c| c.name == "handle"));
    }
}
