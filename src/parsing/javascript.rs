//! JavaScript extractor.
//!
//! Covers ESM imports, `require()` bindings, function declarations, arrow
//! and function expressions bound to `const`/`let`, classes with methods,
//! and call sites. The walk helpers are shared with the TypeScript variant.

use tree_sitter::{Node, Parser};

use crate::error::{ParseError, ParseResult};
use crate::parsing::extractor::{MAX_TREE_DEPTH, node_lines, node_text};
use crate::parsing::record::{
    CallRecord, CallerContext, CallerKind, ClassRecord, FileRecordBuilder, FunctionRecord,
    ImportRecord, VariableRecord,
};
use crate::parsing::{Language, LanguageExtractor};

pub struct JavaScriptExtractor {
    parser: Parser,
}

impl JavaScriptExtractor {
    pub fn new() -> ParseResult<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_javascript::LANGUAGE.into())
            .map_err(|e| ParseError::GrammarInit {
                language: "javascript".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { parser })
    }
}

impl LanguageExtractor for JavaScriptExtractor {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn find_imports(&mut self, source: &str, out: &mut FileRecordBuilder) {
        if let Some(tree) = self.parser.parse(source, None) {
            collect_imports(tree.root_node(), source, out, 0);
        }
    }

    fn find_functions(&mut self, source: &str, out: &mut FileRecordBuilder) {
        if let Some(tree) = self.parser.parse(source, None) {
            collect_functions(tree.root_node(), source, out, None, None, 0);
        }
    }

    fn find_classes(&mut self, source: &str, out: &mut FileRecordBuilder) {
        if let Some(tree) = self.parser.parse(source, None) {
            collect_classes(tree.root_node(), source, out, 0);
        }
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

pub(crate) fn collect_imports(
    node: Node,
    source: &str,
    out: &mut FileRecordBuilder,
    depth: usize,
) {
    if depth > MAX_TREE_DEPTH {
        return;
    }
    match node.kind() {
        "import_statement" => {
            let Some(module) = node
                .child_by_field_name("source")
                .map(|n| strip_quotes(node_text(&n, source)))
            else {
                return;
            };
            let line_number = node.start_position().row as u32 + 1;
            let mut emitted = false;

            for clause in node.children(&mut node.walk()) {
                if clause.kind() != "import_clause" {
                    continue;
                }
                for item in clause.children(&mut clause.walk()) {
                    match item.kind() {
                        "identifier" => {
                            // default import
                            emitted = true;
                            out.add_import(ImportRecord {
                                module: module.clone(),
                                alias: None,
                                imported_name: Some(node_text(&item, source).to_string()),
                                line_number,
                                is_from_import: true,
                            });
                        }
                        "namespace_import" => {
                            emitted = true;
                            let alias = item
                                .named_children(&mut item.walk())
                                .find(|n| n.kind() == "identifier")
                                .map(|n| node_text(&n, source).to_string());
                            out.add_import(ImportRecord {
                                module: module.clone(),
                                alias,
                                imported_name: Some("*".to_string()),
                                line_number,
                                is_from_import: true,
                            });
                        }
                        "named_imports" => {
                            for spec in item.named_children(&mut item.walk()) {
                                if spec.kind() != "import_specifier" {
                                    continue;
                                }
                                emitted = true;
                                let name = spec
                                    .child_by_field_name("name")
                                    .map(|n| node_text(&n, source).to_string());
                                let alias = spec
                                    .child_by_field_name("alias")
                                    .map(|n| node_text(&n, source).to_string());
                                out.add_import(ImportRecord {
                                    module: module.clone(),
                                    alias,
                                    imported_name: name,
                                    line_number,
                                    is_from_import: true,
                                });
                            }
                        }
                        _ => {}
                    }
                }
            }

            if !emitted {
                // side-effect import: `import './setup'`
                out.add_import(ImportRecord {
                    module,
                    alias: None,
                    imported_name: None,
                    line_number,
                    is_from_import: false,
                });
            }
        }
        "variable_declarator" => {
            // const x = require('mod')
            if let (Some(name), Some(value)) = (
                node.child_by_field_name("name"),
                node.child_by_field_name("value"),
            ) {
                if value.kind() == "call_expression" {
                    let callee = value.child_by_field_name("function");
                    let is_require = callee
                        .map(|c| node_text(&c, source) == "require")
                        .unwrap_or(false);
                    if is_require {
                        if let Some(arg) = value
                            .child_by_field_name("arguments")
                            .and_then(|a| a.named_child(0))
                        {
                            out.add_import(ImportRecord {
                                module: strip_quotes(node_text(&arg, source)),
                                alias: Some(node_text(&name, source).to_string()),
                                imported_name: None,
                                line_number: node.start_position().row as u32 + 1,
                                is_from_import: false,
                            });
                        }
                    }
                }
            }
            for child in node.children(&mut node.walk()) {
                collect_imports(child, source, out, depth + 1);
            }
        }
        _ => {
            for child in node.children(&mut node.walk()) {
                collect_imports(child, source, out, depth + 1);
            }
        }
    }
}

pub(crate) fn collect_functions(
    node: Node,
    source: &str,
    out: &mut FileRecordBuilder,
    class_context: Option<&str>,
    function_context: Option<&str>,
    depth: usize,
) {
    if depth > MAX_TREE_DEPTH {
        return;
    }
    match node.kind() {
        "function_declaration" | "generator_function_declaration" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let name = node_text(&name_node, source).to_string();
                emit_function(&node, source, out, &name, class_context, function_context);
                if let Some(body) = node.child_by_field_name("body") {
                    descend_functions(body, source, out, None, Some(&name), depth);
                }
                return;
            }
        }
        "method_definition" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let name = node_text(&name_node, source).to_string();
                emit_function(&node, source, out, &name, class_context, function_context);
                if let Some(body) = node.child_by_field_name("body") {
                    descend_functions(body, source, out, None, Some(&name), depth);
                }
                return;
            }
        }
        "variable_declarator" => {
            // const f = () => {} / const f = function () {}
            if let (Some(name_node), Some(value)) = (
                node.child_by_field_name("name"),
                node.child_by_field_name("value"),
            ) {
                if matches!(
                    value.kind(),
                    "arrow_function" | "function_expression" | "generator_function"
                ) && name_node.kind() == "identifier"
                {
                    let name = node_text(&name_node, source).to_string();
                    emit_function(&value, source, out, &name, class_context, function_context);
                    if let Some(body) = value.child_by_field_name("body") {
                        descend_functions(body, source, out, None, Some(&name), depth);
                    }
                    return;
                }
            }
        }
        "class_declaration" => {
            let class_name = node
                .child_by_field_name("name")
                .map(|n| node_text(&n, source).to_string());
            if let (Some(class_name), Some(body)) = (class_name, node.child_by_field_name("body"))
            {
                for child in body.children(&mut body.walk()) {
                    collect_functions(child, source, out, Some(&class_name), None, depth + 1);
                }
            }
            return;
        }
        _ => {}
    }
    for child in node.children(&mut node.walk()) {
        collect_functions(child, source, out, class_context, function_context, depth + 1);
    }
}

fn descend_functions(
    body: Node,
    source: &str,
    out: &mut FileRecordBuilder,
    class_context: Option<&str>,
    function_context: Option<&str>,
    depth: usize,
) {
    for child in body.children(&mut body.walk()) {
        collect_functions(child, source, out, class_context, function_context, depth + 1);
    }
}

fn emit_function(
    definition: &Node,
    source: &str,
    out: &mut FileRecordBuilder,
    name: &str,
    class_context: Option<&str>,
    function_context: Option<&str>,
) {
    // For `const f = ...` anchor the span at the declaration statement.
    let anchor = declaration_anchor(definition);
    let (line_number, _) = node_lines(&anchor);
    let (_, end_line) = node_lines(definition);

    out.add_function(FunctionRecord {
        name: name.to_string(),
        line_number,
        end_line,
        args: parameter_names(definition, source),
        decorators: Vec::new(),
        docstring: leading_jsdoc(&anchor, source),
        source: source[anchor.start_byte()..definition.end_byte()].to_string(),
        class_context: class_context.map(str::to_string),
        function_context: function_context.map(str::to_string),
        visibility: Some(js_visibility(name)),
        cyclomatic_complexity: cyclomatic_complexity(definition),
    });
}

fn declaration_anchor<'t>(node: &Node<'t>) -> Node<'t> {
    let mut anchor = *node;
    let mut current = node.parent();
    while let Some(parent) = current {
        match parent.kind() {
            "variable_declarator" | "lexical_declaration" | "variable_declaration"
            | "export_statement" => {
                anchor = parent;
                current = parent.parent();
            }
            _ => break,
        }
    }
    anchor
}

pub(crate) fn collect_classes(
    node: Node,
    source: &str,
    out: &mut FileRecordBuilder,
    depth: usize,
) {
    if depth > MAX_TREE_DEPTH {
        return;
    }
    if node.kind() == "class_declaration" {
        if let Some(name_node) = node.child_by_field_name("name") {
            let anchor = declaration_anchor(&node);
            let (line_number, _) = node_lines(&anchor);
            let (_, end_line) = node_lines(&node);
            let mut bases = Vec::new();
            for child in node.children(&mut node.walk()) {
                if child.kind() == "class_heritage" {
                    for base in child.named_children(&mut child.walk()) {
                        if matches!(base.kind(), "identifier" | "member_expression") {
                            bases.push(node_text(&base, source).to_string());
                        }
                    }
                }
            }
            out.add_class(ClassRecord {
                name: node_text(&name_node, source).to_string(),
                line_number,
                end_line,
                bases,
                implements: Vec::new(),
                decorators: Vec::new(),
                docstring: leading_jsdoc(&anchor, source),
                source: source[anchor.start_byte()..node.end_byte()].to_string(),
            });
        }
    }
    for child in node.children(&mut node.walk()) {
        collect_classes(child, source, out, depth + 1);
    }
}

pub(crate) fn collect_calls(node: Node, source: &str, out: &mut FileRecordBuilder, depth: usize) {
    if depth > MAX_TREE_DEPTH {
        return;
    }
    if node.kind() == "call_expression" {
        if let Some(function) = node.child_by_field_name("function") {
            let full_name = node_text(&function, source).to_string();
            // `new Foo()` arrives as new_expression and is handled below;
            // skip require() which is modeled as an import.
            if full_name != "require" {
                let name = full_name
                    .rsplit('.')
                    .next()
                    .unwrap_or(&full_name)
                    .to_string();
                out.add_call(CallRecord {
                    name,
                    full_name,
                    line_number: node.start_position().row as u32 + 1,
                    args: call_arguments(&node, source),
                    caller: enclosing_caller(&node, source),
                    inferred_obj_type: None,
                });
            }
        }
    }
    if node.kind() == "new_expression" {
        if let Some(constructor) = node.child_by_field_name("constructor") {
            let full_name = node_text(&constructor, source).to_string();
            let name = full_name
                .rsplit('.')
                .next()
                .unwrap_or(&full_name)
                .to_string();
            out.add_call(CallRecord {
                name,
                full_name,
                line_number: node.start_position().row as u32 + 1,
                args: call_arguments(&node, source),
                caller: enclosing_caller(&node, source),
                inferred_obj_type: None,
            });
        }
    }
    for child in node.children(&mut node.walk()) {
        collect_calls(child, source, out, depth + 1);
    }
}

pub(crate) fn collect_top_level_variables(root: Node, source: &str, out: &mut FileRecordBuilder) {
    for child in root.children(&mut root.walk()) {
        let statement = if child.kind() == "export_statement" {
            match child.named_child(0) {
                Some(inner) => inner,
                None => continue,
            }
        } else {
            child
        };
        if !matches!(
            statement.kind(),
            "lexical_declaration" | "variable_declaration"
        ) {
            continue;
        }
        for declarator in statement.named_children(&mut statement.walk()) {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            let Some(name) = declarator.child_by_field_name("name") else {
                continue;
            };
            if name.kind() != "identifier" {
                continue;
            }
            // Function-valued bindings are functions, not variables.
            if declarator
                .child_by_field_name("value")
                .map(|v| {
                    matches!(
                        v.kind(),
                        "arrow_function" | "function_expression" | "generator_function"
                    )
                })
                .unwrap_or(false)
            {
                continue;
            }
            let (line_number, end_line) = node_lines(&child);
            out.add_variable(VariableRecord {
                name: node_text(&name, source).to_string(),
                line_number,
                end_line,
                source: node_text(&child, source).trim_end().to_string(),
            });
        }
    }
}

pub(crate) fn enclosing_caller(node: &Node, source: &str) -> Option<CallerContext> {
    let mut current = node.parent();
    let mut class_fallback = None;
    while let Some(parent) = current {
        match parent.kind() {
            "function_declaration" | "generator_function_declaration" | "method_definition" => {
                if let Some(name) = parent.child_by_field_name("name") {
                    let anchor = declaration_anchor(&parent);
                    return Some(CallerContext {
                        name: node_text(&name, source).to_string(),
                        kind: CallerKind::Function,
                        line_number: anchor.start_position().row as u32 + 1,
                    });
                }
            }
            "arrow_function" | "function_expression" => {
                // Named only through a variable_declarator binding.
                if let Some(declarator) = parent
                    .parent()
                    .filter(|p| p.kind() == "variable_declarator")
                {
                    if let Some(name) = declarator.child_by_field_name("name") {
                        let anchor = declaration_anchor(&parent);
                        return Some(CallerContext {
                            name: node_text(&name, source).to_string(),
                            kind: CallerKind::Function,
                            line_number: anchor.start_position().row as u32 + 1,
                        });
                    }
                }
            }
            "class_declaration" => {
                if class_fallback.is_none() {
                    if let Some(name) = parent.child_by_field_name("name") {
                        class_fallback = Some(CallerContext {
                            name: node_text(&name, source).to_string(),
                            kind: CallerKind::Class,
                            line_number: parent.start_position().row as u32 + 1,
                        });
                    }
                }
            }
            _ => {}
        }
        current = parent.parent();
    }
    class_fallback
}

pub(crate) fn parameter_names(node: &Node, source: &str) -> Vec<String> {
    let Some(params) = node
        .child_by_field_name("parameters")
        .or_else(|| node.child_by_field_name("parameter"))
    else {
        return Vec::new();
    };
    if params.kind() == "identifier" {
        // single-arg arrow function without parens
        return vec![node_text(&params, source).to_string()];
    }
    let mut names = Vec::new();
    for param in params.named_children(&mut params.walk()) {
        match param.kind() {
            "identifier" => names.push(node_text(&param, source).to_string()),
            "required_parameter" | "optional_parameter" => {
                if let Some(pattern) = param.child_by_field_name("pattern") {
                    names.push(node_text(&pattern, source).to_string());
                }
            }
            "assignment_pattern" => {
                if let Some(left) = param.child_by_field_name("left") {
                    names.push(node_text(&left, source).to_string());
                }
            }
            "rest_pattern" => names.push(node_text(&param, source).to_string()),
            _ => {}
        }
    }
    names
}

pub(crate) fn call_arguments(node: &Node, source: &str) -> Vec<String> {
    let Some(args) = node.child_by_field_name("arguments") else {
        return Vec::new();
    };
    args.named_children(&mut args.walk())
        .map(|a| node_text(&a, source).to_string())
        .collect()
}

/// JSDoc block immediately above the declaration.
pub(crate) fn leading_jsdoc(node: &Node, source: &str) -> Option<String> {
    let prev = node.prev_sibling()?;
    if prev.kind() != "comment" {
        return None;
    }
    let text = node_text(&prev, source);
    if !text.starts_with("/**") {
        return None;
    }
    let inner = text
        .trim_start_matches("/**")
        .trim_end_matches("*/")
        .lines()
        .map(|l| l.trim().trim_start_matches('*').trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if inner.is_empty() { None } else { Some(inner) }
}

pub(crate) fn cyclomatic_complexity(node: &Node) -> u32 {
    let mut count = 1;
    count_branches(node, &mut count, 0);
    count
}

fn count_branches(node: &Node, count: &mut u32, depth: usize) {
    if depth > MAX_TREE_DEPTH {
        return;
    }
    match node.kind() {
        "if_statement" | "for_statement" | "for_in_statement" | "while_statement"
        | "do_statement" | "switch_case" | "catch_clause" | "ternary_expression" => *count += 1,
        "binary_expression" => {
            // short-circuit operators are decision points
            if node
                .child_by_field_name("operator")
                .map(|op| matches!(op.kind(), "&&" | "||" | "??"))
                .unwrap_or(false)
            {
                *count += 1;
            }
        }
        _ => {}
    }
    for child in node.children(&mut node.walk()) {
        count_branches(&child, count, depth + 1);
    }
}

pub(crate) fn strip_quotes(raw: &str) -> String {
    raw.trim_matches(['"', '\'', '`']).to_string()
}

fn js_visibility(name: &str) -> String {
    if name.starts_with('#') || name.starts_with('_') {
        "private".to_string()
    } else {
        "public".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitsConfig;
    use crate::parsing::ExtractorSet;

    fn parse(source: &str) -> crate::parsing::FileRecord {
        let mut set = ExtractorSet::new(&LimitsConfig::default()).unwrap();
        set.parse_source("m.js", Language::JavaScript, source)
            .unwrap()
    }

    #[test]
    fn esm_imports() {
        let record = parse(
            "import fs from 'fs';\nimport { join, sep as separator } from 'path';\nimport * as os from 'os';\nimport './side-effect';\n",
        );
        assert_eq!(record.imports.len(), 5);
        assert_eq!(record.imports[0].module, "fs");
        assert_eq!(record.imports[0].imported_name.as_deref(), Some("fs"));
        assert_eq!(record.imports[1].imported_name.as_deref(), Some("join"));
        assert_eq!(record.imports[2].alias.as_deref(), Some("separator"));
        assert_eq!(record.imports[3].alias.as_deref(), Some("os"));
        assert_eq!(record.imports[4].module, "./side-effect");
    }

    #[test]
    fn require_binding_is_an_import() {
        let record = parse("const express = require('express');\n");
        assert_eq!(record.imports.len(), 1);
        assert_eq!(record.imports[0].module, "express");
        assert_eq!(record.imports[0].alias.as_deref(), Some("express"));
        // require itself is not a call edge
        assert!(record.function_calls.iter().all(|c| c.name != "require"));
    }

    #[test]
    fn function_forms() {
        let record = parse(
            "function plain(a, b) { return a + b; }\nconst arrow = (x) => x * 2;\nconst expr = function (y) { return y; };\n",
        );
        let names: Vec<_> = record.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["plain", "arrow", "expr"]);
        assert_eq!(record.functions[0].args, vec!["a", "b"]);
        assert_eq!(record.functions[1].line_number, 2);
    }

    #[test]
    fn class_with_methods_and_extends() {
        let record = parse(
            "class Repo extends Base {\n  constructor(url) { super(url); }\n  fetch() { return this.pull(); }\n}\n",
        );
        assert_eq!(record.classes.len(), 1);
        assert_eq!(record.classes[0].bases, vec!["Base"]);
        let methods: Vec<_> = record
            .functions
            .iter()
            .filter(|f| f.class_context.as_deref() == Some("Repo"))
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(methods, vec!["constructor", "fetch"]);
    }

    #[test]
    fn calls_with_context_and_new() {
        let record = parse(
            "function handler() {\n  const c = new Client();\n  c.send(1, 2);\n}\n",
        );
        let send = record.function_calls.iter().find(|c| c.name == "send").unwrap();
        assert_eq!(send.full_name, "c.send");
        assert_eq!(send.args, vec!["1", "2"]);
        assert_eq!(send.caller.as_ref().unwrap().name, "handler");
        assert!(record.function_calls.iter().any(|c| c.name == "Client"));
    }

    #[test]
    fn jsdoc_becomes_docstring() {
        let record = parse("/** Greets loudly. */\nfunction greet() {}\n");
        assert_eq!(
            record.functions[0].docstring.as_deref(),
            Some("Greets loudly.")
        );
    }

    #[test]
    fn top_level_variables_exclude_functions() {
        let record = parse("const LIMIT = 3;\nconst fn = () => 1;\n");
        assert_eq!(record.variables.len(), 1);
        assert_eq!(record.variables[0].name, "LIMIT");
    }
}
