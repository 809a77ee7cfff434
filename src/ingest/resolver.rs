//! Deferred name resolution (passes C and D).
//!
//! One prioritized chain, applied uniformly to calls and inheritance:
//!
//! 1. self-reference receiver (`self`, `this`, `cls`, …), unchained → own file
//! 2. name defined in the calling file → own file
//! 3. inferred receiver type known to the imports map → its file
//! 4. unique imports-map entry → that file
//! 5. ambiguous → constrained by what the file actually imported
//! 6. otherwise → unresolved placeholder (calls) / no edge (inheritance)

use std::collections::HashMap;

use crate::graph::writer::{CallEdgeSpec, InheritEdgeSpec, InheritKind};
use crate::parsing::{ClassRecord, FileRecord};
use crate::types::ImportsMap;

/// Names never worth an edge: language builtins that would otherwise pile
/// up as unresolved placeholders.
const BUILTIN_CALLS: &[&str] = &[
    "print", "len", "range", "isinstance", "enumerate", "zip", "sorted", "getattr", "setattr",
    "hasattr", "str", "int", "float", "bool", "list", "dict", "set", "tuple", "type", "open",
    "append", "log", "error", "warn", "info", "debug", "push", "pop", "join", "split", "format",
    "Sprintf", "Printf", "Println", "Errorf", "panic", "make", "new", "cap", "copy", "delete",
];

/// Map of `local binding → import record` for a file.
fn local_imports(record: &FileRecord) -> HashMap<&str, &crate::parsing::ImportRecord> {
    record
        .imports
        .iter()
        .map(|imp| (imp.local_name(), imp))
        .collect()
}

/// Path fragment a candidate must contain to match this import: the module
/// path with separators normalized (`pkg.alpha` → `pkg/alpha`).
fn module_fragment(import: &crate::parsing::ImportRecord) -> String {
    import
        .module
        .replace('.', "/")
        .trim_start_matches("./")
        .to_string()
}

/// Resolve every call site of `record` into writable edge specs.
pub fn resolve_calls(record: &FileRecord, imports_map: &ImportsMap) -> Vec<CallEdgeSpec> {
    let local_names = record.local_names();
    let locals = local_imports(record);
    let self_keywords = record.language.self_reference_keywords();

    let mut edges = Vec::with_capacity(record.function_calls.len());

    for call in &record.function_calls {
        let full = call.full_name.as_str();
        let base = full.split('.').next().filter(|_| full.contains('.'));
        let is_chained = full.matches('.').count() > 1;

        let lookup_name = if is_chained && base.is_some_and(|b| self_keywords.contains(&b)) {
            call.name.as_str()
        } else {
            base.unwrap_or(call.name.as_str())
        };

        let mut resolved: Option<String> = None;

        // 1. unchained self-reference receiver
        if base.is_some_and(|b| self_keywords.contains(&b)) && !is_chained {
            resolved = Some(record.path.clone());
        }
        // 2. defined in this file
        if resolved.is_none() && local_names.contains(lookup_name) {
            resolved = Some(record.path.clone());
        }
        // 3. inferred receiver type
        if resolved.is_none() {
            if let Some(obj_type) = &call.inferred_obj_type {
                if let Some(paths) = imports_map.get(obj_type) {
                    resolved = paths.first().cloned();
                }
            }
        }
        // 4/5. imports map, by the lookup name then the called name
        if resolved.is_none() {
            resolved = lookup_in_map(imports_map, lookup_name, &locals);
        }
        if resolved.is_none() && lookup_name != call.name {
            resolved = lookup_in_map(imports_map, &call.name, &locals);
        }
        // 2'. bare called name defined here (dotted call on a local helper)
        if resolved.is_none() && local_names.contains(call.name.as_str()) {
            resolved = Some(record.path.clone());
        }

        if resolved.is_none() && BUILTIN_CALLS.contains(&call.name.as_str()) {
            continue;
        }

        edges.push(CallEdgeSpec {
            caller_path: record.path.clone(),
            caller_symbol: call
                .caller
                .as_ref()
                .map(|c| (c.name.clone(), c.line_number)),
            callee_name: call.name.clone(),
            callee_path: resolved,
            line_number: call.line_number,
            args: call.args.clone(),
            full_call_name: call.full_name.clone(),
        });
    }

    edges
}

/// Steps 4–5 of the chain for one name.
fn lookup_in_map(
    imports_map: &ImportsMap,
    name: &str,
    locals: &HashMap<&str, &crate::parsing::ImportRecord>,
) -> Option<String> {
    let candidates = imports_map.get(name)?;
    match candidates.as_slice() {
        [] => None,
        [single] => Some(single.clone()),
        many => {
            let import = locals.get(name)?;
            // A direct map entry for the full dotted name wins.
            if let Some(direct) = imports_map.get(&import.full_import_name()) {
                if let [single] = direct.as_slice() {
                    return Some(single.clone());
                }
            }
            let fragment = module_fragment(import);
            many.iter().find(|p| p.contains(&fragment)).cloned()
        }
    }
}

/// Resolve base classes and implemented interfaces into edge specs.
/// Same-file candidates win over cross-file ones; unresolvable targets
/// produce no edge.
pub fn resolve_inheritance(record: &FileRecord, imports_map: &ImportsMap) -> Vec<InheritEdgeSpec> {
    let locals = local_imports(record);
    let local_types: std::collections::HashSet<&str> = record
        .classes
        .iter()
        .chain(&record.interfaces)
        .chain(&record.structs)
        .chain(&record.traits)
        .map(|c| c.name.as_str())
        .collect();

    let mut edges = Vec::new();

    let mut resolve_group = |group: &[ClassRecord]| {
        for class in group {
            for base in &class.bases {
                if base == "object" {
                    continue;
                }
                if let Some((parent_name, parent_path)) =
                    resolve_type_ref(base, record, &local_types, &locals, imports_map)
                {
                    edges.push(InheritEdgeSpec {
                        child_name: class.name.clone(),
                        child_path: record.path.clone(),
                        child_line: class.line_number,
                        parent_name,
                        parent_path,
                        kind: InheritKind::Inherits,
                    });
                }
            }
            for iface in &class.implements {
                if let Some((parent_name, parent_path)) =
                    resolve_type_ref(iface, record, &local_types, &locals, imports_map)
                {
                    edges.push(InheritEdgeSpec {
                        child_name: class.name.clone(),
                        child_path: record.path.clone(),
                        child_line: class.line_number,
                        parent_name,
                        parent_path,
                        kind: InheritKind::Implements,
                    });
                }
            }
        }
    };

    resolve_group(&record.classes);
    resolve_group(&record.interfaces);
    resolve_group(&record.structs);

    edges
}

/// Resolve a possibly-dotted type reference to `(simple_name, path)`.
fn resolve_type_ref(
    type_ref: &str,
    record: &FileRecord,
    local_types: &std::collections::HashSet<&str>,
    locals: &HashMap<&str, &crate::parsing::ImportRecord>,
    imports_map: &ImportsMap,
) -> Option<(String, String)> {
    let target_name = type_ref.rsplit('.').next().unwrap_or(type_ref).to_string();

    if type_ref.contains('.') {
        let prefix = type_ref.split('.').next().unwrap_or(type_ref);
        let import = locals.get(prefix)?;
        let fragment = module_fragment(import);
        let candidates = imports_map.get(&target_name)?;
        let path = candidates
            .iter()
            .find(|p| p.contains(&fragment))
            .cloned()
            .or_else(|| {
                if candidates.len() == 1 {
                    candidates.first().cloned()
                } else {
                    None
                }
            })?;
        return Some((target_name, path));
    }

    // Single-file scope wins over any cross-file candidate.
    if local_types.contains(type_ref) {
        return Some((target_name, record.path.clone()));
    }
    if let Some(import) = locals.get(type_ref) {
        let fragment = module_fragment(import);
        if let Some(candidates) = imports_map.get(&target_name) {
            if let Some(path) = candidates.iter().find(|p| p.contains(&fragment)) {
                return Some((target_name, path.clone()));
            }
            if candidates.len() == 1 {
                return Some((target_name, candidates[0].clone()));
            }
        }
        return None;
    }
    if let Some(candidates) = imports_map.get(type_ref) {
        if candidates.len() == 1 {
            return Some((target_name, candidates[0].clone()));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitsConfig;
    use crate::parsing::{ExtractorSet, Language};

    fn parse(path: &str, source: &str) -> FileRecord {
        let mut set = ExtractorSet::new(&LimitsConfig::default()).unwrap();
        set.parse_source(path, Language::Python, source).unwrap()
    }

    fn map(entries: &[(&str, &[&str])]) -> ImportsMap {
        entries
            .iter()
            .map(|(name, paths)| {
                (
                    name.to_string(),
                    paths.iter().map(|p| p.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn local_call_resolves_to_own_file() {
        let record = parse("a.py", "def foo():\n    pass\n\ndef bar():\n    foo()\n");
        let edges = resolve_calls(&record, &ImportsMap::new());
        let foo = edges.iter().find(|e| e.callee_name == "foo").unwrap();
        assert_eq!(foo.callee_path.as_deref(), Some("a.py"));
        assert_eq!(foo.caller_symbol.as_ref().unwrap().0, "bar");
    }

    #[test]
    fn self_method_call_resolves_locally() {
        let record = parse(
            "a.py",
            "class C:\n    def go(self):\n        self.stop()\n    def stop(self):\n        pass\n",
        );
        let edges = resolve_calls(&record, &ImportsMap::new());
        let stop = edges.iter().find(|e| e.callee_name == "stop").unwrap();
        assert_eq!(stop.callee_path.as_deref(), Some("a.py"));
    }

    #[test]
    fn unique_import_map_entry_resolves() {
        let record = parse("b.py", "from a import foo\n\ndef bar():\n    foo()\n");
        let edges = resolve_calls(&record, &map(&[("foo", &["a.py"])]));
        let foo = edges.iter().find(|e| e.callee_name == "foo").unwrap();
        assert_eq!(foo.callee_path.as_deref(), Some("a.py"));
        assert_eq!(foo.line_number, 4);
    }

    #[test]
    fn ambiguity_constrained_by_local_imports() {
        let record = parse(
            "b.py",
            "from pkg.alpha import foo\n\ndef bar():\n    foo()\n",
        );
        let edges = resolve_calls(
            &record,
            &map(&[("foo", &["pkg/alpha.py", "pkg/beta.py"])]),
        );
        let foo = edges.iter().find(|e| e.callee_name == "foo").unwrap();
        assert_eq!(foo.callee_path.as_deref(), Some("pkg/alpha.py"));
    }

    #[test]
    fn unknown_name_stays_unresolved() {
        let record = parse("b.py", "def bar():\n    mystery()\n");
        let edges = resolve_calls(&record, &ImportsMap::new());
        let m = edges.iter().find(|e| e.callee_name == "mystery").unwrap();
        assert!(m.callee_path.is_none());
    }

    #[test]
    fn builtins_are_skipped_entirely() {
        let record = parse("b.py", "def bar():\n    print('x')\n");
        let edges = resolve_calls(&record, &ImportsMap::new());
        assert!(edges.iter().all(|e| e.callee_name != "print"));
    }

    #[test]
    fn inferred_receiver_type_wins_over_map_ambiguity() {
        let record = parse(
            "b.py",
            "def bar():\n    c = Client()\n    c.fetch()\n",
        );
        let edges = resolve_calls(&record, &map(&[("Client", &["net/client.py"])]));
        let fetch = edges.iter().find(|e| e.callee_name == "fetch").unwrap();
        assert_eq!(fetch.callee_path.as_deref(), Some("net/client.py"));
    }

    #[test]
    fn inheritance_prefers_same_file() {
        let record = parse(
            "a.py",
            "class Base:\n    pass\n\nclass Child(Base):\n    pass\n",
        );
        // Another Base elsewhere must not shadow the local one.
        let edges = resolve_inheritance(&record, &map(&[("Base", &["other.py"])]));
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].parent_path, "a.py");
        assert_eq!(edges[0].kind, InheritKind::Inherits);
    }

    #[test]
    fn imported_base_resolves_through_map() {
        let record = parse(
            "b.py",
            "from core.models import Base\n\nclass Child(Base):\n    pass\n",
        );
        let edges = resolve_inheritance(
            &record,
            &map(&[("Base", &["core/models.py", "legacy/models.py"])]),
        );
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].parent_path, "core/models.py");
    }

    #[test]
    fn unresolvable_base_produces_no_edge() {
        let record = parse("b.py", "class Child(enum.Enum):\n    pass\n");
        let edges = resolve_inheritance(&record, &ImportsMap::new());
        assert!(edges.is_empty());
    }
}
