//! Tantivy-backed fulltext search.
//!
//! Two logical indexes share one tantivy index, discriminated by `doc_type`:
//! `code_search` over symbol `{name, docstring, source}` and
//! `file_content_search` over `File.source_code`. Documents are keyed by
//! `(repo, path)` so a file update is delete-by-term plus re-add.

use std::path::Path;
use std::sync::Mutex;

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, STORED, STRING, Schema, SchemaBuilder, TextFieldIndexing,
    TextOptions, Value,
};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use crate::error::{GraphError, GraphResult};
use crate::graph::model::{FileNode, SymbolNode};

const DOC_SYMBOL: &str = "symbol";
const DOC_FILE: &str = "file";
const WRITER_BUFFER_BYTES: usize = 50_000_000;

struct Fields {
    doc_type: Field,
    repo: Field,
    path: Field,
    /// `repo\u{0}path` exact-match key used for per-file deletes.
    file_key: Field,
    name: Field,
    kind: Field,
    line_number: Field,
    docstring: Field,
    source: Field,
    source_code: Field,
}

fn build_schema() -> (Schema, Fields) {
    let mut builder = SchemaBuilder::default();

    let text = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer("default")
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();
    let text_unstored = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer("default")
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );

    let doc_type = builder.add_text_field("doc_type", STRING | STORED);
    let repo = builder.add_text_field("repo", STRING | STORED);
    let path = builder.add_text_field("path", STRING | STORED);
    let file_key = builder.add_text_field("file_key", STRING);
    let name = builder.add_text_field("name", text.clone());
    let kind = builder.add_text_field("kind", STRING | STORED);
    let line_number = builder.add_u64_field("line_number", STORED);
    let docstring = builder.add_text_field("docstring", text.clone());
    let source = builder.add_text_field("source", text);
    // File text is indexed for matching but never stored here; the graph
    // store is the source of truth for file content.
    let source_code = builder.add_text_field("source_code", text_unstored);

    let schema = builder.build();
    let fields = Fields {
        doc_type,
        repo,
        path,
        file_key,
        name,
        kind,
        line_number,
        docstring,
        source,
        source_code,
    };
    (schema, fields)
}

fn file_key(repo: &str, path: &str) -> String {
    format!("{repo}\u{0}{path}")
}

/// One `code_search` hit.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CodeSearchHit {
    pub repo: String,
    pub path: String,
    pub name: String,
    pub kind: String,
    pub line_number: u32,
    pub score: f32,
}

/// One `file_content_search` hit.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FileSearchHit {
    pub repo: String,
    pub path: String,
    pub score: f32,
}

pub struct FulltextIndex {
    index: Index,
    reader: IndexReader,
    fields: Fields,
    writer: Mutex<IndexWriter<TantivyDocument>>,
}

impl FulltextIndex {
    pub fn open(dir: &Path) -> GraphResult<Self> {
        std::fs::create_dir_all(dir).map_err(|e| GraphError::Fulltext {
            operation: "open".to_string(),
            cause: e.to_string(),
        })?;
        let (schema, fields) = build_schema();
        let index = if dir.join("meta.json").exists() {
            Index::open_in_dir(dir)
        } else {
            Index::create_in_dir(dir, schema)
        }
        .map_err(|e| GraphError::Fulltext {
            operation: "open".to_string(),
            cause: e.to_string(),
        })?;
        Self::from_index(index, fields)
    }

    /// RAM-backed index, used by tests and ephemeral runs.
    pub fn in_ram() -> GraphResult<Self> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        Self::from_index(index, fields)
    }

    fn from_index(index: Index, fields: Fields) -> GraphResult<Self> {
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e: tantivy::TantivyError| GraphError::Fulltext {
                operation: "reader".to_string(),
                cause: e.to_string(),
            })?;
        let writer = index
            .writer(WRITER_BUFFER_BYTES)
            .map_err(|e| GraphError::Fulltext {
                operation: "writer".to_string(),
                cause: e.to_string(),
            })?;
        Ok(Self {
            index,
            reader,
            fields,
            writer: Mutex::new(writer),
        })
    }

    /// Replace all documents for one file: its file doc plus its symbols.
    pub fn reindex_file(&self, file: &FileNode, symbols: &[&SymbolNode]) -> GraphResult<()> {
        let writer = self.writer.lock().expect("fulltext writer poisoned");
        let key = file_key(&file.repo, &file.path);
        writer.delete_term(Term::from_field_text(self.fields.file_key, &key));

        if let Some(source_code) = &file.source_code {
            let mut doc = TantivyDocument::default();
            doc.add_text(self.fields.doc_type, DOC_FILE);
            doc.add_text(self.fields.repo, &file.repo);
            doc.add_text(self.fields.path, &file.path);
            doc.add_text(self.fields.file_key, &key);
            doc.add_text(self.fields.source_code, source_code);
            writer.add_document(doc).map_err(|e| GraphError::Fulltext {
                operation: "add file doc".to_string(),
                cause: e.to_string(),
            })?;
        }

        for symbol in symbols {
            let mut doc = TantivyDocument::default();
            doc.add_text(self.fields.doc_type, DOC_SYMBOL);
            doc.add_text(self.fields.repo, &symbol.repo);
            doc.add_text(self.fields.path, &symbol.path);
            doc.add_text(self.fields.file_key, &key);
            doc.add_text(self.fields.name, &symbol.name);
            doc.add_text(self.fields.kind, symbol.kind.as_str());
            doc.add_u64(self.fields.line_number, u64::from(symbol.line_number));
            if let Some(docstring) = &symbol.docstring {
                doc.add_text(self.fields.docstring, docstring);
            }
            doc.add_text(self.fields.source, &symbol.source);
            writer.add_document(doc).map_err(|e| GraphError::Fulltext {
                operation: "add symbol doc".to_string(),
                cause: e.to_string(),
            })?;
        }
        Ok(())
    }

    pub fn remove_file(&self, repo: &str, path: &str) {
        let writer = self.writer.lock().expect("fulltext writer poisoned");
        writer.delete_term(Term::from_field_text(
            self.fields.file_key,
            &file_key(repo, path),
        ));
    }

    pub fn remove_repository(&self, repo: &str) {
        let writer = self.writer.lock().expect("fulltext writer poisoned");
        writer.delete_term(Term::from_field_text(self.fields.repo, repo));
    }

    /// Make pending writes visible to searches.
    pub fn commit(&self) -> GraphResult<()> {
        {
            let mut writer = self.writer.lock().expect("fulltext writer poisoned");
            writer.commit().map_err(|e| GraphError::Fulltext {
                operation: "commit".to_string(),
                cause: e.to_string(),
            })?;
        }
        self.reader.reload().map_err(|e| GraphError::Fulltext {
            operation: "reload".to_string(),
            cause: e.to_string(),
        })
    }

    /// `code_search`: query over symbol name, docstring and source.
    pub fn code_search(
        &self,
        query: &str,
        repo: Option<&str>,
        limit: usize,
    ) -> GraphResult<Vec<CodeSearchHit>> {
        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(
            &self.index,
            vec![self.fields.name, self.fields.docstring, self.fields.source],
        );
        let parsed = parser
            .parse_query(query)
            .map_err(|e| GraphError::Fulltext {
                operation: "parse query".to_string(),
                cause: e.to_string(),
            })?;
        let full_query = self.scoped(parsed, DOC_SYMBOL, repo);

        let top = searcher
            .search(&full_query, &TopDocs::with_limit(limit.max(1)))
            .map_err(|e| GraphError::Fulltext {
                operation: "search".to_string(),
                cause: e.to_string(),
            })?;

        let mut hits = Vec::with_capacity(top.len());
        for (score, addr) in top {
            let doc: TantivyDocument =
                searcher.doc(addr).map_err(|e| GraphError::Fulltext {
                    operation: "fetch doc".to_string(),
                    cause: e.to_string(),
                })?;
            let text = |field| {
                doc.get_first(field)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            hits.push(CodeSearchHit {
                repo: text(self.fields.repo),
                path: text(self.fields.path),
                name: text(self.fields.name),
                kind: text(self.fields.kind),
                line_number: doc
                    .get_first(self.fields.line_number)
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as u32,
                score,
            });
        }
        Ok(hits)
    }

    /// `file_content_search`: files whose source matches the query.
    pub fn file_content_search(
        &self,
        query: &str,
        repo: Option<&str>,
        limit: usize,
    ) -> GraphResult<Vec<FileSearchHit>> {
        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.fields.source_code]);
        let parsed = parser
            .parse_query(query)
            .map_err(|e| GraphError::Fulltext {
                operation: "parse query".to_string(),
                cause: e.to_string(),
            })?;
        let full_query = self.scoped(parsed, DOC_FILE, repo);

        let top = searcher
            .search(&full_query, &TopDocs::with_limit(limit.max(1)))
            .map_err(|e| GraphError::Fulltext {
                operation: "search".to_string(),
                cause: e.to_string(),
            })?;

        let mut hits = Vec::with_capacity(top.len());
        for (score, addr) in top {
            let doc: TantivyDocument =
                searcher.doc(addr).map_err(|e| GraphError::Fulltext {
                    operation: "fetch doc".to_string(),
                    cause: e.to_string(),
                })?;
            let text = |field| {
                doc.get_first(field)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            hits.push(FileSearchHit {
                repo: text(self.fields.repo),
                path: text(self.fields.path),
                score,
            });
        }
        Ok(hits)
    }

    fn scoped(&self, inner: Box<dyn Query>, doc_type: &str, repo: Option<&str>) -> BooleanQuery {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![
            (Occur::Must, inner),
            (
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_field_text(self.fields.doc_type, doc_type),
                    IndexRecordOption::Basic,
                )),
            ),
        ];
        if let Some(repo) = repo {
            clauses.push((
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_field_text(self.fields.repo, repo),
                    IndexRecordOption::Basic,
                )),
            ));
        }
        BooleanQuery::new(clauses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::model::SymbolKind;

    fn sample_symbol(name: &str, path: &str) -> SymbolNode {
        SymbolNode {
            kind: SymbolKind::Function,
            name: name.to_string(),
            repo: "o/r".to_string(),
            path: path.to_string(),
            line_number: 3,
            end_line: 5,
            source: format!("def {name}():\n    return compute_total()"),
            docstring: Some("Computes the grand total.".to_string()),
            args: vec![],
            bases: vec![],
            decorators: vec![],
            visibility: None,
            cyclomatic_complexity: None,
            is_dependency: false,
        }
    }

    fn sample_file(path: &str, source: &str) -> FileNode {
        FileNode {
            repo: "o/r".to_string(),
            path: path.to_string(),
            name: path.to_string(),
            language: "python".to_string(),
            lines_count: source.matches('\n').count() as u32 + 1,
            source_code: Some(source.to_string()),
            is_dependency: false,
        }
    }

    #[test]
    fn code_search_finds_symbol_by_docstring() {
        let index = FulltextIndex::in_ram().unwrap();
        let file = sample_file("billing.py", "def total(): pass\n");
        let symbol = sample_symbol("total", "billing.py");
        index.reindex_file(&file, &[&symbol]).unwrap();
        index.commit().unwrap();

        let hits = index.code_search("grand total", Some("o/r"), 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "total");
        assert_eq!(hits[0].kind, "function");
        assert_eq!(hits[0].line_number, 3);
    }

    #[test]
    fn file_content_search_scopes_by_repo() {
        let index = FulltextIndex::in_ram().unwrap();
        let file = sample_file("a.py", "result = compute_total()\n");
        index.reindex_file(&file, &[]).unwrap();
        index.commit().unwrap();

        assert_eq!(
            index
                .file_content_search("compute_total", Some("o/r"), 10)
                .unwrap()
                .len(),
            1
        );
        assert!(index
            .file_content_search("compute_total", Some("other/repo"), 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn reindex_replaces_previous_documents() {
        let index = FulltextIndex::in_ram().unwrap();
        let file = sample_file("a.py", "alpha_marker = 1\n");
        index.reindex_file(&file, &[]).unwrap();
        index.commit().unwrap();
        assert_eq!(index.file_content_search("alpha_marker", None, 10).unwrap().len(), 1);

        let updated = sample_file("a.py", "beta_marker = 2\n");
        index.reindex_file(&updated, &[]).unwrap();
        index.commit().unwrap();
        assert!(index.file_content_search("alpha_marker", None, 10).unwrap().is_empty());
        assert_eq!(index.file_content_search("beta_marker", None, 10).unwrap().len(), 1);
    }

    #[test]
    fn remove_repository_clears_documents() {
        let index = FulltextIndex::in_ram().unwrap();
        let file = sample_file("a.py", "def gamma(): pass\n");
        let symbol = sample_symbol("gamma", "a.py");
        index.reindex_file(&file, &[&symbol]).unwrap();
        index.commit().unwrap();

        index.remove_repository("o/r");
        index.commit().unwrap();
        assert!(index.code_search("gamma", None, 10).unwrap().is_empty());
    }
}
