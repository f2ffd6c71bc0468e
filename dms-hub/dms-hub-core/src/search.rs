//! Local full-text index built on tantivy, used as the index service when no
//! remote one is configured.

use std::fmt::Display;
use std::path::Path;
use tantivy::{
    collector::{Count, TopDocs},
    directory::MmapDirectory,
    doc,
    query::{QueryParser, TermQuery},
    schema::{Field, IndexRecordOption, Schema, STORED, STRING, TEXT},
    Index, IndexReader, ReloadPolicy, Searcher, Term,
};
use uuid::Uuid;

use crate::error::{DmsError, DmsResult, INDEX_NOT_FOUND};
use crate::indexer::{IndexDescriptor, IndexService};

const WRITER_HEAP: usize = 50_000_000;

pub struct SearchIndex {
    index: Index,
    id: Field,
    title: Field,
    content: Field,
    collections: Field,
    visibility: Field,
    institution: Field,
}

fn engine_error(err: impl Display) -> DmsError {
    DmsError::index(500, err.to_string())
}

impl SearchIndex {
    fn schema() -> (Schema, [Field; 6]) {
        let mut schema_builder = Schema::builder();
        let id = schema_builder.add_text_field("id", STRING | STORED);
        let title = schema_builder.add_text_field("title", TEXT | STORED);
        let content = schema_builder.add_text_field("content", TEXT);
        let collections = schema_builder.add_text_field("collections", STRING | STORED);
        let visibility = schema_builder.add_text_field("visibility", STRING | STORED);
        let institution = schema_builder.add_text_field("institution", STRING);
        (
            schema_builder.build(),
            [id, title, content, collections, visibility, institution],
        )
    }

    fn with_index(index: Index, fields: [Field; 6]) -> Self {
        let [id, title, content, collections, visibility, institution] = fields;
        Self {
            index,
            id,
            title,
            content,
            collections,
            visibility,
            institution,
        }
    }

    pub fn new(path: impl AsRef<Path>) -> DmsResult<Self> {
        let (schema, fields) = Self::schema();
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;
        let dir = MmapDirectory::open(path).map_err(engine_error)?;
        let index = Index::open_or_create(dir, schema).map_err(engine_error)?;
        Ok(Self::with_index(index, fields))
    }

    pub fn in_memory() -> Self {
        let (schema, fields) = Self::schema();
        Self::with_index(Index::create_in_ram(schema), fields)
    }

    fn reader(&self) -> DmsResult<IndexReader> {
        self.index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommit)
            .try_into()
            .map_err(engine_error)
    }

    fn id_term(&self, id: Uuid) -> Term {
        Term::from_field_text(self.id, &id.to_string())
    }

    fn count_term(&self, searcher: &Searcher, term: Term) -> DmsResult<usize> {
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        searcher.search(&query, &Count).map_err(engine_error)
    }

    pub fn contains(&self, id: Uuid) -> DmsResult<bool> {
        let searcher = self.reader()?.searcher();
        Ok(self.count_term(&searcher, self.id_term(id))? > 0)
    }

    fn write(&self, descriptor: &IndexDescriptor, content: &str) -> DmsResult<()> {
        let mut writer = self.index.writer(WRITER_HEAP).map_err(engine_error)?;
        writer.delete_term(self.id_term(descriptor.id));
        let mut document = doc!(
            self.id => descriptor.id.to_string(),
            self.title => descriptor.title.as_str(),
            self.content => content,
            self.visibility => descriptor.visibility.as_str(),
            self.institution => descriptor.institution.as_str(),
        );
        for tag in &descriptor.collections {
            document.add_text(self.collections, tag);
        }
        writer.add_document(document).map_err(engine_error)?;
        writer.commit().map_err(engine_error)?;
        writer.wait_merging_threads().map_err(engine_error)?;
        Ok(())
    }

    pub fn search(&self, query: &str, limit: usize) -> DmsResult<Vec<Uuid>> {
        let searcher = self.reader()?.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.title, self.content]);
        let q = parser
            .parse_query(query)
            .map_err(|e| DmsError::InvalidInput(e.to_string()))?;
        let docs = searcher
            .search(&q, &TopDocs::with_limit(limit))
            .map_err(engine_error)?;
        Ok(self.ids_of(&searcher, docs))
    }

    /// Documents carrying the given collection facet tag.
    pub fn tagged(&self, tag: &str, limit: usize) -> DmsResult<Vec<Uuid>> {
        let searcher = self.reader()?.searcher();
        let query = TermQuery::new(
            Term::from_field_text(self.collections, tag),
            IndexRecordOption::Basic,
        );
        let docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .map_err(engine_error)?;
        Ok(self.ids_of(&searcher, docs))
    }

    fn ids_of(&self, searcher: &Searcher, docs: Vec<(f32, tantivy::DocAddress)>) -> Vec<Uuid> {
        docs.into_iter()
            .filter_map(|(_score, addr)| {
                let retrieved = searcher.doc(addr).ok()?;
                let field = retrieved.get_first(self.id)?;
                field.as_text().and_then(|s| Uuid::parse_str(s).ok())
            })
            .collect()
    }
}

impl IndexService for SearchIndex {
    fn add_document(&self, descriptor: &IndexDescriptor, content: &str) -> DmsResult<()> {
        self.write(descriptor, content)
    }

    fn update_document(&self, descriptor: &IndexDescriptor, content: &str) -> DmsResult<()> {
        self.write(descriptor, content)
    }

    fn remove_document(&self, descriptor: &IndexDescriptor) -> DmsResult<()> {
        if !self.contains(descriptor.id)? {
            return Err(DmsError::index(
                INDEX_NOT_FOUND,
                format!("document {} is not indexed", descriptor.id),
            ));
        }
        let mut writer = self.index.writer(WRITER_HEAP).map_err(engine_error)?;
        writer.delete_term(self.id_term(descriptor.id));
        writer.commit().map_err(engine_error)?;
        writer.wait_merging_threads().map_err(engine_error)?;
        Ok(())
    }
}
