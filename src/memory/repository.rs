//! Memory-specific operations over the generic [`Repository`].
//!
//! Adds embedding on write, kNN / keyword / hybrid retrieval with per-user,
//! tag, type and parent filters, paginated listing, and the specialised
//! listings the enrichment worker and reports use (unprocessed raw memories,
//! a day's raw memories, projects, tasks). Writes are mirrored to disk when a
//! [`FileMirror`] is attached.

use std::sync::Arc;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::dates;
use super::mirror::FileMirror;
use super::types::{memory_mapping, MemoryDocument, MemoryFilters, MemoryPatch, MemoryType};
use crate::config::XMemoryConfig;
use crate::embedding::{embed_required, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::store::query::{BoolQuery, KnnQuery, Query, RangeBounds, SearchRequest, SortField, SortOrder};
use crate::store::repository::{Hit, Repository};
use crate::store::StoreClient;

/// A scored memory. `source.id` is always set.
pub type MemoryHit = Hit<MemoryDocument>;

/// Keyword fields and boosts shared by keyword and hybrid search.
const KEYWORD_FIELDS: &[&str] = &["title^2", "content"];

/// Size of the first `get_projects` page; larger result sets trigger a second pass.
const PROJECTS_FIRST_PAGE: usize = 10;

/// Timestamp field to order listings by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl SortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }
}

impl std::str::FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created_at" => Ok(Self::CreatedAt),
            "updated_at" => Ok(Self::UpdatedAt),
            _ => Err(format!("unknown sort field: {s}")),
        }
    }
}

/// One page of a listing. `total` comes from a separate count and may disagree
/// with `items` under concurrent writes.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryPage {
    pub items: Vec<MemoryDocument>,
    pub total: u64,
    pub page: usize,
    pub page_size: usize,
}

impl MemoryPage {
    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(self.page_size.max(1) as u64)
    }
}

#[derive(Clone)]
pub struct MemoryRepository {
    repo: Repository<MemoryDocument>,
    embedder: Arc<dyn EmbeddingProvider>,
    mirror: Option<FileMirror>,
    candidate_multiplier: usize,
    utc_offset: FixedOffset,
}

impl MemoryRepository {
    /// Repository over `index`, with a mapping sized to the embedder's dimension.
    pub fn new(client: StoreClient, index: &str, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        let mapping = memory_mapping(embedder.dimensions());
        Self {
            repo: Repository::new(client, index, mapping),
            embedder,
            mirror: None,
            candidate_multiplier: 10,
            utc_offset: dates::utc(),
        }
    }

    /// Build from configuration. The embedder must produce the configured dimension.
    pub fn from_config(
        client: StoreClient,
        config: &XMemoryConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        if embedder.dimensions() != config.embedding.dimension {
            return Err(Error::Config(format!(
                "embedding model {} produces {} dimensions, config says {}",
                embedder.model_name(),
                embedder.dimensions(),
                config.embedding.dimension
            )));
        }
        let mut repo = Self::new(client, &config.store.index, embedder)
            .with_candidate_multiplier(config.retrieval.num_candidates_multiplier)
            .with_utc_offset(dates::parse_utc_offset(&config.store.utc_offset)?);
        if let Some(dir) = config.resolved_mirror_dir() {
            repo = repo.with_mirror(FileMirror::new(dir));
        }
        Ok(repo)
    }

    pub fn with_mirror(mut self, mirror: FileMirror) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn with_candidate_multiplier(mut self, multiplier: usize) -> Self {
        self.candidate_multiplier = multiplier.max(1);
        self
    }

    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn utc_offset(&self) -> FixedOffset {
        self.utc_offset
    }

    pub fn index(&self) -> &str {
        self.repo.index()
    }

    pub fn repository(&self) -> &Repository<MemoryDocument> {
        &self.repo
    }

    /// Current time in the configured offset.
    pub fn now(&self) -> chrono::DateTime<FixedOffset> {
        dates::now(self.utc_offset)
    }

    /// Create the memory index if it does not exist.
    pub async fn initialize(&self) -> Result<()> {
        self.repo.create_index().await
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        let expected = self.embedder.dimensions();
        if vector.len() != expected {
            return Err(Error::validation(format!(
                "embedding has {} dimensions, expected {expected}",
                vector.len()
            )));
        }
        Ok(())
    }

    async fn mirror_save(&self, id: &str, doc: &MemoryDocument) {
        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.save(id, doc).await {
                tracing::warn!(id = %id, error = %e, "failed to mirror memory");
            }
        }
    }

    // ── Writes ──────────────────────────────────────────────────────────

    /// Embed (unless a vector is supplied) and index `doc`. Returns the new id.
    ///
    /// Embedding is optional here: blank content or a provider failure stores
    /// the memory without a vector.
    pub async fn create_memory(&self, mut doc: MemoryDocument) -> Result<String> {
        if doc.content.trim().is_empty() {
            return Err(Error::validation("memory content is empty"));
        }

        match &doc.embedding {
            Some(vector) => self.check_dimensions(vector)?,
            None => match self.embedder.embed(&doc.content).await {
                Ok(Some(vector)) => {
                    self.check_dimensions(&vector)?;
                    doc.embedding = Some(vector);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "embedding failed, storing memory without a vector");
                }
            },
        }

        let id = self.repo.index_document(&doc, None).await?;
        tracing::info!(
            id = %id,
            user_id = %doc.user_id,
            memory_type = %doc.memory_type,
            embedded = doc.embedding.is_some(),
            "memory created"
        );
        self.mirror_save(&id, &doc).await;
        Ok(id)
    }

    /// Merge `doc` into the stored memory and refresh `updated_at`.
    ///
    /// Does not re-embed: callers that change `content` pass a fresh vector.
    /// Returns `false` when the id is unknown or the backend refuses the write;
    /// fails when `user_id` or `memory_type` would change.
    pub async fn update_memory(&self, id: &str, doc: &MemoryDocument) -> Result<bool> {
        let Some(existing) = self.repo.get_document(id).await else {
            return Ok(false);
        };
        if existing.user_id != doc.user_id {
            return Err(Error::validation("user_id cannot be changed"));
        }
        if existing.memory_type != doc.memory_type {
            return Err(Error::validation("memory_type cannot be changed"));
        }
        if let Some(vector) = &doc.embedding {
            self.check_dimensions(vector)?;
        }

        let mut doc = doc.clone();
        doc.id = None;
        doc.updated_at = self.now();
        let updated = self.repo.update_document(id, &serde_json::to_value(&doc)?).await;
        if updated {
            tracing::debug!(id = %id, "memory updated");
            if let Some(merged) = self.repo.get_document(id).await {
                self.mirror_save(id, &merged).await;
            }
        }
        Ok(updated)
    }

    /// Apply `patch` to a stored memory, re-embedding when the content changes.
    /// Returns `false` when the id is unknown.
    pub async fn edit_memory(&self, id: &str, patch: MemoryPatch) -> Result<bool> {
        let Some(mut doc) = self.get_memory(id).await else {
            return Ok(false);
        };
        if patch.apply(&mut doc) {
            if doc.content.trim().is_empty() {
                return Err(Error::validation("memory content is empty"));
            }
            doc.embedding = Some(embed_required(self.embedder.as_ref(), &doc.content).await?);
            tracing::debug!(id = %id, "content changed, re-embedded");
        }
        self.update_memory(id, &doc).await
    }

    /// Flag a memory as enriched. `false` if it could not be written.
    pub async fn mark_processed(&self, id: &str) -> bool {
        let patch = json!({
            "processed": true,
            "updated_at": dates::format_timestamp(&self.now()),
        });
        let updated = self.repo.update_document(id, &patch).await;
        if updated {
            if let Some(stored) = self.repo.get_document(id).await {
                self.mirror_save(id, &stored).await;
            }
        }
        updated
    }

    /// Remove the memory and its mirror file. `false` if it did not exist.
    pub async fn delete_memory(&self, id: &str) -> bool {
        let owner = self.repo.get_document(id).await.map(|d| d.user_id);
        let deleted = self.repo.delete_document(id).await;
        if deleted {
            tracing::info!(id = %id, "memory deleted");
            if let (Some(mirror), Some(user_id)) = (&self.mirror, owner) {
                if let Err(e) = mirror.remove(&user_id, id).await {
                    tracing::warn!(id = %id, error = %e, "failed to remove mirrored memory");
                }
            }
        }
        deleted
    }

    // ── Reads ───────────────────────────────────────────────────────────

    /// Fetch a memory without its vector.
    pub async fn get_memory(&self, id: &str) -> Option<MemoryDocument> {
        self.repo
            .get_document(id)
            .await
            .map(MemoryDocument::without_embedding)
    }

    pub async fn get_memory_with_embedding(&self, id: &str) -> Option<MemoryDocument> {
        self.repo.get_document(id).await
    }

    /// Paginated listing; `page` starts at 1. `items` and `total` come from two
    /// separate calls.
    pub async fn list_memories(
        &self,
        filters: &MemoryFilters,
        page: usize,
        page_size: usize,
        sort_by: SortBy,
        sort_order: SortOrder,
    ) -> Result<MemoryPage> {
        if page == 0 {
            return Err(Error::validation("page starts at 1"));
        }
        if page_size == 0 {
            return Err(Error::validation("page_size must be at least 1"));
        }

        let from = (page - 1)
            .checked_mul(page_size)
            .ok_or_else(|| Error::validation(format!("page {page} is out of range")))?;

        let query = filter_query(filters);
        let request = SearchRequest::query(query.clone())
            .size(page_size)
            .from(from)
            .sort(SortField::new(sort_by.as_str(), sort_order));

        let items = sources(self.repo.search(request).await?);
        let total = self.repo.count(&query).await?;
        Ok(MemoryPage {
            items,
            total,
            page,
            page_size,
        })
    }

    /// Keyword search over `title` (boosted) and `content`.
    pub async fn search_memories(
        &self,
        query: &str,
        filters: &MemoryFilters,
        size: usize,
    ) -> Result<Vec<MemoryHit>> {
        let mut bool_query = BoolQuery::new().must(Query::multi_match(query, KEYWORD_FIELDS));
        for clause in filters.clauses() {
            bool_query = bool_query.filter(clause);
        }
        self.repo
            .search(SearchRequest::query(bool_query.build()).size(size))
            .await
    }

    /// k-nearest-neighbour search. Filters narrow the candidates before
    /// ranking; `num_candidates` defaults to `k` times the configured multiplier.
    pub async fn search_by_vector(
        &self,
        vector: &[f32],
        filters: &MemoryFilters,
        k: usize,
        num_candidates: Option<usize>,
        return_vector: bool,
    ) -> Result<Vec<MemoryHit>> {
        self.check_dimensions(vector)?;
        if k == 0 {
            return Err(Error::validation("k must be at least 1"));
        }
        let num_candidates = match num_candidates {
            Some(n) => n,
            None => k.checked_mul(self.candidate_multiplier).ok_or_else(|| {
                Error::validation(format!("k {k} is too large for the candidate pool"))
            })?,
        };
        let knn = KnnQuery {
            field: "embedding".into(),
            query_vector: vector.to_vec(),
            k,
            num_candidates,
            filter: (!filters.is_empty()).then(|| filter_query(filters)),
        };
        self.repo
            .search_with_vectors(SearchRequest::knn(knn), return_vector)
            .await
    }

    /// Embed `text` and run [`search_by_vector`](Self::search_by_vector).
    /// Fails when `text` yields no vector.
    pub async fn search_by_similarity(
        &self,
        text: &str,
        filters: &MemoryFilters,
        k: usize,
    ) -> Result<Vec<MemoryHit>> {
        let vector = embed_required(self.embedder.as_ref(), text).await?;
        self.search_by_vector(&vector, filters, k, None, false).await
    }

    /// Keyword-filtered search re-ranked by vector similarity.
    ///
    /// The keyword clause is mandatory; similarity (`cos + 1`) only adds to the
    /// score. `vector_weight` is accepted but not applied.
    pub async fn hybrid_search(
        &self,
        text: &str,
        vector: &[f32],
        filters: &MemoryFilters,
        k: usize,
        vector_weight: f64,
    ) -> Result<Vec<MemoryHit>> {
        self.check_dimensions(vector)?;
        tracing::debug!(vector_weight, "hybrid search; vector weight is not applied");

        let mut bool_query = BoolQuery::new()
            .must(Query::multi_match(text, KEYWORD_FIELDS))
            .should(Query::vector_similarity("embedding", vector.to_vec()))
            .minimum_should_match(1);
        for clause in filters.clauses() {
            bool_query = bool_query.filter(clause);
        }
        self.repo
            .search(SearchRequest::query(bool_query.build()).size(k))
            .await
    }

    // ── Specialised listings ────────────────────────────────────────────

    /// Oldest-first raw memories that have not been enriched yet. A missing
    /// `processed` flag counts as unprocessed.
    pub async fn get_unprocessed_memories(
        &self,
        batch_size: usize,
        user_id: Option<&str>,
    ) -> Result<Vec<MemoryDocument>> {
        let mut query = BoolQuery::new()
            .filter(Query::term("memory_type", MemoryType::Raw.as_str()))
            .must_not(Query::term("processed", true));
        if let Some(user_id) = user_id {
            query = query.filter(Query::term("user_id", user_id));
        }
        let request = SearchRequest::query(query.build())
            .size(batch_size)
            .sort(SortField::asc("created_at"));
        Ok(sources(self.repo.search(request).await?))
    }

    /// Raw memories created on the day `date` names, oldest first.
    pub async fn get_raw_memory_of_the_day(
        &self,
        date: &str,
        user_id: Option<&str>,
        size: usize,
    ) -> Result<Vec<MemoryDocument>> {
        let day = dates::parse_day(date, self.utc_offset)?;
        let (start, end) = dates::day_range(day, self.utc_offset)?;

        let mut query = BoolQuery::new()
            .filter(Query::term("memory_type", MemoryType::Raw.as_str()))
            .filter(Query::range(
                "created_at",
                RangeBounds {
                    gte: Some(dates::format_timestamp(&start).into()),
                    lte: Some(dates::format_timestamp(&end).into()),
                    ..Default::default()
                },
            ));
        if let Some(user_id) = user_id {
            query = query.filter(Query::term("user_id", user_id));
        }
        let request = SearchRequest::query(query.build())
            .size(size)
            .sort(SortField::asc("created_at"));
        Ok(sources(self.repo.search(request).await?))
    }

    /// Every project memory. Fetches one short page, and re-queries with the
    /// exact count when that page was truncated.
    pub async fn get_projects(&self, user_id: Option<&str>) -> Result<Vec<MemoryDocument>> {
        let mut filters = MemoryFilters::new().memory_type(MemoryType::Project);
        filters.user_id = user_id.map(str::to_string);
        let query = filter_query(&filters);

        let request = |size| {
            SearchRequest::query(query.clone())
                .size(size)
                .sort(SortField::asc("created_at"))
        };
        let mut projects = sources(self.repo.search(request(PROJECTS_FIRST_PAGE)).await?);
        let total = self.repo.count(&query).await? as usize;
        if total > projects.len() {
            tracing::debug!(total, first_page = projects.len(), "fetching all projects");
            projects = sources(self.repo.search(request(total)).await?);
        }
        Ok(projects)
    }

    /// Tasks under `project_id` owned by `user_id`, oldest first.
    pub async fn get_tasks(&self, user_id: &str, project_id: &str) -> Result<Vec<MemoryDocument>> {
        let filters = MemoryFilters::new()
            .user(user_id)
            .memory_type(MemoryType::Task)
            .parent(project_id);
        let query = filter_query(&filters);

        let total = self.repo.count(&query).await? as usize;
        if total == 0 {
            return Ok(Vec::new());
        }
        let request = SearchRequest::query(query)
            .size(total)
            .sort(SortField::asc("created_at"));
        Ok(sources(self.repo.search(request).await?))
    }
}

/// Conjunction of `filters`, or match-all when there are none.
fn filter_query(filters: &MemoryFilters) -> Query {
    let clauses = filters.clauses();
    if clauses.is_empty() {
        return Query::MatchAll;
    }
    clauses
        .into_iter()
        .fold(BoolQuery::new(), BoolQuery::filter)
        .build()
}

fn sources(hits: Vec<MemoryHit>) -> Vec<MemoryDocument> {
    hits.into_iter().map(|h| h.source).collect()
}
