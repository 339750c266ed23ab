//! Typed query DSL shared by every backend.
//!
//! Queries are built as Rust values and rendered to the search engine's JSON
//! DSL by [`Query::to_json`]; the embedded backend compiles the same values to
//! SQL. Only the subset the memory layer needs is modelled.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A query clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    MatchAll,
    /// Exact match on a keyword/boolean/date field. For array fields, matches
    /// when any element equals `value`.
    Term { field: String, value: Value },
    /// Exact match against any of `values`.
    Terms { field: String, values: Vec<Value> },
    Range { field: String, bounds: RangeBounds },
    /// Full-text match of `query` against several text fields, OR-of-terms.
    MultiMatch {
        query: String,
        fields: Vec<BoostedField>,
    },
    Bool(BoolQuery),
    /// Matches every document; scores `cosine(vector, field) + 1.0`, or 0 when
    /// the document has no vector.
    VectorSimilarity { field: String, vector: Vec<f32> },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeBounds {
    pub gte: Option<Value>,
    pub gt: Option<Value>,
    pub lte: Option<Value>,
    pub lt: Option<Value>,
}

/// A field name with a relevance boost, written `name^boost` in the JSON DSL.
#[derive(Debug, Clone, PartialEq)]
pub struct BoostedField {
    pub name: String,
    pub boost: f64,
}

impl BoostedField {
    /// Parse `"title^2"` or `"content"`.
    pub fn parse(field: &str) -> Self {
        match field.split_once('^') {
            Some((name, boost)) => Self {
                name: name.to_string(),
                boost: boost.parse().unwrap_or(1.0),
            },
            None => Self {
                name: field.to_string(),
                boost: 1.0,
            },
        }
    }

    fn render(&self) -> String {
        if (self.boost - 1.0).abs() < f64::EPSILON {
            self.name.clone()
        } else {
            format!("{}^{}", self.name, self.boost)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolQuery {
    pub must: Vec<Query>,
    pub filter: Vec<Query>,
    pub should: Vec<Query>,
    pub must_not: Vec<Query>,
    pub minimum_should_match: Option<u32>,
}

impl BoolQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(mut self, query: Query) -> Self {
        self.must.push(query);
        self
    }

    pub fn filter(mut self, query: Query) -> Self {
        self.filter.push(query);
        self
    }

    pub fn should(mut self, query: Query) -> Self {
        self.should.push(query);
        self
    }

    pub fn must_not(mut self, query: Query) -> Self {
        self.must_not.push(query);
        self
    }

    pub fn minimum_should_match(mut self, n: u32) -> Self {
        self.minimum_should_match = Some(n);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
            && self.filter.is_empty()
            && self.should.is_empty()
            && self.must_not.is_empty()
    }

    /// Effective `minimum_should_match`: explicit value, else 1 when the bool has
    /// only `should` clauses, else 0.
    pub fn effective_minimum_should_match(&self) -> u32 {
        match self.minimum_should_match {
            Some(n) => n,
            None if !self.should.is_empty() && self.must.is_empty() && self.filter.is_empty() => 1,
            None => 0,
        }
    }

    pub fn build(self) -> Query {
        Query::Bool(self)
    }
}

impl Query {
    pub fn term(field: &str, value: impl Into<Value>) -> Self {
        Self::Term {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn terms<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Self::Terms {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn range(field: &str, bounds: RangeBounds) -> Self {
        Self::Range {
            field: field.to_string(),
            bounds,
        }
    }

    /// `fields` use the `name^boost` notation.
    pub fn multi_match(query: &str, fields: &[&str]) -> Self {
        Self::MultiMatch {
            query: query.to_string(),
            fields: fields.iter().map(|f| BoostedField::parse(f)).collect(),
        }
    }

    pub fn vector_similarity(field: &str, vector: Vec<f32>) -> Self {
        Self::VectorSimilarity {
            field: field.to_string(),
            vector,
        }
    }

    /// Render to the search engine's JSON query DSL.
    pub fn to_json(&self) -> Value {
        match self {
            Self::MatchAll => json!({ "match_all": {} }),
            Self::Term { field, value } => json!({ "term": { field.as_str(): value } }),
            Self::Terms { field, values } => json!({ "terms": { field.as_str(): values } }),
            Self::Range { field, bounds } => {
                let mut body = Map::new();
                for (key, value) in [
                    ("gte", &bounds.gte),
                    ("gt", &bounds.gt),
                    ("lte", &bounds.lte),
                    ("lt", &bounds.lt),
                ] {
                    if let Some(v) = value {
                        body.insert(key.to_string(), v.clone());
                    }
                }
                json!({ "range": { field.as_str(): body } })
            }
            Self::MultiMatch { query, fields } => {
                let fields: Vec<String> = fields.iter().map(BoostedField::render).collect();
                json!({ "multi_match": { "query": query, "fields": fields } })
            }
            Self::Bool(b) => {
                let mut body = Map::new();
                for (key, clauses) in [
                    ("must", &b.must),
                    ("filter", &b.filter),
                    ("should", &b.should),
                    ("must_not", &b.must_not),
                ] {
                    if !clauses.is_empty() {
                        body.insert(
                            key.to_string(),
                            Value::Array(clauses.iter().map(Query::to_json).collect()),
                        );
                    }
                }
                if let Some(n) = b.minimum_should_match {
                    body.insert("minimum_should_match".to_string(), json!(n));
                }
                json!({ "bool": body })
            }
            Self::VectorSimilarity { field, vector } => json!({
                "script_score": {
                    "query": { "match_all": {} },
                    "script": {
                        "source": format!(
                            "doc['{field}'].size() == 0 ? 0 : cosineSimilarity(params.query_vector, '{field}') + 1.0"
                        ),
                        "params": { "query_vector": vector }
                    }
                }
            }),
        }
    }
}

/// Approximate nearest-neighbour request. `filter` narrows the candidate set
/// before ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct KnnQuery {
    pub field: String,
    pub query_vector: Vec<f32>,
    pub k: usize,
    pub num_candidates: usize,
    pub filter: Option<Query>,
}

impl KnnQuery {
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "field": self.field,
            "query_vector": self.query_vector,
            "k": self.k,
            "num_candidates": self.num_candidates,
        });
        if let Some(filter) = &self.filter {
            body["filter"] = filter.to_json();
        }
        body
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(format!("unknown sort order: {s}")),
        }
    }
}

/// Sort key. The pseudo-field `_score` sorts by relevance.
#[derive(Debug, Clone, PartialEq)]
pub struct SortField {
    pub field: String,
    pub order: SortOrder,
}

impl SortField {
    pub const SCORE: &'static str = "_score";

    pub fn new(field: &str, order: SortOrder) -> Self {
        Self {
            field: field.to_string(),
            order,
        }
    }

    pub fn asc(field: &str) -> Self {
        Self::new(field, SortOrder::Asc)
    }

    pub fn desc(field: &str) -> Self {
        Self::new(field, SortOrder::Desc)
    }

    fn to_json(&self) -> Value {
        json!({ self.field.as_str(): { "order": self.order.as_str() } })
    }
}

/// What a search runs: a scored/filtered query, or a kNN vector search.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchBody {
    Query(Query),
    Knn(KnnQuery),
}

/// A complete search request against one index.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub body: SearchBody,
    pub size: usize,
    pub from: usize,
    pub sort: Vec<SortField>,
    /// Source fields stripped from every hit (vector fields unless requested).
    pub source_excludes: Vec<String>,
}

impl SearchRequest {
    pub fn query(query: Query) -> Self {
        Self::new(SearchBody::Query(query))
    }

    pub fn knn(knn: KnnQuery) -> Self {
        let size = knn.k;
        Self {
            size,
            ..Self::new(SearchBody::Knn(knn))
        }
    }

    fn new(body: SearchBody) -> Self {
        Self {
            body,
            size: 10,
            from: 0,
            sort: Vec::new(),
            source_excludes: Vec::new(),
        }
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn from(mut self, from: usize) -> Self {
        self.from = from;
        self
    }

    pub fn sort(mut self, sort: SortField) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn exclude(mut self, fields: impl IntoIterator<Item = String>) -> Self {
        self.source_excludes.extend(fields);
        self
    }

    /// `true` when hits are ordered by relevance rather than by a field.
    pub fn sorts_by_score(&self) -> bool {
        self.sort.is_empty() || self.sort.iter().all(|s| s.field == SortField::SCORE)
    }

    /// Render the `_search` request body.
    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        match &self.body {
            SearchBody::Query(q) => {
                body.insert("query".into(), q.to_json());
            }
            SearchBody::Knn(knn) => {
                body.insert("knn".into(), knn.to_json());
            }
        }
        body.insert("size".into(), json!(self.size));
        body.insert("from".into(), json!(self.from));
        if !self.sort.is_empty() {
            body.insert(
                "sort".into(),
                Value::Array(self.sort.iter().map(SortField::to_json).collect()),
            );
        }
        if !self.source_excludes.is_empty() {
            body.insert(
                "_source".into(),
                json!({ "excludes": self.source_excludes }),
            );
        }
        Value::Object(body)
    }
}
