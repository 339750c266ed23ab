//! Query DSL → SQL.
//!
//! Every clause compiles to a boolean condition plus a score expression over
//! the `documents d` row. Keyword matches pull in an FTS5 CTE that is
//! LEFT JOINed on `seq`; vector scores call sqlite-vec's `vec_distance_cosine`
//! on the `embedding` blob. Parameters are numbered explicitly, so clause order
//! in the final SQL text does not matter.

use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use super::schema::fts_table;
use super::segment::query_phrases;
use super::vector_to_blob;
use crate::error::{Error, Result};
use crate::store::mapping::{validate_field_name, FieldMapping, IndexMapping};
use crate::store::query::{BoostedField, KnnQuery, Query, RangeBounds, SearchBody, SearchRequest};

/// A compiled statement and its positional parameters.
#[derive(Debug)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

struct Node {
    cond: String,
    score: String,
}

impl Node {
    fn new(cond: impl Into<String>, score: impl Into<String>) -> Self {
        Self {
            cond: cond.into(),
            score: score.into(),
        }
    }
}

#[derive(Clone, Copy)]
enum FieldKind {
    Exact,
    Date,
    Text,
    Vector(usize),
}

struct Compiler<'a> {
    index: &'a str,
    mapping: &'a IndexMapping,
    params: Vec<SqlValue>,
    ctes: Vec<String>,
    joins: Vec<String>,
}

impl<'a> Compiler<'a> {
    fn new(index: &'a str, mapping: &'a IndexMapping) -> Self {
        Self {
            index,
            mapping,
            // ?1 is always the index name
            params: vec![SqlValue::Text(index.to_string())],
            ctes: Vec::new(),
            joins: Vec::new(),
        }
    }

    fn bind(&mut self, value: SqlValue) -> String {
        self.params.push(value);
        format!("?{}", self.params.len())
    }

    fn field_kind(&self, field: &str) -> Result<FieldKind> {
        validate_field_name(field)?;
        Ok(match self.mapping.get(field) {
            Some(FieldMapping::Date) => FieldKind::Date,
            Some(FieldMapping::Text) => FieldKind::Text,
            Some(FieldMapping::DenseVector { dims, .. }) => FieldKind::Vector(*dims),
            // unmapped fields behave like keywords
            Some(FieldMapping::Keyword) | Some(FieldMapping::Boolean) | None => FieldKind::Exact,
        })
    }

    fn compile(&mut self, query: &Query) -> Result<Node> {
        match query {
            Query::MatchAll => Ok(Node::new("1", "1.0")),
            Query::Term { field, value } => self.term(field, std::slice::from_ref(value)),
            Query::Terms { field, values } => self.term(field, values),
            Query::Range { field, bounds } => self.range(field, bounds),
            Query::MultiMatch { query, fields } => self.multi_match(query, fields),
            Query::VectorSimilarity { field, vector } => {
                let blob = self.vector_param(field, vector)?;
                Ok(Node::new(
                    "1",
                    format!(
                        "(CASE WHEN d.embedding IS NULL THEN 0.0 \
                         ELSE 2.0 - vec_distance_cosine(d.embedding, {blob}) END)"
                    ),
                ))
            }
            Query::Bool(b) => {
                let mut conds = Vec::new();
                let mut scores = Vec::new();

                for q in &b.must {
                    let node = self.compile(q)?;
                    conds.push(node.cond);
                    scores.push(node.score);
                }
                for q in &b.filter {
                    conds.push(self.compile(q)?.cond);
                }
                for q in &b.must_not {
                    conds.push(format!("NOT ({})", self.compile(q)?.cond));
                }

                let mut should_hits = Vec::new();
                for q in &b.should {
                    let node = self.compile(q)?;
                    should_hits.push(format!("(CASE WHEN {} THEN 1 ELSE 0 END)", node.cond));
                    scores.push(format!(
                        "(CASE WHEN {} THEN {} ELSE 0.0 END)",
                        node.cond, node.score
                    ));
                }
                let minimum = b.effective_minimum_should_match();
                if minimum > 0 {
                    if should_hits.is_empty() {
                        conds.push("0".to_string());
                    } else {
                        conds.push(format!("({}) >= {minimum}", should_hits.join(" + ")));
                    }
                }

                let cond = if conds.is_empty() {
                    "1".to_string()
                } else {
                    conds
                        .iter()
                        .map(|c| format!("({c})"))
                        .collect::<Vec<_>>()
                        .join(" AND ")
                };
                let score = if scores.is_empty() {
                    "0.0".to_string()
                } else {
                    format!("({})", scores.join(" + "))
                };
                Ok(Node::new(cond, score))
            }
        }
    }

    fn term(&mut self, field: &str, values: &[Value]) -> Result<Node> {
        if values.is_empty() {
            return Ok(Node::new("0", "0.0"));
        }
        match self.field_kind(field)? {
            FieldKind::Vector(_) => Err(Error::validation(format!(
                "term query on vector field {field}"
            ))),
            FieldKind::Date => {
                let expr = field_expr(field);
                let alternatives: Vec<String> = values
                    .iter()
                    .map(|v| {
                        let p = self.bind(json_to_sql(v));
                        format!("julianday({expr}) = julianday({p})")
                    })
                    .collect();
                Ok(Node::new(alternatives.join(" OR "), "0.0"))
            }
            FieldKind::Exact | FieldKind::Text => {
                let placeholders: Vec<String> =
                    values.iter().map(|v| self.bind(json_to_sql(v))).collect();
                Ok(Node::new(
                    format!(
                        "EXISTS (SELECT 1 FROM json_each(d.body, '$.{field}') \
                         WHERE json_each.value IN ({}))",
                        placeholders.join(", ")
                    ),
                    "0.0",
                ))
            }
        }
    }

    fn range(&mut self, field: &str, bounds: &RangeBounds) -> Result<Node> {
        let kind = self.field_kind(field)?;
        if let FieldKind::Vector(_) = kind {
            return Err(Error::validation(format!(
                "range query on vector field {field}"
            )));
        }
        let expr = field_expr(field);
        let mut conds = Vec::new();
        for (op, bound) in [
            (">=", &bounds.gte),
            (">", &bounds.gt),
            ("<=", &bounds.lte),
            ("<", &bounds.lt),
        ] {
            let Some(value) = bound else { continue };
            let p = self.bind(json_to_sql(value));
            conds.push(match kind {
                FieldKind::Date => format!("julianday({expr}) {op} julianday({p})"),
                _ => format!("{expr} {op} {p}"),
            });
        }
        if conds.is_empty() {
            conds.push(format!("{expr} IS NOT NULL"));
        }
        Ok(Node::new(conds.join(" AND "), "0.0"))
    }

    fn multi_match(&mut self, query: &str, fields: &[BoostedField]) -> Result<Node> {
        let columns = self.mapping.text_fields();
        if columns.is_empty() {
            return Err(Error::validation(format!(
                "index {} has no text fields to match against",
                self.index
            )));
        }
        for f in fields {
            if !matches!(self.field_kind(&f.name)?, FieldKind::Text) {
                return Err(Error::validation(format!(
                    "multi_match field {} is not a text field",
                    f.name
                )));
            }
        }

        let terms = escape_fts_terms(query);
        if terms.is_empty() || fields.is_empty() {
            return Ok(Node::new("0", "0.0"));
        }

        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        let expression = format!("{{{}}} : ({})", names.join(" "), terms.join(" OR "));
        let weights: Vec<String> = columns
            .iter()
            .map(|col| {
                let boost = fields
                    .iter()
                    .find(|f| f.name == *col)
                    .map(|f| f.boost)
                    .unwrap_or(0.0);
                format!("{boost:?}")
            })
            .collect();

        let alias = format!("mm{}", self.ctes.len());
        let fts = fts_table(self.index);
        let p = self.bind(SqlValue::Text(expression));
        self.ctes.push(format!(
            "{alias} AS (SELECT rowid AS seq, -bm25({fts}, {}) AS score \
             FROM {fts} WHERE {fts} MATCH {p})",
            weights.join(", ")
        ));
        self.joins
            .push(format!("LEFT JOIN {alias} ON {alias}.seq = d.seq"));

        Ok(Node::new(
            format!("{alias}.seq IS NOT NULL"),
            format!("COALESCE({alias}.score, 0.0)"),
        ))
    }

    fn vector_param(&mut self, field: &str, vector: &[f32]) -> Result<String> {
        match self.field_kind(field)? {
            FieldKind::Vector(dims) if dims == vector.len() => {
                Ok(self.bind(SqlValue::Blob(vector_to_blob(vector))))
            }
            FieldKind::Vector(dims) => Err(Error::validation(format!(
                "query vector has {} dimensions, field {field} expects {dims}",
                vector.len()
            ))),
            _ => Err(Error::validation(format!("{field} is not a vector field"))),
        }
    }

    fn order_by(&self, request: &SearchRequest) -> Result<String> {
        let mut keys = Vec::new();
        for sort in &request.sort {
            let dir = sort.order.as_str().to_uppercase();
            if sort.field == crate::store::query::SortField::SCORE {
                keys.push(format!("score {dir}"));
                continue;
            }
            let expr = field_expr(&sort.field);
            keys.push(match self.field_kind(&sort.field)? {
                FieldKind::Date => format!("julianday({expr}) {dir}"),
                FieldKind::Vector(_) => {
                    return Err(Error::validation(format!(
                        "cannot sort on vector field {}",
                        sort.field
                    )))
                }
                _ => format!("{expr} {dir}"),
            });
        }
        if keys.is_empty() {
            keys.push("score DESC".to_string());
        }
        keys.push("d.seq ASC".to_string());
        Ok(keys.join(", "))
    }

    fn with_clause(&self) -> String {
        if self.ctes.is_empty() {
            String::new()
        } else {
            format!("WITH {} ", self.ctes.join(", "))
        }
    }

    fn join_clause(&self) -> String {
        self.joins
            .iter()
            .map(|j| format!(" {j}"))
            .collect::<String>()
    }
}

fn field_expr(field: &str) -> String {
    format!("json_extract(d.body, '$.{field}')")
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Quote each whitespace-delimited word so FTS5 treats it as a plain term;
/// CJK runs become phrases. Empty tokens are dropped.
fn escape_fts_terms(query: &str) -> Vec<String> {
    query.split_whitespace().flat_map(query_phrases).collect()
}

/// Compile a search request into a `SELECT id, body, embedding, score` statement.
pub fn search_sql(index: &str, mapping: &IndexMapping, request: &SearchRequest) -> Result<SqlQuery> {
    let mut c = Compiler::new(index, mapping);

    let (cond, score, limit) = match &request.body {
        SearchBody::Query(query) => {
            let node = c.compile(query)?;
            (node.cond, node.score, request.size)
        }
        SearchBody::Knn(knn) => {
            let (cond, score) = compile_knn(&mut c, knn)?;
            // top-k first, then paginate within those k
            let limit = request.size.min(knn.k.saturating_sub(request.from));
            (cond, score, limit)
        }
    };

    let order = c.order_by(request)?;
    let limit_p = c.bind(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
    let offset_p = c.bind(SqlValue::Integer(i64::try_from(request.from).unwrap_or(i64::MAX)));
    let sql = format!(
        "{with}SELECT d.id, d.body, d.embedding, {score} AS score \
         FROM documents d{joins} \
         WHERE d.index_name = ?1 AND ({cond}) \
         ORDER BY {order} LIMIT {limit_p} OFFSET {offset_p}",
        with = c.with_clause(),
        joins = c.join_clause(),
    );
    Ok(SqlQuery {
        sql,
        params: c.params,
    })
}

/// Compile a `SELECT COUNT(*)` for `query`.
pub fn count_sql(index: &str, mapping: &IndexMapping, query: &Query) -> Result<SqlQuery> {
    let mut c = Compiler::new(index, mapping);
    let node = c.compile(query)?;
    let sql = format!(
        "{with}SELECT COUNT(*) FROM documents d{joins} WHERE d.index_name = ?1 AND ({cond})",
        with = c.with_clause(),
        joins = c.join_clause(),
        cond = node.cond,
    );
    Ok(SqlQuery {
        sql,
        params: c.params,
    })
}

fn compile_knn(c: &mut Compiler<'_>, knn: &KnnQuery) -> Result<(String, String)> {
    if knn.k == 0 {
        return Err(Error::validation("knn k must be greater than 0"));
    }
    if knn.num_candidates < knn.k {
        return Err(Error::validation(format!(
            "num_candidates ({}) must be >= k ({})",
            knn.num_candidates, knn.k
        )));
    }
    let blob = c.vector_param(&knn.field, &knn.query_vector)?;
    let filter = match &knn.filter {
        Some(f) => c.compile(f)?.cond,
        None => "1".to_string(),
    };
    Ok((
        format!("d.embedding IS NOT NULL AND ({filter})"),
        format!("((2.0 - vec_distance_cosine(d.embedding, {blob})) / 2.0)"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::query::{BoolQuery, SortField};

    fn mapping() -> IndexMapping {
        IndexMapping::new()
            .field("title", FieldMapping::Text)
            .field("content", FieldMapping::Text)
            .field("user_id", FieldMapping::Keyword)
            .field("created_at", FieldMapping::Date)
            .field("embedding", FieldMapping::dense_vector(3))
    }

    #[test]
    fn escape_drops_quotes_and_punctuation_only_tokens() {
        assert_eq!(
            escape_fts_terms(r#"hello "world" -- "#),
            vec!["\"hello\"", "\"world\""]
        );
        assert!(escape_fts_terms("   ").is_empty());
    }

    #[test]
    fn escape_turns_cjk_runs_into_phrases() {
        assert_eq!(
            escape_fts_terms("喝 咖啡。"),
            vec!["\"喝\"", "\"咖 啡\""]
        );
    }

    #[test]
    fn term_binds_parameters_in_order() {
        let m = mapping();
        let q = BoolQuery::new()
            .filter(Query::term("user_id", "u1"))
            .filter(Query::term("processed", false))
            .build();
        let compiled = count_sql("memories", &m, &q).unwrap();
        assert_eq!(compiled.params.len(), 3);
        assert_eq!(compiled.params[1], SqlValue::Text("u1".into()));
        assert_eq!(compiled.params[2], SqlValue::Integer(0));
        assert!(compiled.sql.contains("json_each(d.body, '$.user_id')"));
    }

    #[test]
    fn multi_match_adds_cte_with_column_weights() {
        let m = mapping();
        let req = SearchRequest::query(Query::multi_match("rust lang", &["title^2", "content"]));
        let compiled = search_sql("memories", &m, &req).unwrap();
        assert!(compiled.sql.starts_with("WITH mm0 AS"));
        // text columns are sorted: content, title
        assert!(compiled.sql.contains("bm25(fts_memories, 1.0, 2.0)"));
        assert!(compiled
            .params
            .contains(&SqlValue::Text("{title content} : (\"rust\" OR \"lang\")".into())));
    }

    #[test]
    fn knn_rejects_wrong_dimensions() {
        let m = mapping();
        let req = SearchRequest::knn(KnnQuery {
            field: "embedding".into(),
            query_vector: vec![1.0, 0.0],
            k: 2,
            num_candidates: 20,
            filter: None,
        });
        assert!(search_sql("memories", &m, &req).unwrap_err().is_validation());
    }

    #[test]
    fn knn_rejects_small_candidate_pool() {
        let m = mapping();
        let req = SearchRequest::knn(KnnQuery {
            field: "embedding".into(),
            query_vector: vec![1.0, 0.0, 0.0],
            k: 5,
            num_candidates: 4,
            filter: None,
        });
        assert!(search_sql("memories", &m, &req).is_err());
    }

    #[test]
    fn date_sort_goes_through_julianday() {
        let m = mapping();
        let req = SearchRequest::query(Query::MatchAll).sort(SortField::asc("created_at"));
        let compiled = search_sql("memories", &m, &req).unwrap();
        assert!(compiled
            .sql
            .contains("ORDER BY julianday(json_extract(d.body, '$.created_at')) ASC, d.seq ASC"));
    }

    #[test]
    fn unsafe_field_names_are_rejected() {
        let m = mapping();
        let q = Query::term("user_id') OR 1=1 --", "x");
        assert!(count_sql("memories", &m, &q).is_err());
    }
}
