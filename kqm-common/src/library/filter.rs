//! Typed media filters
//!
//! A filter is a conjunction of clauses. Each clause targets either a media
//! column or a key path inside the provider's opaque JSON metadata, and
//! either compares for equality or tests membership in a list. An empty
//! membership list constrains nothing.
//!
//! Values and JSON paths are always bound as statement parameters.

use crate::{Error, Result};
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite};

/// Filterable media columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaField {
    MediaId,
    ArtistId,
    Title,
    Duration,
    Provider,
    IsPreferred,
}

impl MediaField {
    /// Column reference inside the enabled-media CTE
    fn column(self) -> &'static str {
        match self {
            MediaField::MediaId => "e.media_id",
            MediaField::ArtistId => "e.artist_id",
            MediaField::Title => "e.title",
            MediaField::Duration => "e.duration",
            MediaField::Provider => "e.provider",
            MediaField::IsPreferred => "e.is_preferred",
        }
    }

    /// Accepts both the camelCase names clients send and the column names
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "mediaId" | "media_id" => Some(MediaField::MediaId),
            "artistId" | "artist_id" => Some(MediaField::ArtistId),
            "title" => Some(MediaField::Title),
            "duration" => Some(MediaField::Duration),
            "provider" => Some(MediaField::Provider),
            "isPreferred" | "is_preferred" => Some(MediaField::IsPreferred),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl FilterValue {
    fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(FilterValue::Bool(*b)),
            Value::String(s) => Ok(FilterValue::Text(s.clone())),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(FilterValue::Integer(i)),
                None => n
                    .as_f64()
                    .map(FilterValue::Real)
                    .ok_or_else(|| Error::Validation(format!("Unsupported filter number: {}", n))),
            },
            other => Err(Error::Validation(format!("Unsupported filter value: {}", other))),
        }
    }

    fn push_bind(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            FilterValue::Integer(v) => {
                qb.push_bind(*v);
            }
            FilterValue::Real(v) => {
                qb.push_bind(*v);
            }
            FilterValue::Text(v) => {
                qb.push_bind(v.clone());
            }
            FilterValue::Bool(v) => {
                qb.push_bind(*v);
            }
        }
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Integer(v)
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        FilterValue::Integer(v.into())
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        FilterValue::Real(v)
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        FilterValue::Bool(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Text(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::Text(v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterTarget {
    Field(MediaField),
    /// Dot-separated key path into `provider_data`, e.g. `"file"` or `"meta.channel"`
    ProviderData(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Equals(FilterValue),
    In(Vec<FilterValue>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterClause {
    pub target: FilterTarget,
    pub op: FilterOp,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaFilter {
    clauses: Vec<FilterClause>,
}

impl MediaFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clauses(&self) -> &[FilterClause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn push(mut self, clause: FilterClause) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn equals(self, field: MediaField, value: impl Into<FilterValue>) -> Self {
        self.push(FilterClause {
            target: FilterTarget::Field(field),
            op: FilterOp::Equals(value.into()),
        })
    }

    /// Match any of `values`. The list is bound into one statement, so it is
    /// subject to SQLite's bound-parameter limit (32766 by default); longer
    /// lists fail with `Error::Database`.
    pub fn any_of<V: Into<FilterValue>>(self, field: MediaField, values: impl IntoIterator<Item = V>) -> Self {
        self.push(FilterClause {
            target: FilterTarget::Field(field),
            op: FilterOp::In(values.into_iter().map(Into::into).collect()),
        })
    }

    pub fn provider_data_equals(self, path: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.push(FilterClause {
            target: FilterTarget::ProviderData(path.into()),
            op: FilterOp::Equals(value.into()),
        })
    }

    pub fn provider_data_any_of<V: Into<FilterValue>>(
        self,
        path: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push(FilterClause {
            target: FilterTarget::ProviderData(path.into()),
            op: FilterOp::In(values.into_iter().map(Into::into).collect()),
        })
    }

    /// Build a filter from the mapping form sent by clients:
    ///
    /// ```json
    /// { "provider": "cdg", "mediaId": [1, 2], "providerData": { "file": "a.mp3" } }
    /// ```
    ///
    /// Scalars mean equality, arrays mean membership. Unknown field names are rejected.
    pub fn from_json(value: &Value) -> Result<Self> {
        let fields = value
            .as_object()
            .ok_or_else(|| Error::Validation(format!("Filter must be an object: {}", value)))?;

        let mut filter = MediaFilter::new();
        for (key, val) in fields {
            if key == "providerData" {
                let keys = val.as_object().ok_or_else(|| {
                    Error::Validation(format!("providerData filter must be an object: {}", val))
                })?;
                for (path, pval) in keys {
                    filter = filter.push(FilterClause {
                        target: FilterTarget::ProviderData(path.clone()),
                        op: op_from_json(pval)?,
                    });
                }
            } else {
                let field = MediaField::from_name(key)
                    .ok_or_else(|| Error::Validation(format!("Unknown filter field: {}", key)))?;
                filter = filter.push(FilterClause {
                    target: FilterTarget::Field(field),
                    op: op_from_json(val)?,
                });
            }
        }

        Ok(filter)
    }

    /// Append `AND ...` conditions for every clause that constrains anything
    pub(crate) fn push_conditions(&self, qb: &mut QueryBuilder<'_, Sqlite>) -> Result<()> {
        for clause in &self.clauses {
            if let FilterOp::In(values) = &clause.op {
                if values.is_empty() {
                    continue;
                }
            }

            qb.push(" AND ");
            match &clause.target {
                FilterTarget::Field(field) => {
                    qb.push(field.column());
                }
                FilterTarget::ProviderData(path) => {
                    qb.push("json_extract(e.provider_data, ");
                    qb.push_bind(json_path(path)?);
                    qb.push(")");
                }
            }

            match &clause.op {
                FilterOp::Equals(value) => {
                    qb.push(" = ");
                    value.push_bind(qb);
                }
                FilterOp::In(values) => {
                    qb.push(" IN (");
                    for (i, value) in values.iter().enumerate() {
                        if i > 0 {
                            qb.push(", ");
                        }
                        value.push_bind(qb);
                    }
                    qb.push(")");
                }
            }
        }

        Ok(())
    }
}

fn op_from_json(value: &Value) -> Result<FilterOp> {
    match value {
        Value::Array(items) => Ok(FilterOp::In(
            items.iter().map(FilterValue::from_json).collect::<Result<Vec<_>>>()?,
        )),
        scalar => Ok(FilterOp::Equals(FilterValue::from_json(scalar)?)),
    }
}

/// `a.b` → `$."a"."b"`; each key is quoted so it matches literally
fn json_path(path: &str) -> Result<String> {
    let mut out = String::from("$");
    for key in path.split('.') {
        if key.is_empty() || key.contains('"') {
            return Err(Error::Validation(format!("Invalid provider data path: {:?}", path)));
        }
        out.push_str(".\"");
        out.push_str(key);
        out.push('"');
    }
    Ok(out)
}
