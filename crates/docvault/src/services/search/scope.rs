//! Corpus restriction applied by every strategy and by the plain listing

use sqlx::{QueryBuilder, Sqlite};

use crate::models::SearchFilters;

/// The requester's own live documents, narrowed by structural filters.
///
/// Strategies only ever see documents through [`CorpusFilter::push_conditions`].
#[derive(Debug, Clone)]
pub struct CorpusFilter {
    owner_id: String,
    filters: SearchFilters,
}

impl CorpusFilter {
    pub fn new(owner_id: impl Into<String>, mut filters: SearchFilters) -> Self {
        filters.tags = filters
            .tags
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        filters.mime_type = filters
            .mime_type
            .map(|m| m.trim().to_lowercase())
            .filter(|m| !m.is_empty());

        Self {
            owner_id: owner_id.into(),
            filters,
        }
    }

    /// Append the restriction to a query whose `documents` alias is `d`.
    /// Pushes a complete boolean expression with no leading `AND`.
    pub(crate) fn push_conditions(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push("d.owner_id = ")
            .push_bind(self.owner_id.clone())
            .push(" AND d.status != 'deleted'");

        if let Some(status) = self.filters.status {
            qb.push(" AND d.status = ").push_bind(status.to_string());
        }

        if let Some(mime) = &self.filters.mime_type {
            if mime.ends_with('/') || !mime.contains('/') {
                let prefix = if mime.ends_with('/') {
                    mime.clone()
                } else {
                    format!("{}/", mime)
                };
                qb.push(" AND d.mime_type LIKE ")
                    .push_bind(format!("{}%", escape_like(&prefix)))
                    .push(" ESCAPE '\\'");
            } else {
                qb.push(" AND d.mime_type = ").push_bind(mime.clone());
            }
        }

        for tag in &self.filters.tags {
            qb.push(" AND EXISTS (SELECT 1 FROM json_each(d.tags_json) WHERE json_each.value = ")
                .push_bind(tag.clone())
                .push(")");
        }

        if let Some(after) = self.filters.created_after {
            qb.push(" AND d.created_at >= ").push_bind(after);
        }

        if let Some(before) = self.filters.created_before {
            qb.push(" AND d.created_at < ").push_bind(before);
        }
    }
}

pub(crate) fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
