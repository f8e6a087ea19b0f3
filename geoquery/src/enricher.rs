//! Post-execution display lookup for bare foreign-key ids.
//!
//! Rows that carry `santri_id` / `pesantren_id` but none of the human
//! readable columns get one bounded secondary SELECT per recognised column.
//! Existing keys are never overwritten, and any lookup failure leaves the
//! row set exactly as it was.

use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tokio_util::sync::CancellationToken;

use crate::executor::{ExecutorError, ReadOnlySession, Row, RowSet};

const KEY_ALIAS: &str = "enrich_key";

#[derive(Debug, PartialEq, Eq)]
pub struct EnrichmentTarget {
    pub fk_column: &'static str,
    pub table: &'static str,
    pub join_key: &'static str,
    pub columns: &'static [&'static str],
}

pub const ENRICHMENT_TARGETS: &[EnrichmentTarget] = &[
    EnrichmentTarget {
        fk_column: "santri_id",
        table: "santri_pribadi",
        join_key: "id",
        columns: &[
            "nama",
            "nik",
            "jenis_kelamin",
            "tempat_lahir",
            "tanggal_lahir",
            "status_tinggal",
            "provinsi",
            "kabupaten",
            "kecamatan",
            "desa",
        ],
    },
    EnrichmentTarget {
        fk_column: "pesantren_id",
        table: "pondok_pesantren",
        join_key: "id",
        columns: &[
            "nama",
            "alamat",
            "kecamatan",
            "kabupaten",
            "provinsi",
            "telepon",
            "nama_kyai",
            "jumlah_santri",
            "tahun_berdiri",
        ],
    },
];

impl EnrichmentTarget {
    fn lookup_sql(&self, limit: usize) -> String {
        format!(
            "SELECT {key}::text AS {KEY_ALIAS}, {cols} FROM {table} WHERE {key}::text = ANY($1) LIMIT {limit}",
            key = self.join_key,
            cols = self.columns.join(", "),
            table = self.table,
        )
    }
}

/// Case-folded string form of an id; numbers and UUID strings compare equal
/// to their `::text` rendering.
fn id_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.to_lowercase()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Targets whose id column appears in the first row.
pub fn plan(rows: &RowSet) -> Vec<&'static EnrichmentTarget> {
    let Some(first) = rows.first() else {
        return vec![];
    };
    ENRICHMENT_TARGETS
        .iter()
        .filter(|t| first.contains_key(t.fk_column))
        .collect()
}

pub struct Enricher {
    max_ids: usize,
}

impl Enricher {
    pub fn new(max_ids: usize) -> Self {
        Self {
            max_ids: max_ids.max(1),
        }
    }

    fn collect_ids(&self, rows: &RowSet, column: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut ids = Vec::new();
        for row in rows {
            if ids.len() >= self.max_ids {
                break;
            }
            if let Some(key) = row.get(column).and_then(id_key)
                && seen.insert(key.clone())
            {
                ids.push(key);
            }
        }
        ids
    }

    /// Only `ExecutorError::Cancelled` is returned; every other failure is
    /// logged and the input comes back untouched.
    pub async fn enrich(
        &self,
        rows: RowSet,
        session: &mut dyn ReadOnlySession,
        cancel: &CancellationToken,
    ) -> Result<RowSet, ExecutorError> {
        let targets = plan(&rows);
        if targets.is_empty() {
            return Ok(rows);
        }

        let mut lookups: Vec<(&EnrichmentTarget, HashMap<String, Row>)> = Vec::new();
        for target in targets {
            let ids = self.collect_ids(&rows, target.fk_column);
            if ids.is_empty() {
                continue;
            }
            let sql = target.lookup_sql(ids.len());
            match session.fetch_by_keys(&sql, &ids, cancel).await {
                Ok(found) => {
                    tracing::debug!(
                        table = target.table,
                        ids = ids.len(),
                        found = found.len(),
                        "Enrichment lookup"
                    );
                    let by_key = found
                        .into_iter()
                        .filter_map(|mut r| {
                            let key = r.shift_remove(KEY_ALIAS).as_ref().and_then(id_key)?;
                            Some((key, r))
                        })
                        .collect();
                    lookups.push((target, by_key));
                }
                Err(ExecutorError::Cancelled) => return Err(ExecutorError::Cancelled),
                Err(e) => {
                    tracing::warn!(table = target.table, error = %e, "Enrichment lookup failed; returning rows unaltered");
                    return Ok(rows);
                }
            }
        }

        Ok(merge(rows, &lookups))
    }
}

fn merge(mut rows: RowSet, lookups: &[(&EnrichmentTarget, HashMap<String, Row>)]) -> RowSet {
    for row in &mut rows {
        for (target, by_key) in lookups {
            let Some(extra) = row.get(target.fk_column).and_then(id_key).and_then(|k| by_key.get(&k))
            else {
                continue;
            };
            for (column, value) in extra {
                if !row.contains_key(column) {
                    row.insert(column.clone(), value.clone());
                }
            }
        }
    }
    rows
}
