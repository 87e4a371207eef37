//! Pure view computation, shared by every [`crate::service::MetadataService`]
//! backend so the secondary-index semantics are defined exactly once.

use hafiz_core::types::{FileBlobsTag, ViewParams, ViewResult, ViewRow, ViewRowError};
use serde_json::{json, Value};

use crate::service::KvDocument;

fn owners_of(doc: &KvDocument) -> Vec<String> {
    doc.value
        .get("owners")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn hash_of(doc: &KvDocument) -> String {
    doc.value
        .get("hash")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| doc.key.trim_start_matches('/').to_string())
}

fn apply_limit(mut rows: Vec<ViewRow>, params: &ViewParams) -> Vec<ViewRow> {
    if params.descending {
        rows.reverse();
    }
    if let Some(limit) = params.limit {
        rows.truncate(limit as usize);
    }
    rows
}

fn missing_key_error(view: &str) -> ViewResult {
    ViewResult {
        rows: Vec::new(),
        errors: vec![ViewRowError {
            from: view.to_string(),
            reason: "missing required key parameter".to_string(),
        }],
    }
}

fn node_blobs(params: &ViewParams, docs: &[KvDocument]) -> ViewResult {
    let node_id = match params.key.as_ref().and_then(Value::as_str) {
        Some(id) => id.to_string(),
        None => return missing_key_error("node_blobs"),
    };

    let mut rows: Vec<ViewRow> = docs
        .iter()
        .filter(|d| d.doc_type == "blob" && owners_of(d).iter().any(|o| o == &node_id))
        .map(|d| ViewRow {
            id: d.key.clone(),
            key: json!(node_id),
            value: json!(hash_of(d)),
            doc: params.include_docs.then(|| d.value.clone()),
        })
        .collect();

    rows.sort_by(|a, b| a.id.cmp(&b.id));
    ViewResult {
        rows: apply_limit(rows, params),
        errors: Vec::new(),
    }
}

fn file_blobs(params: &ViewParams, docs: &[KvDocument]) -> ViewResult {
    let hash_filter = params.key.as_ref().and_then(Value::as_str).map(str::to_string);

    let mut rows = Vec::new();

    for doc in docs.iter().filter(|d| d.doc_type == "file_ref") {
        let Some(hashes) = doc.value.get("blob_hashes").and_then(Value::as_array) else {
            continue;
        };
        for h in hashes.iter().filter_map(Value::as_str) {
            if hash_filter.as_deref().is_some_and(|f| f != h) {
                continue;
            }
            rows.push((
                h.to_string(),
                FileBlobsTag::File,
                doc.key.clone(),
                ViewRow {
                    id: doc.key.clone(),
                    key: json!([h, FileBlobsTag::File.as_str(), doc.key]),
                    value: Value::Null,
                    doc: None,
                },
            ));
        }
    }

    for doc in docs.iter().filter(|d| d.doc_type == "blob") {
        let hash = hash_of(doc);
        if hash_filter.as_deref().is_some_and(|f| f != hash) {
            continue;
        }
        for owner in owners_of(doc) {
            rows.push((
                hash.clone(),
                FileBlobsTag::Blob,
                owner.clone(),
                ViewRow {
                    id: doc.key.clone(),
                    key: json!([hash, FileBlobsTag::Blob.as_str(), owner]),
                    value: params.include_docs.then(|| doc.value.clone()).unwrap_or(Value::Null),
                    doc: params.include_docs.then(|| doc.value.clone()),
                },
            ));
        }
    }

    // Tag order (`"file"` before `"blob"`) is fixed regardless of
    // `descending` — OrphanGC's single-watermark scan depends on seeing
    // every file-tagged row for a blob before any blob-tagged row for it.
    // `descending` only reverses which blob hash is visited first.
    rows.sort_by(|a, b| {
        let hash_order = if params.descending { b.0.cmp(&a.0) } else { a.0.cmp(&b.0) };
        hash_order.then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2))
    });
    let mut rows: Vec<ViewRow> = rows.into_iter().map(|(_, _, _, row)| row).collect();
    if let Some(limit) = params.limit {
        rows.truncate(limit as usize);
    }

    ViewResult { rows, errors: Vec::new() }
}

fn repcounts(params: &ViewParams, docs: &[KvDocument]) -> ViewResult {
    let range = |count: u64| -> bool {
        if let Some(start) = params.start_key.as_ref().and_then(Value::as_u64) {
            if count < start {
                return false;
            }
        }
        if let Some(end) = params.end_key.as_ref().and_then(Value::as_u64) {
            if count > end {
                return false;
            }
        }
        true
    };

    let mut rows: Vec<ViewRow> = docs
        .iter()
        .filter(|d| d.doc_type == "blob")
        .filter_map(|d| {
            let count = owners_of(d).len() as u64;
            if !range(count) {
                return None;
            }
            Some(if params.reduce {
                ViewRow {
                    id: d.key.clone(),
                    key: Value::Null,
                    value: json!(count),
                    doc: None,
                }
            } else {
                ViewRow {
                    id: d.key.clone(),
                    key: json!(hash_of(d)),
                    value: json!(count),
                    doc: params.include_docs.then(|| d.value.clone()),
                }
            })
        })
        .collect();

    rows.sort_by(|a, b| a.id.cmp(&b.id));
    ViewResult {
        rows: apply_limit(rows, params),
        errors: Vec::new(),
    }
}

fn nodes(params: &ViewParams, docs: &[KvDocument]) -> ViewResult {
    let mut rows: Vec<ViewRow> = docs
        .iter()
        .filter(|d| d.doc_type == "node")
        .map(|d| ViewRow {
            id: d.key.clone(),
            key: json!(d.key.trim_start_matches('/')),
            value: Value::Null,
            doc: Some(d.value.clone()),
        })
        .collect();

    rows.sort_by(|a, b| a.id.cmp(&b.id));
    ViewResult {
        rows: apply_limit(rows, params),
        errors: Vec::new(),
    }
}

/// Evaluate a named view purely in memory over an already-filtered,
/// already-live document set. Shared by every backend.
pub fn compute_view(name: &str, params: &ViewParams, docs: &[KvDocument]) -> ViewResult {
    match name {
        "node_blobs" => node_blobs(params, docs),
        "file_blobs" => file_blobs(params, docs),
        "repcounts" => repcounts(params, docs),
        "nodes" => nodes(params, docs),
        other => ViewResult {
            rows: Vec::new(),
            errors: vec![ViewRowError {
                from: other.to_string(),
                reason: "unknown view".to_string(),
            }],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hafiz_core::types::ViewParams;

    fn blob_doc(hash: &str, owners: &[&str]) -> KvDocument {
        KvDocument {
            key: format!("/{hash}"),
            doc_type: "blob".to_string(),
            value: json!({ "hash": hash, "size": 10, "owners": owners }),
            expires_at: None,
        }
    }

    #[test]
    fn node_blobs_filters_by_owner() {
        let docs = vec![blob_doc("aaaa", &["n1", "n2"]), blob_doc("bbbb", &["n2"])];
        let result = node_blobs(&ViewParams { key: Some(json!("n1")), ..Default::default() }, &docs);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].id, "/aaaa");
    }

    #[test]
    fn node_blobs_without_key_is_an_error() {
        let result = node_blobs(&ViewParams::default(), &[]);
        assert!(result.has_errors());
    }

    #[test]
    fn file_blobs_orders_file_rows_before_blob_rows_descending() {
        let docs = vec![
            blob_doc("aaaa", &["n1"]),
            KvDocument {
                key: "/file/1".to_string(),
                doc_type: "file_ref".to_string(),
                value: json!({ "blob_hashes": ["aaaa"] }),
                expires_at: None,
            },
        ];
        let result = file_blobs(&ViewParams { key: Some(json!("aaaa")), descending: true, ..Default::default() }, &docs);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0].key[1], "file");
        assert_eq!(result.rows[1].key[1], "blob");
    }

    #[test]
    fn repcounts_reduces_to_owner_count() {
        let docs = vec![blob_doc("aaaa", &["n1", "n2", "n3"])];
        let result = repcounts(&ViewParams { reduce: true, ..Default::default() }, &docs);
        assert_eq!(result.rows[0].value, json!(3));
    }
}
