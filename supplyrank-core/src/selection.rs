//! Supplier data selection: restricts corpora to a supplier's footprint and
//! removes leakage between its training and candidate rows.
//!
//! A supplier is only plausibly relevant to purchases filed under filter keys
//! (composite region + OKPD2 codes) it has touched before. Both corpora are
//! restricted to those keys, stripped of administrative columns, deduplicated
//! and indexed by the purchase id. Then:
//!
//! - training rows whose id is one of the supplier's own purchases are dropped
//!   (they are answers, not features);
//! - candidate rows whose id is still in the cleaned training index are dropped
//!   (they were used for supervision).
//!
//! When no candidate survives the key filter, the unrestricted candidate
//! corpus is used instead so the supplier still receives candidates.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::canonicalize;
use crate::error::{require_columns, ConfigurationError};
use crate::frame::{Frame, Value};

/// Column roles for supplier selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectionConfig {
    /// Column holding the supplier id.
    pub sup_column: String,
    /// Column whose values define the supplier's footprint.
    pub filter_column: String,
    /// Administrative columns removed before deduplication.
    #[serde(default)]
    pub drop_columns: Vec<String>,
    /// Unique row identifier that becomes the index.
    pub index_column: String,
}

/// Leakage-cleaned training and candidate subsets for one supplier, both
/// indexed by the purchase id.
#[derive(Debug, Clone, PartialEq)]
pub struct SupplierPartition {
    pub train: Frame,
    pub candidates: Frame,
    /// True when the key filter left no candidates and the full corpus was used.
    pub used_fallback: bool,
}

/// Filter-key values of the training rows that belong to `supplier`.
pub fn unique_keys(
    train: &Frame,
    supplier: &Value,
    sup_column: &str,
    filter_column: &str,
) -> Result<HashSet<Value>, ConfigurationError> {
    let s = train.require(sup_column)?;
    let f = train.require(filter_column)?;
    Ok(train
        .rows()
        .iter()
        .filter(|r| &r[s] == supplier)
        .map(|r| r[f].clone())
        .collect())
}

/// Purchase ids `supplier` participated in.
pub fn supplier_purchases(
    train: &Frame,
    supplier: &Value,
    sup_column: &str,
    index_column: &str,
) -> Result<HashSet<Value>, ConfigurationError> {
    require_columns(train, &[sup_column, index_column], "training")?;
    let s = train.require(sup_column)?;
    let i = train.require(index_column)?;
    Ok(train
        .rows()
        .iter()
        .filter(|r| &r[s] == supplier)
        .map(|r| r[i].clone())
        .collect())
}

fn restrict(frame: &Frame, filter_column: &str, keys: &HashSet<Value>) -> Result<Frame, ConfigurationError> {
    let f = frame.require(filter_column)?;
    let cells: Vec<&Value> = frame.rows().iter().map(|r| &r[f]).collect();
    Ok(frame.take(&canonicalize::member_rows(&cells, keys, true)?))
}

/// Rows whose index value is not in `ids`.
fn without_ids(frame: &Frame, ids: &HashSet<Value>) -> Result<Frame, ConfigurationError> {
    let cells: Vec<&Value> = frame.index().iter().collect();
    Ok(frame.take(&canonicalize::member_rows(&cells, ids, false)?))
}

fn clean(
    frame: &Frame,
    drop_columns: &[String],
    index_column: &str,
    corpus: &'static str,
) -> Result<Frame, ConfigurationError> {
    require_columns(frame, drop_columns, corpus)?;
    let pruned = frame.drop_columns(drop_columns)?;
    let unique = pruned.take(&canonicalize::unique_rows(&pruned)?);
    Ok(unique.set_index(index_column)?)
}

/// Build the supplier-scoped training and candidate subsets.
///
/// `supplier_purchases` is the supplier's historical participation set; see
/// [`supplier_purchases`]. An empty result is valid.
pub fn select_candidates(
    train: &Frame,
    candidates: &Frame,
    supplier: &Value,
    supplier_purchases: &HashSet<Value>,
    cfg: &SelectionConfig,
) -> Result<SupplierPartition, ConfigurationError> {
    require_columns(
        train,
        &[cfg.sup_column.as_str(), cfg.filter_column.as_str(), cfg.index_column.as_str()],
        "training",
    )?;
    require_columns(
        candidates,
        &[cfg.filter_column.as_str(), cfg.index_column.as_str()],
        "candidate",
    )?;

    let keys = unique_keys(train, supplier, &cfg.sup_column, &cfg.filter_column)?;
    let sup_train = restrict(train, &cfg.filter_column, &keys)?;
    let mut sup_candidates = restrict(candidates, &cfg.filter_column, &keys)?;

    let used_fallback = sup_candidates.is_empty();
    if used_fallback {
        tracing::warn!(
            supplier = %supplier,
            keys = keys.len(),
            "no candidates under the supplier's filter keys; using the full candidate corpus"
        );
        sup_candidates = candidates.clone();
    }

    let sup_train = clean(&sup_train, &cfg.drop_columns, &cfg.index_column, "training")?;
    let sup_candidates = clean(&sup_candidates, &cfg.drop_columns, &cfg.index_column, "candidate")?;

    let sup_train = without_ids(&sup_train, supplier_purchases)?;
    let train_ids: HashSet<Value> = sup_train.index().iter().cloned().collect();
    let sup_candidates = without_ids(&sup_candidates, &train_ids)?;

    tracing::info!(
        supplier = %supplier,
        keys = keys.len(),
        train_rows = sup_train.height(),
        candidate_rows = sup_candidates.height(),
        used_fallback,
        "selected supplier partition"
    );

    Ok(SupplierPartition {
        train: sup_train,
        candidates: sup_candidates,
        used_fallback,
    })
}

/// Training-pipeline variant: restrict the training corpus to the supplier's
/// filter keys, drop administrative columns (the supplier column is kept for
/// labelling), deduplicate and index by the purchase id.
pub fn select_training(
    train: &Frame,
    supplier: &Value,
    cfg: &SelectionConfig,
) -> Result<Frame, ConfigurationError> {
    require_columns(
        train,
        &[cfg.sup_column.as_str(), cfg.filter_column.as_str(), cfg.index_column.as_str()],
        "training",
    )?;

    let keys = unique_keys(train, supplier, &cfg.sup_column, &cfg.filter_column)?;
    let restricted = restrict(train, &cfg.filter_column, &keys)?;
    let drop: Vec<String> = cfg
        .drop_columns
        .iter()
        .filter(|c| **c != cfg.sup_column)
        .cloned()
        .collect();
    let out = clean(&restricted, &drop, &cfg.index_column, "training")?;

    tracing::info!(
        supplier = %supplier,
        keys = keys.len(),
        rows = out.height(),
        "selected supplier training rows"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SelectionConfig {
        SelectionConfig {
            sup_column: "supplier".into(),
            filter_column: "reg_code".into(),
            drop_columns: vec!["notice_url".into()],
            index_column: "purchase".into(),
        }
    }

    fn row(p: &str, key: &str, sup: i64) -> Vec<Value> {
        vec![p.into(), key.into(), Value::Int(sup), "http://x".into()]
    }

    fn train() -> Frame {
        Frame::from_rows(
            ["purchase", "reg_code", "supplier", "notice_url"],
            vec![row("p1", "A_X", 7), row("p2", "A_X", 9), row("p3", "B_Y", 9)],
        )
        .unwrap()
    }

    #[test]
    fn unique_keys_cover_supplier_rows_only() {
        let keys = unique_keys(&train(), &Value::Int(7), "supplier", "reg_code").unwrap();
        assert_eq!(keys, HashSet::from([Value::from("A_X")]));
    }

    #[test]
    fn drops_own_purchases_from_training() {
        let hist = supplier_purchases(&train(), &Value::Int(7), "supplier", "purchase").unwrap();
        let candidates = Frame::from_rows(
            ["purchase", "reg_code", "supplier", "notice_url"],
            vec![row("p4", "A_X", 0), row("p5", "B_Y", 0)],
        )
        .unwrap();

        let part = select_candidates(&train(), &candidates, &Value::Int(7), &hist, &cfg()).unwrap();

        assert_eq!(part.train.index(), &[Value::from("p2")]);
        assert_eq!(part.candidates.index(), &[Value::from("p4")]);
        assert!(!part.train.has_column("notice_url"));
        assert!(!part.used_fallback);
    }

    #[test]
    fn falls_back_to_full_candidate_corpus() {
        let hist = HashSet::from([Value::from("p1")]);
        let candidates = Frame::from_rows(
            ["purchase", "reg_code", "supplier", "notice_url"],
            vec![row("p8", "C_Z", 0), row("p9", "D_W", 0)],
        )
        .unwrap();

        let part = select_candidates(&train(), &candidates, &Value::Int(7), &hist, &cfg()).unwrap();
        assert!(part.used_fallback);
        assert_eq!(part.candidates.height(), 2);
    }

    #[test]
    fn training_variant_keeps_supplier_column() {
        let mut c = cfg();
        c.drop_columns.push("supplier".into());
        let out = select_training(&train(), &Value::Int(7), &c).unwrap();
        assert!(out.has_column("supplier"));
        assert_eq!(out.index(), &[Value::from("p1"), Value::from("p2")]);
    }

    #[test]
    fn missing_index_column_is_reported() {
        let mut c = cfg();
        c.index_column = "purchase_number".into();
        assert_eq!(
            select_training(&train(), &Value::Int(7), &c).unwrap_err(),
            ConfigurationError::MissingColumn {
                column: "purchase_number".into(),
                corpus: "training",
            }
        );
    }
}
