//! Binary participation label for one supplier.

use std::collections::HashSet;

use crate::error::{require_columns, ConfigurationError};
use crate::frame::{Frame, FrameError, Value};

/// Name of the label column appended by [`construct_target`].
pub const TARGET_COLUMN: &str = "target";

/// Label every row by whether `supplier` participated in its purchase.
///
/// `frame` must be indexed by purchase id. A row is positive when its id is
/// one of the ids whose rows carry `supplier` in `sup_column`, so every row of
/// a purchase the supplier bid on is labelled 1. Rows are never merged. The
/// supplier column is removed and `target` (0 or 1) is appended last.
pub fn construct_target(
    frame: &Frame,
    supplier: &Value,
    sup_column: &str,
) -> Result<Frame, ConfigurationError> {
    require_columns(frame, &[sup_column], "training")?;
    if frame.index_name().is_none() {
        return Err(FrameError::NoIndex.into());
    }
    if frame.has_column(TARGET_COLUMN) {
        return Err(ConfigurationError::invalid(
            TARGET_COLUMN,
            "label column name collides with an existing feature",
        ));
    }

    let s = frame.require(sup_column)?;
    let positives: HashSet<&Value> = frame
        .rows()
        .iter()
        .zip(frame.index())
        .filter(|(row, _)| &row[s] == supplier)
        .map(|(_, id)| id)
        .collect();

    let features = frame.drop_columns(&[sup_column])?;
    let labels: Vec<Value> = features
        .index()
        .iter()
        .map(|id| Value::Int(i64::from(positives.contains(id))))
        .collect();
    let n_pos = labels.iter().filter(|v| **v == Value::Int(1)).count();

    tracing::info!(
        supplier = %supplier,
        rows = features.height(),
        positives = n_pos,
        "constructed participation target"
    );
    Ok(features.with_column(TARGET_COLUMN, labels)?)
}
