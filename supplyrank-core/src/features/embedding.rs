//! Embedding decomposition: one scalar column per vector component.

use crate::error::{FeatureError, SchemaError};
use crate::frame::{Frame, Value};

/// Name of the column holding component `i`.
pub fn component_name(i: usize) -> String {
    i.to_string()
}

/// Split the vector column `column` into `n` Float columns named `"0".."n-1"`.
///
/// Every row must hold a vector of exactly `n` components.
pub fn decompose(frame: &Frame, column: &str, n: usize) -> Result<Frame, FeatureError> {
    let cells = frame.column(column)?;
    let mut components: Vec<Vec<Value>> = vec![Vec::with_capacity(frame.height()); n];

    for (row, cell) in cells.into_iter().enumerate() {
        let vector = match cell {
            Value::Vector(v) => v,
            other => {
                return Err(SchemaError::NotAVector {
                    row,
                    column: column.to_string(),
                    found: other.kind(),
                }
                .into())
            }
        };
        if vector.len() != n {
            return Err(SchemaError::EmbeddingDimension {
                row,
                column: column.to_string(),
                expected: n,
                actual: vector.len(),
            }
            .into());
        }
        for (i, x) in vector.iter().enumerate() {
            components[i].push(Value::Float(*x));
        }
    }

    let mut out = frame.clone();
    for (i, values) in components.into_iter().enumerate() {
        out = out.with_column(&component_name(i), values)?;
    }
    Ok(out)
}
