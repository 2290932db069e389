//! Per-group "last observed value" index.
//!
//! Built with one ordered pass over the training corpus: later rows overwrite
//! earlier rows of the same group, so each group ends up holding the values of
//! its last row. Test rows then look their key up explicitly and fall back to a
//! per-family default on a miss.

use std::collections::{HashMap, HashSet};

use crate::frame::{Frame, FrameError, Value};

/// Last row values per group key.
#[derive(Debug, Clone)]
pub struct LastValueIndex {
    value_columns: Vec<String>,
    entries: HashMap<Vec<Value>, Vec<Value>>,
}

impl LastValueIndex {
    /// Index `values` columns of `frame` by the `group` columns.
    ///
    /// Rows with a missing group cell are skipped.
    pub fn build<S: AsRef<str>>(
        frame: &Frame,
        group: &[S],
        values: &[S],
    ) -> Result<Self, FrameError> {
        let group_pos = positions(frame, group)?;
        let value_pos = positions(frame, values)?;

        let mut entries = HashMap::new();
        for row in frame.rows() {
            let key: Vec<Value> = group_pos.iter().map(|&i| row[i].clone()).collect();
            if key.iter().any(Value::is_missing) {
                continue;
            }
            entries.insert(key, value_pos.iter().map(|&i| row[i].clone()).collect());
        }

        Ok(Self {
            value_columns: values.iter().map(|s| s.as_ref().to_string()).collect(),
            entries,
        })
    }

    pub fn value_columns(&self) -> &[String] {
        &self.value_columns
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &[Value]) -> Option<&[Value]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Left-join the indexed values onto `frame`, keyed by its `on` columns.
    ///
    /// Returns one column of values per indexed value column, aligned with the
    /// rows of `frame`. Misses and missing matched cells become `default`.
    pub fn left_join<S: AsRef<str>>(
        &self,
        frame: &Frame,
        on: &[S],
        default: &Value,
    ) -> Result<Vec<Vec<Value>>, FrameError> {
        let on_pos = positions(frame, on)?;
        let mut out = vec![Vec::with_capacity(frame.height()); self.value_columns.len()];
        let mut hits = 0usize;

        for row in frame.rows() {
            let key: Vec<Value> = on_pos.iter().map(|&i| row[i].clone()).collect();
            let found = self.entries.get(&key);
            if found.is_some() {
                hits += 1;
            }
            for (j, column) in out.iter_mut().enumerate() {
                let v = found
                    .map(|vals| &vals[j])
                    .filter(|v| !v.is_missing())
                    .unwrap_or(default);
                column.push(v.clone());
            }
        }

        tracing::debug!(
            columns = ?self.value_columns,
            rows = frame.height(),
            hits,
            "last-value join"
        );
        Ok(out)
    }
}

fn positions<S: AsRef<str>>(frame: &Frame, names: &[S]) -> Result<Vec<usize>, FrameError> {
    names.iter().map(|n| frame.require(n.as_ref())).collect()
}

/// Running count of distinct `code` values per `group`, in row order.
///
/// The last value for a group equals the total number of distinct codes the
/// group has seen.
pub fn running_unique_count(
    frame: &Frame,
    group: &str,
    code: &str,
) -> Result<Vec<Value>, FrameError> {
    let g = frame.require(group)?;
    let c = frame.require(code)?;
    let mut seen: HashMap<&Value, HashSet<&Value>> = HashMap::new();

    Ok(frame
        .rows()
        .iter()
        .map(|row| {
            if row[g].is_missing() {
                return Value::Null;
            }
            let codes = seen.entry(&row[g]).or_default();
            if !row[c].is_missing() {
                codes.insert(&row[c]);
            }
            Value::Int(codes.len() as i64)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> Frame {
        Frame::from_rows(
            ["customer", "okpd2", "is_sme", "size"],
            vec![
                vec!["c1".into(), "26.20".into(), Value::Int(0), Value::Float(1.0)],
                vec!["c1".into(), "26.30".into(), Value::Int(1), Value::Float(f64::NAN)],
                vec!["c2".into(), "26.20".into(), Value::Int(1), Value::Float(3.0)],
                vec![Value::Null, "10.10".into(), Value::Int(1), Value::Float(4.0)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn keeps_last_row_per_group() {
        let idx = LastValueIndex::build(&history(), &["customer"], &["is_sme"]).unwrap();
        assert_eq!(idx.len(), 2);
        assert_eq!(idx.get(&[Value::from("c1")]), Some(&[Value::Int(1)][..]));
    }

    #[test]
    fn left_join_applies_default_on_miss_and_missing_match() {
        let idx = LastValueIndex::build(&history(), &["customer"], &["size"]).unwrap();
        let test = Frame::from_rows(
            ["customer"],
            vec![vec!["c1".into()], vec!["c2".into()], vec!["c9".into()]],
        )
        .unwrap();

        let cols = idx.left_join(&test, &["customer"], &Value::Int(0)).unwrap();
        // c1's last size is NaN, so the default applies.
        assert_eq!(cols[0], vec![Value::Int(0), Value::Float(3.0), Value::Int(0)]);
    }

    #[test]
    fn running_count_is_cumulative() {
        let counts = running_unique_count(&history(), "customer", "okpd2").unwrap();
        assert_eq!(
            counts,
            vec![Value::Int(1), Value::Int(2), Value::Int(1), Value::Null]
        );
    }
}
