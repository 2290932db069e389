//! Feature generation for purchase records.
//!
//! `generate_features` augments a candidate corpus using the training corpus as
//! aggregation source. The families are applied in a fixed order:
//!
//! 1. embedding decomposition (`"0".."N-1"`)
//! 2. month of the purchase date
//! 3. composite region + OKPD2 key
//! 4. purchase size, last value per group (miss → 0)
//! 5. historical flags, last values per group (miss → 0)
//! 6. distinct OKPD2 count, last value per group (miss → 1)
//! 7. pruning of administrative columns
//!
//! The unique-count default is 1, not 0: a group with no history under a code
//! is counted as having just seen it.

pub mod calendar;
pub mod embedding;
pub mod lookup;

use serde::{Deserialize, Serialize};

use crate::error::{require_columns, ConfigurationError, FeatureError};
use crate::frame::{Frame, Value};

pub use embedding::component_name;
pub use lookup::LastValueIndex;

/// Default for flag-type and purchase-size lookups that find nothing.
pub const FLAG_DEFAULT: i64 = 0;
/// Default for unique-count lookups that find nothing.
pub const UNIQUE_COUNT_DEFAULT: i64 = 1;

// ─── Feature config ───────────────────────────────────────────────────

/// One column name or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OneOrMany", into = "Vec<String>")]
pub struct ColumnList(pub Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for ColumnList {
    fn from(v: OneOrMany) -> Self {
        match v {
            OneOrMany::One(s) => ColumnList(vec![s]),
            OneOrMany::Many(v) => ColumnList(v),
        }
    }
}

impl From<ColumnList> for Vec<String> {
    fn from(v: ColumnList) -> Self {
        v.0
    }
}

impl ColumnList {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|c| c == name)
    }
}

impl<S: Into<String>> FromIterator<S> for ColumnList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        ColumnList(iter.into_iter().map(Into::into).collect())
    }
}

/// Purchase-size lookup: last `values` per `group` in training, keyed by `on_col`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PurchaseSizeSpec {
    pub group: String,
    pub values: String,
    pub name: String,
    pub on_col: String,
}

/// Historical flags: last row of `train_columns` per `group`, keyed by `on_col`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlagSpec {
    pub train_columns: Vec<String>,
    pub group: ColumnList,
    pub on_col: ColumnList,
}

impl FlagSpec {
    /// Columns carried onto candidate rows: `train_columns` minus the keys.
    pub fn flag_columns(&self) -> Vec<String> {
        self.train_columns
            .iter()
            .filter(|c| !self.group.contains(c) && !self.on_col.contains(c))
            .cloned()
            .collect()
    }
}

/// Distinct OKPD2 count: last `name` per `group` in training, keyed by `on_col`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UniqueCodeSpec {
    pub group: String,
    pub on_col: String,
    pub name: String,
}

/// Everything the feature generator needs to know about column names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSpec {
    pub vector: String,
    pub n_components: usize,
    pub date: String,
    pub region: String,
    pub okpd2: String,
    pub okpd2_prefix: Option<usize>,
    pub month_name: String,
    pub composite_name: String,
    pub purchase_size: PurchaseSizeSpec,
    pub flag: FlagSpec,
    pub uniq_okpd2: UniqueCodeSpec,
    pub drop_columns: Vec<String>,
}

impl FeatureSpec {
    /// Settings that can be checked without looking at any data.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.flag.group.as_slice().is_empty() {
            return Err(ConfigurationError::invalid("flag.group", "must name at least one column"));
        }
        if self.flag.group.as_slice().len() != self.flag.on_col.as_slice().len() {
            return Err(ConfigurationError::invalid(
                "flag.on_col",
                format!(
                    "has {} columns but flag.group has {}",
                    self.flag.on_col.as_slice().len(),
                    self.flag.group.as_slice().len()
                ),
            ));
        }
        if self.okpd2_prefix == Some(0) {
            return Err(ConfigurationError::invalid("okpd2_prefix", "must be positive"));
        }
        Ok(())
    }

    fn training_columns(&self) -> Vec<&str> {
        let mut cols = vec![
            self.purchase_size.group.as_str(),
            self.purchase_size.values.as_str(),
            self.uniq_okpd2.group.as_str(),
            self.uniq_okpd2.name.as_str(),
        ];
        cols.extend(self.flag.train_columns.iter().map(String::as_str));
        cols.extend(self.flag.group.as_slice().iter().map(String::as_str));
        cols
    }

    /// Join keys the lookups read from the frame being augmented.
    fn key_columns(&self) -> Vec<&str> {
        let mut cols = vec![
            self.purchase_size.on_col.as_str(),
            self.uniq_okpd2.on_col.as_str(),
        ];
        cols.extend(self.flag.on_col.as_slice().iter().map(String::as_str));
        cols
    }

    fn candidate_columns(&self) -> Vec<&str> {
        let mut cols = vec![
            self.vector.as_str(),
            self.date.as_str(),
            self.region.as_str(),
            self.okpd2.as_str(),
            self.purchase_size.on_col.as_str(),
            self.uniq_okpd2.on_col.as_str(),
        ];
        cols.extend(self.flag.on_col.as_slice().iter().map(String::as_str));
        cols
    }
}

// ─── Generation ──────────────────────────────────────────────────────

/// Steps 1-3 of the generator: the row-local families.
fn row_local(frame: &Frame, spec: &FeatureSpec) -> Result<Frame, FeatureError> {
    let out = embedding::decompose(frame, &spec.vector, spec.n_components)?;
    let out = out.with_column(&spec.month_name, calendar::months(&out, &spec.date)?)?;
    let keys = calendar::composite_keys(&out, &spec.region, &spec.okpd2, spec.okpd2_prefix)?;
    Ok(out.with_column(&spec.composite_name, keys)?)
}

/// Annotate the training corpus with the row-local families and, when the
/// corpus lacks it, the running distinct-OKPD2 count per group.
pub fn prepare_training(train: &Frame, spec: &FeatureSpec) -> Result<Frame, FeatureError> {
    spec.validate()?;
    require_columns(
        train,
        &[
            spec.vector.as_str(),
            spec.date.as_str(),
            spec.region.as_str(),
            spec.okpd2.as_str(),
            spec.uniq_okpd2.group.as_str(),
        ],
        "training",
    )?;

    let mut out = row_local(train, spec)?;
    if !out.has_column(&spec.uniq_okpd2.name) {
        let counts = lookup::running_unique_count(&out, &spec.uniq_okpd2.group, &spec.okpd2)?;
        out = out.with_column(&spec.uniq_okpd2.name, counts)?;
    }

    tracing::debug!(rows = out.height(), columns = out.width(), "prepared training corpus");
    Ok(out)
}

/// Steps 4-6 of the generator: last-value lookups built from `source` and
/// keyed onto `target`. Existing columns of the same name are replaced.
pub fn join_history(
    source: &Frame,
    target: &Frame,
    spec: &FeatureSpec,
    corpus: &'static str,
) -> Result<Frame, FeatureError> {
    require_columns(source, &spec.training_columns(), "training")?;
    require_columns(target, &spec.key_columns(), corpus)?;
    let mut out = target.clone();

    // 4. purchase size
    let ps = &spec.purchase_size;
    let index = LastValueIndex::build(source, &[ps.group.as_str()], &[ps.values.as_str()])?;
    let mut joined = index.left_join(&out, &[ps.on_col.as_str()], &Value::Int(FLAG_DEFAULT))?;
    out = out.with_column(&ps.name, joined.remove(0))?;

    // 5. historical flags
    let flag_columns = spec.flag.flag_columns();
    let index = LastValueIndex::build(source, spec.flag.group.as_slice(), &flag_columns)?;
    let joined = index.left_join(&out, spec.flag.on_col.as_slice(), &Value::Int(FLAG_DEFAULT))?;
    for (name, values) in flag_columns.iter().zip(joined) {
        out = out.with_column(name, values)?;
    }

    // 6. distinct OKPD2 count
    let uq = &spec.uniq_okpd2;
    let index = LastValueIndex::build(source, &[uq.group.as_str()], &[uq.name.as_str()])?;
    let mut joined = index.left_join(
        &out,
        &[uq.on_col.as_str()],
        &Value::Int(UNIQUE_COUNT_DEFAULT),
    )?;
    out = out.with_column(&uq.name, joined.remove(0))?;

    tracing::debug!(corpus, flags = flag_columns.len(), "joined historical features");
    Ok(out)
}

/// Training rows with the same feature families candidates receive.
///
/// The corpus is prepared and then looked up against itself, so a flag or
/// count column holds the group's last value on both sides. When the
/// purchase-size lookup writes to a new name, the raw `values` column is
/// dropped: candidates never carry it.
pub fn training_features(train: &Frame, spec: &FeatureSpec) -> Result<Frame, FeatureError> {
    let prepared = prepare_training(train, spec)?;
    let out = join_history(&prepared, &prepared, spec, "training")?;

    let ps = &spec.purchase_size;
    if ps.name != ps.values && !spec.key_columns().contains(&ps.values.as_str()) {
        return Ok(out.drop_columns(&[ps.values.as_str()])?);
    }
    Ok(out)
}

/// Augment `test` with every feature family, using `train` as the source of
/// the per-group lookups. Neither input is modified.
pub fn generate_features(
    train: &Frame,
    test: &Frame,
    spec: &FeatureSpec,
) -> Result<Frame, FeatureError> {
    spec.validate()?;
    require_columns(train, &spec.training_columns(), "training")?;
    require_columns(test, &spec.candidate_columns(), "candidate")?;

    // 1-3
    let out = row_local(test, spec)?;
    // 4-6
    let out = join_history(train, &out, spec, "candidate")?;

    // 7. pruning
    for c in &spec.drop_columns {
        if !out.has_column(c) {
            return Err(ConfigurationError::MissingColumn {
                column: c.clone(),
                corpus: "candidate",
            }
            .into());
        }
    }
    let out = out.drop_columns(&spec.drop_columns)?;

    tracing::debug!(
        rows = out.height(),
        columns = out.width(),
        "generated candidate features"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    pub(crate) fn spec() -> FeatureSpec {
        FeatureSpec {
            vector: "emb".into(),
            n_components: 2,
            date: "date".into(),
            region: "region".into(),
            okpd2: "okpd2".into(),
            okpd2_prefix: None,
            month_name: "month".into(),
            composite_name: "reg_code".into(),
            purchase_size: PurchaseSizeSpec {
                group: "customer".into(),
                values: "size".into(),
                name: "size_last".into(),
                on_col: "customer".into(),
            },
            flag: FlagSpec {
                train_columns: vec!["customer".into(), "is_sme".into()],
                group: ["customer"].into_iter().collect(),
                on_col: ["customer"].into_iter().collect(),
            },
            uniq_okpd2: UniqueCodeSpec {
                group: "customer".into(),
                on_col: "customer".into(),
                name: "uniq_okpd2".into(),
            },
            drop_columns: vec!["emb".into(), "date".into()],
        }
    }

    fn d(m: u32) -> Value {
        NaiveDate::from_ymd_opt(2023, m, 1).unwrap().into()
    }

    fn train() -> Frame {
        Frame::from_rows(
            ["id", "customer", "region", "okpd2", "date", "size", "is_sme", "emb"],
            vec![
                vec![Value::Int(1), "c1".into(), Value::Int(77), "26.20".into(), d(1), Value::Int(2), Value::Int(0), vec![0.0, 1.0].into()],
                vec![Value::Int(2), "c1".into(), Value::Int(77), "26.30".into(), d(2), Value::Int(3), Value::Int(1), vec![1.0, 0.0].into()],
                vec![Value::Int(3), "c2".into(), Value::Int(50), "26.20".into(), d(3), Value::Int(1), Value::Int(1), vec![0.5, 0.5].into()],
            ],
        )
        .unwrap()
    }

    fn test_corpus() -> Frame {
        Frame::from_rows(
            ["id", "customer", "region", "okpd2", "date", "emb"],
            vec![
                vec![Value::Int(10), "c1".into(), Value::Int(77), "26.20".into(), d(5), vec![0.2, 0.8].into()],
                vec![Value::Int(11), "c9".into(), Value::Int(50), "10.10".into(), d(6), vec![0.9, 0.1].into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn generates_all_families_in_order() {
        let spec = spec();
        let train = prepare_training(&train(), &spec).unwrap();
        let out = generate_features(&train, &test_corpus(), &spec).unwrap();

        assert_eq!(
            out.columns(),
            &["id", "customer", "region", "okpd2", "0", "1", "month", "reg_code", "size_last", "is_sme", "uniq_okpd2"]
                .map(String::from)
        );
        assert_eq!(out.get(0, "0"), Some(&Value::Float(0.2)));
        assert_eq!(out.get(0, "month"), Some(&Value::Int(5)));
        assert_eq!(out.get(0, "reg_code"), Some(&Value::Str("77_26.20".into())));
        assert_eq!(out.get(0, "size_last"), Some(&Value::Int(3)));
        assert_eq!(out.get(0, "is_sme"), Some(&Value::Int(1)));
        assert_eq!(out.get(0, "uniq_okpd2"), Some(&Value::Int(2)));
    }

    #[test]
    fn lookup_misses_use_asymmetric_defaults() {
        let spec = spec();
        let train = prepare_training(&train(), &spec).unwrap();
        let out = generate_features(&train, &test_corpus(), &spec).unwrap();

        assert_eq!(out.get(1, "size_last"), Some(&Value::Int(0)));
        assert_eq!(out.get(1, "is_sme"), Some(&Value::Int(0)));
        assert_eq!(out.get(1, "uniq_okpd2"), Some(&Value::Int(1)));
    }

    #[test]
    fn training_rows_carry_the_candidate_lookups() {
        let spec = spec();
        let out = training_features(&train(), &spec).unwrap();

        assert!(!out.has_column("size"));
        assert_eq!(
            out.column("size_last").unwrap(),
            vec![&Value::Int(3), &Value::Int(3), &Value::Int(1)]
        );
        assert_eq!(
            out.column("is_sme").unwrap(),
            vec![&Value::Int(1), &Value::Int(1), &Value::Int(1)]
        );
        assert_eq!(
            out.column("uniq_okpd2").unwrap(),
            vec![&Value::Int(2), &Value::Int(2), &Value::Int(1)]
        );

        let prepared = prepare_training(&train(), &spec).unwrap();
        let candidates = generate_features(&prepared, &test_corpus(), &spec).unwrap();
        for c in candidates.columns() {
            assert!(out.has_column(c), "training rows lack `{c}`");
        }
    }

    #[test]
    fn inputs_are_not_mutated() {
        let spec = spec();
        let train = prepare_training(&train(), &spec).unwrap();
        let test = test_corpus();
        let before = test.clone();
        generate_features(&train, &test, &spec).unwrap();
        assert_eq!(test, before);
    }

    #[test]
    fn missing_training_column_is_a_configuration_error() {
        let spec = spec();
        let train = train().drop_columns(&["size"]).unwrap();
        let err = generate_features(&train, &test_corpus(), &spec).unwrap_err();
        assert_eq!(
            err,
            FeatureError::Configuration(ConfigurationError::MissingColumn {
                column: "size".into(),
                corpus: "training",
            })
        );
    }

    #[test]
    fn missing_drop_column_is_a_configuration_error() {
        let mut spec = spec();
        spec.drop_columns.push("notice_url".into());
        let train = prepare_training(&train(), &spec).unwrap();
        assert!(matches!(
            generate_features(&train, &test_corpus(), &spec),
            Err(FeatureError::Configuration(ConfigurationError::MissingColumn { .. }))
        ));
    }

    #[test]
    fn mismatched_flag_keys_are_rejected() {
        let mut spec = spec();
        spec.flag.on_col = ["customer", "region"].into_iter().collect();
        assert!(matches!(
            spec.validate(),
            Err(ConfigurationError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn column_list_accepts_string_or_array() {
        #[derive(Deserialize)]
        struct Pair {
            a: ColumnList,
            b: ColumnList,
        }
        let p: Pair = serde_json::from_str(r#"{"a": "x", "b": ["y", "z"]}"#).unwrap();
        assert_eq!(p.a.as_slice(), &["x".to_string()]);
        assert_eq!(p.b.as_slice().len(), 2);
    }
}
