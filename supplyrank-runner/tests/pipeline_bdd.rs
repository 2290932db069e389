//! BDD tests for the supplier pipeline.
//!
//! These tests verify end-to-end behaviour on a small synthetic corpus:
//! - Training a supplier model and persisting it as an artifact
//! - Candidate preparation without leakage
//! - Ranking candidates with a loaded artifact
//! - Search determinism
//! - Lookup features that mean the same on training and candidate rows

use chrono::NaiveDate;
use supplyrank_core::frame::{Frame, Value};
use supplyrank_core::selection::supplier_purchases;
use supplyrank_core::trainer::TrainingError;
use supplyrank_runner::{
    prepare_candidates, score_candidates, train_supplier, ModelArtifact, PipelineConfig,
    PipelineError, SupplierRegistry, TrialHistory,
};

const SUPPLIER: &str = "1";

fn config_toml(n_trials: usize, parallel: bool, size_name: &str) -> String {
    format!(
        r#"
[data]
train_data = "train.csv"
candidate_data = "candidates.csv"

[preprocessing]
date = "date"
region = "region"
okpd2 = "okpd2"
drop_columns = ["date", "emb"]

[preprocessing.purchase_size]
group = "customer"
values = "size"
name = "{size_name}"
on_col = "customer"

[preprocessing.flag]
train_columns = ["customer", "is_sme"]
group = "customer"
on_col = "customer"

[preprocessing.uniq_okpd2]
group = "customer"
on_col = "customer"
name = "uniq_okpd2"

[preprocessing.recommender]
sup_column = "supplier"
filter_column = "reg_code"
drop_columns = ["notice_url"]
index_column = "purchase"

[train]
vector = "emb"
n_components = 2
sup_column = "supplier"
index_column = "purchase"
n_trials = {n_trials}
N_FOLDS = 2
random_state = 10
parallel = {parallel}

[train.search_space]
n_estimators = {{ low = 3, high = 8 }}
max_depth = {{ low = 1, high = 3 }}
min_samples_leaf = {{ low = 1, high = 3 }}
"#
    )
}

fn config(n_trials: usize, parallel: bool) -> PipelineConfig {
    config_with_size_name(n_trials, parallel, "size")
}

/// Config whose purchase-size lookup writes to `size_name` instead of `size`.
fn config_with_size_name(n_trials: usize, parallel: bool, size_name: &str) -> PipelineConfig {
    PipelineConfig::from_toml_str(&config_toml(n_trials, parallel, size_name))
        .expect("fixture config is valid")
}

fn position_of(frame: &Frame, id: i64) -> usize {
    frame
        .index()
        .iter()
        .position(|v| *v == Value::Int(id))
        .expect("id is present")
}

fn date(i: i64) -> Value {
    NaiveDate::from_ymd_opt(2023, 1 + (i % 12) as u32, 1 + (i % 28) as u32)
        .unwrap()
        .into()
}

fn okpd2(i: i64) -> Value {
    Value::from(if i % 2 == 0 { "26.20" } else { "26.30" })
}

/// 40 purchases in region 77. Supplier 2 bids on every purchase; supplier 1
/// bids on every third one, which are also the large purchases and lead
/// with a high first embedding component.
fn training_corpus() -> Frame {
    let columns = [
        "purchase", "supplier", "customer", "region", "okpd2", "date", "size", "is_sme", "emb",
        "notice_url",
    ];
    let mut rows = Vec::new();
    for i in 0..40i64 {
        let wins = i % 3 == 0;
        let size = if wins { 100 + i } else { i % 3 };
        let base = |supplier: i64| {
            vec![
                Value::Int(i),
                Value::Int(supplier),
                format!("c{}", i % 4).into(),
                Value::Int(77),
                okpd2(i),
                date(i),
                Value::Int(size),
                Value::Int(i % 2),
                vec![if wins { 0.9 } else { 0.1 }, i as f64 / 40.0].into(),
                format!("https://zakupki.example/{i}").into(),
            ]
        };
        rows.push(base(2));
        if wins {
            rows.push(base(1));
        }
    }
    Frame::from_rows(columns, rows).unwrap()
}

/// 10 new purchases, half under supplier 1's region/code keys.
fn candidate_corpus() -> Frame {
    let columns = ["purchase", "customer", "region", "okpd2", "date", "emb", "notice_url"];
    let rows = (100..110i64)
        .map(|i| {
            vec![
                Value::Int(i),
                format!("c{}", i % 4).into(),
                Value::Int(if i < 105 { 77 } else { 50 }),
                okpd2(i),
                date(i),
                vec![0.5, 0.5].into(),
                format!("https://zakupki.example/{i}").into(),
            ]
        })
        .collect();
    Frame::from_rows(columns, rows).unwrap()
}

#[test]
fn bdd_scenario_train_persist_and_score_supplier() {
    // GIVEN a training corpus and a pipeline config
    let cfg = config(3, true);
    let dir = tempfile::tempdir().unwrap();

    // WHEN the supplier model is trained with trial history enabled
    let history = TrialHistory::new(dir.path().join("history/trials.jsonl"));
    let trained = train_supplier(&training_corpus(), SUPPLIER, &cfg, Some(history.clone()))
        .expect("training should succeed");

    // THEN every training row is labelled: 40 purchases plus supplier 1's 14
    // bids, and both rows of each of those 14 purchases are positive
    assert_eq!(trained.dataset.len(), 54);
    assert_eq!(trained.dataset.positives(), 28);
    assert!(!trained.dataset.schema.names().contains(&"supplier"));
    assert!(!trained.dataset.schema.names().contains(&"notice_url"));
    assert!(trained.cv_score > 0.5);

    // AND every trial is recorded in order under the supplier
    let entries = history.read_all().unwrap();
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|e| e.supplier.as_deref() == Some(SUPPLIER)));
    assert_eq!(
        entries.iter().map(|e| e.trial.trial_id).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );

    // WHEN the artifact is saved and loaded through the registry
    trained.to_artifact().unwrap().save(dir.path()).unwrap();
    let mut registry = SupplierRegistry::new();
    let artifact = registry.load_from_dir(dir.path(), SUPPLIER).unwrap().clone();

    // AND candidates are prepared and scored
    let partition =
        prepare_candidates(&training_corpus(), &candidate_corpus(), SUPPLIER, &cfg).unwrap();
    let ranked = score_candidates(&artifact, &partition.candidates).unwrap();

    // THEN only candidates under the supplier's keys are ranked, best first
    assert!(!partition.used_fallback);
    assert_eq!(ranked.len(), 5);
    assert!(ranked.iter().all(|c| matches!(c.id, Value::Int(i) if i < 105)));
    assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    assert_eq!(ranked[0].rank, 1);
}

#[test]
fn bdd_scenario_candidates_exclude_training_and_supplier_purchases() {
    // GIVEN a candidate corpus that repeats a historical purchase supplier 1 did not bid on
    let cfg = config(1, false);
    let train = training_corpus();
    let mut candidates = candidate_corpus();
    candidates
        .push_row(vec![
            Value::Int(4),
            "c0".into(),
            Value::Int(77),
            okpd2(4),
            date(4),
            vec![0.1, 0.9].into(),
            "https://zakupki.example/4".into(),
        ])
        .unwrap();

    // WHEN the candidates are prepared
    let partition = prepare_candidates(&train, &candidates, SUPPLIER, &cfg).unwrap();

    // THEN the historical purchase stays in training and is not a candidate
    assert!(partition.train.index().contains(&Value::Int(4)));
    assert!(!partition.candidates.index().contains(&Value::Int(4)));

    // AND no supplier purchase remains in the cleaned training set
    let purchases = supplier_purchases(&train, &Value::Int(1), "supplier", "purchase").unwrap();
    assert!(partition.train.index().iter().all(|id| !purchases.contains(id)));

    // AND no training id is a candidate
    assert!(partition
        .candidates
        .index()
        .iter()
        .all(|id| !partition.train.index().contains(id)));
}

#[test]
fn bdd_scenario_fallback_to_full_candidate_corpus() {
    // GIVEN candidates that all lie outside supplier 1's region
    let cfg = config(1, false);
    let candidates = candidate_corpus().filter(|i| i >= 5);

    // WHEN candidates are prepared
    let partition = prepare_candidates(&training_corpus(), &candidates, SUPPLIER, &cfg).unwrap();

    // THEN the full candidate corpus is used
    assert!(partition.used_fallback);
    assert_eq!(partition.candidates.height(), 5);
}

#[test]
fn bdd_scenario_parallel_and_sequential_search_agree() {
    // GIVEN the same corpus and seed
    let train = training_corpus();

    // WHEN the search runs on rayon workers and sequentially
    let parallel = train_supplier(&train, SUPPLIER, &config(4, true), None).unwrap();
    let sequential = train_supplier(&train, SUPPLIER, &config(4, false), None).unwrap();

    // THEN the outcomes are identical
    assert_eq!(parallel.search.trials, sequential.search.trials);
    assert_eq!(parallel.search.best_trial, sequential.search.best_trial);
    assert_eq!(parallel.model, sequential.model);
}

#[test]
fn bdd_scenario_single_trial_is_the_best_trial() {
    // GIVEN n_trials = 1
    let trained = train_supplier(&training_corpus(), SUPPLIER, &config(1, false), None).unwrap();

    // THEN trial 0 wins
    assert_eq!(trained.search.best_trial, 0);
    assert_eq!(trained.search.trials.len(), 1);
    assert_eq!(trained.params, trained.search.trials[0].params);
}

#[test]
fn bdd_scenario_unknown_supplier_has_no_positives() {
    // GIVEN a supplier that never bid
    let cfg = config(2, false);

    // WHEN training is attempted
    let err = train_supplier(&training_corpus(), "999", &cfg, None).unwrap_err();

    // THEN the pipeline fails on the empty training selection
    assert!(
        matches!(err, PipelineError::Training(TrainingError::EmptyDataset)),
        "got {err}"
    );
}

#[test]
fn bdd_scenario_missing_configured_column_is_fatal() {
    // GIVEN a training corpus without the supplier column
    let cfg = config(1, false);
    let train = training_corpus().drop_columns(&["supplier"]).unwrap();

    // WHEN training is attempted
    let err = train_supplier(&train, SUPPLIER, &cfg, None).unwrap_err();

    // THEN a configuration error names the column
    assert!(matches!(err, PipelineError::Configuration(_)), "got {err}");
    assert!(err.to_string().contains("supplier"));
}

#[test]
fn bdd_scenario_artifact_round_trip_scores_identically() {
    // GIVEN a trained supplier saved to disk
    let cfg = config(2, false);
    let dir = tempfile::tempdir().unwrap();
    let trained = train_supplier(&training_corpus(), SUPPLIER, &cfg, None).unwrap();
    let artifact = trained.to_artifact().unwrap();
    let path = artifact.save(dir.path()).unwrap();

    // WHEN it is loaded back
    let loaded = ModelArtifact::load(&path).unwrap();

    // THEN it ranks candidates exactly like the in-memory artifact
    let partition =
        prepare_candidates(&training_corpus(), &candidate_corpus(), SUPPLIER, &cfg).unwrap();
    assert_eq!(
        score_candidates(&artifact, &partition.candidates).unwrap(),
        score_candidates(&loaded, &partition.candidates).unwrap()
    );
}

#[test]
fn bdd_scenario_renamed_purchase_size_trains_and_scores() {
    // GIVEN a config whose purchase-size lookup writes to `size_last`
    let cfg = config_with_size_name(2, false, "size_last");

    // WHEN the supplier model is trained
    let trained = train_supplier(&training_corpus(), SUPPLIER, &cfg, None).unwrap();

    // THEN the model uses the looked-up column, not the raw per-row size
    let names = trained.dataset.schema.names();
    assert!(names.contains(&"size_last"));
    assert!(!names.contains(&"size"));

    // WHEN candidates are prepared and scored with the trained artifact
    let artifact = trained.to_artifact().unwrap();
    let partition =
        prepare_candidates(&training_corpus(), &candidate_corpus(), SUPPLIER, &cfg).unwrap();
    let ranked = score_candidates(&artifact, &partition.candidates).unwrap();

    // THEN every candidate under the supplier's keys is ranked
    assert_eq!(ranked.len(), 5);
}

#[test]
fn bdd_scenario_lookup_features_agree_between_training_and_candidates() {
    // GIVEN a candidate corpus without the flag and size columns
    let cfg = config_with_size_name(1, false, "size_last");
    let candidates = candidate_corpus();
    assert!(!candidates.has_column("is_sme"));
    assert!(!candidates.has_column("size"));

    // WHEN candidates are prepared
    let partition =
        prepare_candidates(&training_corpus(), &candidates, SUPPLIER, &cfg).unwrap();

    // THEN candidate 100 (customer c0) carries c0's last training values:
    // purchase 36, bid on by supplier 1, size 136, not an SME
    let row = position_of(&partition.candidates, 100);
    assert_eq!(partition.candidates.get(row, "size_last"), Some(&Value::Int(136)));
    assert_eq!(partition.candidates.get(row, "is_sme"), Some(&Value::Int(0)));

    // AND the training rows of customer c0 hold the same last values
    let c0 = Value::from("c0");
    let c0_rows: Vec<usize> = (0..partition.train.height())
        .filter(|&r| partition.train.get(r, "customer") == Some(&c0))
        .collect();
    assert!(!c0_rows.is_empty());
    for r in c0_rows {
        assert_eq!(partition.train.get(r, "size_last"), Some(&Value::Int(136)));
        assert_eq!(partition.train.get(r, "is_sme"), Some(&Value::Int(0)));
    }
}
