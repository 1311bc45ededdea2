//! Integration test: train, serve, score, explain

use fraud_ensemble::anomaly::{AnomalyDetector, IsolationForest, LocalOutlierFactor};
use fraud_ensemble::behavior::{BehavioralScorer, ProfileStore, ProfileStoreConfig};
use fraud_ensemble::ensemble::{BlendWeights, RiskTier, WEAK_SIGNALS_REASON};
use fraud_ensemble::error::FraudError;
use fraud_ensemble::features::{FeatureExtractor, Transaction};
use fraud_ensemble::inference::{ActiveModel, FraudModel, TrainedScorer};
use fraud_ensemble::training::{ModelKind, TrainEngine, TrainingConfig};
use std::sync::Arc;

fn records() -> Vec<Transaction> {
    let mut records: Vec<Transaction> = (0..150)
        .map(|i| {
            Transaction::new()
                .with_field("id", format!("tx-{}", i))
                .with_field("Amount", 20.0 + (i % 40) as f64 * 2.5)
                .with_field("Time", (10 + i % 8) as f64 * 3600.0)
                .with_field("merchant", "grocery")
                .with_field("location", "Paris")
                .with_field("velocity", (i % 3) as f64)
                .with_field("Class", 0)
        })
        .collect();
    records.extend((0..15).map(|i| {
        Transaction::new()
            .with_field("id", format!("fraud-{}", i))
            .with_field("Amount", 4000.0 + i as f64 * 100.0)
            .with_field("Time", 3.0 * 3600.0)
            .with_field("merchant", "crypto exchange")
            .with_field("location", "International high risk")
            .with_field("velocity", 8.0)
            .with_field("Class", 1)
    }));
    records
}

fn suspicious() -> Transaction {
    Transaction::new()
        .with_field("Amount", 6500.0)
        .with_field("Time", 2.0 * 3600.0)
        .with_field("merchant", "casino")
        .with_field("location", "international")
        .with_field("velocity", 9.0)
}

fn ordinary() -> Transaction {
    Transaction::new()
        .with_field("Amount", 55.0)
        .with_field("Time", 12.0 * 3600.0)
        .with_field("merchant", "grocery")
        .with_field("location", "Paris")
        .with_field("velocity", 1.0)
}

#[test]
fn test_ensemble_end_to_end() {
    let config = TrainingConfig::new(ModelKind::Ensemble)
        .with_num_trees(50)
        .with_seed(21);
    let outcome = TrainEngine::new(config).train(&records()).unwrap();
    let active = ActiveModel::with_model(outcome.model);

    let bad = active.predict(&suspicious()).unwrap();
    let good = active.predict(&ordinary()).unwrap();

    assert!(bad.score > good.score);
    assert!(bad.risk_score > good.risk_score);
    assert!(bad.sub_scores.isolation_forest.is_some());
    assert!(bad.sub_scores.lof.is_some());
    assert!(bad.sub_scores.one_class.is_some());
    assert!(bad.sub_scores.weighted_forest.is_none());
    assert!(bad.explanation.iter().any(|r| r.contains("standard deviations")));
    assert!(bad.explanation.iter().any(|r| r == "High-risk merchant category"));
    assert_eq!(good.risk_tier, RiskTier::from_score(good.score));
}

#[test]
fn test_blend_weights_change_aggregation() {
    let only_if = BlendWeights::new(1.0, 0.0, 0.0);
    let config = TrainingConfig::new(ModelKind::Ensemble)
        .with_num_trees(30)
        .with_blend_weights(only_if)
        .with_seed(3);
    let model = TrainEngine::new(config).train(&records()).unwrap().model;

    let p = model.predict(&suspicious()).unwrap();
    let isolation = p.sub_scores.isolation_forest.unwrap();
    assert!((p.score - isolation).abs() < 1e-12);
}

#[test]
fn test_invalid_blend_weights_rejected() {
    let config = TrainingConfig::new(ModelKind::Ensemble).with_blend_weights(BlendWeights::new(0.5, 0.5, 0.5));
    assert!(matches!(
        TrainEngine::new(config).train(&records()),
        Err(FraudError::InvalidParameter { .. })
    ));
}

#[test]
fn test_single_model_policy_is_identity() {
    let config = TrainingConfig::new(ModelKind::IsolationForest)
        .with_num_trees(40)
        .with_seed(8);
    let model = TrainEngine::new(config).train(&records()).unwrap().model;
    let p = model.predict(&suspicious()).unwrap();
    assert_eq!(Some(p.score), p.sub_scores.isolation_forest);
    assert_eq!(p.risk_score, (p.score * 100.0).round() as u8);
}

#[test]
fn test_untrained_isolation_forest_is_neutral() {
    let model = FraudModel::new(
        FeatureExtractor::new(),
        TrainedScorer::IsolationForest(IsolationForest::new()),
        0.6,
    );
    let p = model.predict(&ordinary()).unwrap();
    assert_eq!(p.score, 0.5);
    assert!(!p.is_fraud);
}

#[test]
fn test_lof_with_tiny_reference_is_low_confidence() {
    let tiny = FeatureExtractor::new().extract_batch(&records()[..3]);
    let mut lof = LocalOutlierFactor::new(5);
    lof.fit(&tiny).unwrap();
    let model = FraudModel::new(FeatureExtractor::new(), TrainedScorer::Lof(lof), 0.5);

    let p = model.predict(&suspicious()).unwrap();
    assert_eq!(p.score, 0.5);
    assert_eq!(p.confidence, 0.0);
    assert!(p.sub_scores.is_low_confidence(ModelKind::Lof));
}

#[test]
fn test_flagged_without_reasons_gets_weak_signals() {
    let model = FraudModel::new(
        FeatureExtractor::new(),
        TrainedScorer::IsolationForest(IsolationForest::new()),
        0.4,
    );
    let plain = Transaction::new().with_field("Amount", 60.0);
    let p = model.predict(&plain).unwrap();
    assert!(p.is_fraud);
    assert_eq!(p.explanation, vec![WEAK_SIGNALS_REASON.to_string()]);
}

#[test]
fn test_empty_active_model_not_trained() {
    let active = ActiveModel::new();
    assert!(matches!(active.predict(&ordinary()), Err(FraudError::ModelNotTrained)));
}

#[test]
fn test_failed_retrain_keeps_serving_model() {
    let first = TrainEngine::new(TrainingConfig::new(ModelKind::Lof).with_seed(1))
        .train(&records())
        .unwrap();
    let active = ActiveModel::with_model(first.model.clone());

    let broken = vec![Transaction::new().with_field("Amount", "n/a")];
    let result = TrainEngine::new(TrainingConfig::new(ModelKind::Lof)).train(&broken);
    assert!(matches!(result, Err(FraudError::InvalidInput(_))));

    assert_eq!(*active.current().unwrap(), first.model);
}

#[test]
fn test_malformed_amount_at_predict_is_invalid_input() {
    let model = TrainEngine::new(TrainingConfig::new(ModelKind::IsolationForest).with_num_trees(10).with_seed(2))
        .train(&records())
        .unwrap()
        .model;
    let bad = Transaction::new().with_field("Amount", "twelve");
    assert!(matches!(model.predict(&bad), Err(FraudError::InvalidInput(_))));
}

#[test]
fn test_behavioral_variant_over_replayed_history() {
    let store = Arc::new(ProfileStore::new(&ProfileStoreConfig::default().with_shards(4)).unwrap());
    let scorer = BehavioralScorer::new(Arc::clone(&store));

    for tx in records().iter().take(40) {
        let tx = tx.clone().with_field("user_id", "card-1");
        let assessment = scorer.assess(&tx).unwrap();
        assert!(!assessment.is_suspicious);
    }

    let odd = suspicious().with_field("user_id", "card-1");
    let assessment = scorer.assess(&odd).unwrap();
    assert!(assessment.is_suspicious);
    assert!(assessment.reasons.iter().any(|r| r.starts_with("New merchant")));
    assert_eq!(store.get("card-1").unwrap().transaction_count, 41);
}
