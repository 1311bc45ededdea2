//! Integration test: training rounds for every model kind

use fraud_ensemble::anomaly::{average_path_length, AnomalyDetector, IsolationForest};
use fraud_ensemble::features::{FeatureId, FeatureVector, Transaction};
use fraud_ensemble::inference::TrainedScorer;
use fraud_ensemble::training::{weighted_gini, ModelKind, TrainEngine, TrainingConfig, WeightedForest};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn legit(rng: &mut ChaCha8Rng) -> Transaction {
    let hour = rng.gen_range(9..19) as f64;
    Transaction::new()
        .with_field("Amount", rng.gen_range(15.0..120.0))
        .with_field("Time", hour * 3600.0)
        .with_field("merchant", if rng.gen_bool(0.5) { "grocery" } else { "restaurant" })
        .with_field("location", "Berlin")
        .with_field("device_risk", "low")
        .with_field("V1", rng.gen_range(-1.0..1.0))
        .with_field("Class", 0)
}

fn fraud(rng: &mut ChaCha8Rng) -> Transaction {
    let hour = rng.gen_range(1..5) as f64;
    Transaction::new()
        .with_field("Amount", rng.gen_range(2000.0..5000.0))
        .with_field("Time", hour * 3600.0)
        .with_field("merchant", "casino")
        .with_field("location", "international high risk")
        .with_field("device_risk", "high")
        .with_field("V1", rng.gen_range(-8.0..-5.0))
        .with_field("Class", 1)
}

fn dataset(n_legit: usize, n_fraud: usize, seed: u64) -> Vec<Transaction> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut records: Vec<Transaction> = (0..n_legit).map(|_| legit(&mut rng)).collect();
    records.extend((0..n_fraud).map(|_| fraud(&mut rng)));
    records
}

#[test]
fn test_every_kind_trains_and_scores_in_range() {
    let records = dataset(200, 20, 1);
    for kind in ModelKind::ALL {
        let config = TrainingConfig::new(kind).with_num_trees(20).with_seed(3);
        let outcome = TrainEngine::new(config)
            .train(&records)
            .unwrap_or_else(|e| panic!("{} failed to train: {}", kind, e));

        assert_eq!(outcome.model.kind(), kind);
        assert_eq!(outcome.train_size + outcome.test_size, records.len());
        for tx in records.iter().take(30) {
            let p = outcome.model.predict(tx).unwrap();
            assert!((0.0..=1.0).contains(&p.score), "{}: score {}", kind, p.score);
            assert!(p.risk_score <= 100);
            assert!((0.0..=1.0).contains(&p.confidence));
        }
    }
}

#[test]
fn test_weighted_forest_separates_classes() {
    let records = dataset(300, 30, 2);
    let config = TrainingConfig::new(ModelKind::WeightedForest)
        .with_num_trees(30)
        .with_seed(5);
    let outcome = TrainEngine::new(config).train(&records).unwrap();

    let metrics = outcome.metrics.expect("labeled test split is evaluated");
    assert_eq!(metrics.confusion.total(), outcome.test_size);
    assert!(metrics.recall > 0.8, "recall {}", metrics.recall);
    assert!(metrics.accuracy > 0.9, "accuracy {}", metrics.accuracy);

    let mut rng = ChaCha8Rng::seed_from_u64(99);
    let p_fraud = outcome.model.predict(&fraud(&mut rng)).unwrap();
    let p_legit = outcome.model.predict(&legit(&mut rng)).unwrap();
    assert!(p_fraud.is_fraud);
    assert!(!p_legit.is_fraud);
    assert!(!p_fraud.explanation.is_empty());
}

#[test]
fn test_forest_tree_count_matches_config() {
    let records = dataset(60, 6, 3);
    for (kind, trees) in [(ModelKind::WeightedForest, 7), (ModelKind::IsolationForest, 13)] {
        let config = TrainingConfig::new(kind).with_num_trees(trees).with_seed(1);
        let outcome = TrainEngine::new(config).train(&records).unwrap();
        assert_eq!(outcome.model.summary().n_trees, trees);
    }
}

#[test]
fn test_isolation_forest_ranks_outliers_higher() {
    let mut rng = ChaCha8Rng::seed_from_u64(4);
    let data: Vec<FeatureVector> = (0..300)
        .map(|_| {
            FeatureVector::from_pairs([
                (FeatureId::Amount, rng.gen_range(40.0..60.0)),
                (FeatureId::Velocity, rng.gen_range(0.0..2.0)),
            ])
        })
        .collect();
    let mut forest = IsolationForest::new().with_n_estimators(100).with_seed(8);
    forest.fit(&data).unwrap();

    let inlier = FeatureVector::from_pairs([(FeatureId::Amount, 50.0), (FeatureId::Velocity, 1.0)]);
    let outlier = FeatureVector::from_pairs([(FeatureId::Amount, 900.0), (FeatureId::Velocity, 9.0)]);
    assert!(forest.score(&outlier) > forest.score(&inlier));
    assert!(forest.score(&outlier) > 0.6);

    let partial = FeatureVector::from_pairs([(FeatureId::Velocity, 1.0)]);
    let empty = FeatureVector::new();
    for p in [&partial, &empty] {
        assert!((0.0..=1.0).contains(&forest.score(p)));
    }
}

#[test]
fn test_path_length_correction_properties() {
    assert_eq!(average_path_length(0), 0.0);
    assert_eq!(average_path_length(1), 0.0);
    let mut previous = average_path_length(2);
    for n in 3..2000 {
        let c = average_path_length(n);
        assert!(c >= previous, "c({}) = {} < c({}) = {}", n, c, n - 1, previous);
        previous = c;
    }
}

#[test]
fn test_unit_class_weight_is_standard_gini() {
    for (fraud, legit) in [(0, 10), (3, 7), (5, 5), (9, 1), (12, 0)] {
        let n = (fraud + legit) as f64;
        let p = fraud as f64 / n;
        let standard = 1.0 - p * p - (1.0 - p) * (1.0 - p);
        assert!((weighted_gini(fraud, legit, 1.0) - standard).abs() < 1e-12);
    }
}

#[test]
fn test_prediction_is_idempotent() {
    let records = dataset(120, 12, 6);
    let outcome = TrainEngine::new(TrainingConfig::new(ModelKind::Ensemble).with_num_trees(15).with_seed(2))
        .train(&records)
        .unwrap();
    for tx in records.iter().take(20) {
        assert_eq!(outcome.model.predict(tx).unwrap(), outcome.model.predict(tx).unwrap());
    }
}

#[test]
fn test_forest_missing_feature_is_neutral_not_error() {
    let records = dataset(100, 10, 7);
    let outcome = TrainEngine::new(TrainingConfig::new(ModelKind::WeightedForest).with_num_trees(10).with_seed(4))
        .train(&records)
        .unwrap();

    let bare = Transaction::new().with_field("Amount", 50.0);
    let p = outcome.model.predict(&bare).unwrap();
    assert!((0.0..=1.0).contains(&p.score));
}

#[test]
fn test_weighted_forest_direct_api() {
    let mut rng = ChaCha8Rng::seed_from_u64(10);
    let mut data = Vec::new();
    let mut labels = Vec::new();
    for i in 0..200 {
        let is_fraud = i % 20 == 0;
        let amount = if is_fraud {
            rng.gen_range(3000.0..4000.0)
        } else {
            rng.gen_range(10.0..100.0)
        };
        data.push(FeatureVector::from_pairs([(FeatureId::Amount, amount)]));
        labels.push(is_fraud);
    }

    let mut forest = WeightedForest::new(25).with_max_depth(4).with_seed(1);
    forest.fit(&data, &labels).unwrap();
    assert_eq!(forest.n_trees(), 25);

    let high = FeatureVector::from_pairs([(FeatureId::Amount, 3500.0)]);
    let low = FeatureVector::from_pairs([(FeatureId::Amount, 40.0)]);
    assert!(forest.predict(&high).unwrap());
    assert!(!forest.predict(&low).unwrap());
    assert_eq!(forest.feature_importances()[0].0, FeatureId::Amount);
}

#[test]
fn test_one_class_classifies_at_decision_boundary() {
    let mut rng = ChaCha8Rng::seed_from_u64(12);
    let records: Vec<Transaction> = (0..100)
        .map(|_| {
            Transaction::new()
                .with_field("Amount", rng.gen_range(45.0..55.0))
                .with_field("velocity", rng.gen_range(0.0..2.0))
        })
        .collect();
    let config = TrainingConfig::new(ModelKind::OneClass)
        .with_threshold(0.7)
        .with_seed(6);
    let model = TrainEngine::new(config).train(&records).unwrap().model;
    assert_eq!(model.threshold(), 0.5);

    let TrainedScorer::OneClass(scorer) = model.scorer() else {
        panic!("expected a one-class scorer, got {:?}", model.kind());
    };

    let mut flagged = 0;
    for step in 0..40 {
        let tx = Transaction::new()
            .with_field("Amount", 50.0 + step as f64 * 0.5)
            .with_field("velocity", 2.0);
        let features = model.features(&tx).unwrap();
        let p = model.predict(&tx).unwrap();
        assert_eq!(p.is_fraud, scorer.is_anomaly(&features), "amount step {}", step);
        flagged += p.is_fraud as usize;
    }
    assert!(flagged > 0);

    let far = Transaction::new().with_field("Amount", 5000.0).with_field("velocity", 9.0);
    assert!(model.predict(&far).unwrap().is_fraud);
}
