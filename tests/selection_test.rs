//! Best-run selection against a run registry.

use std::sync::Arc;

use churnline::experiment::{LocalRunRegistry, RunRegistry, RunStatus, BEST_MODEL_TAG};
use churnline::selector::{BestTagPolicy, ModelSelector, SelectionConfig};
use churnline::Error;

const EXPERIMENT: &str = "telecom-churn";

fn setup() -> (Arc<LocalRunRegistry>, String, ModelSelector<LocalRunRegistry>) {
    let registry = Arc::new(LocalRunRegistry::in_memory().unwrap());
    let exp = registry.create_experiment(EXPERIMENT).unwrap();
    let selector = ModelSelector::new(Arc::clone(&registry), SelectionConfig::default());
    (registry, exp.experiment_id().to_string(), selector)
}

fn run_with(
    registry: &LocalRunRegistry,
    experiment_id: &str,
    auc: Option<f64>,
    status: RunStatus,
) -> String {
    let run = registry.create_run(experiment_id, "sample_logreg_run").unwrap();
    if let Some(auc) = auc {
        registry.log_metric(run.run_id(), "auc", 0, auc).unwrap();
    }
    if status != RunStatus::Running {
        registry.finish_run(run.run_id(), status).unwrap();
    }
    run.run_id().to_string()
}

#[test]
fn test_selects_highest_auc() {
    let (registry, exp, selector) = setup();
    let ids: Vec<String> = [0.91, 0.95, 0.93]
        .iter()
        .map(|&auc| run_with(&registry, &exp, Some(auc), RunStatus::Success))
        .collect();

    let best = selector.select_best(EXPERIMENT, "auc", 5).unwrap();
    assert_eq!(best, ids[1]);
    assert_eq!(
        registry.get_run(&best).unwrap().tag(BEST_MODEL_TAG),
        Some("true")
    );
}

#[test]
fn test_repeat_selection_is_stable_and_idempotent() {
    let (registry, exp, selector) = setup();
    for auc in [0.8, 0.9, 0.85] {
        run_with(&registry, &exp, Some(auc), RunStatus::Success);
    }

    let first = selector.select_best(EXPERIMENT, "auc", 5).unwrap();
    let second = selector.select_best(EXPERIMENT, "auc", 5).unwrap();
    assert_eq!(first, second);

    let run = registry.get_run(&first).unwrap();
    assert_eq!(
        run.tags().iter().filter(|(k, _)| *k == BEST_MODEL_TAG).count(),
        1
    );
}

#[test]
fn test_tie_goes_to_earliest_run() {
    let (registry, exp, selector) = setup();
    let first = run_with(&registry, &exp, Some(0.9), RunStatus::Success);
    let _second = run_with(&registry, &exp, Some(0.9), RunStatus::Success);
    let _worse = run_with(&registry, &exp, Some(0.7), RunStatus::Success);

    assert_eq!(selector.select_best(EXPERIMENT, "auc", 5).unwrap(), first);
}

#[test]
fn test_incomplete_runs_are_ignored() {
    let (registry, exp, selector) = setup();
    let done = run_with(&registry, &exp, Some(0.6), RunStatus::Success);
    run_with(&registry, &exp, Some(0.99), RunStatus::Running);
    run_with(&registry, &exp, Some(0.98), RunStatus::Failed);

    assert_eq!(selector.select_best(EXPERIMENT, "auc", 5).unwrap(), done);
}

#[test]
fn test_runs_missing_metric_rank_last() {
    let (registry, exp, selector) = setup();
    run_with(&registry, &exp, None, RunStatus::Success);
    let scored = run_with(&registry, &exp, Some(0.5), RunStatus::Success);

    assert_eq!(selector.select_best(EXPERIMENT, "auc", 5).unwrap(), scored);
}

#[test]
fn test_no_completed_runs_is_empty_result() {
    let (registry, exp, selector) = setup();
    run_with(&registry, &exp, Some(0.9), RunStatus::Running);

    assert!(matches!(
        selector.select_best(EXPERIMENT, "auc", 5),
        Err(Error::EmptyResult { .. })
    ));
}

#[test]
fn test_unknown_experiment_is_not_found() {
    let (_, _, selector) = setup();
    assert!(matches!(
        selector.select_best("no-such-experiment", "auc", 5),
        Err(Error::NotFound { kind: "experiment", .. })
    ));
}

#[test]
fn test_max_candidates_one_still_returns_best() {
    let (registry, exp, selector) = setup();
    run_with(&registry, &exp, Some(0.7), RunStatus::Success);
    let best = run_with(&registry, &exp, Some(0.8), RunStatus::Success);

    assert_eq!(selector.select_best(EXPERIMENT, "auc", 1).unwrap(), best);
}

#[test]
fn test_other_metric_can_be_used() {
    let (registry, exp, selector) = setup();
    let high_auc = run_with(&registry, &exp, Some(0.9), RunStatus::Success);
    let run = registry.create_run(&exp, "full_logreg_run").unwrap();
    registry.log_metric(run.run_id(), "auc", 0, 0.5).unwrap();
    registry.log_metric(run.run_id(), "accuracy", 0, 0.99).unwrap();
    registry.finish_run(run.run_id(), RunStatus::Success).unwrap();

    assert_eq!(
        selector.select_best(EXPERIMENT, "accuracy", 5).unwrap(),
        run.run_id()
    );
    assert_eq!(selector.select_best(EXPERIMENT, "auc", 5).unwrap(), high_auc);
}

#[test]
fn test_exclusive_policy_leaves_one_tagged_run() {
    let registry = Arc::new(LocalRunRegistry::in_memory().unwrap());
    let exp = registry.create_experiment(EXPERIMENT).unwrap();
    let selector = ModelSelector::new(
        Arc::clone(&registry),
        SelectionConfig {
            best_tag_policy: BestTagPolicy::Exclusive,
            ..SelectionConfig::default()
        },
    );

    let mut winners = Vec::new();
    for auc in [0.7, 0.8, 0.9] {
        run_with(&registry, exp.experiment_id(), Some(auc), RunStatus::Success);
        winners.push(selector.select_default(EXPERIMENT).unwrap());
    }

    let tagged: Vec<&String> = winners
        .iter()
        .filter(|id| registry.get_run(id).unwrap().tag(BEST_MODEL_TAG).is_some())
        .collect();
    assert_eq!(tagged, vec![&winners[2]]);
}
