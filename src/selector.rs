//! Model Selector - choose the best completed run of an experiment
//!
//! Selection asks the run registry for at most `max_candidates` completed
//! runs ordered by a metric (highest first), takes the head of that list and
//! tags it `best_model=true`. The registry ordering is a total order, so
//! ties resolve to the earliest created run and repeated calls over an
//! unchanged set of runs return the same ID.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::experiment::{OrderBy, RunRegistry, RunStatus, SearchQuery, BEST_MODEL_TAG};
use crate::{Error, Result};

/// What happens to `best_model` tags left by earlier selections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BestTagPolicy {
    /// Earlier winners keep their tag; the tag marks "was chosen at some point".
    #[default]
    Historical,
    /// Clear the tag from every other run in the experiment first, so at most
    /// one run carries it.
    Exclusive,
}

/// Selector settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Metric used when the caller does not name one
    pub metric: String,
    /// Candidate cap used when the caller does not give one
    pub max_candidates: usize,
    /// Handling of previous `best_model` tags
    pub best_tag_policy: BestTagPolicy,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            metric: "auc".to_string(),
            max_candidates: 5,
            best_tag_policy: BestTagPolicy::Historical,
        }
    }
}

/// Picks and tags the best run of an experiment.
#[derive(Debug)]
pub struct ModelSelector<R> {
    runs: Arc<R>,
    config: SelectionConfig,
}

impl<R> Clone for ModelSelector<R> {
    fn clone(&self) -> Self {
        Self {
            runs: Arc::clone(&self.runs),
            config: self.config.clone(),
        }
    }
}

impl<R: RunRegistry> ModelSelector<R> {
    /// Create a selector over `runs`.
    pub const fn new(runs: Arc<R>, config: SelectionConfig) -> Self {
        Self { runs, config }
    }

    /// Selector settings.
    #[must_use]
    pub const fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// [`ModelSelector::select_best`] with the configured metric and cap.
    ///
    /// # Errors
    ///
    /// See [`ModelSelector::select_best`].
    pub fn select_default(&self, experiment_name: &str) -> Result<String> {
        self.select_best(
            experiment_name,
            &self.config.metric,
            self.config.max_candidates,
        )
    }

    /// Choose the completed run with the highest `metric_name` and tag it
    /// `best_model=true`. Returns the winner's run ID.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no experiment is named `experiment_name`
    /// - `InvalidInput` if `max_candidates` is zero
    /// - `EmptyResult` if the experiment has no completed runs
    pub fn select_best(
        &self,
        experiment_name: &str,
        metric_name: &str,
        max_candidates: usize,
    ) -> Result<String> {
        if max_candidates == 0 {
            return Err(Error::InvalidInput(
                "max_candidates must be at least 1".to_string(),
            ));
        }
        let experiment = self
            .runs
            .get_experiment_by_name(experiment_name)?
            .ok_or_else(|| Error::not_found("experiment", experiment_name))?;

        let query = SearchQuery::new(
            experiment.experiment_id(),
            OrderBy::metric_desc(metric_name),
            max_candidates,
        )
        .with_status(RunStatus::Success);
        let candidates = self.runs.search_runs(&query)?;
        debug!(
            experiment = experiment_name,
            candidates = candidates.len(),
            "fetched selection candidates"
        );

        let best = candidates.first().ok_or_else(|| Error::EmptyResult {
            experiment: experiment_name.to_string(),
        })?;
        let run_id = best.run_id().to_string();

        if self.config.best_tag_policy == BestTagPolicy::Exclusive {
            self.clear_previous_tags(experiment.experiment_id(), metric_name, &run_id)?;
        }
        self.runs.set_tag(&run_id, BEST_MODEL_TAG, "true")?;

        info!(
            experiment = experiment_name,
            run_id = %run_id,
            metric = metric_name,
            value = ?best.metric(metric_name),
            "selected best run"
        );
        Ok(run_id)
    }

    fn clear_previous_tags(&self, experiment_id: &str, metric: &str, winner: &str) -> Result<()> {
        // No status filter: every run in the experiment.
        let query = SearchQuery::new(experiment_id, OrderBy::metric_desc(metric), usize::MAX);
        for run in self.runs.search_runs(&query)? {
            if run.run_id() != winner && run.tag(BEST_MODEL_TAG).is_some() {
                self.runs.delete_tag(run.run_id(), BEST_MODEL_TAG)?;
                debug!(run_id = run.run_id(), "cleared previous best_model tag");
            }
        }
        Ok(())
    }
}
