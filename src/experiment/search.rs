//! Run search queries
//!
//! Order-by expressions use the tracking-server convention
//! `metrics.<key> [ASC|DESC]`; the direction defaults to `ASC`.

use std::fmt;
use std::str::FromStr;

use super::RunStatus;
use crate::topk::SortOrder;
use crate::{Error, Result};

/// Ordering of search results by a logged metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    metric: String,
    order: SortOrder,
}

impl OrderBy {
    /// Order by `metric`, highest first.
    #[must_use]
    pub fn metric_desc(metric: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            order: SortOrder::Descending,
        }
    }

    /// Order by `metric`, lowest first.
    #[must_use]
    pub fn metric_asc(metric: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            order: SortOrder::Ascending,
        }
    }

    /// Metric key being ordered on.
    #[must_use]
    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// Sort direction.
    #[must_use]
    pub const fn order(&self) -> SortOrder {
        self.order
    }

    /// Parse an expression such as `"metrics.auc DESC"`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for anything other than `metrics.<key>` followed
    /// by an optional `ASC`/`DESC`.
    pub fn parse(expr: &str) -> Result<Self> {
        let mut parts = expr.split_whitespace();
        let field = parts
            .next()
            .ok_or_else(|| Error::InvalidInput("empty order_by expression".to_string()))?;

        let metric = field
            .strip_prefix("metrics.")
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "order_by must reference a metric as 'metrics.<key>', got '{field}'"
                ))
            })?;

        let order = match parts.next().map(str::to_ascii_uppercase).as_deref() {
            None | Some("ASC") => SortOrder::Ascending,
            Some("DESC") => SortOrder::Descending,
            Some(other) => {
                return Err(Error::InvalidInput(format!(
                    "unknown sort direction '{other}' (expected ASC or DESC)"
                )))
            }
        };

        if let Some(extra) = parts.next() {
            return Err(Error::InvalidInput(format!(
                "unexpected token '{extra}' in order_by expression"
            )));
        }

        Ok(Self {
            metric: metric.to_string(),
            order,
        })
    }
}

impl FromStr for OrderBy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.order {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        };
        write!(f, "metrics.{} {dir}", self.metric)
    }
}

/// Query over the runs of one experiment.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    experiment_id: String,
    order_by: OrderBy,
    limit: usize,
    status: Option<RunStatus>,
}

impl SearchQuery {
    /// Search `experiment_id`, ordered by `order_by`, returning at most `limit` runs.
    #[must_use]
    pub fn new(experiment_id: impl Into<String>, order_by: OrderBy, limit: usize) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            order_by,
            limit,
            status: None,
        }
    }

    /// Only return runs with this status.
    #[must_use]
    pub const fn with_status(mut self, status: RunStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Experiment being searched.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Result ordering.
    #[must_use]
    pub const fn order_by(&self) -> &OrderBy {
        &self.order_by
    }

    /// Maximum number of results.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Status filter, if any.
    #[must_use]
    pub const fn status(&self) -> Option<RunStatus> {
        self.status
    }
}
