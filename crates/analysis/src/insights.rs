use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::time::window_start_date;
use db::{
    CadenceRow, DbError, DownloadsRow, DurationRow, ForkActivityRow, MonthTypeCount, RepoMetaRow,
    Repositories, RetentionRow, Scope, TagDownloadsRow,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::factors::{concentration_factor, top_shares, Share};

pub const DEFAULT_MONTHS: u32 = 6;

/// Dashboard filter: optional org/repo/entity plus a rolling window in months.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightQuery {
    pub org: Option<String>,
    pub repo: Option<String>,
    pub entity: Option<String>,
    pub months: Option<u32>,
}

impl InsightQuery {
    pub fn months(&self) -> u32 {
        self.months.filter(|m| *m > 0).unwrap_or(DEFAULT_MONTHS)
    }

    pub fn scope_at(&self, now: DateTime<Utc>) -> Scope {
        let clean = |v: &Option<String>| v.as_ref().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Scope {
            org: clean(&self.org),
            repo: clean(&self.repo),
            entity: clean(&self.entity),
            since: Some(window_start_date(now, self.months())),
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope_at(Utc::now())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub bus_factor: i64,
    pub pony_factor: i64,
    pub developers: i64,
    pub entities: i64,
    pub events: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrRatio {
    pub month: String,
    pub prs: i64,
    pub reviews: i64,
    pub ratio: f64,
}

/// Read-only aggregates behind the dashboard.
#[derive(Clone)]
pub struct InsightService {
    store: Arc<dyn Repositories>,
}

impl InsightService {
    pub fn new(store: Arc<dyn Repositories>) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn summary(&self, query: &InsightQuery) -> Result<Summary, DbError> {
        let scope = query.scope();
        let insights = self.store.insights();
        let developers = insights.developer_event_counts(scope.clone()).await?;
        let entities = insights.entity_event_counts(scope).await?;
        Ok(Summary {
            bus_factor: concentration_factor(&developers),
            pony_factor: concentration_factor(&entities),
            developers: developers.len() as i64,
            entities: entities.len() as i64,
            events: developers.iter().map(|d| d.count).sum(),
        })
    }

    pub async fn event_types(&self, query: &InsightQuery) -> Result<Vec<MonthTypeCount>, DbError> {
        self.store.insights().event_type_series(query.scope()).await
    }

    pub async fn entity_shares(&self, query: &InsightQuery, exclude: &[String]) -> Result<Vec<Share>, DbError> {
        let counts = self.store.insights().entity_event_counts(query.scope()).await?;
        Ok(top_shares(&counts, exclude))
    }

    pub async fn developer_shares(
        &self,
        query: &InsightQuery,
        exclude: &[String],
    ) -> Result<Vec<Share>, DbError> {
        let counts = self.store.insights().developer_event_counts(query.scope()).await?;
        Ok(top_shares(&counts, exclude))
    }

    pub async fn retention(&self, query: &InsightQuery) -> Result<Vec<RetentionRow>, DbError> {
        self.store.insights().retention(query.scope()).await
    }

    pub async fn time_to_merge(&self, query: &InsightQuery) -> Result<Vec<DurationRow>, DbError> {
        self.store.insights().time_to_merge(query.scope()).await
    }

    pub async fn time_to_close(&self, query: &InsightQuery) -> Result<Vec<DurationRow>, DbError> {
        self.store.insights().time_to_close(query.scope()).await
    }

    pub async fn pr_ratio(&self, query: &InsightQuery) -> Result<Vec<PrRatio>, DbError> {
        let rows = self.store.insights().pr_review_counts(query.scope()).await?;
        Ok(rows
            .into_iter()
            .map(|row| PrRatio {
                ratio: if row.prs == 0 {
                    0.0
                } else {
                    row.reviews as f64 / row.prs as f64
                },
                month: row.month,
                prs: row.prs,
                reviews: row.reviews,
            })
            .collect())
    }

    pub async fn forks_and_activity(&self, query: &InsightQuery) -> Result<Vec<ForkActivityRow>, DbError> {
        self.store.insights().forks_and_activity(query.scope()).await
    }

    pub async fn release_cadence(&self, query: &InsightQuery) -> Result<Vec<CadenceRow>, DbError> {
        self.store.insights().release_cadence(query.scope()).await
    }

    pub async fn release_downloads(&self, query: &InsightQuery) -> Result<Vec<DownloadsRow>, DbError> {
        self.store.insights().release_downloads(query.scope()).await
    }

    pub async fn release_downloads_by_tag(
        &self,
        query: &InsightQuery,
    ) -> Result<Vec<TagDownloadsRow>, DbError> {
        self.store.insights().release_downloads_by_tag(query.scope()).await
    }

    pub async fn repo_meta(&self, query: &InsightQuery) -> Result<Vec<RepoMetaRow>, DbError> {
        let scope = query.scope();
        self.store
            .releases()
            .list_repo_meta(scope.org.as_deref(), scope.repo.as_deref())
            .await
    }

    pub async fn min_date(&self, org: Option<&str>, repo: Option<&str>) -> Result<Option<String>, DbError> {
        self.store.events().min_date(org, repo).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn scope_trims_filters_and_applies_window() {
        let query = InsightQuery {
            org: Some(" acme ".into()),
            repo: Some("".into()),
            entity: None,
            months: Some(0),
        };
        let now = Utc.with_ymd_and_hms(2025, 8, 15, 0, 0, 0).unwrap();
        let scope = query.scope_at(now);
        assert_eq!(scope.org.as_deref(), Some("acme"));
        assert_eq!(scope.repo, None);
        assert_eq!(scope.since.as_deref(), Some("2025-02-15"));
    }
}
