use analysis::InsightQuery;
use common::text::split_pipe;
use db::LookupRow;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};

/// Shared dashboard filters: `o`rg, `r`epo, `e`ntity, `m`onths, e`x`clusions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScopeParams {
    pub o: Option<String>,
    pub r: Option<String>,
    pub e: Option<String>,
    pub m: Option<String>,
    pub x: Option<String>,
    pub limit: Option<i64>,
}

impl ScopeParams {
    pub fn insight_query(&self) -> ApiResult<InsightQuery> {
        let months = match self.m.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            None => None,
            Some(raw) => Some(
                raw.parse::<u32>()
                    .map_err(|_| ApiError::bad_request(format!("invalid months `{raw}`")))?,
            ),
        };
        Ok(InsightQuery {
            org: self.o.clone(),
            repo: self.r.clone(),
            entity: self.e.clone(),
            months,
        })
    }

    /// `x=a|b|c`
    pub fn exclusions(&self) -> Vec<String> {
        self.x.as_deref().map(split_pipe).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct MinDateDto {
    pub min_date: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct LookupDto {
    pub value: String,
    pub text: String,
}

impl From<LookupRow> for LookupDto {
    fn from(row: LookupRow) -> Self {
        Self {
            text: format!("{} ({})", row.value, row.count),
            value: row.value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_text_carries_count() {
        let dto = LookupDto::from(LookupRow {
            value: "acme".into(),
            count: 3,
        });
        assert_eq!(dto.text, "acme (3)");
    }

    #[test]
    fn months_must_be_numeric() {
        let params = ScopeParams {
            m: Some("six".into()),
            ..ScopeParams::default()
        };
        assert!(params.insight_query().is_err());
        let params = ScopeParams {
            m: Some("12".into()),
            x: Some("a|b".into()),
            ..ScopeParams::default()
        };
        assert_eq!(params.insight_query().unwrap().months, Some(12));
        assert_eq!(params.exclusions(), vec!["a", "b"]);
    }
}
