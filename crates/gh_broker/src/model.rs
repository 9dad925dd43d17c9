use chrono::{DateTime, Utc};
use http::{HeaderMap, StatusCode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitUpdate {
    pub limit: i64,
    pub remaining: i64,
    pub reset: DateTime<Utc>,
}

pub fn parse_rate_limit(headers: &HeaderMap) -> Option<RateLimitUpdate> {
    let limit = header_i64(headers, "x-ratelimit-limit")?;
    let remaining = header_i64(headers, "x-ratelimit-remaining")?;
    let reset_ts = header_i64(headers, "x-ratelimit-reset")?;
    let reset = DateTime::from_timestamp(reset_ts, 0)?;
    Some(RateLimitUpdate {
        limit,
        remaining,
        reset,
    })
}

fn header_i64(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<i64>().ok())
}

/// `rel="next"` and `rel="last"` page numbers from a `Link` header; 0 when absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageLinks {
    pub next: u32,
    pub last: u32,
}

pub fn parse_link_header(headers: &HeaderMap) -> PageLinks {
    let mut links = PageLinks::default();
    let Some(raw) = headers.get(http::header::LINK).and_then(|v| v.to_str().ok()) else {
        return links;
    };

    for part in raw.split(',') {
        let mut pieces = part.split(';');
        let Some(target) = pieces.next() else {
            continue;
        };
        let target = target.trim().trim_start_matches('<').trim_end_matches('>');
        let page = page_param(target);
        for attr in pieces {
            match attr.trim() {
                r#"rel="next""# => links.next = page,
                r#"rel="last""# => links.last = page,
                _ => {}
            }
        }
    }
    links
}

fn page_param(url: &str) -> u32 {
    url.split_once('?')
        .map(|(_, query)| query)
        .into_iter()
        .flat_map(|query| query.split('&'))
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "page")
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or(0)
}

/// Metadata every remote response carries back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMeta {
    pub status: u16,
    pub rate: Option<RateLimitUpdate>,
    pub next_page: u32,
    pub last_page: u32,
}

impl ResponseMeta {
    pub fn from_parts(status: StatusCode, headers: &HeaderMap) -> Self {
        let links = parse_link_header(headers);
        Self {
            status: status.as_u16(),
            rate: parse_rate_limit(headers),
            next_page: links.next,
            last_page: links.last,
        }
    }
}
