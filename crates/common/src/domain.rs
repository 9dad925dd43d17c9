use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Closed set of event kinds that may enter the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PullRequest,
    PullRequestReview,
    Issue,
    IssueComment,
    Fork,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        EventType::PullRequest,
        EventType::PullRequestReview,
        EventType::Issue,
        EventType::IssueComment,
        EventType::Fork,
    ];

    /// Streams imported concurrently for a repository.
    pub const CONCURRENT: [EventType; 4] = [
        EventType::PullRequest,
        EventType::PullRequestReview,
        EventType::Issue,
        EventType::IssueComment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PullRequest => "pull_request",
            EventType::PullRequestReview => "pull_request_review",
            EventType::Issue => "issue",
            EventType::IssueComment => "issue_comment",
            EventType::Fork => "fork",
        }
    }

    /// Whether the remote listing accepts a `since` filter.
    pub fn supports_since(&self) -> bool {
        matches!(
            self,
            EventType::PullRequestReview | EventType::Issue | EventType::IssueComment
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type `{0}`")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pull_request" => Ok(EventType::PullRequest),
            "pull_request_review" => Ok(EventType::PullRequestReview),
            "issue" => Ok(EventType::Issue),
            "issue_comment" => Ok(EventType::IssueComment),
            "fork" => Ok(EventType::Fork),
            other => Err(UnknownEventType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_known_type() {
        for ty in EventType::ALL {
            assert_eq!(ty.as_str().parse::<EventType>().unwrap(), ty);
        }
    }

    #[test]
    fn rejects_unknown_type() {
        assert!("push".parse::<EventType>().is_err());
    }

    #[test]
    fn pr_and_fork_have_no_since_filter() {
        assert!(!EventType::PullRequest.supports_since());
        assert!(!EventType::Fork.supports_since());
        assert!(EventType::IssueComment.supports_since());
    }
}
