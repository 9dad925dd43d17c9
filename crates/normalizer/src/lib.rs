pub mod payloads;
pub mod transform;

pub use payloads::{
    CommentPayload, ForkPayload, IssuePayload, PullRequestPayload, ReleasePayload, RepoPayload,
    ReviewCommentPayload, UserPayload,
};
pub use transform::{
    normalize_release, normalize_repo, normalize_user, normalize_value, NormalizedEvent,
};
