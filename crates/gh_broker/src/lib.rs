pub mod broker;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod model;
pub mod token;

pub use broker::{BrokerResponse, GithubBroker, GithubBrokerBuilder, HttpExec, ReqwestExecutor};
pub use coordinator::{RateLimitCoordinator, Sleeper, TokioSleeper};
pub use error::HttpStatusError;
pub use model::{parse_link_header, parse_rate_limit, PageLinks, RateLimitUpdate, ResponseMeta};
pub use token::BearerToken;
