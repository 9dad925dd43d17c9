pub mod batch;
pub mod client;
pub mod fetcher;
pub mod metrics;
pub mod service;

pub use batch::SharedBatch;
pub use client::{BrokerGithubClient, GithubApiError, GithubClient, Page};
pub use fetcher::{DataFetcher, EventPage, OrgRepo, ReleaseBatch, RestDataFetcher};
pub use service::{ImportError, ImportOptions, ImportSummary, Importer, RepoSummary, RepoTarget};
