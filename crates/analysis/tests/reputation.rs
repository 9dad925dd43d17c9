use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use analysis::{ReputationError, ReputationService};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use collector::{DataFetcher, EventPage, OrgRepo, ReleaseBatch};
use common::config::ReputationConfig;
use common::time::format_date;
use common::EventType;
use db::{RepoMetaRow, Repositories};
use db_test_fixture::{developer, event, DbFixture};
use normalizer::UserPayload;

#[derive(Default)]
struct StubFetcher {
    profiles: HashMap<String, UserPayload>,
    members: Vec<(String, String)>,
    user_calls: AtomicUsize,
    membership_calls: AtomicUsize,
}

impl StubFetcher {
    fn profile(mut self, login: &str, company: Option<&str>, suspended: bool) -> Self {
        self.profiles.insert(
            login.to_string(),
            UserPayload {
                id: 1,
                login: login.to_string(),
                company: company.map(str::to_string),
                created_at: Some(Utc::now() - Duration::days(1500)),
                followers: 40,
                following: 4,
                public_repos: 30,
                two_factor_authentication: Some(true),
                suspended_at: suspended.then(Utc::now),
                ..UserPayload::default()
            },
        );
        self
    }
}

#[async_trait]
impl DataFetcher for StubFetcher {
    async fn fetch_events(
        &self,
        _kind: EventType,
        _owner: &str,
        _repo: &str,
        _since: Option<DateTime<Utc>>,
        _page: u32,
        _per_page: u32,
    ) -> anyhow::Result<EventPage> {
        anyhow::bail!("not used")
    }

    async fn fetch_releases(&self, _owner: &str, _repo: &str) -> anyhow::Result<ReleaseBatch> {
        anyhow::bail!("not used")
    }

    async fn fetch_repo_meta(&self, _owner: &str, _repo: &str) -> anyhow::Result<RepoMetaRow> {
        anyhow::bail!("not used")
    }

    async fn fetch_user(&self, login: &str) -> anyhow::Result<Option<UserPayload>> {
        self.user_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.profiles.get(login).cloned())
    }

    async fn is_org_member(&self, org: &str, login: &str) -> anyhow::Result<bool> {
        self.membership_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.members.iter().any(|(o, l)| o == org && l == login))
    }

    async fn fetch_org_repos(&self, _org: &str) -> anyhow::Result<Vec<OrgRepo>> {
        Ok(Vec::new())
    }
}

async fn seeded(prefix: &str) -> anyhow::Result<db_test_fixture::DatabaseHandle> {
    let handle = DbFixture::create(prefix).await?;
    let day = format_date(&(Utc::now() - Duration::days(2)));
    let events = vec![
        event(1, "alice", EventType::PullRequest, &day),
        event(2, "alice", EventType::IssueComment, &day),
        event(3, "bob", EventType::Issue, &day),
        event(4, "dependabot[bot]", EventType::PullRequest, &day),
        event(5, "mallory", EventType::Issue, &day),
    ];
    handle
        .seed(
            vec![
                developer("alice"),
                developer("bob"),
                developer("dependabot[bot]"),
                developer("mallory"),
            ],
            events,
        )
        .await?;
    Ok(handle)
}

#[tokio::test]
async fn shallow_refresh_skips_bots_and_fresh_scores() -> anyhow::Result<()> {
    let handle = seeded("reputation_shallow").await?;
    let store: Arc<dyn Repositories> = Arc::new(handle.db().clone());
    let service = ReputationService::new(store.clone(), Arc::new(StubFetcher::default()), &ReputationConfig::default());

    let first = service.refresh_shallow().await?;
    assert_eq!(first.scored, 3);
    assert_eq!(service.refresh_shallow().await?.scored, 0);

    let bot = store.reputation().get("dependabot[bot]").await?.expect("bot row");
    assert_eq!(bot.reputation, None);

    let alice = store.reputation().get("alice").await?.expect("alice row");
    let score = alice.reputation.expect("scored");
    assert!((0.0..=1.0).contains(&score));
    assert!(!alice.reputation_deep);

    handle.cleanup().await
}

#[tokio::test]
async fn deep_score_is_cached_within_ttl() -> anyhow::Result<()> {
    let handle = seeded("reputation_deep").await?;
    let store: Arc<dyn Repositories> = Arc::new(handle.db().clone());
    let fetcher = Arc::new(StubFetcher::default().profile("alice", Some("@ACME "), false));
    let service = ReputationService::new(store.clone(), fetcher.clone(), &ReputationConfig::default());

    let fresh = service.get_or_compute_deep("alice").await?;
    assert!(!fresh.cached);
    assert!(fresh.deep);
    assert!(fresh.signals.org_member);
    assert!(fresh.signals.strong_auth);
    assert_eq!(fetcher.membership_calls.load(Ordering::SeqCst), 0);

    let cached = service.get_or_compute_deep("alice").await?;
    assert!(cached.cached);
    assert_eq!(cached.score, fresh.score);
    assert_eq!(cached.signals, fresh.signals);
    assert_eq!(fetcher.user_calls.load(Ordering::SeqCst), 1);

    let row = store.reputation().get("alice").await?.expect("alice row");
    assert!(row.reputation_deep);
    assert_eq!(row.reputation, Some(fresh.score));

    handle.cleanup().await
}

#[tokio::test]
async fn membership_falls_back_to_remote_check() -> anyhow::Result<()> {
    let handle = seeded("reputation_member").await?;
    let store: Arc<dyn Repositories> = Arc::new(handle.db().clone());
    let fetcher = Arc::new(StubFetcher {
        members: vec![("acme".into(), "bob".into())],
        ..StubFetcher::default()
    }
    .profile("bob", None, false)
    .profile("mallory", Some("initech"), true));
    let service = ReputationService::new(store, fetcher.clone(), &ReputationConfig::default());

    let bob = service.score_deep("bob").await?;
    assert!(bob.signals.org_member);
    assert_eq!(fetcher.membership_calls.load(Ordering::SeqCst), 1);

    let mallory = service.score_deep("mallory").await?;
    assert!(mallory.signals.suspended);
    assert_eq!(mallory.score, 0.0);

    let missing = service.get_or_compute_deep("nobody").await;
    assert!(matches!(missing, Err(ReputationError::NotFound(_))));

    handle.cleanup().await
}
