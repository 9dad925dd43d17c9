use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use collector::{DataFetcher, EventPage, OrgRepo, ReleaseBatch};
use common::EventType;
use db::{RepoMetaRow, Repositories};
use db_test_fixture::{developer, developer_with_entity, DbFixture};
use enricher::{
    apply_substitutions, substitute, AffiliationMerger, RosterSource, ENTITY_SUBSTITUTION,
};
use gh_broker::HttpStatusError;
use http::StatusCode;
use normalizer::UserPayload;

const ROSTER_ONE: &str = "\
alice: alice!example.com
\tAcme Corp from 2019-01-01
\tInitech, Inc. from 2023-05-01

bob: bob!example.com, bob!users.noreply.github.com
\tGlobex GmbH

stranger: stranger!example.com
\tNowhere Ltd
";

const ROSTER_TWO: &str = "\
carol: carol!example.com
\tumbrella corporation from 2020-01-01
";

#[derive(Default)]
struct StubFetcher {
    profiles: HashMap<String, UserPayload>,
    unauthorized: bool,
}

impl StubFetcher {
    fn with_profile(mut self, login: &str, remote_login: &str, company: Option<&str>) -> Self {
        self.profiles.insert(
            login.to_string(),
            UserPayload {
                id: 42,
                login: remote_login.to_string(),
                name: Some(format!("{login} remote")),
                email: Some(format!("{login}@remote.io")),
                company: company.map(str::to_string),
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
    ) -> Result<EventPage> {
        anyhow::bail!("not used")
    }

    async fn fetch_releases(&self, _owner: &str, _repo: &str) -> Result<ReleaseBatch> {
        anyhow::bail!("not used")
    }

    async fn fetch_repo_meta(&self, _owner: &str, _repo: &str) -> Result<RepoMetaRow> {
        anyhow::bail!("not used")
    }

    async fn fetch_user(&self, login: &str) -> Result<Option<UserPayload>> {
        if self.unauthorized {
            return Err(HttpStatusError::with_endpoint(StatusCode::UNAUTHORIZED, format!("users/{login}")).into());
        }
        Ok(self.profiles.get(login).cloned())
    }

    async fn is_org_member(&self, _org: &str, _login: &str) -> Result<bool> {
        Ok(false)
    }

    async fn fetch_org_repos(&self, _org: &str) -> Result<Vec<OrgRepo>> {
        Ok(Vec::new())
    }
}

/// Serves files by URL and records every URL requested.
struct StubRoster {
    files: HashMap<String, String>,
    requested: Mutex<Vec<String>>,
}

#[async_trait]
impl RosterSource for StubRoster {
    async fn fetch(&self, url: &str) -> Result<Option<String>> {
        self.requested.lock().unwrap().push(url.to_string());
        Ok(self.files.get(url).cloned())
    }
}

fn urls() -> Vec<String> {
    (1..=5).map(|n| format!("https://rosters.test/a{n}.txt")).collect()
}

#[tokio::test]
async fn enrich_merges_known_developers_and_stops_at_first_missing_file() -> Result<()> {
    let handle = DbFixture::create("enrich_merge").await?;
    handle
        .seed(
            vec![
                developer("alice"),
                developer_with_entity("bob", "Globex"),
                developer("Carol"),
                developer_with_entity("dave", "Hooli, Inc."),
            ],
            Vec::new(),
        )
        .await?;
    let store: Arc<dyn Repositories> = Arc::new(handle.db().clone());
    let fetcher = StubFetcher::default()
        .with_profile("alice", "alice", Some("@someplace"))
        .with_profile("bob", "bob", None);

    let roster = StubRoster {
        files: HashMap::from([
            (urls()[0].clone(), ROSTER_ONE.to_string()),
            (urls()[1].clone(), ROSTER_TWO.to_string()),
            (urls()[3].clone(), "ignored: x!y.z\n".to_string()),
        ]),
        requested: Mutex::new(Vec::new()),
    };

    let merger = AffiliationMerger::new(store.clone(), Arc::new(fetcher)).await?;
    let summary = merger.enrich(&roster, &urls()).await?;

    assert_eq!(roster.requested.lock().unwrap().len(), 3);
    assert_eq!(summary.roster_files, 2);
    assert_eq!(summary.roster_developers, 4);
    assert_eq!(summary.matched, 3);
    assert_eq!(summary.updated, 3);
    assert_eq!(summary.entities_cleaned, 1);

    let alice = store.developers().get("alice").await?.expect("alice");
    assert_eq!(alice.entity, "INITECH");
    assert_eq!(alice.email, "alice@remote.io");
    assert_eq!(alice.full_name, "alice remote");
    assert_eq!(alice.id, 42);

    let bob = store.developers().get("bob").await?.expect("bob");
    assert_eq!(bob.entity, "GLOBEX");

    let carol = store.developers().get("Carol").await?.expect("carol");
    assert_eq!(carol.entity, "UMBRELLA");
    assert_eq!(carol.email, "carol@example.com");

    let dave = store.developers().get("dave").await?.expect("dave");
    assert_eq!(dave.entity, "HOOLI");

    assert!(store.developers().get("stranger").await?.is_none());

    handle.cleanup().await
}

#[tokio::test]
async fn username_mismatch_skips_only_that_developer() -> Result<()> {
    let handle = DbFixture::create("enrich_mismatch").await?;
    handle
        .seed(vec![developer("alice"), developer("bob")], Vec::new())
        .await?;
    let store: Arc<dyn Repositories> = Arc::new(handle.db().clone());
    let fetcher = StubFetcher::default()
        .with_profile("alice", "mallory", None)
        .with_profile("bob", "bob", None);

    let merger = AffiliationMerger::new(store.clone(), Arc::new(fetcher)).await?;
    let summary = merger.merge(&enricher::parse_roster(ROSTER_ONE)).await?;

    assert_eq!(summary.matched, 2);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(store.developers().get("alice").await?.expect("alice").entity, "");
    assert_eq!(store.developers().get("bob").await?.expect("bob").entity, "GLOBEX");

    handle.cleanup().await
}

#[tokio::test]
async fn unauthorized_profile_lookup_aborts_merge() -> Result<()> {
    let handle = DbFixture::create("enrich_unauthorized").await?;
    handle.seed(vec![developer("alice")], Vec::new()).await?;
    let store: Arc<dyn Repositories> = Arc::new(handle.db().clone());
    let fetcher = StubFetcher {
        unauthorized: true,
        ..StubFetcher::default()
    };

    let merger = AffiliationMerger::new(store, Arc::new(fetcher)).await?;
    let err = merger
        .merge(&enricher::parse_roster(ROSTER_ONE))
        .await
        .expect_err("401 must abort");
    assert!(err.is_fatal());

    handle.cleanup().await
}

#[tokio::test]
async fn substitutions_apply_now_and_replay_idempotently() -> Result<()> {
    let handle = DbFixture::create("enrich_subs").await?;
    handle
        .seed(
            vec![
                developer_with_entity("alice", "GOOGLE"),
                developer_with_entity("bob", "GOOGLE"),
                developer_with_entity("carol", "ALPHABET"),
            ],
            Vec::new(),
        )
        .await?;
    let store: &dyn Repositories = handle.db();

    assert_eq!(substitute(store, ENTITY_SUBSTITUTION, "GOOGLE", "ALPHABET").await?, 2);
    assert!(substitute(store, "company", "A", "B").await.is_err());
    assert!(substitute(store, ENTITY_SUBSTITUTION, " ", "B").await.is_err());

    // a fresh import can bring the old name back
    store
        .developers()
        .upsert(developer_with_entity("dave", "GOOGLE"))
        .await?;
    assert_eq!(apply_substitutions(store).await?, 1);
    assert_eq!(apply_substitutions(store).await?, 0);

    let entities = store.developers().entities().await?;
    assert!(entities.iter().all(|(_, entity)| entity == "ALPHABET"));
    assert_eq!(store.substitutions().list().await?.len(), 1);

    handle.cleanup().await
}

#[tokio::test]
async fn substitution_values_are_canonicalized() -> Result<()> {
    let handle = DbFixture::create("enrich_subs_canon").await?;
    handle
        .seed(
            vec![
                developer_with_entity("alice", "GOOGLE"),
                developer_with_entity("bob", "GOOGLE"),
            ],
            Vec::new(),
        )
        .await?;
    let store: &dyn Repositories = handle.db();

    assert_eq!(
        substitute(store, ENTITY_SUBSTITUTION, "google llc", "Alphabet, Inc.").await?,
        2
    );
    assert!(substitute(store, ENTITY_SUBSTITUTION, "GOOGLE", "???").await.is_err());

    let entities = store.developers().entities().await?;
    assert!(entities.iter().all(|(_, entity)| entity == "ALPHABET"));
    let rows = store.substitutions().list().await?;
    assert_eq!(rows.len(), 1);
    assert_eq!((rows[0].old.as_str(), rows[0].new.as_str()), ("GOOGLE", "ALPHABET"));

    handle.cleanup().await
}
