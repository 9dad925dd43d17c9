use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use collector::{
    DataFetcher, EventPage, ImportError, ImportOptions, Importer, OrgRepo, ReleaseBatch,
    RepoTarget,
};
use common::time::format_date;
use common::EventType;
use db::{
    BatchOutcome, DeveloperRepository, EventRepository, EventSearch, ImportBatch,
    ImportRepository, InsightRepository, PageState, ReleaseRepository, RepoMetaRow, Repositories,
    ReputationRepository, SqliteDatabase, StateRepository, SubstitutionRepository,
};
use db_test_fixture::{developer, event, DbFixture};
use gh_broker::{HttpStatusError, ResponseMeta};
use http::StatusCode;
use normalizer::{NormalizedEvent, UserPayload};

/// Serves canned pages per stream and records every page requested.
#[derive(Default)]
struct StubFetcher {
    pages: Mutex<HashMap<EventType, Vec<Vec<NormalizedEvent>>>>,
    failures: Mutex<HashMap<(EventType, u32), StatusCode>>,
    requested: Mutex<Vec<(EventType, u32)>>,
}

impl StubFetcher {
    fn with_pages(mut self, kind: EventType, pages: usize, per_page: usize) -> Self {
        let created = Utc::now() - Duration::days(1);
        let pages = (1..=pages)
            .map(|page| {
                (0..per_page)
                    .map(|i| item(kind, (kind as i64 + 1) * 10_000 + (page * 100 + i) as i64, created))
                    .collect()
            })
            .collect();
        self.pages.get_mut().unwrap().insert(kind, pages);
        self
    }

    /// A new item shows up at the top of the first page, as fresh activity does.
    fn publish(&self, kind: EventType, item: NormalizedEvent) {
        let mut pages = self.pages.lock().unwrap();
        let stream = pages.entry(kind).or_default();
        match stream.first_mut() {
            Some(first) => first.insert(0, item),
            None => stream.push(vec![item]),
        }
    }

    fn fail(self, kind: EventType, page: u32, status: StatusCode) -> Self {
        self.failures.lock().unwrap().insert((kind, page), status);
        self
    }

    fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    fn requested(&self, kind: EventType) -> Vec<u32> {
        self.requested
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, page)| *page)
            .collect()
    }
}

fn item(kind: EventType, id: i64, created: DateTime<Utc>) -> NormalizedEvent {
    let username = format!("user{}", id % 3);
    NormalizedEvent {
        event: event(id, &username, kind, &format_date(&created)),
        author: developer(&username),
        created_at: created,
    }
}

fn meta(next_page: u32) -> ResponseMeta {
    ResponseMeta {
        status: 200,
        rate: None,
        next_page,
        last_page: 0,
    }
}

#[async_trait]
impl DataFetcher for StubFetcher {
    async fn fetch_events(
        &self,
        kind: EventType,
        _owner: &str,
        _repo: &str,
        _since: Option<DateTime<Utc>>,
        page: u32,
        _per_page: u32,
    ) -> Result<EventPage> {
        self.requested.lock().unwrap().push((kind, page));
        // let the other streams interleave
        tokio::task::yield_now().await;
        if let Some(status) = self.failures.lock().unwrap().get(&(kind, page)) {
            return Err(HttpStatusError::with_endpoint(*status, "stub").into());
        }
        let pages = self.pages.lock().unwrap().get(&kind).cloned().unwrap_or_default();
        let items = pages.get(page as usize - 1).cloned().unwrap_or_default();
        let next = if (page as usize) < pages.len() { page + 1 } else { 0 };
        Ok(EventPage {
            raw_count: items.len(),
            items,
            meta: meta(next),
        })
    }

    async fn fetch_releases(&self, _owner: &str, _repo: &str) -> Result<ReleaseBatch> {
        Ok(ReleaseBatch::default())
    }

    async fn fetch_repo_meta(&self, owner: &str, repo: &str) -> Result<RepoMetaRow> {
        Ok(RepoMetaRow {
            org: owner.to_string(),
            repo: repo.to_string(),
            stars: 1,
            forks: 0,
            open_issues: 0,
            language: "Rust".into(),
            license: "MIT".into(),
            archived: false,
            updated_at: "2025-01-01T00:00:00Z".into(),
        })
    }

    async fn fetch_user(&self, _login: &str) -> Result<Option<UserPayload>> {
        Ok(None)
    }

    async fn is_org_member(&self, _org: &str, _login: &str) -> Result<bool> {
        Ok(false)
    }

    async fn fetch_org_repos(&self, _org: &str) -> Result<Vec<OrgRepo>> {
        Ok(vec![
            OrgRepo {
                name: "widgets".into(),
                archived: false,
            },
            OrgRepo {
                name: "legacy".into(),
                archived: true,
            },
        ])
    }
}

fn options(batch_size: usize) -> ImportOptions {
    ImportOptions {
        months: 6,
        per_page: 100,
        batch_size,
        fresh: false,
    }
}

fn target() -> RepoTarget {
    RepoTarget::new("acme", "widgets")
}

async fn event_count(store: &dyn Repositories) -> Result<i64> {
    Ok(store.events().count().await?)
}

async fn stored_ids(store: &dyn Repositories, kind: EventType) -> Result<Vec<i64>> {
    let mut ids = store
        .events()
        .search(EventSearch {
            event_type: Some(kind.as_str().into()),
            page_size: 500,
            ..EventSearch::default()
        })
        .await?
        .into_iter()
        .map(|e| e.id)
        .collect::<Vec<_>>();
    ids.sort_unstable();
    Ok(ids)
}

/// Keeps a copy of every batch handed to the store.
struct RecordingImports {
    db: SqliteDatabase,
    commits: Mutex<Vec<ImportBatch>>,
}

#[async_trait]
impl ImportRepository for RecordingImports {
    async fn commit_batch(&self, batch: ImportBatch) -> db::errors::Result<BatchOutcome> {
        self.commits.lock().unwrap().push(batch.clone());
        self.db.imports().commit_batch(batch).await
    }
}

struct RecordingStore {
    db: SqliteDatabase,
    imports: RecordingImports,
}

impl RecordingStore {
    fn new(db: SqliteDatabase) -> Self {
        Self {
            imports: RecordingImports {
                db: db.clone(),
                commits: Mutex::new(Vec::new()),
            },
            db,
        }
    }

    fn commits(&self) -> Vec<ImportBatch> {
        self.imports.commits.lock().unwrap().clone()
    }
}

impl Repositories for RecordingStore {
    fn developers(&self) -> &dyn DeveloperRepository {
        self.db.developers()
    }

    fn events(&self) -> &dyn EventRepository {
        self.db.events()
    }

    fn states(&self) -> &dyn StateRepository {
        self.db.states()
    }

    fn releases(&self) -> &dyn ReleaseRepository {
        self.db.releases()
    }

    fn substitutions(&self) -> &dyn SubstitutionRepository {
        self.db.substitutions()
    }

    fn reputation(&self) -> &dyn ReputationRepository {
        self.db.reputation()
    }

    fn insights(&self) -> &dyn InsightRepository {
        self.db.insights()
    }

    fn imports(&self) -> &dyn ImportRepository {
        &self.imports
    }
}

#[tokio::test]
async fn imports_all_streams_and_resets_cursor() -> Result<()> {
    let handle = DbFixture::create("import_all").await?;
    let store: Arc<dyn Repositories> = Arc::new(handle.db().clone());
    let fetcher = Arc::new(
        StubFetcher::default()
            .with_pages(EventType::PullRequest, 2, 3)
            .with_pages(EventType::Issue, 1, 2)
            .with_pages(EventType::Fork, 1, 1),
    );
    let importer = Importer::new(fetcher.clone(), store.clone(), options(500));

    let summary = importer.run(&[target()]).await?;

    assert_eq!(summary.failed, 0);
    let repo = &summary.repositories[0];
    assert_eq!(repo.events["pull_request"], 6);
    assert_eq!(repo.events["issue"], 2);
    assert_eq!(repo.events["fork"], 1);
    assert_eq!(repo.inserted, 9);
    assert_eq!(event_count(store.as_ref()).await?, 9);

    let today = format_date(&Utc::now());
    let state = store
        .states()
        .get("pull_request", "acme", "widgets", "1970-01-01")
        .await?;
    assert_eq!(state, PageState::new(1, today));
    assert_eq!(fetcher.requested(EventType::PullRequest), vec![1, 2]);

    handle.cleanup().await
}

#[tokio::test]
async fn second_run_inserts_nothing() -> Result<()> {
    let handle = DbFixture::create("import_twice").await?;
    let store: Arc<dyn Repositories> = Arc::new(handle.db().clone());
    let fetcher = Arc::new(
        StubFetcher::default()
            .with_pages(EventType::PullRequest, 2, 2)
            .with_pages(EventType::IssueComment, 2, 2),
    );
    let importer = Importer::new(fetcher, store.clone(), options(500));

    importer.run(&[target()]).await?;
    let before = event_count(store.as_ref()).await?;
    let summary = importer.run(&[target()]).await?;

    assert_eq!(summary.repositories[0].inserted, 0);
    assert_eq!(event_count(store.as_ref()).await?, before);
    let state = store
        .states()
        .get("issue_comment", "acme", "widgets", "1970-01-01")
        .await?;
    assert_eq!(state.page, 1);

    handle.cleanup().await
}

#[tokio::test]
async fn interrupted_stream_resumes_from_next_page() -> Result<()> {
    let handle = DbFixture::create("import_resume").await?;
    let store: Arc<dyn Repositories> = Arc::new(handle.db().clone());
    let fetcher = Arc::new(
        StubFetcher::default()
            .with_pages(EventType::PullRequest, 5, 2)
            .fail(EventType::PullRequest, 4, StatusCode::BAD_GATEWAY),
    );
    // every page is its own flush
    let importer = Importer::new(fetcher.clone(), store.clone(), options(1));

    let first = importer.run(&[target()]).await?;
    assert_eq!(first.repositories[0].errors.len(), 1);
    let state = store
        .states()
        .get("pull_request", "acme", "widgets", "1970-01-01")
        .await?;
    assert_eq!(state.page, 4);
    assert_eq!(event_count(store.as_ref()).await?, 6);

    fetcher.clear_failures();
    fetcher.requested.lock().unwrap().clear();
    importer.run(&[target()]).await?;

    assert_eq!(fetcher.requested(EventType::PullRequest), vec![4, 5]);
    assert_eq!(event_count(store.as_ref()).await?, 10);
    let mut ids = store
        .events()
        .search(EventSearch {
            event_type: Some("pull_request".into()),
            page_size: 500,
            ..EventSearch::default()
        })
        .await?
        .into_iter()
        .map(|e| e.id)
        .collect::<Vec<_>>();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 10);

    handle.cleanup().await
}

#[tokio::test]
async fn resumed_pass_keeps_the_watermark() -> Result<()> {
    let handle = DbFixture::create("import_resume_watermark").await?;
    let store: Arc<dyn Repositories> = Arc::new(handle.db().clone());
    let fetcher = Arc::new(
        StubFetcher::default()
            .with_pages(EventType::PullRequest, 3, 2)
            .fail(EventType::PullRequest, 2, StatusCode::BAD_GATEWAY),
    );
    let importer = Importer::new(fetcher.clone(), store.clone(), options(1));
    let pr_state = || store.states().get("pull_request", "acme", "widgets", "1970-01-01");

    importer.run(&[target()]).await?;
    let interrupted = pr_state().await?;
    assert_eq!(interrupted.page, 2);

    // activity lands on page 1 while the stream is parked on page 2
    let fresh_id = 99;
    fetcher.publish(
        EventType::PullRequest,
        item(EventType::PullRequest, fresh_id, Utc::now() - Duration::days(1)),
    );
    fetcher.clear_failures();
    fetcher.requested.lock().unwrap().clear();

    importer.run(&[target()]).await?;
    assert_eq!(fetcher.requested(EventType::PullRequest), vec![2, 3]);
    assert_eq!(pr_state().await?, PageState::new(1, interrupted.since.clone()));
    assert!(!stored_ids(store.as_ref(), EventType::PullRequest).await?.contains(&fresh_id));

    fetcher.requested.lock().unwrap().clear();
    importer.run(&[target()]).await?;
    assert_eq!(fetcher.requested(EventType::PullRequest), vec![1, 2, 3]);
    assert!(stored_ids(store.as_ref(), EventType::PullRequest).await?.contains(&fresh_id));
    assert_eq!(pr_state().await?, PageState::new(1, format_date(&Utc::now())));

    handle.cleanup().await
}

#[tokio::test]
async fn concurrent_streams_share_threshold_flushes() -> Result<()> {
    let handle = DbFixture::create("import_shared_flush").await?;
    let recording = Arc::new(RecordingStore::new(handle.db().clone()));
    let store: Arc<dyn Repositories> = recording.clone();
    let per_page = HashMap::from([
        ("pull_request", 2usize),
        ("pull_request_review", 2),
        ("issue", 2),
        ("issue_comment", 3),
        ("fork", 1),
    ]);
    let totals = HashMap::from([
        ("pull_request", 6usize),
        ("pull_request_review", 2),
        ("issue", 4),
        ("issue_comment", 6),
        ("fork", 1),
    ]);
    let fetcher = Arc::new(
        StubFetcher::default()
            .with_pages(EventType::PullRequest, 3, 2)
            .with_pages(EventType::PullRequestReview, 1, 2)
            .with_pages(EventType::Issue, 2, 2)
            .with_pages(EventType::IssueComment, 2, 3)
            .with_pages(EventType::Fork, 1, 1),
    );
    let importer = Importer::new(fetcher, store.clone(), options(5));

    let summary = importer.run(&[target()]).await?;
    assert_eq!(summary.repositories[0].inserted, 19);
    assert_eq!(event_count(store.as_ref()).await?, 19);

    let commits = recording.commits();
    assert!(commits[0].events.len() < 19);
    assert!(
        commits.iter().filter(|batch| batch.events.len() >= 5).count() >= 2,
        "expected several threshold flushes, got {:?}",
        commits.iter().map(|batch| batch.events.len()).collect::<Vec<_>>()
    );

    // every cursor is committed together with exactly the events it covers
    let mut committed: HashMap<String, usize> = HashMap::new();
    for batch in &commits {
        for event in &batch.events {
            *committed.entry(event.event_type.clone()).or_default() += 1;
        }
        for (key, state) in &batch.states {
            let stream = key.stream.as_str();
            let so_far = committed.get(stream).copied().unwrap_or_default();
            let expected = if state.page > 1 {
                (state.page as usize - 1) * per_page[stream]
            } else {
                totals[stream]
            };
            assert_eq!(so_far, expected, "{stream} cursor {state:?}");
        }
    }
    assert_eq!(committed.values().sum::<usize>(), 19);

    handle.cleanup().await
}

#[tokio::test]
async fn unauthorized_aborts_the_run() -> Result<()> {
    let handle = DbFixture::create("import_unauthorized").await?;
    let store: Arc<dyn Repositories> = Arc::new(handle.db().clone());
    let fetcher = Arc::new(
        StubFetcher::default()
            .with_pages(EventType::PullRequest, 1, 1)
            .fail(EventType::Issue, 1, StatusCode::UNAUTHORIZED),
    );
    let importer = Importer::new(fetcher.clone(), store.clone(), options(500));

    let err = importer
        .run(&[target(), RepoTarget::new("acme", "gadgets")])
        .await
        .unwrap_err();

    assert!(matches!(err, ImportError::Unauthorized(_)));
    let state = store
        .states()
        .get("issue", "acme", "widgets", "1970-01-01")
        .await?;
    assert_eq!(state, PageState::new(1, "1970-01-01"));
    assert!(fetcher.requested(EventType::Fork).is_empty());

    handle.cleanup().await
}

#[tokio::test]
async fn failing_stream_does_not_stop_the_others() -> Result<()> {
    let handle = DbFixture::create("import_partial").await?;
    let store: Arc<dyn Repositories> = Arc::new(handle.db().clone());
    let fetcher = Arc::new(
        StubFetcher::default()
            .with_pages(EventType::PullRequest, 1, 2)
            .fail(EventType::Issue, 1, StatusCode::INTERNAL_SERVER_ERROR),
    );
    let importer = Importer::new(fetcher, store.clone(), options(500));

    let summary = importer.run(&[target()]).await?;

    let repo = &summary.repositories[0];
    assert_eq!(repo.errors.len(), 1);
    assert!(repo.errors[0].starts_with("issue"));
    assert_eq!(event_count(store.as_ref()).await?, 2);
    assert_eq!(
        store.releases().list_repo_meta(Some("acme"), Some("widgets")).await?.len(),
        1
    );

    handle.cleanup().await
}

#[tokio::test]
async fn cancelled_import_stops_before_fetching() -> Result<()> {
    let handle = DbFixture::create("import_cancel").await?;
    let store: Arc<dyn Repositories> = Arc::new(handle.db().clone());
    let fetcher = Arc::new(StubFetcher::default().with_pages(EventType::PullRequest, 1, 1));
    let importer = Importer::new(fetcher, store.clone(), options(500));
    importer.cancellation().cancel();

    let err = importer.run(&[target()]).await.unwrap_err();

    assert!(matches!(err, ImportError::Cancelled));
    assert_eq!(event_count(store.as_ref()).await?, 0);

    handle.cleanup().await
}

#[tokio::test]
async fn org_import_skips_archived_repositories() -> Result<()> {
    let handle = DbFixture::create("import_org").await?;
    let store: Arc<dyn Repositories> = Arc::new(handle.db().clone());
    let importer = Importer::new(Arc::new(StubFetcher::default()), store, options(500));

    let targets = importer.resolve_targets(Some("acme"), &[]).await?;

    assert_eq!(targets, vec![RepoTarget::new("acme", "widgets")]);
    handle.cleanup().await
}

#[tokio::test]
async fn repositories_without_org_are_rejected() -> Result<()> {
    let handle = DbFixture::create("import_no_org").await?;
    let store: Arc<dyn Repositories> = Arc::new(handle.db().clone());
    let importer = Importer::new(Arc::new(StubFetcher::default()), store, options(500));

    let err = importer
        .resolve_targets(None, &["widgets".to_string()])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("without an organization"));
    assert!(importer.resolve_targets(None, &[]).await?.is_empty());

    handle.cleanup().await
}
