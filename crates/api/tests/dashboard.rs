use std::sync::Arc;

use analysis::ReputationService;
use api::{build_router, ApiState};
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use collector::{DataFetcher, EventPage, OrgRepo, ReleaseBatch};
use common::config::ReputationConfig;
use common::time::format_date;
use common::EventType;
use db::{RepoMetaRow, Repositories};
use db_test_fixture::{developer_with_entity, event, DatabaseHandle, DbFixture};
use normalizer::UserPayload;
use serde_json::{json, Value};
use tower::util::ServiceExt;

/// Every profile exists and nobody belongs to an org.
struct StubFetcher;

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
        Ok(Some(UserPayload {
            id: 9,
            login: login.to_string(),
            created_at: Some(Utc::now() - Duration::days(400)),
            ..UserPayload::default()
        }))
    }

    async fn is_org_member(&self, _org: &str, _login: &str) -> anyhow::Result<bool> {
        Ok(false)
    }

    async fn fetch_org_repos(&self, _org: &str) -> anyhow::Result<Vec<OrgRepo>> {
        Ok(Vec::new())
    }
}

async fn setup_app(prefix: &str) -> anyhow::Result<(DatabaseHandle, Router)> {
    let handle = DbFixture::create(prefix).await?;
    let day = format_date(&(Utc::now() - Duration::days(3)));
    let mut events = Vec::new();
    for id in 1..=6 {
        events.push(event(id, "alice", EventType::PullRequest, &day));
    }
    for id in 7..=9 {
        events.push(event(id, "bob", EventType::Issue, &day));
    }
    events.push(event(10, "carol", EventType::IssueComment, &day));
    handle
        .seed(
            vec![
                developer_with_entity("alice", "ACME"),
                developer_with_entity("bob", "INITECH"),
                developer_with_entity("carol", "ACME"),
            ],
            events,
        )
        .await?;

    let repositories: Arc<dyn Repositories> = Arc::new(handle.db().clone());
    let reputation = Arc::new(ReputationService::new(
        repositories.clone(),
        Arc::new(StubFetcher),
        &ReputationConfig::default(),
    ));
    let app = build_router(Arc::new(ApiState::new(repositories, reputation)));
    Ok((handle, app))
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(request).await.unwrap();
    let status = res.status();
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn summary_and_shares() -> anyhow::Result<()> {
    let (handle, app) = setup_app("api_summary").await?;

    let (status, body) = call(&app, get("/data/insights/summary?m=12")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bus_factor"], 1);
    assert_eq!(body["pony_factor"], 1);
    assert_eq!(body["events"], 10);

    let (status, body) = call(&app, get("/data/entity?m=12&x=initech")).await;
    assert_eq!(status, StatusCode::OK);
    let shares = body.as_array().expect("array");
    assert_eq!(shares.len(), 1);
    assert_eq!(shares[0]["name"], "ACME");
    assert_eq!(shares[0]["count"], 7);
    assert_eq!(shares[0]["percent"], 100.0);

    let (_, body) = call(&app, get("/data/developer?o=acme&r=widgets")).await;
    assert_eq!(body[0]["name"], "alice");

    handle.cleanup().await
}

#[tokio::test]
async fn search_and_lookup() -> anyhow::Result<()> {
    let (handle, app) = setup_app("api_search").await?;

    let request = Request::post("/data/search")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "username": "bob", "page_size": 2 }).to_string()))
        .unwrap();
    let (status, body) = call(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().expect("array");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row["username"] == "bob" && row["type"] == "issue"));

    let (status, body) = call(&app, get("/data/query?v=entity&q=acm")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["value"], "ACME");
    assert_eq!(body[0]["text"], "ACME (2)");

    let (status, body) = call(&app, get("/data/entity/developers?e=ACME")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(2));

    let (status, body) = call(&app, get("/data/min-date?o=acme")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["min_date"].is_string());

    handle.cleanup().await
}

#[tokio::test]
async fn errors_are_json() -> anyhow::Result<()> {
    let (handle, app) = setup_app("api_errors").await?;

    let (status, body) = call(&app, get("/data/type?m=soon")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("soon"));

    let (status, body) = call(&app, get("/data/query?v=planet&q=x")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = call(&app, get("/data/insights/reputation/user?u=nobody")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nobody"));

    handle.cleanup().await
}

#[tokio::test]
async fn deep_reputation_then_listing() -> anyhow::Result<()> {
    let (handle, app) = setup_app("api_reputation").await?;

    let (status, first) = call(&app, get("/data/insights/reputation/user?u=@alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["deep"], true);
    assert_eq!(first["cached"], false);

    let (_, second) = call(&app, get("/data/insights/reputation/user?u=alice")).await;
    assert_eq!(second["cached"], true);
    assert_eq!(second["score"], first["score"]);

    let (status, body) = call(&app, get("/data/insights/reputation")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));
    assert_eq!(body[0]["username"], "alice");

    let res = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    handle.cleanup().await
}
