use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use gh_broker::{
    BearerToken, GithubBrokerBuilder, HttpExec, HttpStatusError, RateLimitCoordinator, Sleeper,
};
use http::{Request, Response, StatusCode};

struct StubExec {
    status: StatusCode,
    headers: Vec<(&'static str, String)>,
    seen: Mutex<Vec<Request<Vec<u8>>>>,
}

impl StubExec {
    fn new(status: StatusCode, headers: Vec<(&'static str, String)>) -> Arc<Self> {
        Arc::new(Self {
            status,
            headers,
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl HttpExec for StubExec {
    async fn execute(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        self.seen.lock().unwrap().push(req);
        let mut builder = Response::builder().status(self.status);
        for (name, value) in &self.headers {
            builder = builder.header(*name, value.as_str());
        }
        Ok(builder.body(b"[]".to_vec())?)
    }
}

#[derive(Default)]
struct RecordingSleeper {
    waits: Arc<Mutex<Vec<Duration>>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

fn request(path: &str) -> Request<Vec<u8>> {
    Request::builder()
        .uri(format!("https://api.github.com/{path}"))
        .body(Vec::new())
        .unwrap()
}

#[tokio::test]
async fn adds_bearer_header() -> Result<()> {
    let exec = StubExec::new(StatusCode::OK, Vec::new());
    let broker = GithubBrokerBuilder::new(BearerToken::new("abc"))
        .http_exec(exec.clone())
        .build()?;

    broker.enqueue(request("repos/a/b")).await?;

    let seen = exec.seen.lock().unwrap();
    assert_eq!(
        seen[0].headers().get(http::header::AUTHORIZATION).unwrap(),
        "Bearer abc"
    );
    Ok(())
}

#[tokio::test]
async fn non_success_becomes_status_error() -> Result<()> {
    let exec = StubExec::new(StatusCode::UNAUTHORIZED, Vec::new());
    let broker = GithubBrokerBuilder::new(None).http_exec(exec).build()?;

    let err = broker.enqueue(request("users/ghost")).await.unwrap_err();
    let status = err.downcast_ref::<HttpStatusError>().unwrap();
    assert_eq!(status.status, StatusCode::UNAUTHORIZED);
    assert_eq!(status.endpoint, "users/ghost");
    assert!(status.is_unauthorized());
    Ok(())
}

#[tokio::test]
async fn sleeps_when_budget_is_low() -> Result<()> {
    let reset = chrono::Utc::now().timestamp() + 30;
    let exec = StubExec::new(
        StatusCode::OK,
        vec![
            ("x-ratelimit-limit", "5000".to_string()),
            ("x-ratelimit-remaining", "3".to_string()),
            ("x-ratelimit-reset", reset.to_string()),
        ],
    );
    let sleeper = RecordingSleeper::default();
    let waits = sleeper.waits.clone();
    let coordinator =
        RateLimitCoordinator::new(Box::new(sleeper)).with_max_jitter(Duration::ZERO);
    let broker = GithubBrokerBuilder::new(None)
        .http_exec(exec)
        .coordinator(Arc::new(coordinator))
        .build()?;

    broker.enqueue(request("repos/a/b/pulls")).await?;

    let waits = waits.lock().unwrap();
    assert_eq!(waits.len(), 1);
    assert!(waits[0] > Duration::from_secs(20) && waits[0] <= Duration::from_secs(30));
    Ok(())
}

#[tokio::test]
async fn plenty_of_budget_never_sleeps() -> Result<()> {
    let reset = chrono::Utc::now().timestamp() + 30;
    let exec = StubExec::new(
        StatusCode::OK,
        vec![
            ("x-ratelimit-limit", "5000".to_string()),
            ("x-ratelimit-remaining", "4000".to_string()),
            ("x-ratelimit-reset", reset.to_string()),
        ],
    );
    let sleeper = RecordingSleeper::default();
    let waits = sleeper.waits.clone();
    let broker = GithubBrokerBuilder::new(None)
        .http_exec(exec)
        .coordinator(Arc::new(RateLimitCoordinator::new(Box::new(sleeper))))
        .build()?;

    broker.enqueue(request("repos/a/b/pulls")).await?;
    assert!(waits.lock().unwrap().is_empty());
    Ok(())
}
