use std::sync::Arc;

use analysis::{InsightQuery, InsightService, OTHERS_BUCKET};
use chrono::{Duration, Utc};
use common::time::format_date;
use common::EventType;
use db::Repositories;
use db_test_fixture::{developer_with_entity, event, DbFixture};

fn recent(days_ago: i64) -> String {
    format_date(&(Utc::now() - Duration::days(days_ago)))
}

fn query(months: u32) -> InsightQuery {
    InsightQuery {
        months: Some(months),
        ..InsightQuery::default()
    }
}

#[tokio::test]
async fn summary_reports_bus_and_pony_factor() -> anyhow::Result<()> {
    let handle = DbFixture::create("insights_summary").await?;
    let mut events = Vec::new();
    let mut id = 0;
    for (user, count) in [("alice", 50), ("bob", 30), ("carol", 20)] {
        for _ in 0..count {
            id += 1;
            events.push(event(id, user, EventType::PullRequest, &recent(3)));
        }
    }
    handle
        .seed(
            vec![
                developer_with_entity("alice", "ACME"),
                developer_with_entity("bob", "ACME"),
                developer_with_entity("carol", "INITECH"),
            ],
            events,
        )
        .await?;

    let service = InsightService::new(Arc::new(handle.db().clone()) as Arc<dyn Repositories>);
    let summary = service.summary(&query(24)).await?;
    assert_eq!(summary.bus_factor, 1);
    assert_eq!(summary.pony_factor, 1);
    assert_eq!(summary.developers, 3);
    assert_eq!(summary.entities, 2);
    assert_eq!(summary.events, 100);

    let scoped = service
        .summary(&InsightQuery {
            entity: Some("INITECH".into()),
            ..query(24)
        })
        .await?;
    assert_eq!(scoped.events, 20);

    handle.cleanup().await
}

#[tokio::test]
async fn pr_ratio_divides_reviews_by_prs() -> anyhow::Result<()> {
    let handle = DbFixture::create("insights_ratio").await?;
    let day = recent(1);
    let mut events = vec![
        event(1, "alice", EventType::PullRequest, &day),
        event(2, "alice", EventType::PullRequest, &day),
    ];
    events.extend((3..=5).map(|id| event(id, "bob", EventType::PullRequestReview, &day)));
    handle
        .seed(
            vec![developer_with_entity("alice", ""), developer_with_entity("bob", "")],
            events,
        )
        .await?;

    let service = InsightService::new(Arc::new(handle.db().clone()));
    let ratios = service.pr_ratio(&query(24)).await?;
    assert_eq!(ratios.len(), 1);
    assert_eq!(ratios[0].month, day[..7]);
    assert_eq!((ratios[0].prs, ratios[0].reviews), (2, 3));
    assert_eq!(ratios[0].ratio, 1.5);

    handle.cleanup().await
}

#[tokio::test]
async fn developer_shares_fold_tail_into_others() -> anyhow::Result<()> {
    let handle = DbFixture::create("insights_shares").await?;
    let mut developers = Vec::new();
    let mut events = Vec::new();
    let mut id = 0;
    for n in 0..12 {
        let user = format!("dev{n:02}");
        developers.push(developer_with_entity(&user, ""));
        for _ in 0..(12 - n) {
            id += 1;
            events.push(event(id, &user, EventType::IssueComment, &recent(2)));
        }
    }
    handle.seed(developers, events).await?;

    let service = InsightService::new(Arc::new(handle.db().clone()));
    let shares = service
        .developer_shares(&query(6), &["dev00".to_string()])
        .await?;
    assert_eq!(shares.len(), 10);
    assert_eq!(shares[0].name, "dev01");
    assert_eq!(shares[9].name, OTHERS_BUCKET);
    assert_eq!(shares[9].count, 2 + 1);

    handle.cleanup().await
}
