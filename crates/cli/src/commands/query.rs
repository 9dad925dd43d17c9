use anyhow::{anyhow, Result};
use db::{DeveloperQuery, EventSearch, Repositories, MAX_PAGE_SIZE};

use crate::args::{DeveloperQuery as DeveloperCmd, EntityQuery, EventArgs, OrgQuery, QueryCommand};
use crate::context::AppContext;
use crate::output;

fn limit(requested: i64) -> i64 {
    requested.clamp(1, MAX_PAGE_SIZE)
}

pub async fn run(ctx: &AppContext, command: QueryCommand) -> Result<()> {
    let db = ctx.open_store().await?;
    let result = execute(ctx, &db, command).await;
    db.close().await;
    result
}

async fn execute(ctx: &AppContext, store: &dyn Repositories, command: QueryCommand) -> Result<()> {
    match command {
        QueryCommand::Developers(DeveloperCmd::List {
            username,
            entity,
            limit: requested,
        }) => {
            let rows = store
                .developers()
                .list(DeveloperQuery {
                    username,
                    entity,
                    limit: limit(requested),
                })
                .await?;
            output::emit(ctx.format, &rows)
        }
        QueryCommand::Developers(DeveloperCmd::Details { username }) => {
            let details = store
                .developers()
                .details(&username)
                .await?
                .ok_or_else(|| anyhow!("developer `{username}` not found"))?;
            output::emit(ctx.format, &details)
        }
        QueryCommand::Entities(EntityQuery::List { limit: requested }) => {
            let rows = store.developers().list_entities(limit(requested)).await?;
            output::emit(ctx.format, &rows)
        }
        QueryCommand::Entities(EntityQuery::Details {
            entity,
            limit: requested,
        }) => {
            let details = store
                .developers()
                .entity_details(&entity, limit(requested))
                .await?
                .ok_or_else(|| anyhow!("entity `{entity}` not found"))?;
            output::emit(ctx.format, &details)
        }
        QueryCommand::Org(OrgQuery::Repos {
            org,
            limit: requested,
        }) => {
            let rows = store.events().org_repos(&org, limit(requested)).await?;
            output::emit(ctx.format, &rows)
        }
        QueryCommand::Events(args) => {
            let rows = store.events().search(event_search(args)).await?;
            output::emit(ctx.format, &rows)
        }
    }
}

fn event_search(args: EventArgs) -> EventSearch {
    EventSearch {
        org: args.org,
        repo: args.repo,
        username: args.username,
        entity: args.entity,
        event_type: args.event_type,
        from_date: args.from_date,
        mention: args.mention,
        label: args.label,
        page: args.page.max(1),
        page_size: limit(args.limit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_are_clamped() {
        assert_eq!(limit(0), 1);
        assert_eq!(limit(42), 42);
        assert_eq!(limit(10_000), MAX_PAGE_SIZE);
    }

    #[test]
    fn event_args_map_onto_search() {
        let search = event_search(EventArgs {
            org: Some("acme".into()),
            repo: None,
            username: None,
            entity: None,
            event_type: Some("issue".into()),
            from_date: Some("2024-01-01".into()),
            mention: None,
            label: None,
            page: 0,
            limit: 900,
        });
        assert_eq!(search.org.as_deref(), Some("acme"));
        assert_eq!(search.event_type.as_deref(), Some("issue"));
        assert_eq!(search.page, 1);
        assert_eq!(search.page_size, MAX_PAGE_SIZE);
    }
}
