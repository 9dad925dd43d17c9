use sqlx::{QueryBuilder, Sqlite};

use crate::models::Scope;

/// Tracks whether a `WHERE` has been emitted so filters chain with `AND`.
#[derive(Debug, Default)]
pub(crate) struct Clause {
    started: bool,
}

impl Clause {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Continues an existing `WHERE` written by hand.
    pub(crate) fn continued() -> Self {
        Self { started: true }
    }

    pub(crate) fn next(&mut self, builder: &mut QueryBuilder<'_, Sqlite>) {
        builder.push(if self.started { " AND " } else { " WHERE " });
        self.started = true;
    }
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Org, repo, entity and window filters against an event table alias.
pub(crate) fn push_event_scope(
    builder: &mut QueryBuilder<'_, Sqlite>,
    clause: &mut Clause,
    scope: &Scope,
    alias: &str,
) {
    push_repo_scope(builder, clause, scope, alias);
    if let Some(entity) = non_empty(&scope.entity) {
        clause.next(builder);
        builder.push(format!(
            "{alias}.username IN (SELECT username FROM developer WHERE entity = "
        ));
        builder.push_bind(entity.to_string());
        builder.push(")");
    }
    if let Some(since) = non_empty(&scope.since) {
        clause.next(builder);
        builder.push(format!("{alias}.date >= "));
        builder.push_bind(since.to_string());
    }
}

/// Only the org and repo parts of the scope.
pub(crate) fn push_repo_scope(
    builder: &mut QueryBuilder<'_, Sqlite>,
    clause: &mut Clause,
    scope: &Scope,
    alias: &str,
) {
    if let Some(org) = non_empty(&scope.org) {
        clause.next(builder);
        builder.push(format!("{alias}.org = "));
        builder.push_bind(org.to_string());
    }
    if let Some(repo) = non_empty(&scope.repo) {
        clause.next(builder);
        builder.push(format!("{alias}.repo = "));
        builder.push_bind(repo.to_string());
    }
}

pub(crate) fn like(value: &str) -> String {
    format!("%{}%", value.trim())
}
