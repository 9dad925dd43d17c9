use std::sync::Arc;

use analysis::{RefreshSummary, ReputationService};
use anyhow::{Context, Result};
use collector::{ImportOptions, ImportSummary, Importer};
use db::Repositories;
use enricher::{AffiliationMerger, EnrichSummary, HttpRosterSource};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::args::ImportArgs;
use crate::context::AppContext;
use crate::output;

#[derive(Debug, Serialize)]
struct ImportReport {
    import: ImportSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    affiliations: Option<EnrichSummary>,
    substitutions: u64,
    reputation: RefreshSummary,
}

/// Cancels `token` on the first Ctrl-C.
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing the current batch");
            token.cancel();
        }
    });
}

pub async fn run(ctx: &AppContext, args: ImportArgs) -> Result<()> {
    let fetcher = ctx.fetcher(true)?;
    let db = ctx.open_store().await?;
    let store: Arc<dyn Repositories> = Arc::new(db.clone());

    let mut options = ImportOptions::from(&ctx.config.importer);
    if let Some(months) = args.months {
        options.months = months;
    }
    options.fresh = args.fresh;

    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());
    let importer = Importer::new(fetcher.clone(), store.clone(), options).with_cancellation(cancel);

    let result = pipeline(ctx, &importer, &args, fetcher, store).await;
    db.close().await;
    let report = result?;

    output::emit(ctx.format, &report)
}

async fn pipeline(
    ctx: &AppContext,
    importer: &Importer,
    args: &ImportArgs,
    fetcher: Arc<dyn collector::DataFetcher>,
    store: Arc<dyn Repositories>,
) -> Result<ImportReport> {
    let targets = importer.resolve_targets(args.org.as_deref(), &args.repos).await?;
    info!(targets = targets.len(), "import starting");
    let import = importer.run(&targets).await?;

    let affiliations = if args.no_enrich {
        None
    } else {
        let merger = AffiliationMerger::new(store.clone(), fetcher.clone()).await?;
        let source = HttpRosterSource::new(&ctx.config.github.user_agent)?;
        Some(merger.enrich(&source, &ctx.config.roster.urls()).await?)
    };

    let substitutions = enricher::apply_substitutions(store.as_ref())
        .await
        .context("apply substitutions")?;

    let reputation = ReputationService::new(store, fetcher, &ctx.config.reputation)
        .refresh_shallow()
        .await
        .context("refresh reputation")?;

    Ok(ImportReport {
        import,
        affiliations,
        substitutions,
        reputation,
    })
}
