use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::io::Write;
use zoo_core::db::{self, write_transaction};
use zoo_core::rebuild::rebuild_aggregates;

use crate::Context;
use crate::output::{self, render};

#[derive(Args, Debug)]
pub struct RebuildArgs {
    /// Ledger rows per page (overrides `[reconstruct] page_size`).
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub page_size: Option<u32>,
}

#[derive(Debug, Serialize)]
struct RebuildSummary {
    event_count: usize,
    specimen_count: usize,
    taxa_touched: usize,
    pages_fetched: usize,
    elapsed_ms: u128,
}

/// Execute `zoo rebuild` in a single write transaction.
///
/// # Errors
///
/// Returns an error if the store is missing, a chain is broken, or the
/// write lock cannot be taken.
pub fn run_rebuild(args: &RebuildArgs, ctx: &Context) -> Result<()> {
    let mut conn = db::open_existing(&ctx.db)?;
    let page_size = args
        .page_size
        .map_or(ctx.config.reconstruct.page_size, |size| size as usize);

    let report = write_transaction(&mut conn, |tx| {
        rebuild_aggregates(tx, &ctx.config.reasons, page_size, &ctx.actor)
    })?;

    let summary = RebuildSummary {
        event_count: report.event_count,
        specimen_count: report.specimen_count,
        taxa_touched: report.taxa_touched,
        pages_fetched: report.pages_fetched,
        elapsed_ms: report.elapsed.as_millis(),
    };
    render(ctx.output, &summary, |s, w| {
        writeln!(
            w,
            "rebuild: events={} specimens={} taxa={} pages={} elapsed={}ms",
            s.event_count, s.specimen_count, s.taxa_touched, s.pages_fetched, s.elapsed_ms
        )?;
        output::kv(w, "status", "aggregates match the ledger")
    })
}
