use anyhow::Result;
use clap::Args;
use std::io::Write;
use zoo_core::db;
use zoo_core::verify::verify_aggregates;

use crate::Context;
use crate::output::{self, render};

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Ledger rows per page (overrides `[reconstruct] page_size`).
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub page_size: Option<u32>,
}

/// Execute `zoo verify`. Prints every drifted row and fails when any exist.
///
/// # Errors
///
/// Returns an error if the store is missing or any counter drifted.
pub fn run_verify(args: &VerifyArgs, ctx: &Context) -> Result<()> {
    let conn = db::open_existing(&ctx.db)?;
    let page_size = args
        .page_size
        .map_or(ctx.config.reconstruct.page_size, |size| size as usize);

    let report = verify_aggregates(&conn, &ctx.config.reasons, page_size)?;

    render(ctx.output, &report, |r, w| {
        output::section(w, "verify")?;
        output::kv(w, "events", r.events_checked.to_string())?;
        output::kv(w, "specimens", r.specimens_checked.to_string())?;
        output::kv(w, "taxa", r.taxa_checked.to_string())?;
        for drift in &r.specimens {
            writeln!(
                w,
                "specimen {}: stored {:?} expected {:?}{}",
                drift.specimen_id,
                drift.stored,
                drift.expected,
                if drift.stale_placement {
                    " (placement not cleared)"
                } else {
                    ""
                }
            )?;
        }
        for drift in &r.taxa {
            writeln!(
                w,
                "{} {}: stored {:?} ({}) expected {:?} ({})",
                drift.level,
                drift.id,
                drift.stored,
                drift.stored_status,
                drift.expected,
                drift.expected_status
            )?;
        }
        if r.is_clean() {
            output::kv(w, "result", "clean")?;
        }
        Ok(())
    })?;

    if let Some(code) = report.code() {
        anyhow::bail!(
            "{code}: {} ({} specimens, {} taxa); run `zoo rebuild`",
            code.message(),
            report.specimens.len(),
            report.taxa.len()
        );
    }
    Ok(())
}
