use anyhow::Result;
use chrono::Local;
use clap::Args;
use serde::Serialize;
use std::io::Write;
use zoo_core::db;
use zoo_core::model::{MovementDate, MovementRecord, QuantitySnapshot, SpecimenId};
use zoo_core::reconstruct::{PointInTimeReport, ReconstructOptions, reconstruct_as_of};

use crate::Context;
use crate::output::{self, render};

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Report date, inclusive (yyyy/MM/dd). Defaults to today.
    #[arg(long)]
    pub as_of: Option<String>,

    /// Only specimens physically present on that date.
    #[arg(long, conflicts_with = "absent")]
    pub present: bool,

    /// Only specimens no longer present on that date.
    #[arg(long)]
    pub absent: bool,

    /// Include every ledger row of each reported specimen.
    #[arg(long)]
    pub events: bool,

    /// Ledger rows per page (overrides `[reconstruct] page_size`).
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub page_size: Option<u32>,
}

#[derive(Debug, Serialize)]
struct Leg {
    movement_id: i64,
    date: MovementDate,
    reason: String,
}

impl Leg {
    fn from_record(record: Option<&MovementRecord>, increment: bool) -> Option<Self> {
        record.map(|r| {
            let reason = if increment {
                &r.increment_reason
            } else {
                &r.decrement_reason
            };
            Self {
                movement_id: r.movement_id,
                date: r.date,
                reason: reason.clone().unwrap_or_default(),
            }
        })
    }
}

#[derive(Debug, Serialize)]
struct ReportRow {
    specimen_id: SpecimenId,
    quantities: QuantitySnapshot,
    arrived: Option<Leg>,
    left: Option<Leg>,
    event_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    events: Option<Vec<MovementRecord>>,
}

#[derive(Debug, Serialize)]
struct ReportOutput {
    as_of: MovementDate,
    specimens: Vec<ReportRow>,
    totals: QuantitySnapshot,
    groups_evaluated: usize,
    events_read: usize,
    pages_fetched: usize,
    completed: bool,
}

fn shape(as_of: MovementDate, report: PointInTimeReport, with_events: bool) -> ReportOutput {
    let specimens: Vec<ReportRow> = report
        .entries
        .into_iter()
        .map(|(specimen_id, entry)| ReportRow {
            specimen_id,
            quantities: entry.snapshot,
            arrived: Leg::from_record(entry.first_in.as_ref(), true),
            left: Leg::from_record(entry.last_out.as_ref(), false),
            event_count: entry.events.len(),
            events: with_events.then_some(entry.events),
        })
        .collect();
    let totals = specimens.iter().map(|row| row.quantities).sum();

    ReportOutput {
        as_of,
        specimens,
        totals,
        groups_evaluated: report.groups_evaluated,
        events_read: report.events_read,
        pages_fetched: report.pages_fetched,
        completed: report.completed,
    }
}

/// Execute `zoo report`: rebuild stock as of a date straight from the
/// ledger, ignoring stored counters.
///
/// # Errors
///
/// Returns an error if the date is malformed or the store cannot be read.
pub fn run_report(args: &ReportArgs, ctx: &Context) -> Result<()> {
    let as_of: MovementDate = match &args.as_of {
        Some(raw) => raw.parse()?,
        None => Local::now().date_naive().into(),
    };
    let conn = db::open_existing(&ctx.db)?;
    let options = ReconstructOptions::with_page_size(
        args.page_size
            .map_or(ctx.config.reconstruct.page_size, |size| size as usize),
    );

    let (present, absent) = (args.present, args.absent);
    let report = reconstruct_as_of(&conn, as_of, &ctx.config.reasons, &options, |snapshot, _| {
        (!present || snapshot.in_zoo > 0) && (!absent || snapshot.in_zoo == 0)
    })?;
    let shaped = shape(as_of, report, args.events);

    render(ctx.output, &shaped, |r, w| {
        output::section(w, &format!("stock as of {}", r.as_of))?;
        writeln!(
            w,
            "{:>8} {:>6} {:>6} {:>6} {:>6}  {:<24} {:<24}",
            "specimen", "owned", "in_zoo", "dep_in", "dep_to", "arrived", "left"
        )?;
        for row in &r.specimens {
            let leg = |leg: Option<&Leg>| {
                leg.map_or_else(|| "-".to_string(), |l| format!("{} {}", l.date, l.reason))
            };
            writeln!(
                w,
                "{:>8} {:>6} {:>6} {:>6} {:>6}  {:<24} {:<24}",
                row.specimen_id,
                row.quantities.owned,
                row.quantities.in_zoo,
                row.quantities.deponated_from,
                row.quantities.deponated_to,
                leg(row.arrived.as_ref()),
                leg(row.left.as_ref())
            )?;
        }
        output::kv(w, "specimens", r.specimens.len().to_string())?;
        output::kv(
            w,
            "totals",
            format!(
                "owned={} in_zoo={} dep_in={} dep_to={}",
                r.totals.owned, r.totals.in_zoo, r.totals.deponated_from, r.totals.deponated_to
            ),
        )?;
        output::kv(w, "ledger rows", r.events_read.to_string())
    })
}
