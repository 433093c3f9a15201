use anyhow::Result;
use clap::{Args, ValueEnum};
use std::io::Write;
use zoo_core::db::{self, taxa};
use zoo_core::model::TaxonLevel;

use crate::Context;
use crate::output::{self, render};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LevelArg {
    Genus,
    Family,
    Order,
    Class,
    Phylum,
}

impl From<LevelArg> for TaxonLevel {
    fn from(level: LevelArg) -> Self {
        match level {
            LevelArg::Genus => Self::Genus,
            LevelArg::Family => Self::Family,
            LevelArg::Order => Self::Order,
            LevelArg::Class => Self::Class,
            LevelArg::Phylum => Self::Phylum,
        }
    }
}

#[derive(Args, Debug)]
pub struct TaxaArgs {
    /// Level to list.
    #[arg(value_enum)]
    pub level: LevelArg,
}

/// Execute `zoo taxa <level>`: print stored aggregate counters.
///
/// # Errors
///
/// Returns an error if the store is missing or cannot be read.
pub fn run_taxa(args: &TaxaArgs, ctx: &Context) -> Result<()> {
    let conn = db::open_existing(&ctx.db)?;
    let level = TaxonLevel::from(args.level);
    let rows = taxa::list_aggregates(&conn, level)?;

    render(ctx.output, &rows, |rows, w| {
        output::section(w, level.as_str())?;
        for row in rows {
            writeln!(
                w,
                "{:>6} {:<12} owned={} in_zoo={} dep_in={} dep_to={}",
                row.id,
                row.status.as_str(),
                row.quantities.owned,
                row.quantities.in_zoo,
                row.quantities.deponated_from,
                row.quantities.deponated_to
            )?;
        }
        Ok(())
    })
}
