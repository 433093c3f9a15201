use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use zoo_core::config::{EngineConfig, LOCAL_CONFIG_FILE};
use zoo_core::db::{self, migrations};

use crate::Context;
use crate::output::{self, render};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Write a zoo.toml with default settings into the working directory.
    #[arg(long)]
    pub write_config: bool,

    /// Overwrite an existing zoo.toml.
    #[arg(long, requires = "write_config")]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct InitSummary {
    db: PathBuf,
    schema_version: u32,
    config_written: Option<PathBuf>,
}

/// Execute `zoo init`: create the store (or migrate an older one) and
/// optionally write a default config file.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or migrated, or if
/// `zoo.toml` exists and `--force` is not set.
pub fn run_init(args: &InitArgs, ctx: &Context, working_dir: &Path) -> Result<()> {
    let conn = db::open_store(&ctx.db)?;
    let schema_version = migrations::current_schema_version(&conn)?;

    let config_written = if args.write_config {
        let path = working_dir.join(LOCAL_CONFIG_FILE);
        if path.exists() && !args.force {
            anyhow::bail!(
                "{} already exists. Use `zoo init --write-config --force` to overwrite.",
                path.display()
            );
        }
        let content = toml::to_string_pretty(&EngineConfig::default())
            .context("serialize default config")?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Some(path)
    } else {
        None
    };

    tracing::info!(db = %ctx.db.display(), schema_version, "store ready");

    let summary = InitSummary {
        db: ctx.db.clone(),
        schema_version,
        config_written,
    };
    render(ctx.output, &summary, |s, w| {
        output::kv(w, "store", s.db.display().to_string())?;
        output::kv(w, "schema", s.schema_version.to_string())?;
        if let Some(path) = &s.config_written {
            output::kv(w, "config", path.display().to_string())?;
        }
        w.flush()
    })
}
