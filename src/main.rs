mod cli;
mod logging;
mod prompt;

use std::path::Path;
use std::process;

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use colored::*;
use dotenv::dotenv;
use indicatif::HumanBytes;
use lms_cleanup::admin::{self, RemovalOutcome};
use lms_cleanup::config::{self, AppConfig};
use lms_cleanup::finder::{FileFilter, FileFinder, FinderScope};
use lms_cleanup::host::{DatabasePlatform, FileDirStore};
use lms_cleanup::scanner::UnlinkedFileScanner;
use lms_cleanup::steps::ghost_files::STRAY_PAGE_SIZE;
use lms_cleanup::tasks::HostServices;
use lms_cleanup::{CleanupTask, Database, ScanTask, ScheduledTask, TraceReporter};
use prompt::prompt_confirm;
use tracing::{error, info};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let args = Cli::parse();

    let loaded = match &args.config {
        Some(path) => config::load_configuration_from(path),
        None => config::load_configuration(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let result = match args.command {
        Some(Commands::Scan) => run_scan(&config),
        Some(Commands::Cleanup) => run_cleanup(&config),
        Some(Commands::StrayFiles { page, csv }) => match csv {
            Some(path) => export_stray_files(&config, &path),
            None => list_stray_files(&config, page),
        },
        Some(Commands::FindFiles {
            min_size_mb,
            name,
            user,
            component,
            user_deleted,
            owner,
            page,
        }) => {
            let filter = FileFilter {
                min_size_mb,
                name_like: name,
                user_like: user,
                component,
                user_deleted,
            };
            let scope = owner.map_or(FinderScope::Admin, FinderScope::Owner);
            find_files(&config, &filter, scope, page)
        }
        Some(Commands::Stats) => run_stats(&config),
        Some(Commands::RemoveFile { id, yes }) => remove_file(&config, id, yes),
        Some(Commands::BatchRemove {
            component,
            until,
            yes,
        }) => batch_remove(&config, &component, &until, yes),
        Some(Commands::ReinitModuleCleanup { force, admin_id }) => {
            reinit_module_cleanup(&config, force, admin_id)
        }
        Some(Commands::PrintConfig) => print_config(&config),
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("Error: {:#}", err);
        process::exit(1);
    }
}

fn open_database(config: &AppConfig) -> anyhow::Result<Database> {
    Database::open(&config.database_path)
        .with_context(|| format!("opening database {}", config.database_path))
}

fn run_scan(config: &AppConfig) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let scanner = UnlinkedFileScanner::new(&db, &config.data_root)
        .with_ignore_patterns(&config.scan.ignore_patterns);
    let task = ScanTask::new(scanner);

    info!("Running task: {}", task.name().cyan());
    task.execute(&TraceReporter::new())?;
    Ok(())
}

fn run_cleanup(config: &AppConfig) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let platform = DatabasePlatform::new(&db);
    let content = FileDirStore::new(&db, &config.data_root);
    let host = HostServices {
        content: &content,
        deleter: &platform,
        hooks: &platform,
    };

    let task = CleanupTask::from_config(&db, host, &config.cleanup, Path::new(&config.data_root));
    info!(
        "Running task: {} ({})",
        task.name().cyan(),
        task.step_names().join(", ")
    );
    task.execute(&TraceReporter::new())?;
    info!("{}", "Clean-up finished".green());
    Ok(())
}

fn list_stray_files(config: &AppConfig, page: usize) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let (count, size) = db.stray_file_totals()?;

    println!(
        "{} unlinked files, {}",
        count.to_string().red(),
        format!("{:.3} GB", size as f64 / GIB).red()
    );

    let limit = config.items_per_page.max(1);
    let candidates = db.stray_file_page((page * limit) as i64, limit as i64)?;
    if candidates.is_empty() {
        println!("Nothing to show.");
        return Ok(());
    }

    for candidate in candidates {
        println!(
            "{:>10}  {:<28}  {}",
            HumanBytes(candidate.size.max(0) as u64),
            candidate.mime,
            candidate.path
        );
    }
    Ok(())
}

fn export_stray_files(config: &AppConfig, path: &Path) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    let mut written = 0;
    let mut last_id = 0;
    loop {
        let page = db.stray_files_after(last_id, STRAY_PAGE_SIZE)?;
        let Some(last) = page.last() else { break };
        last_id = last.id;
        for candidate in &page {
            writer.serialize(candidate)?;
            written += 1;
        }
    }
    writer.flush()?;

    info!("Wrote {} candidates to {}", written, path.display());
    Ok(())
}

fn find_files(
    config: &AppConfig,
    filter: &FileFilter,
    scope: FinderScope,
    page: usize,
) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let finder = FileFinder::new(&db, scope);
    let limit = config.items_per_page.max(1);

    let total = finder.count(filter)?;
    let listings = finder.find(filter, limit, page * limit)?;

    if listings.is_empty() {
        println!("Nothing to show.");
        return Ok(());
    }

    println!("Total files: {}", total.to_string().cyan());
    for listing in listings {
        let file = &listing.file;
        let owner = listing.owner_name().unwrap_or_else(|| "-".to_string());
        let owner = if listing.user_deleted.unwrap_or(false) {
            owner.strikethrough().to_string()
        } else {
            owner
        };
        let created = DateTime::<Utc>::from_timestamp(file.timecreated, 0)
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();

        println!(
            "{:>8}  {:<40}  {}, {}  {:.1} MB  {}  {}",
            file.id,
            file.filename,
            file.component,
            file.filearea,
            file.filesize as f64 / (1024.0 * 1024.0),
            owner,
            created
        );
    }
    Ok(())
}

fn run_stats(config: &AppConfig) -> anyhow::Result<()> {
    let db = open_database(config)?;
    lms_cleanup::stats::write_usage_report(&db, &TraceReporter::new())?;
    Ok(())
}

fn remove_file(config: &AppConfig, id: i64, yes: bool) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let content = FileDirStore::new(&db, &config.data_root);

    let file = db
        .get_file(id)?
        .ok_or_else(|| anyhow!("file {} not found", id))?;
    let question = format!(
        "Remove file {}, {:.2} MB?",
        file.filename.bold(),
        file.filesize as f64 / (1024.0 * 1024.0)
    );
    if !yes && !prompt_confirm(&question, Some(false))? {
        return Ok(());
    }

    match admin::remove_file(&db, &content, id)? {
        RemovalOutcome::Removed { filename, records } => {
            info!("{} removed ({} records)", filename, records);
        }
        RemovalOutcome::ContentMissing { filename, records } => {
            info!("{} had no content on disk, {} records removed", filename, records);
        }
        RemovalOutcome::UnlinkFailed { filename, reason } => {
            bail!("failed to remove {}: {}", filename, reason);
        }
    }
    Ok(())
}

fn batch_remove(config: &AppConfig, component: &str, until: &str, yes: bool) -> anyhow::Result<()> {
    let date = NaiveDate::parse_from_str(until, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{}'", until))?;
    let until_ts = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("invalid date '{}'", until))?
        .and_utc()
        .timestamp();

    let db = open_database(config)?;

    let question = format!("Remove {} to {}?", component.bold(), until);
    if !yes && !prompt_confirm(&question, Some(false))? {
        return Ok(());
    }

    let removed = admin::batch_remove(&db, component, until_ts, Utc::now())?;
    info!("Batch removal done: {} records", removed.to_string().green());
    Ok(())
}

fn reinit_module_cleanup(config: &AppConfig, force: bool, admin_id: i64) -> anyhow::Result<()> {
    if !force {
        println!(
            "This will reinitialize course modules clean-up and delete existing modules removal adhoc tasks."
        );
        println!("To start the process, run it with -f (--force).");
        bail!("refusing to run without --force");
    }

    let db = open_database(config)?;
    let queued = admin::reinit_module_cleanup(&db, admin_id, &TraceReporter::new())?;
    info!("{} deletion tasks queued", queued);
    Ok(())
}

fn print_config(config: &AppConfig) -> anyhow::Result<()> {
    let rendered = toml::to_string_pretty(config).context("rendering configuration")?;
    println!("{}", rendered);
    Ok(())
}
