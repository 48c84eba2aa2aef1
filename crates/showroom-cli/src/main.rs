//! Showroom CLI - operator access to the back-office data cache.
//!
//! Wires one `CacheManager` at start-up and exposes the cached resources and
//! cache administration as subcommands.

mod cli;

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Command, ResourceKind};
use showroom_core::api::ApiClient;
use showroom_core::auth::{resolve_api_key, CredentialStore};
use showroom_core::backoffice::BackOffice;
use showroom_core::cache::{CacheAdmin, CacheManager};
use showroom_core::config::Config;
use showroom_core::models::{Branch, Category, Customer, Employee, Product};
use showroom_core::resource::{Cacheable, CachedResource, ResourceOptions};
use showroom_core::utils::{format_age, truncate_string};

/// Width of the name column in row listings.
const NAME_WIDTH: usize = 32;

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr, and also to `log_file` when one is given. The returned
/// guard must be held until exit so buffered file output is flushed.
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer().with_writer(io::stderr);

    let Some(path) = log_file else {
        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(filter)
            .init();
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .with_context(|| format!("Invalid log file path: {}", path.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .with(filter)
        .init();
    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file.as_deref())?;

    let config = Config::load()?.with_overrides(cli.backend_url.clone(), None);
    info!(command = ?cli.command, "showroom starting");

    run(cli.command, config).await
}

async fn run(command: Command, config: Config) -> Result<()> {
    match command {
        Command::Configure {
            backend_url,
            cache_dir,
            default_branch,
        } => configure(backend_url, cache_dir, default_branch),
        Command::Login => login(&config),
        Command::Logout => {
            let url = config.backend_url()?;
            if CredentialStore::new().forget(url)? {
                println!("Removed API key for {}", url);
            } else {
                println!("No API key stored for {}", url);
            }
            Ok(())
        }
        Command::Fetch {
            resource,
            branch,
            refresh,
            json,
        } => {
            let office = back_office(&config)?;
            let branch = branch.or_else(|| config.default_branch.clone());
            fetch(&office, resource, branch, refresh, json).await
        }
        Command::Watch {
            resource,
            branch,
            interval,
        } => {
            let office = back_office(&config)?;
            let branch = branch.or_else(|| config.default_branch.clone());
            watch(&office, resource, branch, Duration::from_secs(interval)).await
        }
        Command::Stats { json } => stats(&config, json),
        Command::Clear { pattern } => {
            let admin = CacheAdmin::new(CacheManager::open(&config)?);
            let removed = match pattern.as_deref() {
                Some(pattern) => admin.clear_cache_by_pattern(pattern),
                None => admin.clear_all_cache(),
            };
            println!("Removed {} entries, {} left", removed, admin.stats().entry_count);
            Ok(())
        }
        Command::Prune => {
            let admin = CacheAdmin::new(CacheManager::open(&config)?);
            let removed = admin.prune_expired();
            println!("Pruned {} expired entries, {} left", removed, admin.stats().entry_count);
            Ok(())
        }
    }
}

fn configure(
    backend_url: Option<String>,
    cache_dir: Option<std::path::PathBuf>,
    default_branch: Option<String>,
) -> Result<()> {
    let path = Config::config_path()?;
    let mut config = Config::load_from(&path)?;
    if backend_url.is_some() {
        config.backend_url = backend_url;
    }
    if cache_dir.is_some() {
        config.cache_dir = cache_dir;
    }
    if default_branch.is_some() {
        config.default_branch = default_branch;
    }
    config.save_to(&path)?;
    println!("Saved {}", path.display());
    Ok(())
}

fn login(config: &Config) -> Result<()> {
    let url = config.backend_url()?;
    let api_key = rpassword::prompt_password("API key: ")?;
    if api_key.trim().is_empty() {
        bail!("No API key entered");
    }
    CredentialStore::new().save(url, api_key.trim())?;
    println!("Stored API key for {}", url);
    Ok(())
}

fn back_office(config: &Config) -> Result<BackOffice> {
    let url = config.backend_url()?;
    let api_key = resolve_api_key(config, &CredentialStore::new())?;
    let client = ApiClient::new(url, &api_key)?;
    let manager = CacheManager::open(config)?;
    Ok(BackOffice::new(Arc::new(client), manager))
}

fn require_branch(branch: Option<String>) -> Result<String> {
    branch.context("No branch given (use --branch or `showroom configure --default-branch`)")
}

async fn fetch(
    office: &BackOffice,
    resource: ResourceKind,
    branch: Option<String>,
    refresh: bool,
    json: bool,
) -> Result<()> {
    match resource {
        ResourceKind::Branches => {
            let r = office.branches_resource(ResourceOptions::new());
            show(&r, refresh, json, branch_line).await
        }
        ResourceKind::Categories => {
            let r = office.categories_resource(ResourceOptions::new());
            show(&r, refresh, json, category_line).await
        }
        ResourceKind::Products => {
            let branch = require_branch(branch)?;
            let r = office.products_resource(&branch, ResourceOptions::new());
            show(&r, refresh, json, product_line).await
        }
        ResourceKind::Employees => {
            let r = office.employees_resource(branch.as_deref(), ResourceOptions::new());
            show(&r, refresh, json, employee_line).await
        }
        ResourceKind::Customers => {
            let r = office.customers_resource(ResourceOptions::new());
            show(&r, refresh, json, customer_line).await
        }
    }
}

async fn show<T: Cacheable>(
    resource: &CachedResource<Vec<T>>,
    refresh: bool,
    json: bool,
    line: fn(&T) -> String,
) -> Result<()> {
    // One cycle only: a forced refresh skips the cache read entirely.
    if refresh {
        resource.refresh().await;
    } else {
        resource.load().await;
    }
    let state = resource.state();
    let Some(rows) = state.data else {
        bail!(
            "Failed to load {}: {}",
            resource.key(),
            state.error.unwrap_or_else(|| "no data".to_string())
        );
    };
    if let Some(ref error) = state.error {
        eprintln!("Warning: showing previous data, refresh failed: {}", error);
    }

    if json {
        print_json(&rows)?;
        return Ok(());
    }

    let source = if state.is_from_cache { "cache" } else { "backend" };
    println!(
        "{} ({} rows from {}, updated {})",
        resource.key(),
        rows.len(),
        source,
        updated_display(state.last_updated)
    );
    for row in &rows {
        println!("  {}", line(row));
    }
    Ok(())
}

async fn watch(
    office: &BackOffice,
    resource: ResourceKind,
    branch: Option<String>,
    interval: Duration,
) -> Result<()> {
    match resource {
        ResourceKind::Branches => follow(&office.branches(every(interval)).await).await,
        ResourceKind::Categories => follow(&office.categories(every(interval)).await).await,
        ResourceKind::Products => {
            let branch = require_branch(branch)?;
            follow(&office.products(&branch, every(interval)).await).await
        }
        ResourceKind::Employees => {
            follow(&office.employees(branch.as_deref(), every(interval)).await).await
        }
        ResourceKind::Customers => follow(&office.customers(every(interval)).await).await,
    }
}

fn every<T>(interval: Duration) -> ResourceOptions<T> {
    ResourceOptions::new().with_refresh_interval(interval)
}

/// Print a summary line every time the resource settles. Runs until the
/// process is interrupted.
async fn follow<T: Cacheable>(resource: &CachedResource<Vec<T>>) -> Result<()> {
    let mut updates = resource.subscribe();
    print_summary(resource);
    loop {
        updates
            .changed()
            .await
            .context("Resource closed while watching")?;
        if !updates.borrow_and_update().loading {
            print_summary(resource);
        }
    }
}

fn print_summary<T: Cacheable>(resource: &CachedResource<Vec<T>>) {
    let state = resource.state();
    let rows = state.data.as_ref().map_or(0, Vec::len);
    let status = match state.error {
        Some(ref error) => format!("error: {}", error),
        None => "ok".to_string(),
    };
    println!(
        "[{}] {} rows={} from_cache={} {}",
        Local::now().format("%H:%M:%S"),
        resource.key(),
        rows,
        state.is_from_cache,
        status
    );
}

fn stats(config: &Config, json: bool) -> Result<()> {
    let admin = CacheAdmin::new(CacheManager::open(config)?);
    let stats = admin.refresh_stats();
    if json {
        return print_json(&stats);
    }

    println!("Cache directory: {}", config.cache_dir()?.display());
    println!("Entries:         {}", stats.entry_count);
    println!("  fresh:         {}", stats.fresh_count());
    println!("  expired:       {}", stats.expired_count);
    println!("  corrupted:     {}", stats.corrupted_count);
    println!("Total size:      {}", stats.size_display());
    println!("Oldest entry:    {}", stats.oldest_display());
    println!("Newest entry:    {}", stats.newest_display());
    for key in &stats.keys {
        println!("  {}", key);
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn updated_display(updated: Option<DateTime<Utc>>) -> String {
    match updated {
        Some(at) => {
            let age = (Utc::now() - at).to_std().unwrap_or_default();
            format!(
                "{} ({})",
                at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                format_age(age)
            )
        }
        None => "never".to_string(),
    }
}

fn branch_line(b: &Branch) -> String {
    format!("{:<12} {}", b.id, truncate_string(&b.name, NAME_WIDTH))
}

fn category_line(c: &Category) -> String {
    format!("{:<12} {}", c.id, truncate_string(&c.name, NAME_WIDTH))
}

fn product_line(p: &Product) -> String {
    format!(
        "{:<12} {:<width$} {:>10} stock {}",
        p.id,
        truncate_string(&p.name, NAME_WIDTH),
        p.price_display(),
        p.stock_quantity,
        width = NAME_WIDTH
    )
}

fn employee_line(e: &Employee) -> String {
    format!(
        "{:<12} {:<width$} {}",
        e.id,
        truncate_string(&e.full_name(), NAME_WIDTH),
        e.role.as_deref().unwrap_or("-"),
        width = NAME_WIDTH
    )
}

fn customer_line(c: &Customer) -> String {
    format!(
        "{:<12} {:<width$} {}",
        c.id,
        truncate_string(&c.name, NAME_WIDTH),
        c.phone.as_deref().unwrap_or("-"),
        width = NAME_WIDTH
    )
}
