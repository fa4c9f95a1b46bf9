use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use newsbrief::config::Config;
use newsbrief::feed::{export_json, load_subscriptions, FeedStatistics};
use newsbrief::pipeline::Pipeline;
use newsbrief::storage::{Database, DatabaseError};
use newsbrief::summarize::{render_digest, DigestArticle};
use newsbrief::util::{atomic_copy, atomic_write};

#[derive(Parser, Debug)]
#[command(name = "newsbrief", about = "RSS feed summarizer with daily digests")]
struct Args {
    /// Config directory (default: ~/.config/newsbrief)
    #[arg(long, value_name = "DIR", global = true)]
    config_dir: Option<PathBuf>,

    /// Reset database (delete and recreate)
    #[arg(long, global = true)]
    reset_db: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, summarize, and write today's digest once
    Run,
    /// Run continuously: periodic refresh plus a daily digest
    Watch,
    /// Show subscription and article statistics
    Stats,
    /// Print the digest for a date (default: today, UTC)
    Digest {
        /// Date as YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
    },
    /// Import a subscriptions file (OPML or JSON) into the config directory
    Import {
        /// Path to the .opml/.xml/.json file
        file: PathBuf,
    },
    /// Convert an OPML file to the JSON feed-list format
    ConvertOpml {
        /// Path to the .opml file
        file: PathBuf,
        /// Output path (default: feeds.json in the current directory)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

/// Get the config directory path (~/.config/newsbrief/)
fn default_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("newsbrief"))
}

fn setup_config_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).context("Failed to create config directory")?;
        println!("Created config directory: {}", dir.display());
    }

    // User-only access: the directory holds the database and any API keys
    // pasted into config.toml
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(dir, perms) {
                    tracing::warn!(
                        path = %dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }
    Ok(())
}

/// Locate the subscriptions file: feeds.opml preferred, feeds.json legacy.
fn subscriptions_path(config_dir: &Path) -> Option<PathBuf> {
    let opml = config_dir.join("feeds.opml");
    if opml.exists() {
        return Some(opml);
    }
    let json = config_dir.join("feeds.json");
    json.exists().then_some(json)
}

async fn open_database(config_dir: &Path) -> Result<Database> {
    let db_path = config_dir.join("news.db");
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    match Database::open(db_path_str).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: {}", DatabaseError::InstanceLocked);
            std::process::exit(1);
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open database: {}", e)),
    }
}

/// Load subscriptions and sync them into the database. Exits with a
/// getting-started hint when no subscriptions file exists yet.
async fn sync_subscriptions(config_dir: &Path, db: &Database) -> Result<usize> {
    let Some(path) = subscriptions_path(config_dir) else {
        eprintln!("Error: No feeds file found in {}", config_dir.display());
        eprintln!();
        eprintln!("To get started, import your subscriptions:");
        eprintln!("  newsbrief import /path/to/your/feeds.opml");
        std::process::exit(1);
    };

    let subscriptions = load_subscriptions(&path)
        .await
        .with_context(|| format!("Failed to load subscriptions: {}", path.display()))?;

    if subscriptions.is_empty() {
        eprintln!("Warning: No valid feeds found in {}", path.display());
        eprintln!("The file may be empty or contain only invalid URLs");
    } else {
        tracing::info!(count = subscriptions.len(), path = %path.display(), "Loaded subscriptions");
    }

    db.sync_feeds(&subscriptions)
        .await
        .context("Failed to sync feeds")?;
    Ok(subscriptions.len())
}

fn import_subscriptions(config_dir: &Path, file: &Path) -> Result<()> {
    // Canonicalize to resolve symlinks before reading
    let canonical = file
        .canonicalize()
        .with_context(|| format!("Failed to resolve import file: {}", file.display()))?;
    let metadata = std::fs::metadata(&canonical)?;
    if !metadata.is_file() {
        anyhow::bail!("Import path must be a regular file");
    }

    let ext = canonical
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let dest_name = match ext.as_str() {
        "opml" | "xml" => {
            let content = std::fs::read_to_string(&canonical)
                .with_context(|| format!("Failed to read import file: {}", canonical.display()))?;
            if !content.contains("<opml") && !content.contains("<outline") {
                anyhow::bail!("File does not appear to be valid OPML");
            }
            "feeds.opml"
        }
        "json" => "feeds.json",
        _ => anyhow::bail!("Unsupported subscriptions file: expected .opml, .xml, or .json"),
    };

    let dest = config_dir.join(dest_name);

    // Back up the existing file first; if the backup fails the original
    // is untouched
    if dest.exists() {
        let backup_name = format!(
            "{}.backup.{}",
            dest_name,
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        let backup_path = config_dir.join(&backup_name);
        atomic_copy(&dest, &backup_path).with_context(|| {
            format!(
                "Failed to create backup at '{}'. Original file is unchanged.",
                backup_path.display()
            )
        })?;
        println!(
            "Backed up existing subscriptions to: {}",
            backup_path.display()
        );
    }

    atomic_copy(&canonical, &dest).with_context(|| {
        format!(
            "Failed to import '{}'. If a backup was created, your previous feeds are preserved there.",
            canonical.display()
        )
    })?;
    println!("Imported subscriptions to: {}", dest.display());
    Ok(())
}

async fn convert_opml(file: &Path, output: Option<PathBuf>) -> Result<()> {
    let subscriptions = load_subscriptions(file)
        .await
        .with_context(|| format!("Failed to parse OPML: {}", file.display()))?;
    let json = export_json(&subscriptions)?;

    let output = output.unwrap_or_else(|| PathBuf::from("feeds.json"));
    atomic_write(&output, json.as_bytes())
        .with_context(|| format!("Failed to write: {}", output.display()))?;
    println!(
        "Converted {} feeds to {}",
        subscriptions.len(),
        output.display()
    );
    Ok(())
}

async fn show_stats(config_dir: &Path, db: &Database) -> Result<()> {
    if let Some(path) = subscriptions_path(config_dir) {
        let subscriptions = load_subscriptions(&path).await?;
        print!("{}", FeedStatistics::from_subscriptions(&subscriptions));
    } else {
        println!("No subscriptions file found.");
    }

    println!("Stored articles: {}", db.count_articles().await?);
    println!("Awaiting summary: {}", db.count_unsummarized().await?);
    match db.latest_digest_date().await? {
        Some(date) => println!("Latest digest: {}", date),
        None => println!("Latest digest: none"),
    }
    Ok(())
}

/// Print the stored digest for a date, or render one on the fly from
/// stored articles when no digest was generated that day.
async fn show_digest(db: &Database, date: Option<String>) -> Result<()> {
    let date = match date {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{}': expected YYYY-MM-DD", raw))?,
        None => Utc::now().date_naive(),
    };

    if let Some(digest) = db.get_digest(date).await? {
        print!("{}", digest.content);
        return Ok(());
    }

    let articles: Vec<DigestArticle> = db
        .articles_published_on(date)
        .await?
        .into_iter()
        .map(|a| {
            let summary = a
                .ai_summary
                .or(a.summary)
                .unwrap_or_else(|| "(no summary available)".to_string());
            DigestArticle {
                title: a.title,
                url: a.url,
                category: a.category,
                feed_title: a.feed_title,
                summary,
            }
        })
        .collect();
    print!("{}", render_digest(date, &articles));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = match &args.config_dir {
        Some(dir) => dir.clone(),
        None => default_config_dir()?,
    };
    setup_config_dir(&config_dir)?;

    let config = Config::load(&config_dir.join("config.toml"))?;

    if args.reset_db {
        let db_path = config_dir.join("news.db");
        if db_path.exists() {
            std::fs::remove_file(&db_path).context("Failed to delete database")?;
            println!("Database reset.");
        }
    }

    match args.command {
        Command::Import { file } => import_subscriptions(&config_dir, &file),
        Command::ConvertOpml { file, output } => convert_opml(&file, output).await,
        Command::Stats => {
            let db = open_database(&config_dir).await?;
            show_stats(&config_dir, &db).await
        }
        Command::Digest { date } => {
            let db = open_database(&config_dir).await?;
            show_digest(&db, date).await
        }
        Command::Run => {
            let db = open_database(&config_dir).await?;
            sync_subscriptions(&config_dir, &db).await?;

            let pipeline = Pipeline::new(&config, &config_dir, db)?;
            let report = pipeline.run_once().await?;

            println!(
                "Refreshed {} feeds ({} failed), {} new articles, {} summarized.",
                report.feeds_refreshed, report.feeds_failed, report.new_articles, report.summarized
            );
            if let Some(path) = report.digest_path {
                println!(
                    "Digest with {} articles written to {}",
                    report.digest_articles,
                    path.display()
                );
            }
            Ok(())
        }
        Command::Watch => {
            let digest_time = config.digest_time()?;
            let db = open_database(&config_dir).await?;
            sync_subscriptions(&config_dir, &db).await?;

            let pipeline = Pipeline::new(&config, &config_dir, db)?;
            newsbrief::scheduler::watch(&pipeline, digest_time, config.refresh_interval_hours).await
        }
    }
}
