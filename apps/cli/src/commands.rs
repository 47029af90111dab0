//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use studykit_core::assembler;
use studykit_core::library::fetch_chapter;
use studykit_core::context::context_window;
use studykit_core::pipeline::{IngestRequest, IngestResult, ProgressReporter};
use studykit_core::session::{StudySession, SystemClock};
use studykit_shared::{
    AppConfig, BookManifest, TocItem, TopicStatus, init_config, load_config, validate_api_key,
};
use studykit_storage::Storage;
use studykit_structure::group_by_domain;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// StudyKit — turn study guides into structured, navigable books.
#[derive(Parser)]
#[command(
    name = "studykit",
    version,
    about = "Turn study-guide documents into chapters, assessment tests, and study elements.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Structure a document into a book directory.
    Ingest {
        /// `.txt` / `.md` file, or a directory of page text files.
        path: PathBuf,

        /// Human-readable name for the book (defaults to the file stem).
        #[arg(short, long)]
        name: Option<String>,

        /// Output root for book directories (defaults to `library.output_dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Do not record the book in the library database.
        #[arg(long)]
        no_library: bool,
    },

    /// Show a book's manifest and table of contents.
    Show {
        /// Book directory.
        book_dir: PathBuf,

        /// Print the TOC as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print one chapter and its study elements.
    Chapter {
        /// Book directory, or the id of a book in the library.
        book: String,

        /// Section id (e.g. `intro`, `section_3`).
        section_id: String,
    },

    /// Print the exam objective map, grouped by domain.
    Objectives {
        /// Book directory.
        book_dir: PathBuf,
    },

    /// Print the book context handed to the model.
    Context {
        /// Book directory.
        book_dir: PathBuf,

        /// Character limit (defaults to `session.context_char_limit`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Start a study session on a book and print its opening prompt.
    Session {
        /// Book directory.
        book_dir: PathBuf,

        /// Forget the usage counters of the configured credential.
        #[arg(long)]
        reset: bool,
    },

    /// Library database operations.
    Library {
        #[command(subcommand)]
        action: LibraryAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Library subcommands.
#[derive(Subcommand)]
pub(crate) enum LibraryAction {
    /// List all recorded books.
    List,
    /// Set the reading status of a TOC entry.
    Progress {
        book_id: String,
        item_id: String,
        /// not_started, in_progress, or completed.
        status: TopicStatus,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "studykit=info",
        1 => "studykit=debug",
        _ => "studykit=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Ingest {
            path,
            name,
            out,
            no_library,
        } => cmd_ingest(&path, name, out, no_library).await,
        Command::Show { book_dir, json } => cmd_show(&book_dir, json).await,
        Command::Chapter { book, section_id } => cmd_chapter(&book, &section_id).await,
        Command::Objectives { book_dir } => cmd_objectives(&book_dir),
        Command::Context { book_dir, limit } => cmd_context(&book_dir, limit),
        Command::Session { book_dir, reset } => cmd_session(&book_dir, reset).await,
        Command::Library { action } => match action {
            LibraryAction::List => cmd_library_list().await,
            LibraryAction::Progress {
                book_id,
                item_id,
                status,
            } => cmd_library_progress(&book_id, &item_id, status).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ingest(
    path: &Path,
    name: Option<String>,
    out: Option<PathBuf>,
    no_library: bool,
) -> Result<()> {
    let config = load_config()?;

    let request = IngestRequest {
        source: path.to_path_buf(),
        name,
        output_root: out.unwrap_or_else(|| config.library.output_dir_path()),
        db_path: (!no_library).then(|| config.library.db_file_path()),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
    };

    info!(path = %path.display(), library = !no_library, "ingesting document");

    let reporter = CliProgress::new();
    let result = studykit_core::pipeline::ingest(&request, &config, &reporter).await?;

    println!();
    println!("  Book processed successfully!");
    println!("  ID:         {}", result.book_id);
    println!("  Name:       {}", result.manifest.name);
    println!("  Sections:   {}", result.manifest.section_count);
    println!(
        "  Assessment: {}",
        result
            .book
            .assessment_test
            .as_ref()
            .map_or_else(|| "none".to_string(), |t| format!("{} questions", t.questions.len()))
    );
    println!("  Path:       {}", result.book_dir.display());
    println!("  Time:       {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_show(book_dir: &Path, json: bool) -> Result<()> {
    let manifest = assembler::validate_book_dir(book_dir)?;
    let mut toc = assembler::load_toc(book_dir)?;

    // Overlay reading progress when the book is in the library.
    let config = load_config()?;
    let db_path = config.library.db_file_path();
    if db_path.exists() {
        let storage = Storage::open_readonly(&db_path).await?;
        let statuses = storage.item_statuses(&manifest.id.to_string()).await?;
        for item in &mut toc {
            if let Some(status) = statuses.get(&item.id) {
                item.status = *status;
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&toc)?);
        return Ok(());
    }

    print_manifest(&manifest);
    println!();
    for item in &toc {
        print_toc_item(item);
    }

    Ok(())
}

async fn cmd_chapter(book: &str, section_id: &str) -> Result<()> {
    let config = load_config()?;
    let db_path = config.library.db_file_path();
    let storage = if db_path.exists() {
        Some(Storage::open_readonly(&db_path).await?)
    } else {
        None
    };
    let chapter = fetch_chapter(book, section_id, storage.as_ref()).await?;

    println!("# {}", chapter.title);
    println!();
    println!("{}", chapter.text.trim_end());

    let elements = &chapter.elements;
    if !elements.is_empty() {
        println!();
        println!("---");
        for tip in &elements.tips {
            println!("Tip: {tip}");
        }
        for essential in &elements.study_essentials {
            println!("Essentials: {essential}");
        }
        for lab in &elements.written_labs {
            println!("Written lab: {}", lab.question);
        }
        if !elements.review_questions.is_empty() {
            println!("Review questions: {}", elements.review_questions.len());
        }
    }

    Ok(())
}

fn cmd_objectives(book_dir: &Path) -> Result<()> {
    assembler::validate_book_dir(book_dir)?;
    let book = assembler::load_book(book_dir)?;

    if book.objective_map.is_empty() {
        println!("No objective map found.");
        return Ok(());
    }

    for (domain, items) in group_by_domain(&book.objective_map) {
        println!("Domain {domain}");
        for item in items {
            let chapters: Vec<String> = item.chapters.iter().map(u32::to_string).collect();
            println!("  {:<8} {}  (ch. {})", item.domain_id, item.description, chapters.join(", "));
        }
    }

    Ok(())
}

fn cmd_context(book_dir: &Path, limit: Option<usize>) -> Result<()> {
    let config = load_config()?;
    assembler::validate_book_dir(book_dir)?;
    let book = assembler::load_book(book_dir)?;

    let limit = limit.unwrap_or(config.session.context_char_limit);
    let window = context_window(&book, limit, config.session.breakpoint_lookback);

    info!(
        limit,
        truncated = window.is_truncated(),
        breakpoint = ?window.breakpoint,
        kept_bytes = window.kept_bytes,
        "context built"
    );
    println!("{}", window.text);

    Ok(())
}

async fn cmd_session(book_dir: &Path, reset: bool) -> Result<()> {
    let config = load_config()?;
    let credential = validate_api_key(&config)?;

    let manifest = assembler::validate_book_dir(book_dir)?;
    let book = assembler::load_book(book_dir)?;
    let storage = Storage::open(&config.library.db_file_path()).await?;

    let book_id = manifest.id.to_string();
    let mut session =
        StudySession::start(&credential, &book_id, &book, &config.session, SystemClock, &storage)
            .await?;

    if reset {
        session.reset().await?;
        println!("Session usage cleared.");
        return Ok(());
    }

    let prompt = session.opening_prompt();
    let usage = session.record_exchange(&prompt).await?;

    println!();
    println!("  Book:      {}", manifest.name);
    println!("  Exchanges: {}", usage.exchanges);
    println!("  Chars:     {}", usage.prompt_chars);
    println!("  Truncated: {}", session.context_truncated());
    println!();

    Ok(())
}

async fn cmd_library_list() -> Result<()> {
    let config = load_config()?;
    let db_path = config.library.db_file_path();
    if !db_path.exists() {
        println!("Library is empty.");
        return Ok(());
    }

    let storage = Storage::open_readonly(&db_path).await?;
    let books = storage.list_books().await?;
    if books.is_empty() {
        println!("Library is empty.");
        return Ok(());
    }

    for record in books {
        let m = &record.manifest;
        println!(
            "{}  {:<32} {:>3} sections  {}",
            m.id,
            m.name,
            m.section_count,
            record
                .book_dir
                .as_deref()
                .map_or_else(|| "-".to_string(), |p| p.display().to_string())
        );
    }

    Ok(())
}

async fn cmd_library_progress(book_id: &str, item_id: &str, status: TopicStatus) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open(&config.library.db_file_path()).await?;

    let record = storage
        .get_book(book_id)
        .await?
        .ok_or_else(|| eyre!("no book '{book_id}' in the library"))?;

    if let Some(dir) = &record.book_dir {
        let toc = assembler::load_toc(dir)?;
        if !toc.iter().any(|item| item.id == item_id) {
            return Err(eyre!("book '{book_id}' has no TOC entry '{item_id}'"));
        }
    }

    storage.set_item_status(book_id, item_id, status).await?;
    println!("{item_id}: {}", status.as_str());
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn print_manifest(manifest: &BookManifest) {
    println!("  ID:         {}", manifest.id);
    println!("  Name:       {}", manifest.name);
    println!("  Source:     {} ({})", manifest.source_file, manifest.media_type);
    println!("  Sections:   {}", manifest.section_count);
    println!("  Assessment: {}", if manifest.has_assessment_test { "yes" } else { "no" });
    println!("  Created:    {}", manifest.created_at.format("%Y-%m-%d %H:%M"));
}

fn print_toc_item(item: &TocItem) {
    let mark = match item.status {
        TopicStatus::NotStarted => " ",
        TopicStatus::InProgress => "~",
        TopicStatus::Completed => "x",
    };
    let indent = "  ".repeat(usize::from(item.level.saturating_sub(1)));
    println!("[{mark}] {indent}{:<16} {}", item.id, item.title);
    for child in &item.children {
        print_toc_item(child);
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _result: &IngestResult) {
        self.spinner.finish_and_clear();
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_ingest_flags() {
        let cli = Cli::parse_from(["studykit", "ingest", "guide.txt", "--name", "Guide", "--no-library"]);
        match cli.command {
            Command::Ingest {
                path,
                name,
                out,
                no_library,
            } => {
                assert_eq!(path, PathBuf::from("guide.txt"));
                assert_eq!(name.as_deref(), Some("Guide"));
                assert!(out.is_none());
                assert!(no_library);
            }
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn parses_progress_status() {
        let cli = Cli::parse_from(["studykit", "-v", "library", "progress", "b1", "section_2", "completed"]);
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Library {
                action: LibraryAction::Progress { status, .. },
            } => assert_eq!(status, TopicStatus::Completed),
            _ => panic!("expected library progress"),
        }

        let bad = Cli::try_parse_from(["studykit", "library", "progress", "b1", "x", "done"]);
        assert!(bad.is_err());
    }

    #[test]
    fn chapter_accepts_a_book_id() {
        let cli = Cli::parse_from(["studykit", "chapter", "0192f0c1-book", "section_3"]);
        match cli.command {
            Command::Chapter { book, section_id } => {
                assert_eq!(book, "0192f0c1-book");
                assert_eq!(section_id, "section_3");
            }
            _ => panic!("expected chapter"),
        }
    }
}
