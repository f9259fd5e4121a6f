use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand, ValueEnum};
use sweep_core::{Job, JobStatus, Record, TargetKey};
use sweep_engine::{
    build_threads, export_filename, flatten_threads, read_frames, reconcile_senders,
    ticket_rows_from_document, write_export, AuditRowExtractor, ChatMessage,
    ChatMessageExtractor, EngineHandle, ExportFormat, HtmlFrameSurface, NavLinkExtractor,
    ResetMode, RowFilter, SweepPlan, SweepSettings, SweepTarget, Sweeper, Table, ThreadStats,
};
use sweep_logging::sweep_info;
use url::Url;

use crate::{AppConfig, Coordinator, LogSignals, RonFileStore, DEFAULT_CONFIG_FILE};

#[derive(Debug, Parser)]
#[command(
    name = "scrollsweep",
    version,
    about = "Collect every row of a lazily loaded list and export it"
)]
pub struct Cli {
    /// RON configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Replay captured frames of a list, collect its records and write an export.
    Sweep(SweepArgs),
    /// Show the stored result for a target.
    Status { target: TargetKey },
    /// Forget the stored result for a target.
    Reset { target: TargetKey },
    /// Count ticket rows that the visibility filter would hide.
    FilterRows(FilterArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListKind {
    /// Admin audit log table.
    Audit,
    /// Broadcast chat, exported as question threads.
    Chat,
    /// Collapsible wiki navigation tree.
    Nav,
}

impl ListKind {
    fn container(self) -> &'static str {
        match self {
            ListKind::Audit => "table",
            ListKind::Chat => ".yamb-conversation__content",
            ListKind::Nav => ".NavigationTreeScrollable",
        }
    }

    fn item(self) -> &'static str {
        match self {
            ListKind::Audit => r#"tr[data-testid="resource-table-row"]"#,
            ListKind::Chat => "article.message",
            ListKind::Nav => "a.NavigationTree-ItemTitle",
        }
    }

    fn plan(self) -> SweepPlan {
        match self {
            ListKind::Audit => SweepPlan::default(),
            ListKind::Chat => SweepPlan {
                reset: ResetMode::Converge,
                expand_tree: false,
            },
            ListKind::Nav => SweepPlan {
                reset: ResetMode::Jump,
                expand_tree: true,
            },
        }
    }

    fn file_prefix(self) -> &'static str {
        match self {
            ListKind::Audit => "audit_log",
            ListKind::Chat => "chat_export",
            ListKind::Nav => "wiki_pages",
        }
    }
}

#[derive(Debug, clap::Args)]
pub struct SweepArgs {
    /// Directory of `*.html` snapshots, one per scroll position, in name order.
    pub frames: PathBuf,
    #[arg(long, value_enum)]
    pub kind: ListKind,
    #[arg(long, default_value = "csv")]
    pub format: ExportFormat,
    /// Export directory; defaults to `output_dir` from the config.
    #[arg(long)]
    pub out: Option<PathBuf>,
    #[arg(long, default_value_t = 1)]
    pub target: TargetKey,
    /// Base URL that relative navigation links are resolved against.
    #[arg(long)]
    pub base_url: Option<Url>,
    /// Override the scroll container selector.
    #[arg(long)]
    pub container: Option<String>,
    /// Override the item selector.
    #[arg(long)]
    pub item: Option<String>,
    /// Skip the inter-step waits (recorded frames need no settling time).
    #[arg(long)]
    pub no_delays: bool,
    #[arg(long, default_value_t = 600)]
    pub timeout_secs: u64,
}

#[derive(Debug, clap::Args)]
pub struct FilterArgs {
    pub html: PathBuf,
    /// Hide rows without a subject.
    #[arg(long)]
    pub no_subject: bool,
    /// Hide archived rows.
    #[arg(long)]
    pub archived: bool,
}

pub fn run(cli: Cli, config: &AppConfig) -> Result<()> {
    match cli.command {
        Command::Sweep(args) => sweep(args, config),
        Command::Status { target } => status(target, config),
        Command::Reset { target } => reset(target, config),
        Command::FilterRows(args) => filter_rows(&args),
    }
}

fn coordinator(config: &AppConfig) -> Coordinator {
    Coordinator::new(
        EngineHandle::new(),
        Arc::new(RonFileStore::new(config.state_dir.clone())),
        Arc::new(LogSignals),
        config.retention(),
    )
}

fn sweep(args: SweepArgs, config: &AppConfig) -> Result<()> {
    let frames = read_frames(&args.frames)
        .with_context(|| format!("reading frames from {:?}", args.frames))?;
    if frames.is_empty() {
        bail!("no .html frames in {:?}", args.frames);
    }
    let surface = HtmlFrameSurface::new(
        frames,
        args.container.as_deref().unwrap_or(args.kind.container()),
        args.item.as_deref().unwrap_or(args.kind.item()),
    )?;

    let mut settings = config.sweep_settings();
    if args.no_delays {
        settings = settings.without_delays();
    }
    let runner = sweep_target(args.kind, surface, settings, args.base_url.clone());

    let coordinator = coordinator(config);
    coordinator.restore_from_store()?;
    coordinator.attach_target(args.target, runner);

    let response = coordinator.start(args.target);
    sweep_info!(tab = args.target; "start: {:?}", response.job().status);
    let Some(job) = coordinator.wait_until(
        args.target,
        Duration::from_secs(args.timeout_secs),
        |job| job.status.is_terminal(),
    ) else {
        coordinator.cancel(args.target);
        bail!("sweep did not finish within {}s", args.timeout_secs);
    };

    match (job.status, job.result) {
        (JobStatus::Completed, Some(result)) => {
            let table = export_table(args.kind, &result.records, &config.self_name);
            let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
            let filename = export_filename(args.kind.file_prefix(), &stamp, args.format);
            let out = args.out.as_deref().unwrap_or(config.output_dir.as_path());
            let summary = write_export(out, &filename, &table, args.format)?;
            println!(
                "{} records collected in {} iterations{}; {} rows written to {}",
                result.record_count,
                result.iterations,
                if result.complete { "" } else { " (iteration cap hit)" },
                summary.row_count,
                summary.path.display()
            );
            Ok(())
        }
        (status, _) => bail!(
            "sweep ended {}: {}",
            status.as_str(),
            job.error.unwrap_or_else(|| "no reason given".to_string())
        ),
    }
}

fn sweep_target(
    kind: ListKind,
    surface: HtmlFrameSurface,
    settings: SweepSettings,
    base_url: Option<Url>,
) -> Arc<dyn SweepTarget> {
    let plan = kind.plan();
    match kind {
        ListKind::Audit => Arc::new(Sweeper::new(
            surface,
            AuditRowExtractor::default(),
            settings,
            plan,
        )),
        ListKind::Chat => Arc::new(Sweeper::new(
            surface,
            ChatMessageExtractor::default(),
            settings,
            plan,
        )),
        ListKind::Nav => Arc::new(Sweeper::new(
            surface,
            NavLinkExtractor::new(base_url),
            settings,
            plan,
        )),
    }
}

fn export_table(kind: ListKind, records: &[Record], self_name: &str) -> Table {
    if kind != ListKind::Chat {
        return Table::from_records(records);
    }
    let mut messages: Vec<ChatMessage> = records
        .iter()
        .filter_map(ChatMessage::from_record)
        .collect();
    if let Some(name) = reconcile_senders(&mut messages, self_name) {
        sweep_info!("own messages attributed to {}", name);
    }
    let threads = build_threads(&messages);
    let stats = ThreadStats::new(&threads, &messages);
    sweep_info!("{} questions, {} answers", stats.questions, stats.answers);
    Table::from_thread_rows(&flatten_threads(&threads))
}

fn status(target: TargetKey, config: &AppConfig) -> Result<()> {
    match coordinator(config).get_state(target) {
        Some(job) => println!("{}", describe(target, &job)),
        None => println!("tab {target}: idle"),
    }
    Ok(())
}

fn describe(target: TargetKey, job: &Job) -> String {
    let when = job
        .ended_at
        .and_then(|ms| Local.timestamp_millis_opt(ms).single())
        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    match (&job.result, &job.error) {
        (Some(result), _) => format!(
            "tab {target}: {} at {when}, {} records",
            job.status.as_str(),
            result.record_count
        ),
        (None, Some(error)) => format!("tab {target}: {} at {when}: {error}", job.status.as_str()),
        (None, None) => format!("tab {target}: {} at {when}", job.status.as_str()),
    }
}

fn reset(target: TargetKey, config: &AppConfig) -> Result<()> {
    let coordinator = coordinator(config);
    coordinator.restore_from_store()?;
    if coordinator.restart(target) {
        println!("tab {target}: reset");
    } else {
        println!("tab {target}: nothing to reset");
    }
    Ok(())
}

fn filter_rows(args: &FilterArgs) -> Result<()> {
    let html = read_html(&args.html)?;
    let filter = RowFilter {
        hide_without_subject: args.no_subject,
        hide_archived: args.archived,
    };
    let rows = ticket_rows_from_document(&html);
    let stats = filter.stats(&rows);
    println!(
        "{} rows: {} visible, {} without subject, {} archived",
        stats.total, stats.visible, stats.hidden_no_subject, stats.hidden_archived
    );
    Ok(())
}

fn read_html(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {path:?}"))
}
