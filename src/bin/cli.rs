//! Binary entry point for the Strudex administrative CLI.
#![forbid(unsafe_code)]

#[path = "cli/config.rs"]
mod config;
#[path = "cli/ui.rs"]
mod ui;

use std::error::Error;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::Serialize;
use strudex::{
    admin::{
        open_registry, open_store, reconcile, run_check, stats, verify, AdminOpenOptions,
        CheckKind, CheckOptions, ReconcileReport, RegistryHandle, StatsReport, VerifyLevel,
        VerifyReport,
    },
    check::{sink::JsonLinesSink, CheckReport, IdRange, ProgressSink},
    logging::init_logging,
    model::{Group, Record, RecordSpec},
    types::{GroupId, RecordId},
};

use crate::config::{CliConfig, Profile, ProfileUpdate};
use crate::ui::{format_duration, Theme, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "strudex",
    version,
    about = "Deduplication index for structural records",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        env = "STRUDEX_STORE",
        help = "Store snapshot file (defaults to the profile or config default)"
    )]
    store: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        env = "STRUDEX_CONFIG",
        help = "CLI config file"
    )]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Profile from the CLI config to apply")]
    profile: Option<String>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(
        long,
        global = true,
        value_name = "FILTER",
        env = "STRUDEX_LOG",
        default_value = "warn",
        help = "Log filter, e.g. info or strudex::registry=debug"
    )]
    log: String,

    #[arg(long, global = true, value_enum, default_value_t = Theme::Auto)]
    theme: Theme,

    #[arg(long, short, global = true, help = "Plain output without progress bars")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct IngestCmd {
    #[arg(value_name = "FILE", help = "JSON array or JSON lines of record specs")]
    input: PathBuf,

    #[arg(long, help = "Create the store if it does not exist")]
    create: bool,

    #[arg(long, value_name = "GROUP", help = "Group to try first for every record")]
    hint: Option<u64>,
}

#[derive(Args, Debug)]
struct CheckCmd {
    #[arg(value_enum, value_name = "KIND")]
    kind: CheckKindArg,

    #[arg(long, help = "Lowest id to check (inclusive)")]
    start_id: Option<u64>,

    #[arg(long, help = "Highest id to check (inclusive)")]
    end_id: Option<u64>,

    #[arg(long, help = "Progress grid rows")]
    rows: Option<usize>,

    #[arg(long, help = "Progress grid columns")]
    cols: Option<usize>,

    #[arg(long, help = "Worker threads")]
    workers: Option<usize>,

    #[arg(long, help = "Items between progress snapshots")]
    flush_every: Option<u64>,

    #[arg(
        long,
        value_name = "FILE",
        help = "Append progress snapshots to FILE as JSON lines"
    )]
    progress_log: Option<PathBuf>,

    #[arg(long, help = "Drop evidence from the final report")]
    no_evidence: bool,
}

#[derive(Subcommand, Debug)]
enum ProfileCmd {
    #[command(about = "List configured profiles")]
    List,

    #[command(about = "Create or update a profile")]
    Save {
        name: String,
        #[arg(long = "store-path", value_name = "PATH")]
        store_path: Option<PathBuf>,
        #[arg(long)]
        rows: Option<usize>,
        #[arg(long)]
        cols: Option<usize>,
        #[arg(long)]
        workers: Option<usize>,
        #[arg(long)]
        flush_every: Option<u64>,
        #[arg(long, help = "Cell length tolerance")]
        ltol: Option<f64>,
        #[arg(long, help = "Site displacement tolerance")]
        stol: Option<f64>,
        #[arg(long, help = "Cell angle tolerance in degrees")]
        angle_tol: Option<f64>,
    },

    #[command(about = "Delete a profile")]
    Delete { name: String },

    #[command(about = "Show, set, or clear the default profile")]
    Default {
        name: Option<String>,
        #[arg(long, conflicts_with = "name")]
        clear: bool,
    },
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Add record specs to the store and place them into groups")]
    Ingest(IngestCmd),

    #[command(about = "Run a consistency checker")]
    Check(CheckCmd),

    #[command(about = "Verify group invariants")]
    Verify {
        #[arg(
            long,
            value_enum,
            default_value_t = VerifyLevelArg::Fast,
            help = "Verification level"
        )]
        level: VerifyLevelArg,
    },

    #[command(about = "Print store statistics")]
    Stats,

    #[command(about = "Place records that belong to no group")]
    Reconcile,

    #[command(about = "Switch a group's canonical record")]
    Canonical {
        #[arg(long)]
        group: u64,
        #[arg(long)]
        record: u64,
    },

    #[command(about = "Append a remark to a record")]
    Remark {
        #[arg(long)]
        record: u64,
        text: String,
    },

    #[command(about = "Mark a record deprecated")]
    Deprecate {
        #[arg(long)]
        record: u64,
        #[arg(long)]
        reason: String,
    },

    #[command(about = "Manage CLI profiles", subcommand)]
    Profile(ProfileCmd),

    #[command(about = "Print shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum VerifyLevelArg {
    Fast,
    Full,
}

impl From<VerifyLevelArg> for VerifyLevel {
    fn from(level: VerifyLevelArg) -> Self {
        match level {
            VerifyLevelArg::Fast => VerifyLevel::Fast,
            VerifyLevelArg::Full => VerifyLevel::Full,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CheckKindArg {
    Spacegroup,
    Members,
    Canonical,
    ExternalId,
    All,
}

impl CheckKindArg {
    fn kinds(self) -> Vec<CheckKind> {
        match self {
            CheckKindArg::Spacegroup => vec![CheckKind::Spacegroup],
            CheckKindArg::Members => vec![CheckKind::Members],
            CheckKindArg::Canonical => vec![CheckKind::Canonical],
            CheckKindArg::ExternalId => vec![CheckKind::ExternalId],
            CheckKindArg::All => CheckKind::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Default, Serialize)]
struct IngestReport {
    ingested: u64,
    new_groups: u64,
    joined: u64,
    failures: Vec<String>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let Cli {
        store,
        config: config_path,
        profile: profile_name,
        format,
        log,
        theme,
        quiet,
        command,
    } = Cli::parse();
    init_logging(&log)?;
    let mut config = CliConfig::load(config_path)?;
    let ui = Ui::new(theme, quiet || format == OutputFormat::Json);

    let profile = match profile_name.as_deref().or(config.default_profile_name()) {
        Some(name) => Some(
            config
                .profile(name)
                .cloned()
                .ok_or_else(|| format!("profile '{name}' not found"))?,
        ),
        None => None,
    };
    let store_path = || resolve_store(store.as_ref(), &config, profile.as_ref());

    match command {
        Command::Ingest(cmd) => {
            let mut opts = open_options(profile.as_ref());
            opts.create_if_missing = cmd.create;
            let handle = open_registry(&store_path()?, &opts)?;
            let specs = read_specs(&cmd.input)?;
            let task = ui.task(format!("Ingesting {} records", specs.len()));
            let report = ingest(&handle, specs, cmd.hint.map(GroupId));
            handle.flush()?;
            let elapsed = task.finish();
            emit(format, &report, || {
                ui.success(&format!(
                    "Ingested {} records in {} ({} new groups, {} joins)",
                    report.ingested,
                    format_duration(elapsed),
                    report.new_groups,
                    report.joined
                ));
                for failure in &report.failures {
                    ui.warn(failure);
                }
            })?;
        }
        Command::Check(cmd) => {
            let handle = open_registry(&store_path()?, &open_options(profile.as_ref()))?;
            let opts = check_options(&cmd, profile.as_ref());
            let mut reports = Vec::new();
            for kind in cmd.kind.kinds() {
                let sink = check_sink(&ui, kind, cmd.progress_log.as_deref())?;
                reports.push(run_check(&handle.registry, kind, opts.clone(), sink)?);
            }
            emit(format, &reports, || {
                for report in &reports {
                    print_check_text(&ui, report);
                }
            })?;
        }
        Command::Verify { level } => {
            let store = open_store(&store_path()?, &AdminOpenOptions::default())?;
            let report = verify(store.as_ref(), level.into())?;
            emit(format, &report, || print_verify_text(&ui, &report))?;
            if !report.success {
                std::process::exit(2);
            }
        }
        Command::Stats => {
            let store = open_store(&store_path()?, &AdminOpenOptions::default())?;
            let report = stats(store.as_ref())?;
            emit(format, &report, || print_stats_text(&ui, &report))?;
        }
        Command::Reconcile => {
            let handle = open_registry(&store_path()?, &open_options(profile.as_ref()))?;
            let report = reconcile(&handle.registry)?;
            handle.flush()?;
            emit(format, &report, || print_reconcile_text(&ui, &report))?;
        }
        Command::Canonical { group, record } => {
            let handle = open_registry(&store_path()?, &open_options(profile.as_ref()))?;
            let group = handle.registry.set_canonical(GroupId(group), RecordId(record))?;
            handle.flush()?;
            emit(format, &group, || print_group_text(&ui, &group))?;
        }
        Command::Remark { record, text } => {
            let handle = open_registry(&store_path()?, &open_options(profile.as_ref()))?;
            let record = handle.registry.append_remark(RecordId(record), &text)?;
            handle.flush()?;
            emit(format, &record, || print_record_text(&ui, &record))?;
        }
        Command::Deprecate { record, reason } => {
            let handle = open_registry(&store_path()?, &open_options(profile.as_ref()))?;
            let record = handle.registry.deprecate(RecordId(record), &reason)?;
            handle.flush()?;
            emit(format, &record, || print_record_text(&ui, &record))?;
        }
        Command::Profile(cmd) => run_profile(cmd, &mut config, &ui)?,
        Command::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "strudex", &mut io::stdout());
        }
    }

    Ok(())
}

fn resolve_store(
    explicit: Option<&PathBuf>,
    config: &CliConfig,
    profile: Option<&Profile>,
) -> Result<PathBuf, Box<dyn Error>> {
    explicit
        .cloned()
        .or_else(|| profile.and_then(|p| p.store.clone()))
        .or_else(|| config.default_store_path().cloned())
        .ok_or_else(|| "no store given; pass --store or configure a profile".into())
}

fn open_options(profile: Option<&Profile>) -> AdminOpenOptions {
    let mut opts = AdminOpenOptions::default();
    if let Some(profile) = profile {
        if let Some(ltol) = profile.ltol {
            opts.matcher.ltol = ltol;
        }
        if let Some(stol) = profile.stol {
            opts.matcher.stol = stol;
        }
        if let Some(angle_tol) = profile.angle_tol {
            opts.matcher.angle_tol = angle_tol;
        }
    }
    opts
}

fn check_options(cmd: &CheckCmd, profile: Option<&Profile>) -> CheckOptions {
    let defaults = CheckOptions::default();
    let pick = |flag: Option<usize>, saved: Option<usize>, fallback: usize| {
        flag.or(saved).unwrap_or(fallback)
    };
    CheckOptions {
        range: IdRange::new(
            cmd.start_id.unwrap_or(defaults.range.start),
            cmd.end_id.unwrap_or(defaults.range.end),
        ),
        rows: pick(cmd.rows, profile.and_then(|p| p.rows), defaults.rows),
        cols: pick(cmd.cols, profile.and_then(|p| p.cols), defaults.cols),
        workers: pick(cmd.workers, profile.and_then(|p| p.workers), defaults.workers),
        flush_every: cmd
            .flush_every
            .or(profile.and_then(|p| p.flush_every))
            .unwrap_or(defaults.flush_every),
        retain_evidence: !cmd.no_evidence,
        ..defaults
    }
}

fn check_sink(
    ui: &Ui,
    kind: CheckKind,
    progress_log: Option<&Path>,
) -> Result<Arc<dyn ProgressSink>, Box<dyn Error>> {
    if let Some(path) = progress_log {
        return Ok(Arc::new(JsonLinesSink::open(path)?));
    }
    Ok(Arc::new(ui.check_progress(kind.as_str())))
}

fn read_specs(path: &Path) -> Result<Vec<RecordSpec>, Box<dyn Error>> {
    let contents = fs::read_to_string(path)?;
    if contents.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(&contents)?);
    }
    let mut specs = Vec::new();
    for (line_no, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let spec = serde_json::from_str(line)
            .map_err(|err| format!("{}:{}: {err}", path.display(), line_no + 1))?;
        specs.push(spec);
    }
    Ok(specs)
}

fn ingest(handle: &RegistryHandle, specs: Vec<RecordSpec>, hint: Option<GroupId>) -> IngestReport {
    let mut report = IngestReport::default();
    for (position, spec) in specs.into_iter().enumerate() {
        match handle.registry.add_record(spec, hint) {
            Ok(outcome) => {
                report.ingested += 1;
                if outcome.is_new_group {
                    report.new_groups += 1;
                } else {
                    report.joined += 1;
                }
            }
            Err(err) => report.failures.push(format!("entry {position}: {err}")),
        }
    }
    report
}

fn run_profile(cmd: ProfileCmd, config: &mut CliConfig, ui: &Ui) -> Result<(), Box<dyn Error>> {
    match cmd {
        ProfileCmd::List => {
            let default = config.default_profile_name().map(str::to_string);
            let entries: Vec<String> = config
                .profiles()
                .map(|profile| {
                    let marker = if default.as_deref() == Some(profile.name.as_str()) {
                        " (default)"
                    } else {
                        ""
                    };
                    let store = profile
                        .store
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "-".into());
                    format!("{}{marker}: store={store}", profile.name)
                })
                .collect();
            if entries.is_empty() {
                ui.info("No profiles configured");
            } else {
                ui.list("Profiles", entries);
            }
        }
        ProfileCmd::Save {
            name,
            store_path,
            rows,
            cols,
            workers,
            flush_every,
            ltol,
            stol,
            angle_tol,
        } => {
            config.upsert_profile(
                &name,
                ProfileUpdate {
                    store: store_path,
                    rows,
                    cols,
                    workers,
                    flush_every,
                    ltol,
                    stol,
                    angle_tol,
                },
            )?;
            let path = config.persist()?;
            ui.success(&format!("Saved profile '{name}' to {}", path.display()));
        }
        ProfileCmd::Delete { name } => {
            config.delete_profile(&name)?;
            let path = config.persist()?;
            ui.success(&format!("Deleted profile '{name}' from {}", path.display()));
        }
        ProfileCmd::Default { name, clear } => {
            if clear {
                config.set_default_profile(None)?;
                config.persist()?;
                ui.success("Cleared default profile");
            } else if let Some(name) = name {
                config.set_default_profile(Some(&name))?;
                config.persist()?;
                ui.success(&format!("Default profile set to '{name}'"));
            } else {
                match config.default_profile_name() {
                    Some(name) => ui.info(&format!("Default profile: {name}")),
                    None => ui.info("No default profile"),
                }
            }
        }
    }
    Ok(())
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: FnOnce(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_check_text(ui: &Ui, report: &CheckReport) {
    ui.section(
        &format!("Check {}", report.checker),
        [
            ("processed", report.processed.to_string()),
            ("failed", report.failed.to_string()),
            ("issues", report.issues.to_string()),
            ("elapsed", format!("{:.2} ms", report.elapsed_ms)),
        ],
    );
    ui.section(
        "Totals",
        report
            .totals
            .iter()
            .map(|(tag, count)| (tag.as_str(), count.to_string())),
    );
    for (tag, evidence) in &report.evidence {
        ui.list(tag, evidence.iter().cloned());
    }
    ui.spacer();
}

fn print_verify_text(ui: &Ui, report: &VerifyReport) {
    ui.section(
        &format!("Verify ({:?})", report.level),
        [
            ("success", report.success.to_string()),
            ("groups", report.counts.groups_found.to_string()),
            ("records", report.counts.records_found.to_string()),
            ("member refs", report.counts.member_refs.to_string()),
            ("ungrouped", report.counts.ungrouped_records.to_string()),
        ],
    );
    ui.list(
        "Findings",
        report
            .findings
            .iter()
            .map(|finding| format!("{:?}: {}", finding.severity, finding.message)),
    );
}

fn print_stats_text(ui: &Ui, report: &StatsReport) {
    let largest = report
        .largest_group
        .map(|id| format!("{id} ({} members)", report.largest_group_size))
        .unwrap_or_else(|| "-".into());
    ui.section(
        "Store",
        [
            ("records", report.records.to_string()),
            ("ordered", report.ordered_records.to_string()),
            ("deprecated", report.deprecated_records.to_string()),
            ("ungrouped", report.ungrouped_records.to_string()),
            ("groups", report.groups.to_string()),
            ("singletons", report.singleton_groups.to_string()),
            ("largest group", largest),
            ("distinct keys", report.distinct_keys.to_string()),
            ("compositions", report.distinct_compositions.to_string()),
        ],
    );
}

fn print_reconcile_text(ui: &Ui, report: &ReconcileReport) {
    ui.success(&format!(
        "Reconciled {} ungrouped records ({} joined, {} new groups)",
        report.examined, report.joined, report.new_groups
    ));
    for failure in &report.failures {
        ui.warn(failure);
    }
}

fn print_group_text(ui: &Ui, group: &Group) {
    ui.section(
        &format!("Group {}", group.id),
        [
            ("key", group.group_key.to_string()),
            ("canonical", group.canonical_id().to_string()),
            ("members", group.size().to_string()),
        ],
    );
}

fn print_record_text(ui: &Ui, record: &Record) {
    ui.section(
        &format!("Record {}", record.id),
        [
            ("key", record.group_key.to_string()),
            ("deprecated", record.is_deprecated().to_string()),
            ("annotations", record.annotations.len().to_string()),
        ],
    );
    ui.list("Annotations", record.annotations.iter().cloned());
}
