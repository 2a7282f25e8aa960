//! Operator CLI for the issue lifecycle engine
//!
//! Drives every engine operation against a durable store. Identity is taken
//! from the command line as-is; this binary stands in for an API layer that
//! would have authenticated the caller.
//!
//! # Usage
//!
//! ```bash
//! # Seed an issue at the entry tier
//! lifecycle --hierarchy hierarchy.toml admit --title "Broken water main" \
//!     --description "Road flooded" --province western --district colombo \
//!     --ds-division thimbirigasyaya --gn-division kollupitiya
//!
//! # GN officer escalates it
//! lifecycle --hierarchy hierarchy.toml escalate <ISSUE_ID> --reason "needs funding" \
//!     --actor-id gn-kollupitiya --actor-tier grama_niladhari
//!
//! # Preview, then run, the deadline sweep
//! lifecycle --hierarchy hierarchy.toml sweep --dry-run
//! RUST_LOG=issue_lifecycle=debug lifecycle --hierarchy hierarchy.toml sweep --watch
//! ```
//!
//! Output is pretty JSON on stdout. Rejections print a structured error and
//! exit with status 1, or 75 when the failure is retryable.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use issue_lifecycle::escalation::run_sweeper;
use issue_lifecycle::state::{
    AppendOutcome, Category, EscalationRecord, Issue, IssueStatus, Priority, SharedIssueStore,
    SharedLedger,
};
use issue_lifecycle::{
    Actor, EngineConfig, EngineResult, EscalationEngine, EventBus, HierarchyConfig,
    HierarchyDirectory, Jurisdiction, Location, Tier,
};

/// Exit status for failures worth retrying (EX_TEMPFAIL)
const EXIT_RETRYABLE: u8 = 75;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "lifecycle", author, version, about, long_about = None)]
struct Cli {
    /// Directory holding issue rows, ledgers and the event journal
    #[arg(long, global = true, default_value = "./lifecycle-state")]
    state_dir: PathBuf,

    /// Hierarchy roster (.toml, .yaml or .yml); empty roster if omitted
    #[arg(long, global = true)]
    hierarchy: Option<PathBuf>,

    /// Per-issue lock wait (overrides LIFECYCLE_LOCK_WAIT_MS)
    #[arg(long, global = true)]
    lock_wait_ms: Option<u64>,

    /// Extensions allowed per tier (overrides LIFECYCLE_MAX_EXTENSIONS)
    #[arg(long, global = true)]
    max_extensions: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Insert a new issue at the entry tier (intake stand-in)
    Admit(AdmitArgs),
    /// Print the current state of an issue
    Show { issue_id: String },
    /// Print the escalation ledger of an issue
    History { issue_id: String },
    /// Request a status change
    Status {
        issue_id: String,
        /// pending, in_progress, resolved or closed
        #[arg(long)]
        to: IssueStatus,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Escalate to the next tier (admins may name a higher target)
    Escalate {
        issue_id: String,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        target: Option<Tier>,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Push the response deadline out by a number of days
    Extend {
        issue_id: String,
        #[arg(long)]
        days: u32,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Move an issue to a tier and optionally set its handler (admin only)
    Reassign {
        issue_id: String,
        #[arg(long)]
        tier: Tier,
        #[arg(long)]
        handler: Option<String>,
        #[arg(long)]
        reason: Option<String>,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// List issues at a tier inside a jurisdiction
    List {
        #[arg(long)]
        tier: Tier,
        /// Repeatable; no value means every status
        #[arg(long = "status")]
        statuses: Vec<IssueStatus>,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Dashboard counters for a viewer
    Stats {
        #[command(flatten)]
        actor: ActorArgs,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Issues escalated out of a tier, with their latest escalation
    EscalatedFrom {
        #[arg(long)]
        tier: Tier,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Escalate or defer every overdue issue
    Sweep {
        /// Report the plan without writing
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Evaluate deadlines as of this RFC 3339 instant instead of now
        #[arg(long, conflicts_with = "watch")]
        at: Option<DateTime<Utc>>,
        /// Keep sweeping on an interval until Ctrl-C
        #[arg(long, default_value_t = false, conflicts_with = "dry_run")]
        watch: bool,
        /// Interval for --watch (overrides LIFECYCLE_SWEEP_INTERVAL_SECS)
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Replay a ledger append reported by a PARTIAL_ESCALATION error
    AuditRetry {
        /// JSON file holding the `record` from the error context
        #[arg(long)]
        record: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ActorArgs {
    #[arg(long)]
    actor_id: String,
    #[arg(long, default_value = "citizen")]
    actor_tier: Tier,
    #[arg(long, default_value_t = false)]
    admin: bool,
}

impl ActorArgs {
    fn actor(&self) -> Actor {
        Actor::new(self.actor_id.clone(), self.actor_tier, self.admin)
    }
}

/// Jurisdiction filter; omitted fields widen the scope
#[derive(Args, Debug)]
struct ScopeArgs {
    #[arg(long)]
    province: Option<String>,
    #[arg(long)]
    district: Option<String>,
    #[arg(long)]
    ds_division: Option<String>,
    #[arg(long)]
    gn_division: Option<String>,
}

impl ScopeArgs {
    fn jurisdiction(&self) -> Jurisdiction {
        Jurisdiction {
            province: self.province.clone(),
            district: self.district.clone(),
            ds_division: self.ds_division.clone(),
            gn_division: self.gn_division.clone(),
        }
    }
}

#[derive(Args, Debug)]
struct AdmitArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    description: String,
    #[arg(long)]
    province: String,
    #[arg(long)]
    district: String,
    #[arg(long)]
    ds_division: String,
    #[arg(long)]
    gn_division: String,
    #[arg(long)]
    category: Option<Category>,
    #[arg(long)]
    priority: Option<Priority>,
    /// Citizen account id; anonymous if omitted
    #[arg(long)]
    submitter: Option<String>,
}

#[derive(Serialize)]
struct AuditRetryOutput<'a> {
    issue_id: &'a str,
    sequence: u32,
    outcome: &'static str,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("issue_lifecycle=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let engine = build_engine(&cli)?;

    match cli.command {
        Command::Admit(args) => admit(&engine, args),
        Command::Show { issue_id } => emit(engine.get_current_state(&issue_id)),
        Command::History { issue_id } => emit(engine.get_escalation_history(&issue_id)),
        Command::Status {
            issue_id,
            to,
            actor,
        } => emit(
            engine
                .request_status_change(&issue_id, to, actor.actor())
                .await,
        ),
        Command::Escalate {
            issue_id,
            reason,
            target,
            actor,
        } => {
            let result = match target {
                Some(target) => {
                    engine
                        .request_escalation_to(&issue_id, target, &reason, actor.actor())
                        .await
                }
                None => {
                    engine
                        .request_escalation(&issue_id, &reason, actor.actor())
                        .await
                }
            };
            emit(result)
        }
        Command::Extend {
            issue_id,
            days,
            actor,
        } => emit(engine.request_extension(&issue_id, days, actor.actor()).await),
        Command::Reassign {
            issue_id,
            tier,
            handler,
            reason,
            actor,
        } => emit(
            engine
                .request_reassignment(&issue_id, tier, handler, reason.as_deref(), actor.actor())
                .await,
        ),
        Command::List {
            tier,
            statuses,
            scope,
        } => emit(engine.list_issues_for_tier(tier, &scope.jurisdiction(), &statuses)),
        Command::Stats { actor, scope } => {
            emit(engine.dashboard_stats(&actor.actor(), &scope.jurisdiction()))
        }
        Command::EscalatedFrom { tier, scope } => {
            emit(engine.escalated_from(tier, &scope.jurisdiction()))
        }
        Command::Sweep { watch: true, .. } => watch_sweeps(engine).await,
        Command::Sweep { dry_run, at, .. } => {
            emit(engine.sweep_overdue(at.unwrap_or_else(Utc::now), dry_run).await)
        }
        Command::AuditRetry { record } => audit_retry(&engine, &record).await,
    }
}

fn build_engine(cli: &Cli) -> Result<EscalationEngine> {
    let hierarchy = match &cli.hierarchy {
        Some(path) => HierarchyConfig::load(path)
            .with_context(|| format!("loading hierarchy from {}", path.display()))?,
        None => HierarchyConfig::default(),
    };

    let mut config = EngineConfig::from_env();
    if let Some(ms) = cli.lock_wait_ms {
        config = config.with_lock_wait(Duration::from_millis(ms));
    }
    if let Some(max) = cli.max_extensions {
        config.max_pending_extensions = max;
    }
    if let Command::Sweep {
        interval_secs: Some(secs),
        ..
    } = &cli.command
    {
        config.sweep_interval = Duration::from_secs((*secs).max(1));
    }

    std::fs::create_dir_all(&cli.state_dir)
        .with_context(|| format!("creating state dir {}", cli.state_dir.display()))?;
    let (store, ledger) = open_stores(&cli.state_dir)?;
    let events = Arc::new(EventBus::with_journal(cli.state_dir.join("events.jsonl")));

    info!(
        state_dir = %cli.state_dir.display(),
        hierarchy_version = hierarchy.version,
        officials = hierarchy.officials.len(),
        "Engine ready"
    );

    Ok(EscalationEngine::new(
        store,
        ledger,
        HierarchyDirectory::new(hierarchy).shared(),
        config,
    )
    .with_events(events))
}

#[cfg(feature = "heavy-state")]
fn open_stores(state_dir: &Path) -> Result<(SharedIssueStore, SharedLedger)> {
    let store = issue_lifecycle::state::RocksStore::open(state_dir.join("rocks"))
        .context("opening RocksDB store")?
        .shared();
    let issues: SharedIssueStore = store.clone();
    let ledger: SharedLedger = store;
    Ok((issues, ledger))
}

#[cfg(not(feature = "heavy-state"))]
fn open_stores(state_dir: &Path) -> Result<(SharedIssueStore, SharedLedger)> {
    let store = issue_lifecycle::state::FileStore::open(state_dir)
        .context("opening file store")?
        .shared();
    let issues: SharedIssueStore = store.clone();
    let ledger: SharedLedger = store;
    Ok((issues, ledger))
}

fn admit(engine: &EscalationEngine, args: AdmitArgs) -> Result<ExitCode> {
    let directory = engine.directory();
    let entry = directory.entry_tier();
    let location = Location::new(
        args.province,
        args.district,
        args.ds_division,
        args.gn_division,
    );

    let mut issue = Issue::new(
        args.title,
        args.description,
        location,
        entry,
        directory.response_window(entry),
    );
    if let Some(category) = args.category {
        issue = issue.with_category(category);
    }
    if let Some(priority) = args.priority {
        issue = issue.with_priority(priority);
    }
    if let Some(submitter) = args.submitter {
        issue = issue.with_submitter(submitter);
    }

    engine.store().insert(&issue).context("inserting issue")?;
    info!(issue_id = %issue.id, reference = %issue.reference_number, tier = %entry, "Issue admitted");
    print_json(&issue)?;
    Ok(ExitCode::SUCCESS)
}

async fn watch_sweeps(engine: EscalationEngine) -> Result<ExitCode> {
    let engine = engine.shared();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(run_sweeper(Arc::clone(&engine), shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("Shutdown requested");
    // The sweeper also stops if the receiver sees the sender dropped
    let _ = shutdown_tx.send(true);
    sweeper.await.context("sweeper task panicked")?;
    Ok(ExitCode::SUCCESS)
}

async fn audit_retry(engine: &EscalationEngine, path: &Path) -> Result<ExitCode> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading record from {}", path.display()))?;
    let record: EscalationRecord =
        serde_json::from_str(&content).context("parsing escalation record")?;

    let result = engine.retry_audit_append(&record).await.map(|outcome| AuditRetryOutput {
        issue_id: &record.issue_id,
        sequence: record.sequence,
        outcome: match outcome {
            AppendOutcome::Appended => "appended",
            AppendOutcome::AlreadyPresent => "already_present",
        },
    });
    emit(result)
}

/// Print the value, or the structured error with a non-zero exit status.
fn emit<T: Serialize>(result: EngineResult<T>) -> Result<ExitCode> {
    match result {
        Ok(value) => {
            print_json(&value)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            let structured = err.to_structured();
            print_json(&structured)?;
            Ok(if structured.retryable {
                ExitCode::from(EXIT_RETRYABLE)
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_escalation_with_actor() {
        let cli = Cli::try_parse_from([
            "lifecycle",
            "--state-dir",
            "/tmp/x",
            "escalate",
            "issue-1",
            "--reason",
            "needs funding",
            "--actor-id",
            "gn-1",
            "--actor-tier",
            "gn",
        ])
        .unwrap();

        match cli.command {
            Command::Escalate {
                issue_id,
                reason,
                target,
                actor,
            } => {
                assert_eq!(issue_id, "issue-1");
                assert_eq!(reason, "needs funding");
                assert!(target.is_none());
                let actor = actor.actor();
                assert_eq!(actor.tier, Tier::GramaNiladhari);
                assert!(!actor.is_admin());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_tier() {
        let err = Cli::try_parse_from(["lifecycle", "list", "--tier", "mayor"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_list_collects_repeated_statuses() {
        let cli = Cli::try_parse_from([
            "lifecycle",
            "list",
            "--tier",
            "divisional_secretary",
            "--status",
            "pending",
            "--status",
            "in_progress",
            "--district",
            "colombo",
        ])
        .unwrap();

        match cli.command {
            Command::List {
                statuses, scope, ..
            } => {
                assert_eq!(statuses, vec![IssueStatus::Pending, IssueStatus::InProgress]);
                let scope = scope.jurisdiction();
                assert_eq!(scope.district.as_deref(), Some("colombo"));
                assert!(scope.province.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_watch_conflicts_with_dry_run() {
        assert!(Cli::try_parse_from(["lifecycle", "sweep", "--watch", "--dry-run"]).is_err());
    }

    #[tokio::test]
    async fn test_engine_over_state_dir_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let state_dir = dir.path().join("state");
        let cli = Cli::try_parse_from([
            "lifecycle",
            "--state-dir",
            state_dir.to_str().unwrap(),
            "show",
            "missing",
        ])
        .unwrap();

        let engine = build_engine(&cli).unwrap();
        let args = AdmitArgs {
            title: "Broken culvert".into(),
            description: "Water across the road".into(),
            province: "western".into(),
            district: "colombo".into(),
            ds_division: "thimbirigasyaya".into(),
            gn_division: "kollupitiya".into(),
            category: None,
            priority: None,
            submitter: Some("citizen-9".into()),
        };
        assert_eq!(admit(&engine, args).unwrap(), ExitCode::SUCCESS);
        drop(engine);

        let reopened = build_engine(&cli).unwrap();
        let issues = reopened
            .list_issues_for_tier(Tier::Admin, &Jurisdiction::national(), &[])
            .unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].submitter.as_deref(), Some("citizen-9"));
        assert!(matches!(
            reopened.get_current_state("missing"),
            Err(issue_lifecycle::EngineError::NotFound(_))
        ));
    }
}
