//! `sentinel`: the local front door (C10) — a single-shot
//! `credential_process`-protocol binary plus operator subcommands for
//! the approval, break-glass, session, audit, and policy-analysis
//! workflows.

mod app;
mod config;
mod handlers;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use app::App;
use config::Config;

#[derive(Parser)]
#[command(name = "sentinel", about = "Sentinel credential-issuance gateway — local front door")]
struct Cli {
    /// Path to the Sentinel config file (defaults to the platform config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Emit `credential_process`-protocol JSON credentials on stdout (C10).
    CredentialProcess {
        /// Identity to request credentials as; falls back to config/`$USER`.
        #[arg(long)]
        user: Option<String>,
        /// Profile to vend credentials for.
        #[arg(long)]
        profile: String,
    },
    /// Access-policy subcommands (C2).
    #[command(subcommand)]
    Policy(PolicyCommand),
    /// Approval-workflow subcommands (C4).
    #[command(subcommand)]
    Approval(ApprovalCommand),
    /// Break-glass workflow subcommands (C5).
    #[command(subcommand)]
    Breakglass(BreakglassCommand),
    /// Server-session subcommands (C6).
    #[command(subcommand)]
    Session(SessionCommand),
    /// Audit-log subcommands (C7, C16).
    #[command(subcommand)]
    Audit(AuditCommand),
    /// Trust-policy analyzer subcommands (C15).
    #[command(subcommand, name = "trust-policy")]
    TrustPolicy(TrustPolicyCommand),
}

#[derive(Subcommand)]
enum PolicyCommand {
    /// Lint an access-policy document for shadowed rules and risky patterns.
    Lint {
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum ApprovalCommand {
    /// Create a new approval request.
    Request {
        #[arg(long)]
        requester: String,
        #[arg(long)]
        profile: String,
        #[arg(long = "duration-mins")]
        duration_mins: i64,
        #[arg(long)]
        justification: String,
    },
    /// Approve or deny a pending request.
    Decide {
        #[arg(long)]
        id: String,
        #[arg(long)]
        approver: String,
        #[arg(long, conflicts_with = "deny")]
        approve: bool,
        #[arg(long, conflicts_with = "approve")]
        deny: bool,
        #[arg(long)]
        comment: Option<String>,
    },
    /// List requests by requester.
    List {
        #[arg(long)]
        requester: String,
    },
}

#[derive(Subcommand)]
enum BreakglassCommand {
    /// Invoke emergency access.
    Invoke {
        #[arg(long)]
        invoker: String,
        #[arg(long)]
        profile: String,
        #[arg(long)]
        reason: String,
        #[arg(long = "duration-mins")]
        duration_mins: i64,
        #[arg(long)]
        justification: String,
    },
    /// Close an active event.
    Close {
        #[arg(long)]
        id: String,
        #[arg(long)]
        by: String,
        #[arg(long)]
        reason: String,
    },
    /// List events by invoker.
    List {
        #[arg(long)]
        invoker: String,
    },
}

#[derive(Subcommand)]
enum SessionCommand {
    /// Revoke an active server session.
    Revoke {
        #[arg(long = "session-id")]
        session_id: String,
        #[arg(long)]
        by: String,
        #[arg(long)]
        reason: String,
    },
    /// List sessions by user.
    List {
        #[arg(long)]
        user: String,
    },
}

#[derive(Subcommand)]
enum AuditCommand {
    /// Verify the signed audit log's tamper-evidence (C7, S6).
    Verify {
        #[arg(long = "log-path")]
        log_path: Option<PathBuf>,
    },
    /// Compute cloud-side fingerprint coverage over a time window (C16).
    Coverage {
        #[arg(long = "events-path")]
        events_path: PathBuf,
        #[arg(long)]
        profile: Option<String>,
        #[arg(long = "role-arn")]
        role_arn: Option<String>,
        #[arg(long)]
        start: DateTime<Utc>,
        #[arg(long)]
        end: DateTime<Utc>,
    },
}

#[derive(Subcommand)]
enum TrustPolicyCommand {
    /// Classify and lint a role's trust policy document.
    Analyze {
        #[arg(long)]
        file: PathBuf,
    },
    /// Generate a remediation trust-policy statement template.
    Template {
        /// `any-sentinel`, `specific-users`, or `migration`.
        #[arg(long)]
        kind: String,
        #[arg(long = "account-id")]
        account_id: String,
        #[arg(long = "user")]
        users: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let exit_code = run(cli).await;
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> i32 {
    // Trust-policy and policy-lint subcommands are pure, read-only
    // analyses over a file the caller supplies directly — they don't
    // need a Config/App at all.
    match &cli.command {
        Command::Policy(PolicyCommand::Lint { file }) => {
            return handlers::policy::lint(file.clone()).await;
        }
        Command::TrustPolicy(TrustPolicyCommand::Analyze { file }) => {
            return handlers::trust_policy::analyze(file.clone());
        }
        Command::TrustPolicy(TrustPolicyCommand::Template { kind, account_id, users }) => {
            return handlers::trust_policy::template(kind.clone(), account_id.clone(), users.clone());
        }
        _ => {}
    }

    let config_path = match cli.config.clone().map(Ok).unwrap_or_else(Config::default_path) {
        Ok(path) => path,
        Err(err) => {
            eprintln!("ERROR: {err}");
            return 1;
        }
    };
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("ERROR: {err}");
            return 1;
        }
    };
    let app = match App::build(config) {
        Ok(app) => app,
        Err(err) => {
            eprintln!("ERROR: {err}");
            return 1;
        }
    };

    match cli.command {
        Command::CredentialProcess { user, profile } => handlers::credential_process::run(&app, user, profile).await,
        Command::Approval(ApprovalCommand::Request {
            requester,
            profile,
            duration_mins,
            justification,
        }) => handlers::approval::request(&app, requester, profile, duration_mins, justification).await,
        Command::Approval(ApprovalCommand::Decide {
            id,
            approver,
            approve,
            deny: _,
            comment,
        }) => handlers::approval::decide(&app, id, approver, approve, comment).await,
        Command::Approval(ApprovalCommand::List { requester }) => handlers::approval::list(&app, requester).await,
        Command::Breakglass(BreakglassCommand::Invoke {
            invoker,
            profile,
            reason,
            duration_mins,
            justification,
        }) => handlers::breakglass::invoke(&app, invoker, profile, reason, duration_mins, justification).await,
        Command::Breakglass(BreakglassCommand::Close { id, by, reason }) => handlers::breakglass::close(&app, id, by, reason).await,
        Command::Breakglass(BreakglassCommand::List { invoker }) => handlers::breakglass::list(&app, invoker).await,
        Command::Session(SessionCommand::Revoke { session_id, by, reason }) => {
            handlers::session::revoke(&app, session_id, by, reason).await
        }
        Command::Session(SessionCommand::List { user }) => handlers::session::list(&app, user).await,
        Command::Audit(AuditCommand::Verify { log_path }) => handlers::audit::verify(&app, log_path).await,
        Command::Audit(AuditCommand::Coverage {
            events_path,
            profile,
            role_arn,
            start,
            end,
        }) => handlers::audit::coverage(&app, events_path, profile, role_arn, start, end).await,
        Command::Policy(PolicyCommand::Lint { .. })
        | Command::TrustPolicy(TrustPolicyCommand::Analyze { .. })
        | Command::TrustPolicy(TrustPolicyCommand::Template { .. }) => unreachable!("handled before config load"),
    }
}
