//! # LeadClaw — Lead-Management CRM Core
//!
//! Round-robin lead assignment, lifecycle jobs, and outbound notifications
//! over a single SQLite store.
//!
//! Usage:
//!   leadclaw ingest --name "Ana" --email ana@x.com --source facebook
//!   leadclaw rule create --source facebook --candidates ana,luis
//!   leadclaw job run                     # One lifecycle pass
//!   leadclaw job watch --interval 3600   # Keep running until Ctrl-C
//!   leadclaw webhook logs --page 1

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use leadclaw_store::CrmDb;

#[derive(Parser)]
#[command(name = "leadclaw", version, about = "🦀 LeadClaw — Lead-Management CRM Core")]
struct Cli {
    /// Database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register an incoming lead and auto-assign it
    Ingest {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: Option<String>,
        /// Acquisition channel, e.g. facebook, google, referral
        #[arg(long)]
        source: String,
        #[arg(long)]
        campaign: Option<String>,
    },
    /// Manage assignment rules
    Rule {
        #[command(subcommand)]
        action: RuleAction,
    },
    /// Lifecycle job: stale-state transitions
    Job {
        #[command(subcommand)]
        action: JobAction,
    },
    /// Assignment-notification email
    Email {
        #[command(subcommand)]
        action: EmailAction,
    },
    /// Outbound webhooks
    Webhook {
        #[command(subcommand)]
        action: WebhookAction,
    },
    /// Show the audit trail for a lead
    History {
        lead_id: String,
    },
}

#[derive(Subcommand)]
enum RuleAction {
    /// List active rules (newest first)
    List,
    Create {
        #[arg(long)]
        source: String,
        #[arg(long)]
        campaign: Option<String>,
        /// Comma-separated candidate pool, in tie-break order
        #[arg(long, value_delimiter = ',')]
        candidates: Vec<String>,
    },
    Update {
        id: i64,
        #[arg(long)]
        source: String,
        #[arg(long)]
        campaign: Option<String>,
        #[arg(long, value_delimiter = ',')]
        candidates: Vec<String>,
        #[arg(long, default_value_t = true)]
        active: bool,
    },
    Delete {
        id: i64,
    },
}

#[derive(Subcommand)]
enum JobAction {
    /// Run one transition pass and print the report
    Run,
    /// Run the job on an interval until Ctrl-C
    Watch {
        /// Seconds between passes
        #[arg(long, default_value = "3600")]
        interval: u64,
    },
    /// Print the job configuration
    Config,
    /// Update the job configuration
    Configure {
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long)]
        days_new: Option<u32>,
        #[arg(long)]
        days_contacted: Option<u32>,
    },
}

#[derive(Subcommand)]
enum EmailAction {
    /// Send a test message to verify the SMTP settings
    Test {
        /// Recipient: a full address, or a bare name completed with the
        /// configured domain
        to: String,
    },
    /// Print the email configuration (password masked)
    Config,
    /// Update the SMTP settings
    Configure {
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        pass: Option<String>,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        org_domain: Option<String>,
    },
}

#[derive(Subcommand)]
enum WebhookAction {
    /// Fire a test event for an existing lead
    Test {
        lead_id: String,
    },
    /// Page through the delivery log (newest first)
    Logs {
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(long, default_value = "20")]
        limit: u32,
    },
    /// Print the webhook configuration
    Config,
    /// Update the webhook configuration
    Configure {
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        max_retries: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "leadclaw=debug" } else { "leadclaw=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let db_path = cli.db.unwrap_or_else(CrmDb::default_path);
    let db = Arc::new(CrmDb::open(&db_path).context("open database")?);

    let shutdown = CancellationToken::new();
    let ctrl_c_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            ctrl_c_token.cancel();
        }
    });

    match cli.command {
        Command::Ingest { name, email, phone, source, campaign } => {
            ingest(&db, shutdown, &name, &email, phone, &source, campaign).await
        }
        Command::Rule { action } => rule_command(&db, action),
        Command::Job { action } => job_command(db, shutdown, action).await,
        Command::Email { action } => email_command(db, shutdown, action).await,
        Command::Webhook { action } => webhook_command(db, shutdown, action).await,
        Command::History { lead_id } => history_command(&db, &lead_id),
    }
}

#[allow(clippy::too_many_arguments)]
async fn ingest(
    db: &Arc<CrmDb>,
    shutdown: CancellationToken,
    name: &str,
    email: &str,
    phone: Option<String>,
    source: &str,
    campaign: Option<String>,
) -> Result<()> {
    let mut lead = leadclaw_core::Lead::new(name, email, source, campaign.as_deref());
    lead.phone = phone;
    db.insert_lead(&lead)?;
    println!("✅ Lead {} registered ({source})", lead.id);

    let dispatcher = leadclaw_notify::Dispatcher::new(db.clone(), shutdown);
    dispatcher
        .send_webhook(&lead.id, "lead_creado", &json!({"nombre": name, "origen": source}))
        .await
        .ok();

    match leadclaw_assign::select_assignee(db, &lead.id, source, campaign.as_deref())? {
        Some(outcome) => {
            println!(
                "📌 Assigned to {} (rule {}, {} prior today)",
                outcome.assignee, outcome.rule_id, outcome.prior_count
            );
            // Both notifications are best-effort; the assignment stands
            // regardless.
            if dispatcher.send_assignment_email(&lead.id, &outcome.assignee).await? {
                println!("📧 Assignment email sent");
            }
            dispatcher
                .send_webhook(
                    &lead.id,
                    "lead_asignado",
                    &json!({"responsable": outcome.assignee, "regla": outcome.rule_id}),
                )
                .await
                .ok();
        }
        None => println!("ℹ️  No rule matches {source}; lead left unassigned"),
    }
    Ok(())
}

fn rule_command(db: &CrmDb, action: RuleAction) -> Result<()> {
    match action {
        RuleAction::List => {
            let rules = leadclaw_assign::list_rules(db)?;
            if rules.is_empty() {
                println!("No active rules.");
            }
            for rule in rules {
                println!(
                    "#{} {}/{} → [{}]",
                    rule.id,
                    rule.source,
                    rule.campaign.as_deref().unwrap_or("general"),
                    rule.candidates.join(", "),
                );
            }
        }
        RuleAction::Create { source, campaign, candidates } => {
            let id = leadclaw_assign::create_rule(db, &source, campaign.as_deref(), &candidates)?;
            println!("✅ Rule #{id} created");
        }
        RuleAction::Update { id, source, campaign, candidates, active } => {
            if leadclaw_assign::update_rule(db, id, &source, campaign.as_deref(), &candidates, active)? {
                println!("✅ Rule #{id} updated");
            } else {
                bail!("rule #{id} not found");
            }
        }
        RuleAction::Delete { id } => {
            if leadclaw_assign::delete_rule(db, id)? {
                println!("🗑️  Rule #{id} deleted");
            } else {
                bail!("rule #{id} not found");
            }
        }
    }
    Ok(())
}

async fn job_command(db: Arc<CrmDb>, shutdown: CancellationToken, action: JobAction) -> Result<()> {
    match action {
        JobAction::Run => {
            let report = leadclaw_jobs::run_state_transition_job(&db)?;
            println!(
                "⚙️  nuevo→no_contactado: {}, contactado→en_negociacion: {}, skipped: {}",
                report.new_processed, report.contacted_processed, report.skipped
            );
        }
        JobAction::Watch { interval } => {
            leadclaw_jobs::spawn_job_loop(db, interval, shutdown).await;
        }
        JobAction::Config => {
            let config = db.job_config()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        JobAction::Configure { enabled, days_new, days_contacted } => {
            let mut config = db.job_config()?;
            apply(&mut config.enabled, enabled);
            apply(&mut config.days_new, days_new);
            apply(&mut config.days_contacted, days_contacted);
            db.set_job_config(&config)?;
            println!("✅ Job configuration saved");
        }
    }
    Ok(())
}

async fn email_command(
    db: Arc<CrmDb>,
    shutdown: CancellationToken,
    action: EmailAction,
) -> Result<()> {
    match action {
        EmailAction::Test { to } => {
            let dispatcher = leadclaw_notify::Dispatcher::new(db.clone(), shutdown);
            if dispatcher.send_test_email(&to).await? {
                println!("✅ Test email sent to {to}");
            } else {
                println!("❌ Test email not sent (email disabled or SMTP failing)");
            }
        }
        EmailAction::Config => {
            let config = db.email_config()?.masked();
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        EmailAction::Configure { enabled, host, port, user, pass, from, org_domain } => {
            let mut config = db.email_config()?;
            apply(&mut config.enabled, enabled);
            apply(&mut config.smtp.host, host);
            apply(&mut config.smtp.port, port);
            apply(&mut config.smtp.user, user);
            apply(&mut config.smtp.pass, pass);
            apply(&mut config.from, from);
            apply(&mut config.org_domain, org_domain);
            db.set_email_config(&config)?;
            println!("✅ Email configuration saved");
        }
    }
    Ok(())
}

async fn webhook_command(
    db: Arc<CrmDb>,
    shutdown: CancellationToken,
    action: WebhookAction,
) -> Result<()> {
    match action {
        WebhookAction::Test { lead_id } => {
            if db.get_lead(&lead_id)?.is_none() {
                bail!("lead {lead_id} not found");
            }
            let dispatcher = leadclaw_notify::Dispatcher::new(db, shutdown);
            let delivered = dispatcher
                .send_webhook(
                    &lead_id,
                    "test_webhook",
                    &json!({"mensaje": "Webhook de prueba desde admin"}),
                )
                .await?;
            if delivered {
                println!("✅ Test webhook delivered");
            } else {
                println!("❌ Test webhook not delivered (disabled or endpoint failing)");
            }
        }
        WebhookAction::Logs { page, limit } => {
            let logs = db.webhook_logs(page, limit)?;
            if logs.entries.is_empty() {
                println!("No deliveries on page {page}.");
            }
            for entry in &logs.entries {
                println!(
                    "#{} {} {} {} status={} attempts={} lead={}",
                    entry.id,
                    entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                    if entry.succeeded { "✅" } else { "❌" },
                    entry.payload["evento"].as_str().unwrap_or("?"),
                    entry.status_code,
                    entry.attempts,
                    entry.lead_id,
                );
            }
        }
        WebhookAction::Config => {
            let config = db.webhook_config()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        WebhookAction::Configure { enabled, url, max_retries } => {
            let mut config = db.webhook_config()?;
            apply(&mut config.enabled, enabled);
            apply(&mut config.base_url, url);
            apply(&mut config.max_retries, max_retries);
            db.set_webhook_config(&config)?;
            println!("✅ Webhook configuration saved");
        }
    }
    Ok(())
}

fn history_command(db: &CrmDb, lead_id: &str) -> Result<()> {
    let entries = db.history_for_lead(lead_id)?;
    if entries.is_empty() {
        println!("No history for lead {lead_id}.");
    }
    for entry in &entries {
        println!(
            "{} [{}] {}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.kind.as_str(),
            entry.content,
        );
    }
    Ok(())
}

fn apply<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}
