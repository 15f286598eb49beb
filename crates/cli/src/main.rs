use api_shared::{parse_status, ResultParameter, StatusChangeReq, WireEntity};
use clap::{Parser, Subcommand};
use clinic_core::constants::{DEFAULT_CACHE_TTL_SECS, DEFAULT_POLL_INTERVAL_SECS};
use clinic_core::{Actor, Bill, Collection, LabOrder, ListFilter, MedicalRecord, Role, StatusBearing};
use clinic_sync::{HttpSource, PollScheduler, ReadCache, SnapshotOutcome, SyncEngine};
use clinic_types::NonEmptyText;
use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "clinic")]
#[command(about = "Clinic status lifecycle CLI")]
struct Cli {
    /// Base URL of the clinic REST API
    #[arg(long, env = "CLINIC_API_URL", default_value = "http://127.0.0.1:3000")]
    api_url: String,
    /// Shared API key, if the server requires one
    #[arg(long, env = "CLINIC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    /// Acting staff member
    #[arg(long, env = "CLINIC_ACTOR_ID", default_value = "cli")]
    actor_id: String,
    /// Role of the acting staff member
    #[arg(long, env = "CLINIC_ACTOR_ROLE", default_value = "reception", value_parser = parse_role)]
    role: Role,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the API is reachable
    Health,
    /// Print a snapshot of a collection
    List {
        /// lab_orders, medical_records or bills
        #[arg(value_parser = parse_collection)]
        collection: Collection,
        #[arg(long)]
        patient_id: Option<Uuid>,
        /// Wire status name, e.g. in_progress
        #[arg(long)]
        status: Option<String>,
    },
    /// Move an entity to a new status
    Transition {
        #[arg(value_parser = parse_collection)]
        collection: Collection,
        id: Uuid,
        /// Target status, e.g. sample_collected, dispensed, paid
        status: String,
        /// Lab result parameter as name=value or name=value:unit (repeatable)
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<ResultParameter>,
        /// Lab result attachment reference (repeatable)
        #[arg(long = "attachment")]
        attachments: Vec<String>,
        /// Re-read and retry once if the local view turns out to be stale
        #[arg(long)]
        retry: bool,
    },
    /// Delete a bill (admin only)
    DeleteBill { id: Uuid },
    /// Poll a collection and print it whenever it changes, until ctrl-c
    Watch {
        #[arg(value_parser = parse_collection)]
        collection: Collection,
        #[arg(long)]
        patient_id: Option<Uuid>,
        #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_SECS, value_parser = clap::value_parser!(u64).range(1..))]
        interval_secs: u64,
    },
}

fn parse_collection(s: &str) -> Result<Collection, String> {
    s.parse()
}

fn parse_role(s: &str) -> Result<Role, String> {
    s.parse()
}

fn parse_param(s: &str) -> Result<ResultParameter, String> {
    let (name, rest) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{s}'"))?;
    let (value, unit) = match rest.split_once(':') {
        Some((value, unit)) => (value, Some(unit.to_string())),
        None => (rest, None),
    };
    Ok(ResultParameter {
        name: name.trim().to_string(),
        value: value.trim().to_string(),
        unit,
        reference_range: None,
    })
}

/// One-line rendering of an entity.
trait Describe {
    fn describe(&self) -> String;
}

impl Describe for LabOrder {
    fn describe(&self) -> String {
        format!(
            "{}  {:<16} {} ({}) priority={:?} patient={}",
            self.id,
            self.status.to_string(),
            self.test_code, self.test_name, self.priority, self.patient_id
        )
    }
}

impl Describe for MedicalRecord {
    fn describe(&self) -> String {
        format!(
            "{}  {:<16} {} line(s) patient={}",
            self.id,
            self.prescription_status.to_string(),
            self.prescriptions.len(),
            self.patient_id
        )
    }
}

impl Describe for Bill {
    fn describe(&self) -> String {
        format!(
            "{}  {:<16} {} total={} paid={} patient={}",
            self.id,
            self.status.to_string(),
            self.bill_number,
            self.grand_total,
            self.paid_amount.map(|m| m.to_string()).unwrap_or_else(|| "-".into()),
            self.patient_id
        )
    }
}

fn engine<E: WireEntity>(
    source: &Arc<HttpSource>,
    filter: ListFilter,
    interval: Duration,
) -> SyncEngine<E, HttpSource> {
    let ttl = Duration::from_secs(DEFAULT_CACHE_TTL_SECS).min(interval / 2);
    SyncEngine::new(
        source.clone(),
        ReadCache::new(ttl),
        filter,
        PollScheduler::new(interval),
    )
}

fn default_interval() -> Duration {
    Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS)
}

async fn list<E: WireEntity + Describe>(
    source: &Arc<HttpSource>,
    filter: ListFilter,
) -> anyhow::Result<()> {
    let engine = engine::<E>(source, filter, default_interval());
    engine.refresh().await?;
    let items = engine.items().await;
    if items.is_empty() {
        println!("No {} found.", E::COLLECTION);
    }
    for item in items {
        println!("{}", item.describe());
    }
    Ok(())
}

async fn transition<E: WireEntity + Describe>(
    source: &Arc<HttpSource>,
    id: Uuid,
    req: StatusChangeReq,
    retry: bool,
) -> anyhow::Result<()> {
    let target = parse_status::<E::Status>(&req.status)?;
    let action = E::action_for(target, &req)?;

    let engine = engine::<E>(source, ListFilter::default(), default_interval());
    engine.refresh().await?;
    let entity = if retry {
        engine.perform_with_retry(id, action).await?
    } else {
        engine.perform(id, action).await?
    };
    println!("{}", entity.describe());
    Ok(())
}

async fn watch_collection<E: WireEntity + Describe>(
    source: &Arc<HttpSource>,
    filter: ListFilter,
    interval: Duration,
) -> anyhow::Result<()> {
    let engine = engine::<E>(source, filter, interval);
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(true);
        }
    });

    let last_seen = RefCell::new(Vec::<(Uuid, u64)>::new());
    let (engine_ref, last_ref) = (&engine, &last_seen);
    PollScheduler::new(interval)
        .run(rx, move || async move {
            match engine_ref.poll_once().await {
                Ok(SnapshotOutcome::Applied) => {
                    let items = engine_ref.items().await;
                    let seen: Vec<(Uuid, u64)> =
                        items.iter().map(|e| (e.id(), e.version())).collect();
                    if *last_ref.borrow() != seen {
                        println!("-- {} ({} item(s))", E::COLLECTION, items.len());
                        for item in &items {
                            println!("{}", item.describe());
                        }
                        *last_ref.borrow_mut() = seen;
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("poll failed: {e}"),
            }
        })
        .await;

    engine.close().await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clinic=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let actor = Actor::new(NonEmptyText::new(&cli.actor_id)?, cli.role);
    let source = Arc::new(HttpSource::new(cli.api_url, actor).with_api_key(cli.api_key));

    match cli.command {
        Commands::Health => {
            let health = source.health().await?;
            println!("{}", health.message);
        }
        Commands::List {
            collection,
            patient_id,
            status,
        } => {
            let filter = ListFilter { patient_id, status };
            match collection {
                Collection::LabOrders => list::<LabOrder>(&source, filter).await?,
                Collection::MedicalRecords => list::<MedicalRecord>(&source, filter).await?,
                Collection::Bills => list::<Bill>(&source, filter).await?,
            }
        }
        Commands::Transition {
            collection,
            id,
            status,
            params,
            attachments,
            retry,
        } => {
            let mut req = StatusChangeReq::new(&status, "");
            req.parameters = params;
            req.attachments = attachments;
            match collection {
                Collection::LabOrders => transition::<LabOrder>(&source, id, req, retry).await?,
                Collection::MedicalRecords => {
                    transition::<MedicalRecord>(&source, id, req, retry).await?
                }
                Collection::Bills => transition::<Bill>(&source, id, req, retry).await?,
            }
        }
        Commands::DeleteBill { id } => {
            let engine = engine::<Bill>(&source, ListFilter::default(), default_interval());
            engine.delete_bill(id).await?;
            println!("Deleted bill {id}");
        }
        Commands::Watch {
            collection,
            patient_id,
            interval_secs,
        } => {
            let filter = ListFilter {
                patient_id,
                status: None,
            };
            let interval = Duration::from_secs(interval_secs);
            match collection {
                Collection::LabOrders => {
                    watch_collection::<LabOrder>(&source, filter, interval).await?
                }
                Collection::MedicalRecords => {
                    watch_collection::<MedicalRecord>(&source, filter, interval).await?
                }
                Collection::Bills => {
                    watch_collection::<Bill>(&source, filter, interval).await?
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_parse_with_and_without_unit() {
        let p = parse_param("Hemoglobin=13.5:g/dL").unwrap();
        assert_eq!(p.name, "Hemoglobin");
        assert_eq!(p.value, "13.5");
        assert_eq!(p.unit.as_deref(), Some("g/dL"));

        let p = parse_param("Blood group=O+").unwrap();
        assert_eq!(p.value, "O+");
        assert!(p.unit.is_none());

        assert!(parse_param("no-equals").is_err());
    }

    #[test]
    fn cli_parses_transition_with_result() {
        let cli = Cli::try_parse_from([
            "clinic",
            "--role",
            "lab_technician",
            "transition",
            "lab_orders",
            "550e8400-e29b-41d4-a716-446655440000",
            "completed",
            "--param",
            "Hemoglobin=13.5:g/dL",
        ])
        .unwrap();
        assert_eq!(cli.role, Role::LabTechnician);
        match cli.command {
            Commands::Transition {
                collection, params, ..
            } => {
                assert_eq!(collection, Collection::LabOrders);
                assert_eq!(params.len(), 1);
            }
            _ => panic!("expected transition"),
        }
    }

    #[test]
    fn unknown_collection_is_rejected() {
        assert!(Cli::try_parse_from(["clinic", "list", "patients"]).is_err());
    }
}
