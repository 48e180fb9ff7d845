// 🌱 Bootstrap loader
// Creates the four dashboard tables and upserts the seed datasets into them.
//
// Stages:
//   1. ensure tables          (fatal on failure)
//   2. users, customers, revenue   (concurrently, no cross references)
//   3. invoices               (only after every customer write is acknowledged)
//
// Inside a stage every record is its own task. With a transactional gateway
// the stages share one session: everything commits or nothing does.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{BootstrapError, GatewayError, RecordError};
use crate::gateway::{Gateway, RecordWriter, Row};
use crate::models::EntityKind;
use crate::schema;
use crate::seed_data::SeedData;

// ============================================================================
// CANCELLATION
// ============================================================================

/// Caller-side stop signal: an explicit flag, a deadline, or both.
/// Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Cancellation {
    pub fn never() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Cancellation {
            flag: Arc::default(),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.deadline.map_or(false, |deadline| Instant::now() >= deadline)
    }
}

// ============================================================================
// SUMMARY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    /// Natural key of the record that failed.
    pub record: String,
    #[serde(flatten)]
    pub error: RecordError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseSummary {
    pub entity: EntityKind,
    pub attempted: usize,
    pub written: usize,
    pub failures: Vec<RecordFailure>,
}

impl PhaseSummary {
    fn new(entity: EntityKind, attempted: usize) -> Self {
        PhaseSummary {
            entity,
            attempted,
            written: 0,
            failures: Vec::new(),
        }
    }

    /// A phase fails when the gateway could not be reached for some record.
    pub fn failed(&self) -> bool {
        self.transport_error().is_some()
    }

    fn transport_error(&self) -> Option<&RecordFailure> {
        self.failures
            .iter()
            .find(|f| matches!(f.error, RecordError::Transport { .. }))
    }
}

/// What a run wrote. `transactional: false` means best-effort mode: phases
/// that did run are persisted even when others failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub transactional: bool,
    pub cancelled: bool,
    pub rolled_back: bool,
    pub phases: Vec<PhaseSummary>,
}

impl Summary {
    fn new(transactional: bool) -> Self {
        Summary {
            transactional,
            cancelled: false,
            rolled_back: false,
            phases: Vec::new(),
        }
    }

    pub fn phase(&self, entity: EntityKind) -> Option<&PhaseSummary> {
        self.phases.iter().find(|p| p.entity == entity)
    }

    pub fn written(&self, entity: EntityKind) -> usize {
        self.phase(entity).map_or(0, |p| p.written)
    }

    pub fn failures(&self) -> impl Iterator<Item = &RecordFailure> {
        self.phases.iter().flat_map(|p| p.failures.iter())
    }

    pub fn is_complete(&self) -> bool {
        !self.cancelled
            && !self.rolled_back
            && self.phases.len() == EntityKind::ALL.len()
            && self.failures().next().is_none()
    }

    fn transport_error(&self) -> Option<&RecordFailure> {
        self.phases.iter().find_map(PhaseSummary::transport_error)
    }
}

// ============================================================================
// RECORD PREPARATION
// ============================================================================

/// Row that has to exist before a record may be written.
#[derive(Debug, Clone)]
struct Requirement {
    table: &'static str,
    column: &'static str,
    value: String,
}

#[derive(Debug, Clone)]
struct PendingRecord {
    key: String,
    /// `Err` when the row could not be built (a password that failed to hash).
    row: Result<Row, RecordError>,
    requires: Option<Requirement>,
}

fn pending_records(seed: &SeedData, entity: EntityKind) -> Vec<PendingRecord> {
    let plain = |key: &str, row: Result<Row, RecordError>| PendingRecord {
        key: key.to_string(),
        row,
        requires: None,
    };

    match entity {
        EntityKind::Users => seed
            .users
            .iter()
            .map(|u| {
                let row = u.to_row().map_err(|err| RecordError::Rejected {
                    message: format!("password hashing failed: {}", err),
                });
                plain(&u.id, row)
            })
            .collect(),
        EntityKind::Customers => seed
            .customers
            .iter()
            .map(|c| plain(&c.id, Ok(c.to_row())))
            .collect(),
        EntityKind::Revenue => seed
            .revenue
            .iter()
            .map(|r| plain(&r.month, Ok(r.to_row())))
            .collect(),
        EntityKind::Invoices => seed
            .invoices
            .iter()
            .map(|i| PendingRecord {
                key: i.key(),
                row: Ok(i.to_row()),
                requires: Some(Requirement {
                    table: EntityKind::Customers.table(),
                    column: EntityKind::Customers.conflict_key(),
                    value: i.customer_id.clone(),
                }),
            })
            .collect(),
    }
}

/// bcrypt is slow on purpose, so user rows are built on the blocking pool.
async fn pending_users(seed: Arc<SeedData>) -> Vec<PendingRecord> {
    let source = seed.clone();
    match tokio::task::spawn_blocking(move || pending_records(&source, EntityKind::Users)).await {
        Ok(records) => records,
        Err(err) => seed
            .users
            .iter()
            .map(|u| PendingRecord {
                key: u.id.clone(),
                row: Err(RecordError::Rejected {
                    message: format!("password hashing failed: {}", err),
                }),
                requires: None,
            })
            .collect(),
    }
}

async fn write_record<W>(writer: &W, entity: EntityKind, record: PendingRecord) -> Result<(), RecordError>
where
    W: RecordWriter + ?Sized,
{
    let row = record.row?;

    if let Some(req) = &record.requires {
        if !writer.exists(req.table, req.column, &req.value).await? {
            return Err(RecordError::Dependency {
                table: req.table.to_string(),
                key: req.value.clone(),
            });
        }
    }

    writer.upsert(entity.table(), entity.conflict_key(), row).await?;
    Ok(())
}

/// Write one entity type, one task per record, and wait for all of them.
async fn load_phase<W>(writer: Arc<W>, entity: EntityKind, records: Vec<PendingRecord>) -> PhaseSummary
where
    W: RecordWriter + ?Sized + 'static,
{
    let mut phase = PhaseSummary::new(entity, records.len());
    let mut tasks = JoinSet::new();

    for record in records {
        let writer = writer.clone();
        tasks.spawn(async move {
            let key = record.key.clone();
            let result = write_record(writer.as_ref(), entity, record).await;
            (key, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let (key, result) = match joined {
            Ok(done) => done,
            Err(err) => (
                "<unknown>".to_string(),
                Err(RecordError::Rejected {
                    message: format!("write task failed: {}", err),
                }),
            ),
        };

        match result {
            Ok(()) => phase.written += 1,
            Err(error) => {
                warn!(%entity, %key, %error, "record not seeded");
                phase.failures.push(RecordFailure { record: key, error });
            }
        }
    }

    phase.failures.sort_by(|a, b| a.record.cmp(&b.record));
    info!(
        %entity,
        attempted = phase.attempted,
        written = phase.written,
        failed = phase.failures.len(),
        "phase finished"
    );
    phase
}

// ============================================================================
// LOADER
// ============================================================================

pub struct Loader {
    gateway: Arc<dyn Gateway>,
    seed: Arc<SeedData>,
}

impl Loader {
    pub fn new(gateway: Arc<dyn Gateway>, seed: Arc<SeedData>) -> Self {
        Loader { gateway, seed }
    }

    pub async fn run(&self) -> Result<Summary, BootstrapError> {
        self.run_until(&Cancellation::never()).await
    }

    /// Seed the store, stopping between stages once `cancel` fires.
    /// Writes already in flight are allowed to finish.
    pub async fn run_until(&self, cancel: &Cancellation) -> Result<Summary, BootstrapError> {
        info!(records = self.seed.record_count(), "seeding started");

        // Two records with one key would race for the same row.
        self.seed.validate().map_err(|err| {
            warn!(error = %err, "seed data rejected");
            BootstrapError::InvalidSeed(err.to_string())
        })?;

        for spec in schema::TABLES {
            self.gateway.ensure_table(&spec).await.map_err(|source| {
                warn!(table = spec.name, error = %source, "table creation failed");
                match source {
                    GatewayError::Transport(_) => BootstrapError::Transport(source),
                    _ => BootstrapError::Schema {
                        table: spec.name,
                        source,
                    },
                }
            })?;
        }

        let summary = match self.gateway.begin().await.map_err(BootstrapError::Transport)? {
            Some(session) => {
                let mut summary = Summary::new(true);
                self.load(session.clone(), cancel, true, &mut summary).await;

                if let Some(failure) = summary.transport_error() {
                    let cause = GatewayError::Transport(format!("{}: {}", failure.record, failure.error));
                    if let Err(err) = session.rollback().await {
                        warn!(error = %err, "rollback failed");
                    }
                    return Err(BootstrapError::Transport(cause));
                }

                if summary.cancelled {
                    session.rollback().await.map_err(BootstrapError::Transport)?;
                    summary.rolled_back = true;
                } else {
                    session.commit().await.map_err(BootstrapError::Transport)?;
                }
                summary
            }
            None => {
                warn!("gateway has no transactions, seeding in best-effort mode");
                let mut summary = Summary::new(false);
                self.load(self.gateway.clone(), cancel, false, &mut summary).await;
                summary
            }
        };

        info!(
            transactional = summary.transactional,
            cancelled = summary.cancelled,
            rolled_back = summary.rolled_back,
            failures = summary.failures().count(),
            "seeding finished"
        );
        Ok(summary)
    }

    async fn load<W>(&self, writer: Arc<W>, cancel: &Cancellation, stop_on_transport: bool, summary: &mut Summary)
    where
        W: RecordWriter + ?Sized + 'static,
    {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            return;
        }

        let (users, customers, revenue) = tokio::join!(
            async {
                let users = pending_users(self.seed.clone()).await;
                load_phase(writer.clone(), EntityKind::Users, users).await
            },
            load_phase(writer.clone(), EntityKind::Customers, pending_records(&self.seed, EntityKind::Customers)),
            load_phase(writer.clone(), EntityKind::Revenue, pending_records(&self.seed, EntityKind::Revenue)),
        );
        summary.phases.extend([users, customers, revenue]);

        if stop_on_transport && summary.transport_error().is_some() {
            return;
        }
        if cancel.is_cancelled() {
            summary.cancelled = true;
            return;
        }

        let invoices = load_phase(writer, EntityKind::Invoices, pending_records(&self.seed, EntityKind::Invoices)).await;
        summary.phases.push(invoices);
    }
}
