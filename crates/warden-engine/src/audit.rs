//! Decision audit trail.
//!
//! Every decision is recorded for compliance review. Recording must never
//! slow down or block the decision path, so events flow through a bounded
//! queue to a background consumer that writes the records to a pluggable
//! sink and folds the rolling rule/engine counters in as it drains. When
//! the queue is full the event is dropped and counted; the decision
//! itself is unaffected.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use warden_core::{AccessRequest, Decision, DecisionType};

use crate::config::AuditConfig;
use crate::error::EngineResult;
use crate::metrics::EngineMetrics;

// =============================================================================
// Records
// =============================================================================

/// One audited decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Unique id of this record. Distinct per record even when the same
    /// cached decision is served more than once, so a sink consumer can
    /// deduplicate redelivered records without losing events.
    pub id: uuid::Uuid,

    /// Id of the decision this record describes.
    pub decision_id: uuid::Uuid,

    pub tenant: String,
    pub subject_id: String,
    pub resource: String,
    pub operation: String,
    pub decision: DecisionType,

    /// Reason code from the decision, e.g. `rule-matched`.
    pub reason_code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule_id: Option<String>,

    pub risk_score: f64,

    /// Time spent producing the decision, in microseconds.
    pub evaluation_micros: u64,

    /// Source IP as recorded on the request, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    /// Whether the decision was served from the cache.
    pub cached: bool,

    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

impl AuditRecord {
    /// Build a record from a decision and the request that produced it.
    #[must_use]
    pub fn from_decision(request: &AccessRequest, decision: &Decision, cached: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            decision_id: decision.id,
            tenant: decision.tenant.clone(),
            subject_id: request.subject.id.clone(),
            resource: decision.resource.clone(),
            operation: decision.operation.clone(),
            decision: decision.decision,
            reason_code: decision.reason.code.clone(),
            matched_rule_id: decision.matched_rule_id.clone(),
            risk_score: decision.risk_score,
            evaluation_micros: decision.evaluation_micros,
            source_ip: request.network.ip.map(|ip| ip.to_string()),
            device_id: request.network.device_id.clone(),
            cached,
            recorded_at: OffsetDateTime::now_utc(),
        }
    }
}

/// One queued unit of audit work: the record to persist, plus the
/// counters of the engine that produced the decision.
pub struct AuditEvent {
    pub record: AuditRecord,
    /// Folded into by the consumer when the event is drained. `None`
    /// for decisions made outside any engine, e.g. unknown tenants.
    pub metrics: Option<Arc<EngineMetrics>>,
}

impl AuditEvent {
    #[must_use]
    pub fn new(record: AuditRecord) -> Self {
        Self {
            record,
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_metrics(record: AuditRecord, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            record,
            metrics: Some(metrics),
        }
    }
}

// =============================================================================
// Sinks
// =============================================================================

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist one record. Failures are logged by the consumer, never
    /// surfaced to the decision path.
    async fn write(&self, record: AuditRecord) -> EngineResult<()>;
}

/// In-memory sink, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: tokio::sync::RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All records written so far, oldest first.
    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn write(&self, record: AuditRecord) -> EngineResult<()> {
        self.records.write().await.push(record);
        Ok(())
    }
}

// =============================================================================
// Recorder
// =============================================================================

/// Non-blocking front end for the audit trail.
///
/// `record` only ever does a `try_send` into the bounded queue; the
/// spawned consumer drains the queue, updates the engine counters
/// carried by each event, and hands the record to the sink. Dropped
/// events are counted so operators can size the queue; a dropped event
/// updates no counters.
pub struct AuditRecorder {
    tx: std::sync::Mutex<Option<mpsc::Sender<AuditEvent>>>,
    dropped: Arc<AtomicU64>,
    written: Arc<AtomicU64>,
    consumer: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRecorder")
            .field("dropped", &self.dropped.load(Ordering::Relaxed))
            .field("written", &self.written.load(Ordering::Relaxed))
            .finish()
    }
}

impl AuditRecorder {
    /// Spawn the consumer task and return the recorder.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>, config: &AuditConfig) -> Self {
        let (tx, mut rx) = mpsc::channel::<AuditEvent>(config.queue_capacity.max(1));
        let written = Arc::new(AtomicU64::new(0));

        let consumer_written = Arc::clone(&written);
        let consumer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Some(metrics) = &event.metrics {
                    metrics.record_outcome(
                        event.record.decision,
                        event.record.evaluation_micros,
                        event.record.matched_rule_id.as_deref(),
                    );
                }
                let record_id = event.record.id;
                match sink.write(event.record).await {
                    Ok(()) => {
                        consumer_written.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        tracing::warn!(%record_id, error = %e, "Failed to write audit record");
                    }
                }
            }
        });

        Self {
            tx: std::sync::Mutex::new(Some(tx)),
            dropped: Arc::new(AtomicU64::new(0)),
            written,
            consumer: std::sync::Mutex::new(Some(consumer)),
        }
    }

    /// Enqueue an event. Never blocks; drops and counts when the queue
    /// is full or the recorder has been shut down.
    pub fn record(&self, event: AuditEvent) {
        let guard = match self.tx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let accepted = guard.as_ref().is_some_and(|tx| tx.try_send(event).is_ok());
        if !accepted {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::debug!(dropped_total = total, "Audit queue full, record dropped");
        }
    }

    /// Records dropped because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Records confirmed written to the sink.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Stop accepting records, drain the queue and wait for the consumer.
    pub async fn shutdown(&self) {
        let tx = match self.tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(tx);

        let consumer = match self.consumer.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = consumer
            && let Err(e) = handle.await
        {
            tracing::warn!(error = %e, "Audit consumer ended abnormally");
        }
    }
}
