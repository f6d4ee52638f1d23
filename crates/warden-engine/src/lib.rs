//! # warden-engine
//!
//! Access control decision engine for the warden ERP platform.
//!
//! This crate provides:
//! - A rule index compiled from stored policies, swapped atomically on change
//! - Fail-closed condition evaluation over request attributes
//! - Priority-ordered decision resolution with configurable combining modes
//! - Contextual risk scoring that can escalate an allow to a challenge
//! - A bounded decision cache invalidated on every index rebuild
//! - Non-blocking audit recording with rolling rule/engine counters
//! - A per-tenant engine registry with most-restrictive-wins merging
//!
//! ## Overview
//!
//! The engine is embedded in a request-handling service and called
//! synchronously: a request enters the [`registry::EngineRegistry`], the
//! registry selects the engine(s) configured for the tenant, each engine
//! runs its pipeline (cache, index, resolver, risk scorer), and the final
//! decision is handed to the audit recorder fire-and-forget before being
//! returned to the caller. Nothing on the hot path performs blocking I/O.
//!
//! ## Modules
//!
//! - [`config`] - engine settings (risk weights, cache TTLs, audit queue)
//! - [`store`] - policy store adapter trait and in-memory implementation
//! - [`pattern`] - resource pattern compilation and specificity
//! - [`matcher`] - subject matching
//! - [`condition`] - condition expression trees and evaluation
//! - [`index`] - immutable rule index snapshots
//! - [`resolver`] - combining-mode decision resolution
//! - [`risk`] - contextual risk scoring
//! - [`cache`] - fingerprinted decision cache
//! - [`audit`] - asynchronous audit and feedback recording
//! - [`metrics`] - rolling per-rule and per-engine counters
//! - [`engine`] - the single-engine decision pipeline
//! - [`registry`] - tenant-level engine selection and outcome merging

pub mod audit;
pub mod cache;
pub mod condition;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod matcher;
pub mod metrics;
pub mod pattern;
pub mod registry;
pub mod resolver;
pub mod risk;
pub mod store;

pub use audit::{AuditEvent, AuditRecord, AuditRecorder, AuditSink, MemoryAuditSink};
pub use cache::{CacheStats, CachedDecision, DecisionCache};
pub use condition::{ConditionExpr, ConditionOp};
pub use config::{AuditConfig, CacheConfig, EngineSettings, RiskConfig, RiskWeights};
pub use engine::DecisionEngine;
pub use error::{EngineError, EngineResult};
pub use index::{IndexedRule, RuleIndex, RuleIndexBuilder};
pub use matcher::matches_subject;
pub use metrics::{EngineMetrics, EngineMetricsSnapshot, RuleStats};
pub use pattern::ResourcePattern;
pub use registry::EngineRegistry;
pub use resolver::{Resolution, resolve};
pub use risk::RiskScorer;
pub use store::{MemoryPolicyStore, PolicyStore};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use warden_engine::prelude::*;
/// ```
pub mod prelude {
    pub use crate::audit::{AuditEvent, AuditRecord, AuditRecorder, AuditSink, MemoryAuditSink};
    pub use crate::config::EngineSettings;
    pub use crate::engine::DecisionEngine;
    pub use crate::error::{EngineError, EngineResult};
    pub use crate::registry::EngineRegistry;
    pub use crate::store::{MemoryPolicyStore, PolicyStore};
    pub use warden_core::{
        AccessRequest, CombiningMode, Decision, DecisionType, EngineFlavor, EngineRecord,
        PolicyRecord, RuleEffect, RuleRecord, Subject,
    };
}
