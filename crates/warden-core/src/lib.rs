//! # warden-core
//!
//! Shared data model for the warden access control decision engine.
//!
//! This crate holds the plain types exchanged between the decision engine
//! and its collaborators:
//! - [`model`] - engine, policy, and rule records as read from storage
//! - [`context`] - the ephemeral per-request access context
//! - [`decision`] - decision outcomes and reasons
//! - [`error`] - model-level error types

pub mod context;
pub mod decision;
pub mod error;
pub mod model;

pub use context::{AccessRequest, GeoPoint, NetworkContext, Subject};
pub use decision::{Decision, DecisionReason, DecisionType};
pub use error::{CoreError, Result};
pub use model::{
    BaselineGrant, CombiningMode, EngineFlavor, EngineRecord, PolicyRecord, RuleContext,
    RuleEffect, RuleRecord, SubjectMatcher,
};
