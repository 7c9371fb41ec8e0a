//! Lead Scoring Job Library
//!
//! Nightly batch job that scores every lead in the store, guarded by a
//! once-per-day job lock persisted alongside the leads.
//!
//! # Modules
//!
//! - `config`: Environment configuration.
//! - `db`: Connection retry policy.
//! - `errors`: Error handling types.
//! - `job_lock`: Once-per-day run gate with stale-lock reclamation.
//! - `models`: Job records, leads and config rows.
//! - `orchestrator`: End-to-end run state machine.
//! - `scoring`: Lead scoring function.
//! - `scoring_config`: Scoring parameters and their loader.
//! - `store`: Store interface and its PostgreSQL implementation.

pub mod config;
pub mod db;
pub mod errors;
pub mod job_lock;
pub mod models;
pub mod orchestrator;
pub mod scoring;
pub mod scoring_config;
pub mod store;
