//! Homeowner Lead Enrichment Pipeline Library
//!
//! This library provides the core functionality for the homeowner lead
//! enrichment pipeline: paginated property discovery, skip-trace contact
//! enrichment, region phone filtering, Thirsty Buyer scoring, optional
//! carrier verification, and idempotent import into the CRM store, with a
//! durable checkpoint for resume-after-crash.
//!
//! # Modules
//!
//! - `circuit_breaker`: Circuit breaker guarding skip-trace batches.
//! - `config`: Configuration management (env credentials + run options).
//! - `db`: Database connection and pool management.
//! - `errors`: Error handling types.
//! - `export`: CSV export of the final record set.
//! - `importer`: Idempotent lead import into the destination store.
//! - `models`: Core data models.
//! - `phone_verify`: Carrier lookup phone verification.
//! - `pipeline`: Pipeline orchestrator.
//! - `progress`: Durable run-progress checkpoint store.
//! - `region_filter`: Area-code allow-list filtering.
//! - `scoring`: Thirsty Buyer scoring engine.
//! - `search_client`: Property search provider client.
//! - `skip_trace`: Skip-trace contact enrichment client.

pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod errors;
pub mod export;
pub mod importer;
pub mod models;
pub mod phone_verify;
pub mod pipeline;
pub mod progress;
pub mod region_filter;
pub mod scoring;
pub mod search_client;
pub mod skip_trace;
