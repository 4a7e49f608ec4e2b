//! Durable background job processing for the courseflow storefront.
//!
//! The rest of the application is CRUD against the catalog database and the
//! LMS API; everything that has to survive a failure — transactional email,
//! enrollment confirmations, payment verification, LMS sync — goes through
//! this queue instead: a persisted job store, a polling worker with bounded
//! concurrency, a per-job-type processor registry, exponential-backoff
//! retries with per-attempt timeouts, and a dead letter store for failures
//! that need a human.

pub mod config;
pub mod db;
pub mod jobs;
