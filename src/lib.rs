//! Synapse Janitor: disk-space housekeeping for Matrix Synapse
//!
//! Finds rooms whose `state_groups_state` history dominates the database and purges
//! them through the Synapse admin API, then removes the state history Synapse leaves
//! behind. Every purge is checkpointed so an interrupted run resumes where it stopped.

pub mod admin;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod purge;
pub mod scan;
pub mod scheduler;
pub mod store;
