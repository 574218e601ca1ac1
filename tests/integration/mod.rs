//! Integration tests for the Synapse janitor


mod admin_client;
mod checkpoint_store;
mod config_loading;
mod purge_pipeline;
