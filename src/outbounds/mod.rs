//! Adapters implementing the domain ports.

pub mod http_asset_store;
pub mod in_memory_broker;
pub mod in_memory_cache;
pub mod in_memory_ledger;
pub mod in_memory_store;
pub mod rabbit_transport;
