//! Agent and cluster metadata persistence.
//!
//! Agents are workload identities keyed by a SPIFFE ID. Clusters are named,
//! UID-keyed groupings of agents; an agent belongs to at most one cluster.
//! The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
