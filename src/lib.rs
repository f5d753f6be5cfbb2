//! agentdb: agent and cluster metadata persistence.
//!
//! This crate maps agents (workload identities keyed by SPIFFE ID) and
//! clusters (named groupings of agents) onto a relational store, keeping
//! multi-step writes such as batch agent assignment transactional.
//!
//! # Architecture
//!
//! agentdb follows hexagonal architecture principles:
//!
//! - **Domain**: Validated identifiers and payload types
//! - **Ports**: The [`AgentStore`](agent_metadata::ports::AgentStore) contract
//!   and its error type
//! - **Adapters**: `SQLite` (Diesel) and in-memory store implementations
//!
//! # Modules
//!
//! - [`agent_metadata`]: Agents, clusters, memberships and selectors

pub mod agent_metadata;
