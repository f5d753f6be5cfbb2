//! Unit tests for the agent metadata context.
