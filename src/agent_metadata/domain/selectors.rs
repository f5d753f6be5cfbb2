//! Selector sets attested for an agent by a node attestor plugin.

use super::{AgentId, AgentMetadataDomainError};
use serde::{Deserialize, Serialize};

/// Plugin name and selectors recorded for one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSelectors {
    spiffeid: AgentId,
    plugin: String,
    selectors: Vec<String>,
}

impl AgentSelectors {
    /// Creates a validated selector set.
    ///
    /// The plugin name and every selector are trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`AgentMetadataDomainError::EmptyPluginName`] for a blank
    /// plugin or [`AgentMetadataDomainError::EmptySelector`] for a blank
    /// selector entry.
    pub fn new<I, S>(
        spiffeid: AgentId,
        plugin: impl Into<String>,
        selectors: I,
    ) -> Result<Self, AgentMetadataDomainError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let plugin_name = plugin.into().trim().to_owned();
        if plugin_name.is_empty() {
            return Err(AgentMetadataDomainError::EmptyPluginName);
        }

        let entries = selectors
            .into_iter()
            .enumerate()
            .map(|(index, raw)| {
                let selector = raw.into().trim().to_owned();
                if selector.is_empty() {
                    Err(AgentMetadataDomainError::EmptySelector(index))
                } else {
                    Ok(selector)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            spiffeid,
            plugin: plugin_name,
            selectors: entries,
        })
    }

    /// Returns the agent identity.
    #[must_use]
    pub const fn spiffeid(&self) -> &AgentId {
        &self.spiffeid
    }

    /// Returns the attesting plugin name.
    #[must_use]
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Returns the selectors in their recorded order.
    #[must_use]
    pub fn selectors(&self) -> &[String] {
        &self.selectors
    }
}
