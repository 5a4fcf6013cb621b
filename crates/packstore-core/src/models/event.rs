//! Provenance events.
//!
//! Every storage operation that mutates a package appends a structured,
//! immutable event to the package's metadata document, linked to the
//! agents responsible. The document holds one shared agent list; agents
//! are deduplicated by (identifier_type, identifier_value) on merge so
//! repeated operations by the same agent never duplicate its entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Reference to an agent responsible for an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRef {
    pub identifier_type: String,
    pub identifier_value: String,
    pub name: String,
    pub agent_type: String,
}

impl AgentRef {
    /// The storage service's own software agent.
    pub fn storage_service() -> Self {
        AgentRef {
            identifier_type: "preservation system".to_string(),
            identifier_value: format!("Packstore-{}", SERVICE_VERSION),
            name: "Packstore Storage Service".to_string(),
            agent_type: "software".to_string(),
        }
    }

    fn key(&self) -> (&str, &str) {
        (&self.identifier_type, &self.identifier_value)
    }
}

/// An append-only record of an action taken on a package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceEvent {
    pub event_id: Uuid,
    pub event_type: String,
    pub event_detail: String,
    pub outcome: String,
    pub timestamp: DateTime<Utc>,
    /// Identifiers of linked agents, `(identifier_type, identifier_value)`.
    pub linked_agents: Vec<(String, String)>,
}

impl ProvenanceEvent {
    /// Build an event linked to the given agents (the service agent is
    /// always linked, supplied or not).
    pub fn new(event_type: &str, event_detail: &str, outcome: &str, agents: &[AgentRef]) -> Self {
        let service = AgentRef::storage_service();
        let mut linked_agents: Vec<(String, String)> = vec![(
            service.identifier_type.clone(),
            service.identifier_value.clone(),
        )];
        for agent in agents {
            let key = (agent.identifier_type.clone(), agent.identifier_value.clone());
            if !linked_agents.contains(&key) {
                linked_agents.push(key);
            }
        }
        ProvenanceEvent {
            event_id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            event_detail: event_detail.to_string(),
            outcome: outcome.to_string(),
            timestamp: Utc::now(),
            linked_agents,
        }
    }

    /// Append this event (and any missing agent entries) to the package
    /// metadata document, creating the document structure on first use.
    pub fn merge_into(&self, metadata: &mut JsonValue, agents: &[AgentRef]) {
        if !metadata.is_object() {
            *metadata = json!({ "events": [], "agents": [] });
        }
        let doc = metadata.as_object_mut().expect("metadata is an object");
        doc.entry("events").or_insert_with(|| json!([]));
        doc.entry("agents").or_insert_with(|| json!([]));

        if let Some(events) = doc.get_mut("events").and_then(JsonValue::as_array_mut) {
            events.push(serde_json::to_value(self).expect("event serializes"));
        }

        let mut all_agents = vec![AgentRef::storage_service()];
        all_agents.extend_from_slice(agents);
        if let Some(existing) = doc.get_mut("agents").and_then(JsonValue::as_array_mut) {
            for agent in all_agents {
                let dup = existing.iter().any(|a| {
                    a.get("identifier_type").and_then(JsonValue::as_str)
                        == Some(agent.key().0)
                        && a.get("identifier_value").and_then(JsonValue::as_str)
                            == Some(agent.key().1)
                });
                if !dup {
                    existing.push(serde_json::to_value(&agent).expect("agent serializes"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: &str) -> AgentRef {
        AgentRef {
            identifier_type: "repository code".to_string(),
            identifier_value: id.to_string(),
            name: id.to_string(),
            agent_type: "organization".to_string(),
        }
    }

    #[test]
    fn test_event_links_service_agent() {
        let event = ProvenanceEvent::new("ingestion", "imported from disk", "success", &[]);
        assert_eq!(event.linked_agents.len(), 1);
        assert_eq!(event.linked_agents[0].0, "preservation system");
    }

    #[test]
    fn test_merge_creates_document() {
        let mut metadata = JsonValue::Null;
        let event = ProvenanceEvent::new("ingestion", "", "success", &[agent("org-1")]);
        event.merge_into(&mut metadata, &[agent("org-1")]);

        assert_eq!(metadata["events"].as_array().unwrap().len(), 1);
        // Service agent plus org-1.
        assert_eq!(metadata["agents"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_merge_deduplicates_agents() {
        let mut metadata = JsonValue::Null;
        for _ in 0..3 {
            let event = ProvenanceEvent::new("fixity check", "", "success", &[agent("org-1")]);
            event.merge_into(&mut metadata, &[agent("org-1")]);
        }
        assert_eq!(metadata["events"].as_array().unwrap().len(), 3);
        assert_eq!(metadata["agents"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_merge_distinguishes_agents_by_full_key() {
        let mut metadata = JsonValue::Null;
        let mut other = agent("org-1");
        other.identifier_type = "preservation system".to_string();
        let event = ProvenanceEvent::new("replication", "", "success", &[agent("org-1"), other]);
        event.merge_into(&mut metadata, &[agent("org-1")]);

        let mut with_other = agent("org-1");
        with_other.identifier_type = "preservation system".to_string();
        let event2 = ProvenanceEvent::new("replication", "", "success", &[with_other.clone()]);
        event2.merge_into(&mut metadata, &[with_other]);

        // service + org-1(repository code) + org-1(preservation system)
        assert_eq!(metadata["agents"].as_array().unwrap().len(), 3);
    }
}
