use std::collections::{BTreeMap, BTreeSet};

/// ConnectorDefinition is the static configuration a connector declares
/// about itself. It's loaded once at process start and never mutated.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConnectorDefinition {
    /// Unique connector id, e.g. "hackernews".
    pub name: String,
    /// Human-readable title shown in the UI.
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Five-field cron expression. Absent means the source is manual-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    /// Names of secrets which must be present before a sync may start.
    #[serde(default)]
    pub required_secrets: Vec<String>,
    /// Logical stream names the connector can emit. Each stream maps to
    /// one table, named `<name>_<stream>` unless the stream already
    /// carries the connector prefix.
    #[serde(default)]
    pub declared_streams: Vec<String>,
    /// Ordered fields of the upsert key. Absent means append-only writes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<Vec<String>>,
    /// Opaque per-stream subscription metadata for externally-replicated
    /// tables. Round-tripped onto discovered tables, never interpreted.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subscriptions: BTreeMap<String, serde_json::Value>,
}

impl ConnectorDefinition {
    /// Validate the definition at load time, so malformed connectors fail
    /// at registration rather than mid-sync.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.is_empty() {
            anyhow::bail!("connector name must not be empty");
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            anyhow::bail!(
                "connector name {:?} must be lowercase ascii, digits, or '_'",
                self.name
            );
        }
        if let Some(schedule) = &self.schedule {
            if schedule.split_whitespace().count() != 5 {
                anyhow::bail!(
                    "connector {:?} schedule {:?} is not a five-field cron expression",
                    self.name,
                    schedule
                );
            }
        }
        let mut seen = BTreeSet::new();
        for stream in &self.declared_streams {
            if stream.is_empty() {
                anyhow::bail!("connector {:?} declares an empty stream name", self.name);
            }
            if !seen.insert(stream.as_str()) {
                anyhow::bail!(
                    "connector {:?} declares stream {:?} more than once",
                    self.name,
                    stream
                );
            }
        }
        if let Some(key) = &self.primary_key {
            if key.is_empty() || key.iter().any(String::is_empty) {
                anyhow::bail!(
                    "connector {:?} primary key must list at least one non-empty field",
                    self.name
                );
            }
        }
        for stream in self.subscriptions.keys() {
            if !seen.contains(stream.as_str()) {
                anyhow::bail!(
                    "connector {:?} declares subscription metadata for unknown stream {:?}",
                    self.name,
                    stream
                );
            }
        }
        Ok(())
    }

    /// The physical table name owned by one of this connector's streams.
    pub fn table_for_stream(&self, stream: &str) -> String {
        if stream == self.name || stream.starts_with(&format!("{}_", self.name)) {
            stream.to_string()
        } else {
            format!("{}_{}", self.name, stream)
        }
    }
}
