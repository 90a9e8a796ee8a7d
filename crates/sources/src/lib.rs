use catalog::{ColumnDescriptor, Storage, TableDescriptor};
use connectors::{Registry, SecretStore};
use std::collections::BTreeMap;

/// One relational table owned by a discovered source.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DiscoveredTable {
    pub name: String,
    pub schema: Vec<ColumnDescriptor>,
    /// Opaque metadata for externally-replicated tables. Round-tripped
    /// from the connector definition, never interpreted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<serde_json::Value>,
}

/// A connector matched against the tables it physically owns. Discovery
/// always produces a fresh snapshot; these are never mutated in place.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DiscoveredSource {
    pub id: String,
    pub tables: Vec<DiscoveredTable>,
    pub missing_secrets: Vec<String>,
}

/// The result of one discovery pass: sources in registration order, plus
/// non-fatal warnings (e.g. table ownership collisions).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Discovery {
    pub sources: Vec<DiscoveredSource>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Match installed connectors against introspected tables and the secret
/// store. Purely local: one introspection pass, `SecretStore::has` checks,
/// and no external API calls, so it's safe to run on every UI refresh.
///
/// A stream claims the table named by its connector's naming convention
/// (see `ConnectorDefinition::table_for_stream`). If two connectors claim
/// the same table, the later-registered connector wins and the collision
/// is recorded as a warning rather than failing discovery.
#[tracing::instrument(skip_all)]
pub async fn discover(
    registry: &Registry,
    storage: &dyn Storage,
    secrets: &dyn SecretStore,
) -> anyhow::Result<Discovery> {
    let tables = catalog::introspect(storage).await?;
    let by_name: BTreeMap<&str, &TableDescriptor> =
        tables.iter().map(|t| (t.name.as_str(), t)).collect();

    // Table name -> owning connector, resolved in registration order so a
    // later registration displaces an earlier claim.
    let mut claims: BTreeMap<String, &str> = BTreeMap::new();
    let mut warnings = Vec::new();

    for connector in registry.iter() {
        let def = connector.config();
        for stream in &def.declared_streams {
            let table = def.table_for_stream(stream);
            if let Some(earlier) = claims.insert(table.clone(), &def.name) {
                if earlier != def.name {
                    warnings.push(format!(
                        "table '{table}' is declared by both '{earlier}' and '{}'; '{}' wins",
                        def.name, def.name
                    ));
                }
            }
        }
    }

    let mut sources = Vec::with_capacity(registry.len());
    for connector in registry.iter() {
        let def = connector.config();

        let mut owned = Vec::new();
        for stream in &def.declared_streams {
            let table = def.table_for_stream(stream);
            if claims.get(table.as_str()).copied() != Some(def.name.as_str()) {
                continue; // Claimed away by a later registration.
            }
            // Declared streams without a physical table yet are skipped;
            // they appear once the connector's own DDL has run.
            let Some(descriptor) = by_name.get(table.as_str()) else {
                continue;
            };
            if owned.iter().any(|t: &DiscoveredTable| t.name == table) {
                continue; // Two streams of one connector mapping to one table.
            }
            owned.push(DiscoveredTable {
                name: table,
                schema: descriptor.columns.clone(),
                subscription: def.subscriptions.get(stream).cloned(),
            });
        }

        let missing_secrets: Vec<String> = def
            .required_secrets
            .iter()
            .filter(|name| !secrets.has(name))
            .cloned()
            .collect();

        sources.push(DiscoveredSource {
            id: def.name.clone(),
            tables: owned,
            missing_secrets,
        });
    }

    for warning in &warnings {
        tracing::warn!(%warning, "discovery warning");
    }
    tracing::debug!(
        sources = sources.len(),
        tables = tables.len(),
        "discovery pass complete"
    );

    Ok(Discovery { sources, warnings })
}

/// Tables present in the database but claimed by no discovered source.
/// One introspection pass plus O(tables) set subtraction.
pub async fn orphan_tables(
    storage: &dyn Storage,
    sources: &[DiscoveredSource],
) -> anyhow::Result<Vec<TableDescriptor>> {
    let tables = catalog::introspect(storage).await?;
    let claimed: Vec<&str> = sources
        .iter()
        .flat_map(|s| s.tables.iter().map(|t| t.name.as_str()))
        .collect();
    Ok(catalog::orphans(&tables, claimed)
        .into_iter()
        .cloned()
        .collect())
}
