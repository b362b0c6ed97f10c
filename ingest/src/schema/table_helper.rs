use ingest_config::shared::DestinationConfig;
use metrics::counter;
use tracing::{debug, error, info};

use crate::coordination::Coordinator;
use crate::destination::Destination;
use crate::error::{ErrorKind, IngestResult};
use crate::ingest_error;
use crate::metrics::{
    DESTINATION_ID_LABEL, INGEST_SCHEMA_PATCHES_TOTAL, INGEST_TABLES_CREATED_TOTAL,
    TABLE_NAME_LABEL,
};
use crate::schema::cache::TableCache;
use crate::schema::column_name::normalize_name;
use crate::schema::type_map::TypeMap;
use crate::types::{BatchHeader, SqlColumn, Table, TableKey};

/// Keeps the tables of one destination in step with the schema inferred from incoming records.
///
/// Schemas are cached per table. A table whose cached schema already satisfies the desired one
/// is returned without any coordination. Otherwise the change is applied while holding the
/// table's lock, after checking through the table's version that no other process changed the
/// table since it was cached.
///
/// Clones share the same cache.
#[derive(Debug, Clone)]
pub struct TableHelper<D, C> {
    destination_id: String,
    destination: D,
    coordinator: C,
    cache: TableCache,
    type_map: TypeMap,
    primary_key_fields: Vec<String>,
    remove_primary_key: bool,
}

impl<D, C> TableHelper<D, C>
where
    D: Destination + Clone + Send + Sync + 'static,
    C: Coordinator + Clone + Send + Sync + 'static,
{
    pub fn new(config: &DestinationConfig, destination: D, coordinator: C) -> Self {
        Self {
            destination_id: config.id.clone(),
            destination,
            coordinator,
            cache: TableCache::new(),
            type_map: TypeMap::with_overrides(config.kind, &config.column_types),
            primary_key_fields: config
                .primary_key_fields
                .iter()
                .map(|field| normalize_name(field))
                .collect(),
            remove_primary_key: config.remove_primary_key,
        }
    }

    pub fn destination_id(&self) -> &str {
        &self.destination_id
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    pub fn coordinator(&self) -> &C {
        &self.coordinator
    }

    /// Returns the cached schema of a table.
    pub fn cached_table(&self, table_name: &str) -> Option<Table> {
        self.cache.get(table_name)
    }

    /// Drops the cached schema of a table so the next call reloads it from the destination.
    pub fn refresh(&self, table_name: &str) {
        self.cache.remove(table_name);
    }

    /// Translates an inferred header into the table schema it requires.
    ///
    /// Fields whose type has no SQL mapping are left out of the table.
    pub fn map_table_schema(&self, header: &BatchHeader) -> Table {
        let mut table = Table::new(&header.table_name);

        for (name, field) in &header.fields {
            let column = match field.suggestion() {
                Some(suggestion) => SqlColumn {
                    sql_type: suggestion.sql_type.clone(),
                    column_type: suggestion.column_type.clone(),
                },
                None => {
                    let data_type = field.resolved_type();
                    let Some(sql_type) = self.type_map.sql_type(data_type) else {
                        error!(
                            destination_id = %self.destination_id,
                            table_name = %header.table_name,
                            field = %name,
                            %data_type,
                            "no sql type is mapped for the field type, column is omitted"
                        );
                        continue;
                    };
                    SqlColumn::new(sql_type)
                }
            };

            table.columns.insert(name.clone(), column);
        }

        table.primary_key_fields = self
            .primary_key_fields
            .iter()
            .filter(|field| header.fields.contains_key(*field))
            .cloned()
            .collect();
        table.delete_primary_key = self.remove_primary_key && self.primary_key_fields.is_empty();

        table
    }

    /// Makes sure the destination table satisfies `desired` and returns its schema.
    pub async fn ensure_table(&self, desired: &Table) -> IngestResult<Table> {
        let key = TableKey::new(&self.destination_id, &desired.name);

        let cached = match self.cache.get(&desired.name) {
            Some(cached) => cached,
            None => self.load_table(&key, desired).await?,
        };

        if cached.diff(desired).is_empty() {
            return Ok(cached);
        }

        self.coordinator.lock(&key).await?;
        let result = self.patch_locked(&key, desired).await;
        let unlocked = self.coordinator.unlock(&key).await;

        // A failed reconciliation may have left the live schema ahead of the cached one.
        let table = result.inspect_err(|_| self.refresh(&desired.name))?;
        unlocked?;

        Ok(table)
    }

    /// Loads a table seen for the first time, creating it when it does not exist.
    async fn load_table(&self, key: &TableKey, desired: &Table) -> IngestResult<Table> {
        // The version is read before the schema so a concurrent change can only make the cached
        // version look older than the schema it is stamped on.
        let version = self.coordinator.get_version(key).await?;

        let mut table = match self.destination.get_table_schema(&desired.name).await? {
            Some(live) => live,
            None => {
                self.coordinator.lock(key).await?;
                let result = self.create_locked(desired).await;
                let unlocked = self.coordinator.unlock(key).await;

                let table = result?;
                unlocked?;
                table
            }
        };
        table.version = version;
        table.delete_primary_key = false;

        Ok(self.cache.insert_if_absent(table))
    }

    async fn create_locked(&self, desired: &Table) -> IngestResult<Table> {
        if let Some(live) = self.destination.get_table_schema(&desired.name).await? {
            debug!(
                destination_id = %self.destination_id,
                table_name = %desired.name,
                "table was created by another process"
            );
            return Ok(live);
        }

        let mut table = desired.clone();
        table.delete_primary_key = false;
        self.destination.create_table(&table).await?;

        info!(
            destination_id = %self.destination_id,
            table_name = %table.name,
            columns = table.columns.len(),
            "created table"
        );
        counter!(
            INGEST_TABLES_CREATED_TOTAL,
            DESTINATION_ID_LABEL => self.destination_id.clone(),
            TABLE_NAME_LABEL => table.name.clone()
        )
        .increment(1);

        Ok(table)
    }

    async fn patch_locked(&self, key: &TableKey, desired: &Table) -> IngestResult<Table> {
        let cached = self.cache.get(&desired.name);

        // Another task of this process may have applied the change while we waited for the lock.
        if let Some(cached) = &cached
            && cached.diff(desired).is_empty()
        {
            return Ok(cached.clone());
        }

        let version = self.coordinator.get_version(key).await?;
        let mut table = match cached {
            Some(cached) if cached.version == version => cached,
            cached => {
                debug!(
                    destination_id = %self.destination_id,
                    table_name = %desired.name,
                    cached_version = ?cached.map(|table| table.version),
                    version,
                    "cached schema is stale, reloading"
                );

                let mut live = self
                    .destination
                    .get_table_schema(&desired.name)
                    .await?
                    .ok_or_else(|| {
                        ingest_error!(
                            ErrorKind::DestinationTableMissing,
                            "Cached table no longer exists",
                            format!("table `{}`", desired.name)
                        )
                    })?;
                live.version = version;
                live.delete_primary_key = false;
                self.cache.replace(live.clone());

                live
            }
        };

        let diff = table.diff(desired);
        if diff.is_empty() {
            return Ok(table);
        }

        self.destination.patch_table_schema(&diff).await?;
        let version = self.coordinator.increment_version(key).await?;

        info!(
            destination_id = %self.destination_id,
            table_name = %desired.name,
            added_columns = ?diff.columns.keys().collect::<Vec<_>>(),
            primary_key = ?diff.primary_key_fields,
            delete_primary_key = diff.delete_primary_key,
            version,
            "patched table schema"
        );
        counter!(
            INGEST_SCHEMA_PATCHES_TOTAL,
            DESTINATION_ID_LABEL => self.destination_id.clone(),
            TABLE_NAME_LABEL => desired.name.clone()
        )
        .increment(1);

        if let Some(patched) = self.cache.apply(&diff, version) {
            return Ok(patched);
        }

        table.apply(&diff);
        table.version = version;
        self.cache.replace(table.clone());

        Ok(table)
    }
}
