use crate::bail;
use crate::error::{ErrorKind, SnapshotResult};

/// Table name selecting every table of a schema.
pub const WILDCARD: &str = "*";

/// Schema that exists in every Postgres database.
pub const PUBLIC_SCHEMA: &str = "public";

/// Request to snapshot some or all tables of a single schema.
///
/// `table_names` is either empty, in which case there is nothing to snapshot, exactly
/// `["*"]` to select the whole schema, or the explicit list of tables to include.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub schema_name: String,
    pub table_names: Vec<String>,
}

impl Snapshot {
    pub fn new(schema_name: impl Into<String>, table_names: Vec<String>) -> Snapshot {
        Snapshot {
            schema_name: schema_name.into(),
            table_names,
        }
    }

    /// Creates a request for every table of `schema_name`.
    pub fn wildcard(schema_name: impl Into<String>) -> Snapshot {
        Snapshot::new(schema_name, vec![WILDCARD.to_string()])
    }

    /// Returns `true` when the request selects no table at all.
    pub fn has_no_tables(&self) -> bool {
        self.table_names.is_empty()
    }

    /// Returns `true` when the request selects the whole schema.
    pub fn is_wildcard(&self) -> bool {
        matches!(self.table_names.as_slice(), [table] if table == WILDCARD)
    }

    /// Groups table patterns into one request per schema.
    ///
    /// Accepted patterns are `table` (in the `public` schema), `schema.table` and `schema.*`.
    /// Schemas keep the order in which they first appear and duplicated tables are dropped. A
    /// wildcard selects the whole schema regardless of the other tables listed for it.
    pub fn from_table_patterns<S: AsRef<str>>(patterns: &[S]) -> SnapshotResult<Vec<Snapshot>> {
        let mut snapshots: Vec<Snapshot> = Vec::new();

        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            let (schema_name, table_name) = pattern
                .split_once('.')
                .unwrap_or((PUBLIC_SCHEMA, pattern));

            if schema_name.is_empty() || table_name.is_empty() {
                bail!(
                    ErrorKind::InvalidData,
                    "Invalid snapshot table pattern",
                    format!("`{pattern}` must be one of `table`, `schema.table` or `schema.*`")
                );
            }

            if schema_name == WILDCARD {
                bail!(
                    ErrorKind::InvalidData,
                    "Wildcard schemas are not supported in snapshot table patterns",
                    pattern
                );
            }

            let index = match snapshots
                .iter()
                .position(|snapshot| snapshot.schema_name == schema_name)
            {
                Some(index) => index,
                None => {
                    snapshots.push(Snapshot::new(schema_name, Vec::new()));
                    snapshots.len() - 1
                }
            };

            let snapshot = &mut snapshots[index];
            if snapshot.is_wildcard() {
                continue;
            }

            if table_name == WILDCARD {
                snapshot.table_names = vec![WILDCARD.to_string()];
            } else if !snapshot.table_names.iter().any(|table| table == table_name) {
                snapshot.table_names.push(table_name.to_string());
            }
        }

        Ok(snapshots)
    }
}
