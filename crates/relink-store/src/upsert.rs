//! Idempotent create: insert a row, or fetch the id of the row that
//! already holds the same unique key.

use rusqlite::{ToSql, Transaction};

use crate::error::{OpContext, StoreResult};

/// An entity created with "insert; on conflict, look up the existing id".
#[derive(Debug)]
pub(crate) struct UpsertTarget {
    pub table: &'static str,
    pub id_column: &'static str,
    /// Columns of the UNIQUE constraint used to find an existing row
    pub key_columns: &'static [&'static str],
    /// Columns written only when the row is inserted
    pub value_columns: &'static [&'static str],
    /// Operation name used in error messages
    pub op: &'static str,
}

pub(crate) const TAG_SET: UpsertTarget = UpsertTarget {
    table: "tag_set",
    id_column: "tag_set_id",
    key_columns: &["tags"],
    value_columns: &[],
    op: "upsert build tag set",
};

pub(crate) const LINK_INVOCATION: UpsertTarget = UpsertTarget {
    table: "link_invocation",
    id_column: "invocation_id",
    key_columns: &["program", "tag_set_id"],
    value_columns: &["captured_at"],
    op: "upsert link invocation",
};

pub(crate) const ARTIFACT: UpsertTarget = UpsertTarget {
    table: "artifact",
    id_column: "artifact_id",
    key_columns: &["file"],
    value_columns: &["package"],
    op: "upsert package artifact",
};

impl UpsertTarget {
    /// Returns the row id and whether this call inserted it.
    ///
    /// `key` and `values` bind to `key_columns` and `value_columns` in order.
    pub(crate) fn upsert(
        &self,
        tx: &Transaction<'_>,
        key: &[&dyn ToSql],
        values: &[&dyn ToSql],
    ) -> StoreResult<(i64, bool)> {
        debug_assert_eq!(key.len(), self.key_columns.len());
        debug_assert_eq!(values.len(), self.value_columns.len());

        let params: Vec<&dyn ToSql> = key.iter().chain(values.iter()).copied().collect();
        let inserted = tx.execute(&self.insert_sql(), params.as_slice()).op(self.op)?;
        if inserted == 1 {
            return Ok((tx.last_insert_rowid(), true));
        }

        let id = tx
            .query_row(&self.select_sql(), key, |row| row.get(0))
            .op(self.op)?;
        Ok((id, false))
    }

    fn insert_sql(&self) -> String {
        let columns: Vec<&str> = self
            .key_columns
            .iter()
            .chain(self.value_columns.iter())
            .copied()
            .collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT DO NOTHING",
            self.table,
            columns.join(", "),
            placeholders.join(", ")
        )
    }

    fn select_sql(&self) -> String {
        let conditions: Vec<String> = self
            .key_columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ?{}", column, i + 1))
            .collect();
        format!(
            "SELECT {} FROM {} WHERE {}",
            self.id_column,
            self.table,
            conditions.join(" AND ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_schema;
    use rusqlite::Connection;

    #[test]
    fn test_sql_shapes() {
        assert_eq!(
            LINK_INVOCATION.insert_sql(),
            "INSERT INTO link_invocation (program, tag_set_id, captured_at) VALUES (?1, ?2, ?3) ON CONFLICT DO NOTHING"
        );
        assert_eq!(
            LINK_INVOCATION.select_sql(),
            "SELECT invocation_id FROM link_invocation WHERE program = ?1 AND tag_set_id = ?2"
        );
    }

    #[test]
    fn test_upsert_returns_existing_id() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let tx = conn.transaction().unwrap();

        let (first, inserted) = TAG_SET.upsert(&tx, &[&r#"["a"]"#], &[]).unwrap();
        assert!(inserted);
        let (again, inserted) = TAG_SET.upsert(&tx, &[&r#"["a"]"#], &[]).unwrap();
        assert!(!inserted);
        assert_eq!(first, again);

        let (other, _) = TAG_SET.upsert(&tx, &[&r#"["b"]"#], &[]).unwrap();
        assert_ne!(first, other);
    }

    #[test]
    fn test_upsert_keeps_first_values() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let tx = conn.transaction().unwrap();

        let (id, _) = ARTIFACT.upsert(&tx, &[&"/c/fmt.a"], &[&"fmt"]).unwrap();
        let (same, inserted) = ARTIFACT.upsert(&tx, &[&"/c/fmt.a"], &[&"other"]).unwrap();
        assert_eq!(id, same);
        assert!(!inserted);

        let package: String = tx
            .query_row("SELECT package FROM artifact WHERE artifact_id = ?1", [id], |r| r.get(0))
            .unwrap();
        assert_eq!(package, "fmt");
    }
}
