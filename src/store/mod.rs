//! SQLite access to the per-instrument metadata and segment tables.
//!
//! Tables are written once by ingestion and read through short-lived
//! read-only connections acquired per call, so concurrent readers never
//! contend with each other.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};

use crate::Error;
use crate::coordinate::LatLon;
use crate::metadata::{Metadata, TIME_FORMAT, TIME_FORMAT_LENIENT, Value};
use crate::segment::TriSegment;

// The column types the metadata schema configuration may use
const SQL_TYPES: [&str; 4] = ["integer", "real", "text", "timestamp"];

impl From<&Value> for rusqlite::types::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Int(v) => rusqlite::types::Value::Integer(*v),
            Value::Real(v) => rusqlite::types::Value::Real(*v),
            Value::Text(v) => rusqlite::types::Value::Text(v.clone()),
            Value::Timestamp(v) => {
                rusqlite::types::Value::Text(v.format(TIME_FORMAT).to_string())
            }
        }
    }
}

// Column names and types are schema-driven and end up inside SQL text;
// only plain identifiers ever get there
fn valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn declared_timestamp(decl_type: Option<&str>) -> bool {
    decl_type.is_some_and(|decl| {
        let decl = decl.to_ascii_lowercase();
        decl.contains("timestamp") || decl.contains("datetime")
    })
}

// ----- P R E D I C A T E S -----------------------------------------------------------

/// Comparison operators accepted in metadata predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CmpOp {
    pub fn parse(token: &str) -> Result<CmpOp, Error> {
        match token {
            "=" => Ok(CmpOp::Eq),
            "<" => Ok(CmpOp::Lt),
            ">" => Ok(CmpOp::Gt),
            "<=" => Ok(CmpOp::Le),
            ">=" => Ok(CmpOp::Ge),
            other => Err(Error::BadPredicate(format!("unknown comparator '{other}'"))),
        }
    }

    fn sql(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Lt => "<",
            CmpOp::Gt => ">",
            CmpOp::Le => "<=",
            CmpOp::Ge => ">=",
        }
    }
}

/// One `(column, comparator, value)` constraint; a query conjoins them
#[derive(Debug, Clone)]
pub struct Predicate {
    column: String,
    op: CmpOp,
    value: Value,
}

impl Predicate {
    pub fn new(column: &str, op: &str, value: Value) -> Result<Predicate, Error> {
        if !valid_identifier(column) {
            return Err(Error::BadPredicate(format!("bad column name '{column}'")));
        }
        Ok(Predicate {
            column: column.to_string(),
            op: CmpOp::parse(op)?,
            value,
        })
    }

    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }
}

// ----- M E T A D A T A   S T O R E ---------------------------------------------------

/// One instrument's metadata table
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    /// Handle on an existing database file
    #[must_use]
    pub fn open(path: &Path) -> MetadataStore {
        MetadataStore {
            path: path.to_path_buf(),
        }
    }

    /// Create the metadata table with the configured `(name, sql type)`
    /// columns, replacing any previous database at `path`
    pub fn create(path: &Path, columns: &[(String, String)]) -> Result<MetadataStore, Error> {
        if columns.is_empty() {
            return Err(Error::Invalid("metadata schema with no columns".to_string()));
        }
        for (name, sql_type) in columns {
            if !valid_identifier(name) {
                return Err(Error::Invalid(format!("bad column name '{name}'")));
            }
            if !SQL_TYPES.contains(&sql_type.to_ascii_lowercase().as_str()) {
                return Err(Error::Invalid(format!(
                    "unsupported column type '{sql_type}' for '{name}'"
                )));
            }
        }

        if path.exists() {
            std::fs::remove_file(path)?;
        }

        let conn = Connection::open(path)?;
        let spec = columns
            .iter()
            .map(|(name, sql_type)| format!("{name} {sql_type}"))
            .collect::<Vec<_>>()
            .join(", ");
        conn.execute(&format!("CREATE TABLE metadata ({spec})"), [])?;

        Ok(MetadataStore {
            path: path.to_path_buf(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Build a secondary index on one column
    pub fn create_index(&self, column: &str) -> Result<(), Error> {
        if !valid_identifier(column) {
            return Err(Error::Invalid(format!("bad column name '{column}'")));
        }
        let conn = Connection::open(&self.path)?;
        conn.execute(
            &format!("CREATE INDEX IF NOT EXISTS {column}_index ON metadata ({column})"),
            [],
        )?;
        Ok(())
    }

    /// Insert rows given in schema column order, in one transaction
    pub fn insert_rows(&self, rows: &[Vec<Value>]) -> Result<(), Error> {
        let mut conn = Connection::open(&self.path)?;
        let tx = conn.transaction()?;
        {
            let width = match rows.first() {
                Some(row) => row.len(),
                None => return Ok(()),
            };
            let placeholders = vec!["?"; width].join(", ");
            let mut stmt =
                tx.prepare(&format!("INSERT INTO metadata VALUES ({placeholders})"))?;
            for row in rows {
                let params: Vec<rusqlite::types::Value> =
                    row.iter().map(rusqlite::types::Value::from).collect();
                stmt.execute(rusqlite::params_from_iter(params))?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Stream all rows matching the conjunction of `predicates`, in the
    /// table's natural order
    pub fn query(
        &self,
        instrument: &str,
        predicates: &[Predicate],
    ) -> Result<Vec<Metadata>, Error> {
        let conn = self.read_only()?;
        let columns = table_columns(&conn)?;

        let mut sql = "SELECT * FROM metadata".to_string();
        let mut params: Vec<rusqlite::types::Value> = Vec::new();
        if !predicates.is_empty() {
            let mut parts = Vec::with_capacity(predicates.len());
            for predicate in predicates {
                if !columns.iter().any(|(name, _)| name == &predicate.column) {
                    return Err(Error::BadPredicate(format!(
                        "no column '{}' in metadata",
                        predicate.column
                    )));
                }
                parts.push(format!("{}{}?", predicate.column, predicate.op.sql()));
                params.push(rusqlite::types::Value::from(&predicate.value));
            }
            sql.push_str(" WHERE ");
            sql.push_str(&parts.join(" and "));
        }

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(params))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(row_to_metadata(instrument, row, &columns)?);
        }
        Ok(records)
    }

    /// All rows under the given observation ids. Duplicate input ids
    /// collapse; distinct products under one observation id are all
    /// returned, in the table's natural order.
    pub fn query_by_observation_id(
        &self,
        instrument: &str,
        observation_ids: &[&str],
    ) -> Result<Vec<Metadata>, Error> {
        let conn = self.read_only()?;
        let columns = table_columns(&conn)?;

        let mut stmt = conn.prepare("SELECT * FROM metadata WHERE observation_id=?")?;
        let mut seen = std::collections::BTreeSet::new();
        let mut records = Vec::new();
        for &oid in observation_ids {
            if !seen.insert(oid) {
                continue;
            }
            let mut rows = stmt.query([oid])?;
            while let Some(row) = rows.next()? {
                records.push(row_to_metadata(instrument, row, &columns)?);
            }
        }
        Ok(records)
    }

    fn read_only(&self) -> Result<Connection, Error> {
        Ok(Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY,
        )?)
    }
}

// Names and declared types of the metadata table columns
fn table_columns(conn: &Connection) -> Result<Vec<(String, Option<String>)>, Error> {
    let stmt = conn.prepare("SELECT * FROM metadata LIMIT 0")?;
    Ok(stmt
        .columns()
        .iter()
        .map(|c| (c.name().to_string(), c.decl_type().map(str::to_string)))
        .collect())
}

fn row_to_metadata(
    instrument: &str,
    row: &rusqlite::Row,
    columns: &[(String, Option<String>)],
) -> Result<Metadata, Error> {
    let mut record = Metadata::new(instrument);
    for (i, (name, decl_type)) in columns.iter().enumerate() {
        let value = match row.get_ref(i)? {
            ValueRef::Null => continue,
            ValueRef::Integer(v) => Value::Int(v),
            ValueRef::Real(v) => Value::Real(v),
            ValueRef::Text(bytes) => {
                let text = std::str::from_utf8(bytes)
                    .map_err(|e| Error::Invalid(format!("non-utf8 text in '{name}': {e}")))?;
                if declared_timestamp(decl_type.as_deref()) {
                    let parsed = NaiveDateTime::parse_from_str(text, TIME_FORMAT_LENIENT)
                        .map_err(|e| Error::Invalid(format!("bad timestamp '{text}': {e}")))?;
                    Value::Timestamp(parsed)
                } else {
                    Value::Text(text.to_string())
                }
            }
            ValueRef::Blob(_) => {
                return Err(Error::Invalid(format!("blob column '{name}' unsupported")));
            }
        };
        record.insert(name, value);
    }
    Ok(record)
}

// ----- S E G M E N T   S T O R E -----------------------------------------------------

/// One instrument's segment table: one row of eight fields per
/// triangular segment, keyed by segment id, with a secondary index by
/// observation
#[derive(Debug, Clone)]
pub struct SegmentStore {
    path: PathBuf,
}

impl SegmentStore {
    /// Handle on an existing database file
    #[must_use]
    pub fn open(path: &Path) -> SegmentStore {
        SegmentStore {
            path: path.to_path_buf(),
        }
    }

    /// Create the segment table, replacing any previous database
    pub fn create(path: &Path) -> Result<SegmentStore, Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE segments (
                segment_id INTEGER PRIMARY KEY,
                observation_id TEXT,
                lat0 REAL, lon0 REAL,
                lat1 REAL, lon1 REAL,
                lat2 REAL, lon2 REAL)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX observation_index ON segments (observation_id)",
            [],
        )?;
        Ok(SegmentStore {
            path: path.to_path_buf(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert `(segment id, observation id, segment)` rows in one
    /// transaction
    pub fn insert<'a>(
        &self,
        segments: impl IntoIterator<Item = (usize, &'a str, &'a TriSegment)>,
    ) -> Result<(), Error> {
        let mut conn = Connection::open(&self.path)?;
        let tx = conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO segments VALUES (?, ?, ?, ?, ?, ?, ?, ?)")?;
            for (id, observation_id, segment) in segments {
                let [v0, v1, v2] = segment.vertices();
                stmt.execute(rusqlite::params![
                    id as i64,
                    observation_id,
                    v0.lat(),
                    v0.lon(),
                    v1.lat(),
                    v1.lon(),
                    v2.lat(),
                    v2.lon(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Load `(observation id, segment)` for each segment id, in the
    /// given order
    pub fn segments_by_ids(&self, ids: &[usize]) -> Result<Vec<(String, TriSegment)>, Error> {
        let conn = self.read_only()?;
        let mut stmt = conn.prepare("SELECT * FROM segments WHERE segment_id=?")?;
        let mut segments = Vec::with_capacity(ids.len());
        for &id in ids {
            let mut rows = stmt.query([id as i64])?;
            let Some(row) = rows.next()? else {
                return Err(Error::CorruptArtifact(
                    self.path.display().to_string(),
                    format!("segment id {id} missing from the segment table"),
                ));
            };
            segments.push((row.get::<_, String>(1)?, row_to_segment(row)?));
        }
        Ok(segments)
    }

    /// Load all segments of one observation
    pub fn segments_for_observation(
        &self,
        observation_id: &str,
    ) -> Result<Vec<TriSegment>, Error> {
        let conn = self.read_only()?;
        let mut stmt = conn.prepare("SELECT * FROM segments WHERE observation_id=?")?;
        let mut rows = stmt.query([observation_id])?;
        let mut segments = Vec::new();
        while let Some(row) = rows.next()? {
            segments.push(row_to_segment(row)?);
        }
        Ok(segments)
    }

    fn read_only(&self) -> Result<Connection, Error> {
        Ok(Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY,
        )?)
    }
}

fn row_to_segment(row: &rusqlite::Row) -> Result<TriSegment, Error> {
    TriSegment::new(
        LatLon::new(row.get(2)?, row.get(3)?),
        LatLon::new(row.get(4)?, row.get(5)?),
        LatLon::new(row.get(6)?, row.get(7)?),
    )
}

// ----- T E S T S ---------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn schema() -> Vec<(String, String)> {
        vec![
            ("observation_id".to_string(), "TEXT".to_string()),
            ("lines".to_string(), "INTEGER".to_string()),
            ("emission_angle".to_string(), "REAL".to_string()),
            ("start_time".to_string(), "TIMESTAMP".to_string()),
        ]
    }

    fn timestamp(day: u32) -> Value {
        Value::Timestamp(
            NaiveDate::from_ymd_opt(2008, 5, day)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        )
    }

    fn populated_store(dir: &Path) -> Result<MetadataStore, Error> {
        let store = MetadataStore::create(&dir.join("ctx_metadata.db"), &schema())?;
        store.insert_rows(&[
            vec![
                Value::Text("B01".into()),
                Value::Int(1024),
                Value::Real(0.5),
                timestamp(1),
            ],
            vec![
                Value::Text("B02".into()),
                Value::Int(2048),
                Value::Real(11.25),
                timestamp(2),
            ],
            vec![
                Value::Text("B02".into()),
                Value::Int(2048),
                Value::Real(11.5),
                timestamp(2),
            ],
            vec![
                Value::Text("B03".into()),
                Value::Int(512),
                Value::Real(3.0),
                timestamp(9),
            ],
        ])?;
        store.create_index("observation_id")?;
        Ok(store)
    }

    #[test]
    fn predicate_queries() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let store = populated_store(dir.path())?;

        let all = store.query("ctx", &[])?;
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].observation_id()?, "B01");
        assert_eq!(all[0].int("lines")?, 1024);
        assert_eq!(all[0].real("emission_angle")?, 0.5);
        assert_eq!(
            all[0].timestamp("start_time")?,
            timestamp(1).as_timestamp().unwrap()
        );

        let big = store.query(
            "ctx",
            &[Predicate::new("lines", ">", Value::Int(1000))?],
        )?;
        assert_eq!(big.len(), 3);

        let narrow = store.query(
            "ctx",
            &[
                Predicate::new("lines", ">", Value::Int(1000))?,
                Predicate::new("emission_angle", "<=", Value::Real(0.5))?,
            ],
        )?;
        assert_eq!(narrow.len(), 1);
        assert_eq!(narrow[0].observation_id()?, "B01");

        let after = store.query(
            "ctx",
            &[Predicate::new("start_time", ">=", timestamp(2))?],
        )?;
        assert_eq!(after.len(), 3);
        Ok(())
    }

    #[test]
    fn bad_predicates_are_rejected() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let store = populated_store(dir.path())?;

        assert!(matches!(
            CmpOp::parse("!="),
            Err(Error::BadPredicate(_))
        ));
        assert!(Predicate::new("lines; DROP TABLE metadata", "=", Value::Int(1)).is_err());

        let unknown = Predicate::new("no_such_column", "=", Value::Int(1))?;
        assert!(matches!(
            store.query("ctx", &[unknown]),
            Err(Error::BadPredicate(_))
        ));
        Ok(())
    }

    #[test]
    fn by_observation_id() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let store = populated_store(dir.path())?;

        // Two products under B02 are both preserved
        let records = store.query_by_observation_id("ctx", &["B02"])?;
        assert_eq!(records.len(), 2);

        // Duplicate input ids collapse; unknown ids yield nothing
        let records = store.query_by_observation_id("ctx", &["B02", "B02", "B01", "nope"])?;
        assert_eq!(records.len(), 3);
        Ok(())
    }

    #[test]
    fn schema_validation() {
        let dir = tempfile::tempdir().unwrap();
        let bad_name = vec![("drop table".to_string(), "TEXT".to_string())];
        assert!(MetadataStore::create(&dir.path().join("a.db"), &bad_name).is_err());

        let bad_type = vec![("x".to_string(), "BLOB".to_string())];
        assert!(MetadataStore::create(&dir.path().join("b.db"), &bad_type).is_err());

        assert!(MetadataStore::create(&dir.path().join("c.db"), &[]).is_err());
    }

    #[test]
    fn segment_roundtrip() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let store = SegmentStore::create(&dir.path().join("ctx_segments.db"))?;

        let a = TriSegment::new(
            LatLon::new(2., 1.),
            LatLon::new(2., -1.),
            LatLon::new(-2., -1.),
        )?;
        let b = TriSegment::new(
            LatLon::new(1., 2.),
            LatLon::new(1., -2.),
            LatLon::new(-1., -2.),
        )?;
        store.insert([(0, "A", &a), (1, "A", &b), (2, "B", &a)])?;

        let loaded = store.segments_by_ids(&[1, 0])?;
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].0, "A");
        assert_eq!(loaded[0].1, b);
        assert_eq!(loaded[1].1, a);

        let of_a = store.segments_for_observation("A")?;
        assert_eq!(of_a.len(), 2);
        let of_c = store.segments_for_observation("C")?;
        assert!(of_c.is_empty());

        // A candidate id the table does not know is an artifact
        // consistency failure, not an empty result
        assert!(matches!(
            store.segments_by_ids(&[99]),
            Err(Error::CorruptArtifact(_, _))
        ));
        Ok(())
    }
}
