//! Observation metadata records: an instrument tag plus typed named
//! fields, with the JSON codec used at the service boundary.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde_json::json;

use crate::Error;

/// Suffix of the per-instrument metadata database file
pub const METADATA_DB_SUFFIX: &str = "_metadata.db";

/// Suffix of the per-instrument segment database file
pub const SEGMENT_DB_SUFFIX: &str = "_segments.db";

/// Suffix of the per-instrument segment tree artifact
pub const SEGMENT_TREE_SUFFIX: &str = "_segment_tree.bin";

/// The timestamp format used across all instruments
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

// Accepts any fractional-second width on input
pub(crate) const TIME_FORMAT_LENIENT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// A typed metadata field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Real(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Numeric view; integers widen to reals
    #[must_use]
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Real(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(v) => Some(*v),
            _ => None,
        }
    }
}

/// One observation's metadata: an immutable map of instrument-specific
/// fields. Produced by the external cumulative-index parser (or the
/// metadata store) and consumed by localizers and the query engine.
/// Equality is structural over the instrument tag and the full field
/// set.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    instrument: String,
    fields: BTreeMap<String, Value>,
}

impl Metadata {
    #[must_use]
    pub fn new(instrument: &str) -> Metadata {
        Metadata {
            instrument: instrument.to_string(),
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn from_pairs<'a>(
        instrument: &str,
        pairs: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> Metadata {
        let mut metadata = Metadata::new(instrument);
        for (name, value) in pairs {
            metadata.insert(name, value);
        }
        metadata
    }

    #[must_use]
    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn insert(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The observation primary key. Instruments without a native
    /// observation id store their configured substitute under the same
    /// column, so this lookup is uniform.
    pub fn observation_id(&self) -> Result<&str, Error> {
        self.text("observation_id")
    }

    /// A numeric field; integer values widen
    pub fn real(&self, name: &str) -> Result<f64, Error> {
        let value = self.require(name)?;
        value
            .as_real()
            .ok_or_else(|| Error::BadParam(name.to_string(), format!("{value:?}")))
    }

    pub fn int(&self, name: &str) -> Result<i64, Error> {
        let value = self.require(name)?;
        value
            .as_int()
            .ok_or_else(|| Error::BadParam(name.to_string(), format!("{value:?}")))
    }

    pub fn text(&self, name: &str) -> Result<&str, Error> {
        let value = self.require(name)?;
        value
            .as_text()
            .ok_or_else(|| Error::BadParam(name.to_string(), format!("{value:?}")))
    }

    pub fn timestamp(&self, name: &str) -> Result<NaiveDateTime, Error> {
        let value = self.require(name)?;
        value
            .as_timestamp()
            .ok_or_else(|| Error::BadParam(name.to_string(), format!("{value:?}")))
    }

    fn require(&self, name: &str) -> Result<&Value, Error> {
        self.fields
            .get(name)
            .ok_or_else(|| Error::MissingField(name.to_string()))
    }
}

// ----- J S O N   C O D E C -----------------------------------------------------------

// Timestamps do not survive plain JSON, so they travel in a tagged
// wrapper object the peers on the service boundary agree on:
// {"__datetime__": {"__val__": ..., "__fmt__": ...}}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Int(v) => json!(v),
        Value::Real(v) => json!(v),
        Value::Text(v) => json!(v),
        Value::Timestamp(v) => json!({
            "__datetime__": {
                "__val__": v.format(TIME_FORMAT).to_string(),
                "__fmt__": TIME_FORMAT,
            }
        }),
    }
}

fn value_from_json(value: &serde_json::Value) -> Result<Value, Error> {
    if let Some(number) = value.as_i64() {
        return Ok(Value::Int(number));
    }
    if let Some(number) = value.as_f64() {
        return Ok(Value::Real(number));
    }
    if let Some(text) = value.as_str() {
        return Ok(Value::Text(text.to_string()));
    }
    if let Some(wrapper) = value.get("__datetime__") {
        let Some(val) = wrapper.get("__val__").and_then(serde_json::Value::as_str) else {
            return Err(Error::Invalid("datetime wrapper without __val__".to_string()));
        };
        let parsed = NaiveDateTime::parse_from_str(val, TIME_FORMAT_LENIENT)
            .map_err(|e| Error::Invalid(format!("bad datetime '{val}': {e}")))?;
        return Ok(Value::Timestamp(parsed));
    }
    Err(Error::Invalid(format!("unsupported metadata value: {value}")))
}

/// Encode records for the service boundary
pub fn to_json(records: &[Metadata]) -> Result<String, Error> {
    let encoded: Vec<serde_json::Value> = records
        .iter()
        .map(|record| {
            let mut object = serde_json::Map::new();
            object.insert("instrument".to_string(), json!(record.instrument()));
            for (name, value) in record.fields() {
                object.insert(name.to_string(), value_to_json(value));
            }
            serde_json::Value::Object(object)
        })
        .collect();
    Ok(serde_json::to_string(&encoded)?)
}

/// Decode records from the service boundary
pub fn from_json(text: &str) -> Result<Vec<Metadata>, Error> {
    let parsed: serde_json::Value = serde_json::from_str(text)?;
    let Some(array) = parsed.as_array() else {
        return Err(Error::Invalid("expected a JSON array of records".to_string()));
    };

    let mut records = Vec::with_capacity(array.len());
    for entry in array {
        let Some(object) = entry.as_object() else {
            return Err(Error::Invalid("expected a JSON object record".to_string()));
        };
        let Some(instrument) = object.get("instrument").and_then(serde_json::Value::as_str)
        else {
            return Err(Error::Invalid("record without instrument tag".to_string()));
        };

        let mut record = Metadata::new(instrument);
        for (name, value) in object {
            if name == "instrument" {
                continue;
            }
            record.insert(name, value_from_json(value)?);
        }
        records.push(record);
    }
    Ok(records)
}

// ----- T E S T S ---------------------------------------------------------------------
