//! Structured on-chain data as a tagged union
//!
//! Input is the detailed JSON schema used by chain indexers:
//!
//! ```text
//! {"constructor": 0, "fields": [ ... ]}
//! {"int": 42}
//! {"bytes": "deadbeef"}
//! {"list": [ ... ]}
//! {"map": [{"k": ..., "v": ...}]}
//! ```
//!
//! Objects with extra keys, missing keys, or wrongly typed values are
//! rejected rather than partially read.

use serde_json::{json, Map, Value};

use crate::{DecodeError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlutusData {
    Constr { index: u64, fields: Vec<PlutusData> },
    Map(Vec<(PlutusData, PlutusData)>),
    List(Vec<PlutusData>),
    Int(i64),
    Bytes(Vec<u8>),
}

fn single_key<'a>(obj: &'a Map<String, Value>) -> Option<(&'a str, &'a Value)> {
    if obj.len() == 1 {
        obj.iter().next().map(|(k, v)| (k.as_str(), v))
    } else {
        None
    }
}

impl PlutusData {
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| DecodeError::Shape(format!("expected object, got {}", value)))?;

        if obj.len() == 2 && obj.contains_key("constructor") && obj.contains_key("fields") {
            let index = obj["constructor"]
                .as_u64()
                .ok_or_else(|| DecodeError::Shape("constructor must be a non-negative integer".into()))?;
            let fields = obj["fields"]
                .as_array()
                .ok_or_else(|| DecodeError::Shape("fields must be an array".into()))?
                .iter()
                .map(Self::from_json)
                .collect::<Result<Vec<_>>>()?;
            return Ok(PlutusData::Constr { index, fields });
        }

        match single_key(obj) {
            Some(("int", v)) => v
                .as_i64()
                .map(PlutusData::Int)
                .ok_or_else(|| DecodeError::InvalidInt(v.to_string())),
            Some(("bytes", v)) => {
                let s = v
                    .as_str()
                    .ok_or_else(|| DecodeError::InvalidBytes(v.to_string()))?;
                hex::decode(s)
                    .map(PlutusData::Bytes)
                    .map_err(|e| DecodeError::InvalidBytes(format!("{}: {}", s, e)))
            }
            Some(("list", v)) => v
                .as_array()
                .ok_or_else(|| DecodeError::Shape("list must be an array".into()))?
                .iter()
                .map(Self::from_json)
                .collect::<Result<Vec<_>>>()
                .map(PlutusData::List),
            Some(("map", v)) => {
                let entries = v
                    .as_array()
                    .ok_or_else(|| DecodeError::Shape("map must be an array".into()))?;
                let mut pairs = Vec::with_capacity(entries.len());
                for entry in entries {
                    let kv = entry
                        .as_object()
                        .filter(|o| o.len() == 2)
                        .ok_or_else(|| DecodeError::Shape("map entry must be {k, v}".into()))?;
                    let (k, v) = match (kv.get("k"), kv.get("v")) {
                        (Some(k), Some(v)) => (k, v),
                        _ => return Err(DecodeError::Shape("map entry must be {k, v}".into())),
                    };
                    pairs.push((Self::from_json(k)?, Self::from_json(v)?));
                }
                Ok(PlutusData::Map(pairs))
            }
            _ => Err(DecodeError::Shape(format!("unrecognised object {}", value))),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            PlutusData::Constr { index, fields } => json!({
                "constructor": index,
                "fields": fields.iter().map(Self::to_json).collect::<Vec<_>>(),
            }),
            PlutusData::Map(pairs) => json!({
                "map": pairs
                    .iter()
                    .map(|(k, v)| json!({"k": k.to_json(), "v": v.to_json()}))
                    .collect::<Vec<_>>(),
            }),
            PlutusData::List(items) => json!({
                "list": items.iter().map(Self::to_json).collect::<Vec<_>>(),
            }),
            PlutusData::Int(i) => json!({ "int": i }),
            PlutusData::Bytes(b) => json!({ "bytes": hex::encode(b) }),
        }
    }

    /// Constructor index and fields, checking the field count
    pub fn expect_constr(&self, kind: &'static str, field_count: usize) -> Result<(u64, &[PlutusData])> {
        match self {
            PlutusData::Constr { index, fields } if fields.len() == field_count => {
                Ok((*index, fields.as_slice()))
            }
            PlutusData::Constr { fields, .. } => Err(DecodeError::FieldCount {
                kind,
                expected: field_count,
                actual: fields.len(),
            }),
            other => Err(DecodeError::Shape(format!("{} must be a constructor, got {:?}", kind, other))),
        }
    }

    pub fn expect_bytes(&self, field: &str) -> Result<&[u8]> {
        match self {
            PlutusData::Bytes(b) => Ok(b),
            other => Err(DecodeError::Shape(format!("{} must be bytes, got {:?}", field, other))),
        }
    }

    /// Non-negative integer
    pub fn expect_u64(&self, field: &str) -> Result<u64> {
        match self {
            PlutusData::Int(i) if *i >= 0 => Ok(*i as u64),
            PlutusData::Int(i) => Err(DecodeError::InvalidInt(format!("{} is negative: {}", field, i))),
            other => Err(DecodeError::Shape(format!("{} must be an integer, got {:?}", field, other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_nested() {
        let value = json!({
            "constructor": 1,
            "fields": [
                {"int": 42},
                {"bytes": "deadbeef"},
                {"list": [{"int": -1}]},
                {"map": [{"k": {"bytes": ""}, "v": {"int": 0}}]}
            ]
        });
        let data = PlutusData::from_json(&value).unwrap();
        let (index, fields) = data.expect_constr("test", 4).unwrap();
        assert_eq!(index, 1);
        assert_eq!(fields[0], PlutusData::Int(42));
        assert_eq!(fields[1], PlutusData::Bytes(vec![0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(fields[2], PlutusData::List(vec![PlutusData::Int(-1)]));
        assert_eq!(
            fields[3],
            PlutusData::Map(vec![(PlutusData::Bytes(vec![]), PlutusData::Int(0))])
        );
        assert_eq!(PlutusData::from_json(&data.to_json()).unwrap(), data);
    }

    #[test]
    fn test_rejects_ambiguous_objects() {
        assert!(PlutusData::from_json(&json!({"int": 1, "bytes": "00"})).is_err());
        assert!(PlutusData::from_json(&json!({"constructor": 0})).is_err());
        assert!(PlutusData::from_json(&json!({"constructor": 0, "fields": [], "x": 1})).is_err());
        assert!(PlutusData::from_json(&json!({"unknown": 1})).is_err());
        assert!(PlutusData::from_json(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_rejects_bad_leaf_values() {
        assert!(matches!(
            PlutusData::from_json(&json!({"bytes": "xyz"})),
            Err(DecodeError::InvalidBytes(_))
        ));
        assert!(matches!(
            PlutusData::from_json(&json!({"int": "12"})),
            Err(DecodeError::InvalidInt(_))
        ));
        assert!(PlutusData::from_json(&json!({"constructor": -1, "fields": []})).is_err());
        assert!(PlutusData::from_json(&json!({"map": [{"k": {"int": 1}}]})).is_err());
    }

    #[test]
    fn test_expect_helpers() {
        let constr = PlutusData::Constr { index: 0, fields: vec![PlutusData::Int(-5)] };
        assert!(matches!(
            constr.expect_constr("x", 2),
            Err(DecodeError::FieldCount { expected: 2, actual: 1, .. })
        ));
        assert!(PlutusData::Int(-5).expect_u64("t").is_err());
        assert_eq!(PlutusData::Int(5).expect_u64("t").unwrap(), 5);
        assert!(PlutusData::Int(5).expect_bytes("b").is_err());
    }
}
