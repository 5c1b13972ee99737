//! Wire encodings: a tagged binary tree, a JSON envelope, and the two-pass
//! deserializer / NaN-suppressing serializer that bridge both to
//! [`crate::dataset::Dataset`].
//!
//! Grounded on `auxiliary/serialization/serializer.hpp` and
//! `deserializer.hpp`'s design: the binary tree and JSON are two renderings
//! of the same tagged map/array/scalar [`Value`], with JSON carrying the
//! extra `"inf"`/`"-inf"`/`null` string conventions for values binary floats
//! represent natively.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use gat_core::component::ComponentKind;
use gat_core::error::GatError;

use crate::dataset::{AttrValue, ComponentBuffer, Dataset, ElementRecord};

/// A tagged binary/JSON tree node. Maps preserve insertion order (unlike a
/// `BTreeMap`) because envelope key order is meaningful for pretty-printing.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    Map(Vec<(String, Value)>),
}

impl Value {
    fn as_map(&self) -> Result<&[(String, Value)], GatError> {
        match self {
            Value::Map(m) => Ok(m),
            _ => Err(GatError::SerializationError("expected a map".into())),
        }
    }

    fn as_array(&self) -> Result<&[Value], GatError> {
        match self {
            Value::Array(a) => Ok(a),
            _ => Err(GatError::SerializationError("expected an array".into())),
        }
    }

    fn as_str(&self) -> Result<&str, GatError> {
        match self {
            Value::Str(s) => Ok(s),
            _ => Err(GatError::SerializationError("expected a string".into())),
        }
    }

    fn as_bool(&self) -> Result<bool, GatError> {
        match self {
            Value::Bool(b) => Ok(*b),
            _ => Err(GatError::SerializationError("expected a bool".into())),
        }
    }

    fn map_get<'a>(map: &'a [(String, Value)], key: &str) -> Option<&'a Value> {
        map.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

// --- Binary tagged encoding --------------------------------------------

const TAG_NIL: u8 = 0x00;
const TAG_FALSE: u8 = 0x01;
const TAG_TRUE: u8 = 0x02;
const TAG_INT: u8 = 0x03;
const TAG_UINT: u8 = 0x04;
const TAG_FLOAT: u8 = 0x05;
const TAG_STR: u8 = 0x06;
const TAG_ARRAY: u8 = 0x07;
const TAG_MAP: u8 = 0x08;

/// Encode `value` as a tagged binary tree. Maps/arrays declare their
/// element count up front as an unsigned 32-bit integer.
pub fn to_binary(value: &Value) -> Result<Vec<u8>, GatError> {
    let mut buf = Vec::new();
    write_binary(value, &mut buf)?;
    Ok(buf)
}

fn write_binary(value: &Value, buf: &mut Vec<u8>) -> Result<(), GatError> {
    match value {
        Value::Nil => buf.push(TAG_NIL),
        Value::Bool(false) => buf.push(TAG_FALSE),
        Value::Bool(true) => buf.push(TAG_TRUE),
        Value::Int(i) => {
            buf.push(TAG_INT);
            buf.extend_from_slice(&i.to_le_bytes());
        }
        Value::UInt(u) => {
            buf.push(TAG_UINT);
            buf.extend_from_slice(&u.to_le_bytes());
        }
        Value::Float(f) => {
            buf.push(TAG_FLOAT);
            buf.extend_from_slice(&f.to_le_bytes());
        }
        Value::Str(s) => {
            buf.push(TAG_STR);
            write_len(s.len(), buf)?;
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Array(items) => {
            buf.push(TAG_ARRAY);
            write_len(items.len(), buf)?;
            for item in items {
                write_binary(item, buf)?;
            }
        }
        Value::Map(entries) => {
            buf.push(TAG_MAP);
            write_len(entries.len(), buf)?;
            for (k, v) in entries {
                write_len(k.len(), buf)?;
                buf.extend_from_slice(k.as_bytes());
                write_binary(v, buf)?;
            }
        }
    }
    Ok(())
}

fn write_len(len: usize, buf: &mut Vec<u8>) -> Result<(), GatError> {
    let len: u32 = len
        .try_into()
        .map_err(|_| GatError::SerializationError("map/array size exceeds 32-bit limit".into()))?;
    buf.extend_from_slice(&len.to_le_bytes());
    Ok(())
}

pub fn from_binary(bytes: &[u8]) -> Result<Value, GatError> {
    let mut cursor = 0usize;
    let value = read_binary(bytes, &mut cursor)?;
    Ok(value)
}

fn take<'a>(bytes: &'a [u8], cursor: &mut usize, n: usize) -> Result<&'a [u8], GatError> {
    let slice = bytes
        .get(*cursor..*cursor + n)
        .ok_or_else(|| GatError::SerializationError("unexpected end of binary stream".into()))?;
    *cursor += n;
    Ok(slice)
}

fn read_len(bytes: &[u8], cursor: &mut usize) -> Result<usize, GatError> {
    let raw = take(bytes, cursor, 4)?;
    Ok(u32::from_le_bytes(raw.try_into().unwrap()) as usize)
}

fn read_binary(bytes: &[u8], cursor: &mut usize) -> Result<Value, GatError> {
    let tag = *take(bytes, cursor, 1)?.first().unwrap();
    match tag {
        TAG_NIL => Ok(Value::Nil),
        TAG_FALSE => Ok(Value::Bool(false)),
        TAG_TRUE => Ok(Value::Bool(true)),
        TAG_INT => Ok(Value::Int(i64::from_le_bytes(take(bytes, cursor, 8)?.try_into().unwrap()))),
        TAG_UINT => Ok(Value::UInt(u64::from_le_bytes(take(bytes, cursor, 8)?.try_into().unwrap()))),
        TAG_FLOAT => Ok(Value::Float(f64::from_le_bytes(take(bytes, cursor, 8)?.try_into().unwrap()))),
        TAG_STR => {
            let len = read_len(bytes, cursor)?;
            let raw = take(bytes, cursor, len)?;
            Ok(Value::Str(
                String::from_utf8(raw.to_vec()).map_err(|e| GatError::SerializationError(e.to_string()))?,
            ))
        }
        TAG_ARRAY => {
            let len = read_len(bytes, cursor)?;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(read_binary(bytes, cursor)?);
            }
            Ok(Value::Array(items))
        }
        TAG_MAP => {
            let len = read_len(bytes, cursor)?;
            let mut entries = Vec::with_capacity(len);
            for _ in 0..len {
                let klen = read_len(bytes, cursor)?;
                let kraw = take(bytes, cursor, klen)?;
                let key = String::from_utf8(kraw.to_vec()).map_err(|e| GatError::SerializationError(e.to_string()))?;
                let value = read_binary(bytes, cursor)?;
                entries.push((key, value));
            }
            Ok(Value::Map(entries))
        }
        other => Err(GatError::SerializationError(format!("unexpected value type tag {other}"))),
    }
}

// --- JSON rendering -----------------------------------------------------

/// Render `value` as JSON, with `±∞` as the strings `"inf"`/`"-inf"` and NaN
/// as `null`. At nesting depth `<= max_indent_level` the output is
/// multi-line and indented; beyond it, elements are space-separated on one
/// line (mirrors the envelope's `max_indent_level` knob: 4 for batch, 3 for
/// single datasets).
pub fn to_json_pretty(value: &Value, max_indent_level: usize) -> String {
    let mut out = String::new();
    write_json(value, max_indent_level, 0, &mut out);
    out
}

fn write_json(value: &Value, max_indent: usize, depth: usize, out: &mut String) {
    match value {
        Value::Nil => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(i) => {
            let _ = write!(out, "{i}");
        }
        Value::UInt(u) => {
            let _ = write!(out, "{u}");
        }
        Value::Float(f) => {
            if f.is_nan() {
                out.push_str("null");
            } else if f.is_infinite() {
                out.push_str(if *f > 0.0 { "\"inf\"" } else { "\"-inf\"" });
            } else {
                let _ = write!(out, "{f}");
            }
        }
        Value::Str(s) => {
            let _ = write!(out, "{}", serde_json::Value::String(s.clone()));
        }
        Value::Array(items) => write_collection(items.iter().map(|v| (None, v)), '[', ']', max_indent, depth, out),
        Value::Map(entries) => write_collection(
            entries.iter().map(|(k, v)| (Some(k.as_str()), v)),
            '{',
            '}',
            max_indent,
            depth,
            out,
        ),
    }
}

fn write_collection<'a>(
    items: impl ExactSizeIterator<Item = (Option<&'a str>, &'a Value)>,
    open: char,
    close: char,
    max_indent: usize,
    depth: usize,
    out: &mut String,
) {
    let pretty = depth <= max_indent;
    let count = items.len();
    out.push(open);
    if count == 0 {
        out.push(close);
        return;
    }
    let indent = "  ".repeat(depth + 1);
    for (i, (key, v)) in items.enumerate() {
        if pretty {
            out.push('\n');
            out.push_str(&indent);
        }
        if let Some(k) = key {
            let _ = write!(out, "{}: ", serde_json::Value::String(k.to_string()));
        }
        write_json(v, max_indent, depth + 1, out);
        if i + 1 < count {
            out.push(',');
            if !pretty {
                out.push(' ');
            }
        }
    }
    if pretty {
        out.push('\n');
        out.push_str(&"  ".repeat(depth));
    }
    out.push(close);
}

/// Parse JSON into a [`Value`], mapping the string sentinels `"inf"`/`"-inf"`
/// back to floats wherever a number is structurally expected (callers that
/// need strict string/float typing should inspect the original text; this
/// tree is lossy about that distinction the same way the binary form is
/// lossless about it, since JSON itself cannot carry ±∞ as a number).
pub fn from_json(text: &str) -> Result<Value, GatError> {
    let raw: serde_json::Value = serde_json::from_str(text)?;
    Ok(json_to_value(&raw))
}

fn json_to_value(v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                Value::UInt(u)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => match s.as_str() {
            "inf" => Value::Float(f64::INFINITY),
            "-inf" => Value::Float(f64::NEG_INFINITY),
            _ => Value::Str(s.clone()),
        },
        serde_json::Value::Array(items) => Value::Array(items.iter().map(json_to_value).collect()),
        serde_json::Value::Object(map) => Value::Map(map.iter().map(|(k, v)| (k.clone(), json_to_value(v))).collect()),
    }
}

// --- Dataset envelope <-> Value -----------------------------------------

fn attr_value_to_value(v: &AttrValue) -> Value {
    match v {
        AttrValue::Nil => Value::Nil,
        AttrValue::Int8(i) => Value::Int(*i as i64),
        AttrValue::Int32(i) => Value::Int(*i as i64),
        AttrValue::Int64(i) => Value::Int(*i),
        AttrValue::Double(f) => Value::Float(*f),
        AttrValue::Double3(arr) => Value::Array(arr.iter().map(|f| Value::Float(*f)).collect()),
    }
}

fn value_to_attr(v: &Value, breadcrumb: &str) -> Result<AttrValue, GatError> {
    match v {
        Value::Nil => Ok(AttrValue::Nil),
        Value::Int(i) => Ok(AttrValue::Int64(*i)),
        Value::UInt(u) => i64::try_from(*u)
            .map(AttrValue::Int64)
            .map_err(|_| GatError::SerializationError(format!("{breadcrumb}: integer overflow on narrowing"))),
        Value::Float(f) => Ok(AttrValue::Double(*f)),
        Value::Array(items) => {
            if items.len() != 3 {
                return Err(GatError::SerializationError(format!(
                    "{breadcrumb}: array length {} != 3 for a three-phase value",
                    items.len()
                )));
            }
            let mut out = [0.0; 3];
            for (i, item) in items.iter().enumerate() {
                out[i] = match item {
                    Value::Nil => f64::NAN,
                    Value::Float(f) => *f,
                    Value::Int(v) => *v as f64,
                    _ => {
                        return Err(GatError::SerializationError(format!(
                            "{breadcrumb}[{i}]: unexpected value type in three-phase array"
                        )))
                    }
                };
            }
            Ok(AttrValue::Double3(out))
        }
        _ => Err(GatError::SerializationError(format!("{breadcrumb}: unexpected value type"))),
    }
}

/// A fully decoded dataset envelope before it is folded into a [`Dataset`]:
/// `version`/`type` plus the component-wise scenario element lists produced
/// by the deserializer's parse pass.
pub struct Envelope {
    pub version: String,
    pub shape_name: String,
    pub is_batch: bool,
}

/// Pre-parse: validate the envelope shape and, per (scenario, component),
/// record whether any element is a map (forward-compat skipping needs to
/// know this) and the element count (to derive uniform vs. ragged).
struct PreParsed<'a> {
    envelope: Envelope,
    /// component -> per-scenario element arrays (borrowed from the parsed tree)
    data: BTreeMap<String, Vec<&'a [Value]>>,
}

fn pre_parse(root: &Value) -> Result<PreParsed<'_>, GatError> {
    let map = root.as_map()?;
    let version = Value::map_get(map, "version")
        .ok_or_else(|| GatError::SerializationError("envelope missing `version`".into()))?
        .as_str()?
        .to_string();
    let shape_name = Value::map_get(map, "type")
        .ok_or_else(|| GatError::SerializationError("envelope missing `type`".into()))?
        .as_str()?
        .to_string();
    let is_batch = Value::map_get(map, "is_batch")
        .ok_or_else(|| GatError::SerializationError("envelope missing `is_batch`".into()))?
        .as_bool()?;
    let data_value = Value::map_get(map, "data")
        .ok_or_else(|| GatError::SerializationError("envelope missing `data`".into()))?;

    let scenario_maps: Vec<&[(String, Value)]> = if is_batch {
        data_value
            .as_array()?
            .iter()
            .map(|v| v.as_map())
            .collect::<Result<_, _>>()?
    } else {
        vec![data_value.as_map()?]
    };

    let mut data: BTreeMap<String, Vec<&[Value]>> = BTreeMap::new();
    for kind in ComponentKind::ALL {
        let mut per_scenario = Vec::with_capacity(scenario_maps.len());
        let mut present = false;
        for scenario_map in &scenario_maps {
            match Value::map_get(scenario_map, kind.name()) {
                Some(v) => {
                    present = true;
                    per_scenario.push(v.as_array()?);
                }
                None => per_scenario.push(&[][..]),
            }
        }
        if present {
            data.insert(kind.name().to_string(), per_scenario);
        }
    }

    Ok(PreParsed {
        envelope: Envelope { version, shape_name, is_batch },
        data,
    })
}

/// Two-pass deserialize an envelope [`Value`] into a [`Dataset`]. `attributes`
/// (the envelope's declared positional attribute lists) governs whether an
/// element is decoded as a map (`attribute -> value`) or a positional array.
pub fn deserialize_dataset(root: &Value) -> Result<(Envelope, Dataset), GatError> {
    let pre = pre_parse(root)?;
    let attr_decls = Value::map_get(root.as_map()?, "attributes")
        .map(|v| v.as_map())
        .transpose()?
        .unwrap_or(&[]);

    let batch_size = if pre.envelope.is_batch {
        root.as_map()?
            .iter()
            .find(|(k, _)| k == "data")
            .map(|(_, v)| v.as_array().map(|a| a.len()).unwrap_or(0))
            .unwrap_or(0)
    } else {
        1
    };
    let mut dataset = Dataset::new(pre.envelope.is_batch, batch_size);

    for (kind_name, per_scenario) in &pre.data {
        let kind = ComponentKind::ALL
            .iter()
            .copied()
            .find(|k| k.name() == kind_name)
            .expect("kind_name comes from ComponentKind::ALL");

        let declared_attrs: Option<Vec<String>> = Value::map_get(attr_decls, kind_name)
            .map(|v| v.as_array())
            .transpose()?
            .map(|arr| arr.iter().map(|v| v.as_str().map(|s| s.to_string())).collect::<Result<_, _>>())
            .transpose()?;

        let has_any_map = per_scenario.iter().any(|elems| elems.iter().any(|e| matches!(e, Value::Map(_))));
        if declared_attrs.is_none() && !has_any_map {
            // No declared attributes and nothing but positional arrays with
            // nothing to position against: skip, matching the fast path for
            // "no declared attribute intersects destination and no maps
            // present."
            continue;
        }

        let total_elements: usize = per_scenario.iter().map(|s| s.len()).sum();
        let counts: Vec<usize> = per_scenario.iter().map(|s| s.len()).collect();
        let uniform = counts.windows(2).all(|w| w[0] == w[1]);

        let mut rows: Vec<ElementRecord> = Vec::with_capacity(total_elements);
        for (scenario_idx, elems) in per_scenario.iter().enumerate() {
            for (elem_idx, elem) in elems.iter().enumerate() {
                let mut record = ElementRecord::new();
                match elem {
                    Value::Map(fields) => {
                        for (attr_name, v) in fields {
                            let crumb = format!("{kind_name}/{scenario_idx}/{elem_idx}/{attr_name}");
                            record.insert(attr_name.clone(), value_to_attr(v, &crumb)?);
                        }
                    }
                    Value::Array(values) => {
                        let Some(attrs) = &declared_attrs else {
                            return Err(GatError::SerializationError(format!(
                                "{kind_name}/{scenario_idx}/{elem_idx}: positional array with no declared attribute list"
                            )));
                        };
                        if values.len() != attrs.len() {
                            return Err(GatError::SerializationError(format!(
                                "{kind_name}/{scenario_idx}/{elem_idx}: element array length {} != declared attribute count {}",
                                values.len(),
                                attrs.len()
                            )));
                        }
                        for (attr_name, v) in attrs.iter().zip(values) {
                            let crumb = format!("{kind_name}/{scenario_idx}/{elem_idx}/{attr_name}");
                            record.insert(attr_name.clone(), value_to_attr(v, &crumb)?);
                        }
                    }
                    _ => {
                        return Err(GatError::SerializationError(format!(
                            "{kind_name}/{scenario_idx}/{elem_idx}: element must be a map or an array"
                        )))
                    }
                }
                rows.push(record);
            }
        }

        if uniform {
            let eps = counts.first().copied().unwrap_or(0) as i64;
            dataset.add_buffer(kind, eps, total_elements, None, rows)?;
        } else {
            let mut indptr = Vec::with_capacity(counts.len() + 1);
            let mut running = 0i64;
            indptr.push(0);
            for c in &counts {
                running += *c as i64;
                indptr.push(running);
            }
            dataset.add_buffer(kind, -1, total_elements, Some(indptr), rows)?;
        }

        if let Some(attrs) = declared_attrs {
            dataset.set_attribute_order(kind, attrs);
        }
    }

    Ok((pre.envelope, dataset))
}

/// Single-pass serialize a [`Dataset`] into an envelope [`Value`]. A
/// compact-list mode first scans each column/field; attributes that are
/// NaN/Nil for every element across every scenario are omitted from both
/// the `attributes` declaration and the emitted elements.
pub fn serialize_dataset(shape_name: &str, version: &str, dataset: &Dataset) -> Value {
    let mut attributes: Vec<(String, Value)> = Vec::new();
    let mut per_scenario_maps: Vec<Vec<(String, Value)>> = vec![Vec::new(); dataset.batch_size().max(1)];

    for kind in dataset.components() {
        let Some(slot) = dataset.slot(kind) else { continue };
        let all_attrs = collect_attribute_names(slot);
        let live_attrs: Vec<String> = all_attrs
            .into_iter()
            .filter(|attr| attr == "id" || !column_is_all_nan(dataset, kind, attr))
            .collect();

        if !live_attrs.is_empty() {
            attributes.push((
                kind.name().to_string(),
                Value::Array(live_attrs.iter().map(|a| Value::Str(a.clone())).collect()),
            ));
        }

        for (scenario_idx, scenario_map) in per_scenario_maps.iter_mut().enumerate() {
            let span = dataset.get_span(kind, scenario_idx);
            let elements: Vec<Value> = match span {
                Ok(rows) => rows
                    .iter()
                    .map(|row| {
                        Value::Array(
                            live_attrs
                                .iter()
                                .map(|a| attr_value_to_value(row.get(a).unwrap_or(&AttrValue::Nil)))
                                .collect(),
                        )
                    })
                    .collect(),
                Err(_) => {
                    let n = dataset.elements_per_scenario(kind, scenario_idx).unwrap_or(0);
                    (0..n)
                        .map(|i| {
                            Value::Array(
                                live_attrs
                                    .iter()
                                    .map(|a| {
                                        let col = dataset.get_column(kind, a, scenario_idx).unwrap_or_default();
                                        attr_value_to_value(col.get(i).unwrap_or(&AttrValue::Nil))
                                    })
                                    .collect(),
                            )
                        })
                        .collect()
                }
            };
            scenario_map.push((kind.name().to_string(), Value::Array(elements)));
        }
    }

    let data = if dataset.is_batch {
        Value::Array(per_scenario_maps.into_iter().map(Value::Map).collect())
    } else {
        Value::Map(per_scenario_maps.into_iter().next().unwrap_or_default())
    };

    Value::Map(vec![
        ("version".to_string(), Value::Str(version.to_string())),
        ("type".to_string(), Value::Str(shape_name.to_string())),
        ("is_batch".to_string(), Value::Bool(dataset.is_batch)),
        ("attributes".to_string(), Value::Map(attributes)),
        ("data".to_string(), data),
    ])
}

fn collect_attribute_names(slot: &crate::dataset::ComponentSlot) -> Vec<String> {
    if let Some(order) = &slot.attribute_order {
        return order.clone();
    }
    match &slot.buffer {
        ComponentBuffer::Row(rows) => {
            let mut names: Vec<String> = Vec::new();
            for row in rows {
                for key in row.keys() {
                    if !names.contains(key) {
                        names.push(key.clone());
                    }
                }
            }
            names
        }
        ComponentBuffer::Columnar(cols) => cols.keys().cloned().collect(),
    }
}

fn column_is_all_nan(dataset: &Dataset, kind: ComponentKind, attr: &str) -> bool {
    for scenario in 0..dataset.batch_size().max(1) {
        let values = dataset.get_column(kind, attr, scenario).unwrap_or_default();
        if values.iter().any(|v| !v.is_nil_or_nan()) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::AttrValue;

    #[test]
    fn binary_round_trip_preserves_tree_shape() {
        let value = Value::Map(vec![
            ("version".to_string(), Value::Str("1.0.0".to_string())),
            ("is_batch".to_string(), Value::Bool(false)),
            ("n".to_string(), Value::Int(-5)),
            ("x".to_string(), Value::Float(f64::INFINITY)),
            ("items".to_string(), Value::Array(vec![Value::Nil, Value::UInt(7)])),
        ]);
        let bytes = to_binary(&value).unwrap();
        let back = from_binary(&bytes).unwrap();
        assert_eq!(value, back);
    }

    #[test]
    fn json_infinity_round_trips_through_string_sentinel() {
        let value = Value::Float(f64::INFINITY);
        let json = to_json_pretty(&value, 3);
        assert_eq!(json, "\"inf\"");
        let back = from_json(&json).unwrap();
        assert_eq!(back, Value::Float(f64::INFINITY));
    }

    #[test]
    fn json_nan_serializes_to_null() {
        let json = to_json_pretty(&Value::Float(f64::NAN), 3);
        assert_eq!(json, "null");
    }

    #[test]
    fn deserialize_skips_unknown_attribute_names() {
        let root = Value::Map(vec![
            ("version".to_string(), Value::Str("1.0.0".to_string())),
            ("type".to_string(), Value::Str("input".to_string())),
            ("is_batch".to_string(), Value::Bool(false)),
            ("attributes".to_string(), Value::Map(vec![])),
            (
                "data".to_string(),
                Value::Map(vec![(
                    "node".to_string(),
                    Value::Array(vec![Value::Map(vec![
                        ("id".to_string(), Value::Int(1)),
                        ("u_rated".to_string(), Value::Float(10_000.0)),
                        ("bogus_future_attr".to_string(), Value::Int(99)),
                    ])]),
                )]),
            ),
        ]);
        let (_, dataset) = deserialize_dataset(&root).unwrap();
        let span = dataset.get_span(ComponentKind::Node, 0).unwrap();
        assert_eq!(span.len(), 1);
        assert_eq!(span[0].get("u_rated").unwrap().as_f64(), 10_000.0);
    }

    #[test]
    fn serialize_omits_all_nan_attribute() {
        let mut ds = Dataset::new(false, 1);
        let mut row = ElementRecord::new();
        row.insert("id".to_string(), AttrValue::Int32(1));
        row.insert("u_rated".to_string(), AttrValue::Nil);
        ds.add_buffer(ComponentKind::Node, 1, 1, None, vec![row]).unwrap();
        ds.set_attribute_order(ComponentKind::Node, vec!["id".to_string(), "u_rated".to_string()]);
        let envelope = serialize_dataset("input", "1.0.0", &ds);
        let map = envelope.as_map().unwrap();
        let attrs = Value::map_get(map, "attributes").unwrap().as_map().unwrap();
        let node_attrs = Value::map_get(attrs, "node").unwrap().as_array().unwrap();
        assert_eq!(node_attrs.len(), 1);
        assert_eq!(node_attrs[0], Value::Str("id".to_string()));
    }

    #[test]
    fn empty_batch_scenario_round_trips_to_empty_array() {
        let mut ds = Dataset::new(true, 1);
        ds.add_buffer(ComponentKind::Source, 0, 0, None, vec![]).unwrap();
        let envelope = serialize_dataset("input", "1.0.0", &ds);
        let map = envelope.as_map().unwrap();
        let data = Value::map_get(map, "data").unwrap().as_array().unwrap();
        let scenario0 = data[0].as_map().unwrap();
        let source = Value::map_get(scenario0, "source");
        assert!(source.is_none() || matches!(source, Some(Value::Array(v)) if v.is_empty()));
    }
}
