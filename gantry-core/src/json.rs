//! # JSON <-> DynamicMessage Conversion
//!
//! The value half of the dynamic codec: converts between the loosely-typed JSON form
//! used by HTTP clients and the schema-typed [`DynamicMessage`] form used on the wire,
//! with a [`MessageDescriptor`] as the conversion schema.
//!
//! ## Conversion rules
//!
//! * Unknown keys in the JSON input are rejected with [`ConvertError::UnknownField`].
//!   The conversion fails closed so a typo never silently drops data. Keys may use
//!   either the Protobuf field name or its camelCase JSON name.
//! * Singular fields absent from the input take the type's zero value; zero-valued
//!   implicit-presence fields are omitted from the JSON output. Fields the schema marks
//!   as explicitly optional are emitted whenever they are set, zero or not.
//! * Enum fields accept the symbolic name or the numeric ordinal on the way in and
//!   always emit the symbolic name on the way out.
//! * `bytes` fields use standard base64 text in the JSON form.
//! * 64-bit integers additionally accept decimal strings, following the proto3 JSON
//!   convention.
//!
//! Errors carry the path of the offending field (`a.b[2].c`). A failed conversion never
//! exposes a partially-built message.
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use prost_reflect::{
    DynamicMessage, EnumDescriptor, FieldDescriptor, Kind, MapKey, MessageDescriptor,
    ReflectMessage,
};
use serde_json::Value as Json;
use std::collections::HashMap;

/// Errors raised while converting a JSON value into a [`DynamicMessage`].
///
/// These are always caused by caller input and always name the offending field path.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("unknown field '{path}'")]
    UnknownField { path: String },

    #[error("invalid value '{value}' for enum field '{path}' of type '{enum_name}'")]
    InvalidEnumValue {
        path: String,
        value: String,
        enum_name: String,
    },

    #[error("type mismatch at '{path}': expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: &'static str,
    },
}

impl ConvertError {
    /// Machine-readable error kind, used in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ConvertError::UnknownField { .. } => "unknown_field",
            ConvertError::InvalidEnumValue { .. } => "invalid_enum_value",
            ConvertError::TypeMismatch { .. } => "type_mismatch",
        }
    }
}

/// Builds a [`DynamicMessage`] conforming to `descriptor` from a JSON value.
///
/// The input must be a JSON object whose keys all match fields of the descriptor.
/// `null` entries are treated as absent.
pub fn from_generic(
    value: &Json,
    descriptor: &MessageDescriptor,
) -> Result<DynamicMessage, ConvertError> {
    message_from_json(value, descriptor, "")
}

/// Converts a [`DynamicMessage`] into its JSON form.
///
/// Implicit-presence fields at their zero value are omitted; explicitly optional fields
/// are emitted whenever set. Enum values emit their symbolic name, bytes emit base64.
pub fn to_generic(message: &DynamicMessage) -> Json {
    let mut object = serde_json::Map::new();
    for field in message.descriptor().fields() {
        if !message.has_field(&field) {
            continue;
        }
        let value = message.get_field(&field);
        object.insert(field.name().to_string(), value_to_json(&value, &field.kind()));
    }
    Json::Object(object)
}

fn message_from_json(
    value: &Json,
    descriptor: &MessageDescriptor,
    path: &str,
) -> Result<DynamicMessage, ConvertError> {
    let Json::Object(entries) = value else {
        return Err(mismatch(
            path,
            format!("message '{}'", descriptor.full_name()),
            value,
        ));
    };

    let mut message = DynamicMessage::new(descriptor.clone());
    for (key, entry) in entries {
        let field = find_field(descriptor, key).ok_or_else(|| ConvertError::UnknownField {
            path: join(path, key),
        })?;
        // JSON null means "leave unset", matching the proto3 JSON mapping.
        if entry.is_null() {
            continue;
        }
        let field_path = join(path, field.name());
        let value = field_from_json(entry, &field, &field_path)?;
        message.set_field(&field, value);
    }
    Ok(message)
}

/// Looks a JSON key up among the descriptor's fields, by proto name first and by
/// camelCase JSON name second.
fn find_field(descriptor: &MessageDescriptor, key: &str) -> Option<FieldDescriptor> {
    descriptor
        .get_field_by_name(key)
        .or_else(|| descriptor.fields().find(|f| f.json_name() == key))
}

fn field_from_json(
    value: &Json,
    field: &FieldDescriptor,
    path: &str,
) -> Result<prost_reflect::Value, ConvertError> {
    if field.is_map() {
        return map_from_json(value, field, path);
    }
    if field.is_list() {
        let Json::Array(items) = value else {
            return Err(mismatch(path, format!("repeated {}", kind_name(&field.kind())), value));
        };
        let values = items
            .iter()
            .enumerate()
            .map(|(index, item)| scalar_from_json(item, &field.kind(), &format!("{path}[{index}]")))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(prost_reflect::Value::List(values));
    }
    scalar_from_json(value, &field.kind(), path)
}

fn map_from_json(
    value: &Json,
    field: &FieldDescriptor,
    path: &str,
) -> Result<prost_reflect::Value, ConvertError> {
    let Kind::Message(entry) = field.kind() else {
        return Err(mismatch(path, "map".to_string(), value));
    };
    let Json::Object(object) = value else {
        return Err(mismatch(path, "map (JSON object)".to_string(), value));
    };

    let key_kind = entry.map_entry_key_field().kind();
    let value_kind = entry.map_entry_value_field().kind();
    let mut out = HashMap::with_capacity(object.len());
    for (key, item) in object {
        let entry_path = format!("{path}.{key}");
        let map_key = map_key_from_str(key, &key_kind, &entry_path)?;
        let map_value = scalar_from_json(item, &value_kind, &entry_path)?;
        out.insert(map_key, map_value);
    }
    Ok(prost_reflect::Value::Map(out))
}

fn map_key_from_str(key: &str, kind: &Kind, path: &str) -> Result<MapKey, ConvertError> {
    let parse_err = || ConvertError::TypeMismatch {
        path: path.to_string(),
        expected: format!("map key of type {}", kind_name(kind)),
        found: "string",
    };
    match kind {
        Kind::String => Ok(MapKey::String(key.to_string())),
        Kind::Bool => key.parse().map(MapKey::Bool).map_err(|_| parse_err()),
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => {
            key.parse().map(MapKey::I32).map_err(|_| parse_err())
        }
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => {
            key.parse().map(MapKey::I64).map_err(|_| parse_err())
        }
        Kind::Uint32 | Kind::Fixed32 => key.parse().map(MapKey::U32).map_err(|_| parse_err()),
        Kind::Uint64 | Kind::Fixed64 => key.parse().map(MapKey::U64).map_err(|_| parse_err()),
        _ => Err(parse_err()),
    }
}

fn scalar_from_json(
    value: &Json,
    kind: &Kind,
    path: &str,
) -> Result<prost_reflect::Value, ConvertError> {
    use prost_reflect::Value;
    match kind {
        Kind::Bool => value
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| mismatch(path, "bool".to_string(), value)),
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => {
            let wide = int64_from_json(value, path, "int32")?;
            i32::try_from(wide)
                .map(Value::I32)
                .map_err(|_| mismatch(path, "int32".to_string(), value))
        }
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => {
            int64_from_json(value, path, "int64").map(Value::I64)
        }
        Kind::Uint32 | Kind::Fixed32 => {
            let wide = uint64_from_json(value, path, "uint32")?;
            u32::try_from(wide)
                .map(Value::U32)
                .map_err(|_| mismatch(path, "uint32".to_string(), value))
        }
        Kind::Uint64 | Kind::Fixed64 => uint64_from_json(value, path, "uint64").map(Value::U64),
        Kind::Float => value
            .as_f64()
            .map(|v| Value::F32(v as f32))
            .ok_or_else(|| mismatch(path, "float".to_string(), value)),
        Kind::Double => value
            .as_f64()
            .map(Value::F64)
            .ok_or_else(|| mismatch(path, "double".to_string(), value)),
        Kind::String => value
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(|| mismatch(path, "string".to_string(), value)),
        Kind::Bytes => {
            let text = value
                .as_str()
                .ok_or_else(|| mismatch(path, "base64 string".to_string(), value))?;
            let bytes = BASE64
                .decode(text)
                .map_err(|_| mismatch(path, "base64 string".to_string(), value))?;
            Ok(Value::Bytes(bytes.into()))
        }
        Kind::Enum(descriptor) => enum_from_json(value, descriptor, path),
        Kind::Message(descriptor) => {
            message_from_json(value, descriptor, path).map(Value::Message)
        }
    }
}

fn enum_from_json(
    value: &Json,
    descriptor: &EnumDescriptor,
    path: &str,
) -> Result<prost_reflect::Value, ConvertError> {
    let invalid = |shown: String| ConvertError::InvalidEnumValue {
        path: path.to_string(),
        value: shown,
        enum_name: descriptor.full_name().to_string(),
    };
    match value {
        Json::String(name) => descriptor
            .get_value_by_name(name)
            .map(|v| prost_reflect::Value::EnumNumber(v.number()))
            .ok_or_else(|| invalid(name.clone())),
        Json::Number(number) => {
            let ordinal = number
                .as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .ok_or_else(|| invalid(number.to_string()))?;
            descriptor
                .get_value(ordinal)
                .map(|v| prost_reflect::Value::EnumNumber(v.number()))
                .ok_or_else(|| invalid(number.to_string()))
        }
        other => Err(mismatch(
            path,
            format!("enum '{}' name or ordinal", descriptor.full_name()),
            other,
        )),
    }
}

fn int64_from_json(value: &Json, path: &str, expected: &str) -> Result<i64, ConvertError> {
    match value {
        Json::Number(number) => number
            .as_i64()
            .ok_or_else(|| mismatch(path, expected.to_string(), value)),
        Json::String(text) => text
            .parse()
            .map_err(|_| mismatch(path, expected.to_string(), value)),
        other => Err(mismatch(path, expected.to_string(), other)),
    }
}

fn uint64_from_json(value: &Json, path: &str, expected: &str) -> Result<u64, ConvertError> {
    match value {
        Json::Number(number) => number
            .as_u64()
            .ok_or_else(|| mismatch(path, expected.to_string(), value)),
        Json::String(text) => text
            .parse()
            .map_err(|_| mismatch(path, expected.to_string(), value)),
        other => Err(mismatch(path, expected.to_string(), other)),
    }
}

fn value_to_json(value: &prost_reflect::Value, kind: &Kind) -> Json {
    use prost_reflect::Value;
    match value {
        Value::Bool(v) => Json::Bool(*v),
        Value::I32(v) => (*v).into(),
        Value::I64(v) => (*v).into(),
        Value::U32(v) => (*v).into(),
        Value::U64(v) => (*v).into(),
        Value::F32(v) => serde_json::Number::from_f64(f64::from(*v))
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Value::F64(v) => serde_json::Number::from_f64(*v)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Value::String(v) => Json::String(v.clone()),
        Value::Bytes(v) => Json::String(BASE64.encode(v)),
        Value::EnumNumber(number) => match kind {
            Kind::Enum(descriptor) => descriptor
                .get_value(*number)
                .map(|v| Json::String(v.name().to_string()))
                .unwrap_or_else(|| (*number).into()),
            _ => (*number).into(),
        },
        Value::Message(message) => to_generic(message),
        Value::List(items) => {
            Json::Array(items.iter().map(|item| value_to_json(item, kind)).collect())
        }
        Value::Map(entries) => {
            // Map fields always carry a map-entry message kind.
            let Kind::Message(entry) = kind else {
                return Json::Null;
            };
            let value_kind = entry.map_entry_value_field().kind();
            let mut object = serde_json::Map::with_capacity(entries.len());
            for (key, item) in entries {
                object.insert(map_key_to_string(key), value_to_json(item, &value_kind));
            }
            Json::Object(object)
        }
    }
}

fn map_key_to_string(key: &MapKey) -> String {
    match key {
        MapKey::Bool(v) => v.to_string(),
        MapKey::I32(v) => v.to_string(),
        MapKey::I64(v) => v.to_string(),
        MapKey::U32(v) => v.to_string(),
        MapKey::U64(v) => v.to_string(),
        MapKey::String(v) => v.clone(),
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn mismatch(path: &str, expected: String, found: &Json) -> ConvertError {
    ConvertError::TypeMismatch {
        path: if path.is_empty() {
            "(request)".to_string()
        } else {
            path.to_string()
        },
        expected,
        found: json_kind(found),
    }
}

fn json_kind(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn kind_name(kind: &Kind) -> String {
    match kind {
        Kind::Message(descriptor) => format!("message '{}'", descriptor.full_name()),
        Kind::Enum(descriptor) => format!("enum '{}'", descriptor.full_name()),
        other => format!("{other:?}").to_lowercase(),
    }
}
