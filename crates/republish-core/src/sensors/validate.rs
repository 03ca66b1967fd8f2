// Sensor table parsing. All-or-nothing: the first violation rejects the
// whole payload.

use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::model::{SensorNameEntry, SensorTable};

/// Accepted spellings for each required field, preferred name first.
const DISPLAY_NAME: [&str; 2] = ["display_name", "sensor_name"];
const MACHINE_NAME: [&str; 2] = ["machine_name", "id_sensor_name"];

/// Parse and validate a full replacement table.
pub fn parse_sensor_table(payload: &[u8]) -> Result<SensorTable, ValidationError> {
    let value: Value =
        serde_json::from_slice(payload).map_err(|e| ValidationError::InvalidJson {
            reason: e.to_string(),
        })?;

    let Value::Object(devices) = value else {
        return Err(ValidationError::NotAnObject {
            found: kind(&value),
        });
    };

    let mut table = SensorTable::new();
    for (device_id, entry) in devices {
        let device_id = device_id.trim().to_owned();
        if device_id.is_empty() {
            return Err(ValidationError::BlankDeviceId);
        }
        if table.contains_key(&device_id) {
            return Err(ValidationError::DuplicateDeviceId { device_id });
        }
        let Value::Object(fields) = entry else {
            return Err(ValidationError::EntryNotObject { device_id });
        };

        let display_name = required(&fields, &DISPLAY_NAME, &device_id)?;
        let machine_name = required(&fields, &MACHINE_NAME, &device_id)?;
        let comment = match fields.get("comment") {
            None | Some(Value::Null) => None,
            Some(Value::String(comment)) => Some(comment.clone()),
            Some(_) => return Err(ValidationError::InvalidComment { device_id }),
        };

        table.insert(
            device_id,
            SensorNameEntry {
                display_name,
                machine_name,
                comment,
            },
        );
    }
    Ok(table)
}

/// Serialize a table in the on-disk / on-wire format.
pub fn encode_sensor_table(table: &SensorTable) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec_pretty(table)
}

fn required(
    fields: &Map<String, Value>,
    names: &[&'static str; 2],
    device_id: &str,
) -> Result<String, ValidationError> {
    names
        .iter()
        .find_map(|name| fields.get(*name).and_then(Value::as_str))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| ValidationError::MissingField {
            device_id: device_id.to_owned(),
            field: names[0],
        })
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
