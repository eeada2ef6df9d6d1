//! Gateway wire messages
//!
//! Every frame is one JSON object with a `type` field. Gateways in the field
//! disagree on field names, so readings are accepted under several aliases
//! and device hints may come from either `sensor` or `name`.

use crate::error::{HubError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Value fields in priority order
const VALUE_FIELDS: [&str; 4] = ["value", "voltage", "normalized_value", "moisture_app_value"];

/// Hint fields in priority order
const HINT_FIELDS: [&str; 2] = ["sensor", "name"];

/// A reading attributed to some device hint
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    /// Candidate hints, tried in order until one resolves
    pub hints: Vec<String>,
    /// The frame's `name` field, used for display only
    pub name: Option<String>,
    /// Numeric reading; `None` when absent or not a number
    pub value: Option<f64>,
}

impl SensorReading {
    fn from_fields(fields: &Map<String, Value>) -> Self {
        let value = VALUE_FIELDS
            .iter()
            .find_map(|key| fields.get(*key).filter(|v| !v.is_null()))
            .and_then(Value::as_f64);

        Self {
            hints: hints(fields),
            name: display_name(fields),
            value,
        }
    }

    /// Name the device should be displayed under, if the frame carried one
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

fn hints(fields: &Map<String, Value>) -> Vec<String> {
    HINT_FIELDS
        .iter()
        .filter_map(|key| fields.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

fn display_name(fields: &Map<String, Value>) -> Option<String> {
    fields.get("name").and_then(Value::as_str).map(str::to_string)
}

/// Device entry inside an `esp_status` snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct AnnouncedDevice {
    pub name: String,
    pub last_data: Option<SensorReading>,
}

/// Inbound gateway message
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayMessage {
    /// Greeting from the gateway, informational only
    Welcome { message: Option<String> },
    /// Sensor reading
    SensorData(SensorReading),
    /// Device announced itself
    DeviceConnected {
        hints: Vec<String>,
        name: Option<String>,
    },
    /// Device went away
    DeviceDisconnected {
        hints: Vec<String>,
        name: Option<String>,
    },
    /// Gateway's current device table
    DeviceStatus { devices: Vec<AnnouncedDevice> },
    /// Keep-alive traffic
    Heartbeat,
    /// Recognised envelope with no effect on device state
    Informational { kind: String },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl GatewayMessage {
    /// Parse one text frame
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(HubError::malformed("frame is not a JSON object"));
        }
        let Envelope { kind, fields } = serde_json::from_value(value)?;

        let Some(kind) = kind else {
            // Bare readings without an envelope still carry a sensor hint
            if fields.contains_key("sensor") {
                return Ok(GatewayMessage::SensorData(SensorReading::from_fields(&fields)));
            }
            return Err(HubError::malformed("frame has no type field"));
        };

        let message = match kind.as_str() {
            "welcome" => GatewayMessage::Welcome {
                message: fields
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            "sensor_data" | "sensor" => {
                GatewayMessage::SensorData(SensorReading::from_fields(&fields))
            }
            "esp_connected" | "device_connected" => GatewayMessage::DeviceConnected {
                hints: Self::required_hints(&kind, &fields)?,
                name: display_name(&fields),
            },
            "esp_disconnected" | "device_disconnected" => GatewayMessage::DeviceDisconnected {
                hints: Self::required_hints(&kind, &fields)?,
                name: display_name(&fields),
            },
            "esp_status" | "device_status" => GatewayMessage::DeviceStatus {
                devices: Self::announced_devices(&fields)?,
            },
            "heartbeat" | "ping" | "pong" => GatewayMessage::Heartbeat,
            _ => GatewayMessage::Informational { kind },
        };

        Ok(message)
    }

    fn required_hints(kind: &str, fields: &Map<String, Value>) -> Result<Vec<String>> {
        let hints = hints(fields);
        if hints.is_empty() {
            return Err(HubError::malformed(format!("{kind} frame without a device name")));
        }
        Ok(hints)
    }

    fn announced_devices(fields: &Map<String, Value>) -> Result<Vec<AnnouncedDevice>> {
        let devices = fields
            .get("devices")
            .and_then(Value::as_array)
            .ok_or_else(|| HubError::malformed("status frame without a devices array"))?;

        let announced = devices
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|device| {
                let name = ["name", "sensor", "id"]
                    .iter()
                    .find_map(|key| device.get(*key).and_then(Value::as_str))?
                    .to_string();
                let last_data = device
                    .get("lastData")
                    .and_then(Value::as_object)
                    .map(|data| {
                        let mut reading = SensorReading::from_fields(data);
                        if reading.hints.is_empty() {
                            reading.hints.push(name.clone());
                        }
                        reading
                    });
                Some(AnnouncedDevice { name, last_data })
            })
            .collect();

        Ok(announced)
    }
}

/// Outbound frames the hub itself originates
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Identification sent right after the socket opens
    Hello { client: String, session: String },
    /// Ask the gateway to replay its device table
    #[serde(rename = "get_esp_status")]
    StatusRequest,
}
