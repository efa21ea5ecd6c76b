use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::settings::{SettingsStore, install_defaults};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    #[serde(rename = "INIT")]
    Init,
    #[serde(rename = "GET_SETTINGS")]
    GetSettings,
    #[serde(rename = "UPDATE_SETTINGS")]
    UpdateSettings {
        #[serde(default)]
        settings: Option<Value>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Map<String, Value>>,
}

impl Response {
    fn ok(message: &str) -> Self {
        Self {
            status: Status::Ok,
            message: Some(message.to_string()),
            settings: None,
        }
    }

    fn error(message: &str) -> Self {
        Self {
            status: Status::Error,
            message: Some(message.to_string()),
            settings: None,
        }
    }

    fn with_settings(settings: Map<String, Value>) -> Self {
        Self {
            status: Status::Ok,
            message: None,
            settings: Some(settings),
        }
    }
}

/// Passive responder for the settings and initialization requests sent over
/// the extension message channel.
pub struct Coordinator<S> {
    store: S,
}

impl<S: SettingsStore> Coordinator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// First-install hook: seeds missing settings. Failures are logged only.
    pub fn on_installed(&mut self) {
        match install_defaults(&mut self.store) {
            Ok(true) => info!("settings initialized with defaults"),
            Ok(false) => {}
            Err(err) => error!("settings initialization failed: {err}"),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn handle(&mut self, request: Request) -> Response {
        match request {
            Request::Init => Response::ok("System initialized"),
            Request::GetSettings => match self.store.entries() {
                Ok(entries) => Response::with_settings(entries),
                Err(err) => {
                    error!("failed to read settings: {err}");
                    Response::error("Internal system error")
                }
            },
            Request::UpdateSettings {
                settings: Some(Value::Object(updates)),
            } => match self.store.merge(updates) {
                Ok(()) => Response::ok("Settings updated successfully"),
                Err(err) => {
                    error!("failed to write settings: {err}");
                    Response::error("Internal system error")
                }
            },
            Request::UpdateSettings { .. } => Response::error("Invalid settings payload"),
        }
    }

    /// Decodes a raw envelope and answers it. Undecodable envelopes get an
    /// `ERROR` response rather than a failure.
    pub fn handle_json(&mut self, raw: &str) -> Response {
        let envelope: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(err) => {
                warn!("rejected malformed message envelope: {err}");
                return Response::error("Internal system error");
            }
        };

        match serde_json::from_value::<Request>(envelope) {
            Ok(request) => self.handle(request),
            Err(err) => {
                warn!("rejected message with unknown type: {err}");
                Response::error("Unknown request type")
            }
        }
    }
}
