//! Outbound update and error payloads.

use crate::domain::session::SessionType;
use serde::{Deserialize, Serialize};

/// In-band error codes carried in `errorCode`.
pub mod codes {
    pub const NO_ERROR: i32 = 0;
    pub const INTERNAL_ERROR: i32 = 1;
    pub const BAD_REQUEST: i32 = 2;
    pub const UNAUTHORIZED: i32 = 3;
    pub const TOO_MANY_UPDATES: i32 = 4;
}

/// Reply sent when an authenticated frame cannot be decoded.
pub const DECODE_FAILURE_MSG: &str = "Failed to parse websocket command!";

/// Reply sent once per rate-limit denial episode.
pub const TOO_MANY_UPDATES_MSG: &str = "Too many updates!";

/// Update (or error) addressed to one command of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmdUpdate {
    pub cmd_id: i32,
    pub error_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CmdUpdate {
    pub fn data(cmd_id: i32, data: serde_json::Value) -> Self {
        Self {
            cmd_id,
            error_code: codes::NO_ERROR,
            error_msg: None,
            data: Some(data),
        }
    }

    pub fn error(cmd_id: i32, error_code: i32, msg: impl Into<String>) -> Self {
        Self {
            cmd_id,
            error_code,
            error_msg: Some(msg.into()),
            data: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_code != codes::NO_ERROR
    }

    /// Render the client frame. Legacy telemetry sessions key the command
    /// as `subscriptionId`.
    pub fn to_client_json(&self, session_type: SessionType) -> String {
        let id_key = match session_type {
            SessionType::Telemetry => "subscriptionId",
            SessionType::General | SessionType::Notifications => "cmdId",
        };

        let mut frame = serde_json::Map::new();
        frame.insert(id_key.to_string(), self.cmd_id.into());
        frame.insert("errorCode".to_string(), self.error_code.into());
        if let Some(msg) = &self.error_msg {
            frame.insert("errorMsg".to_string(), msg.clone().into());
        }
        if let Some(data) = &self.data {
            frame.insert("data".to_string(), data.clone());
        }
        serde_json::Value::Object(frame).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_frame() {
        let update = CmdUpdate::data(5, json!({"temp": [[1, "21.5"]]}));
        let frame: serde_json::Value =
            serde_json::from_str(&update.to_client_json(SessionType::General)).unwrap();

        assert_eq!(frame["cmdId"], 5);
        assert_eq!(frame["errorCode"], 0);
        assert_eq!(frame["data"]["temp"][0][1], "21.5");
        assert!(frame.get("errorMsg").is_none());
    }

    #[test]
    fn test_telemetry_uses_subscription_id() {
        let update = CmdUpdate::error(2, codes::BAD_REQUEST, DECODE_FAILURE_MSG);
        let frame: serde_json::Value =
            serde_json::from_str(&update.to_client_json(SessionType::Telemetry)).unwrap();

        assert_eq!(frame["subscriptionId"], 2);
        assert!(frame.get("cmdId").is_none());
        assert_eq!(frame["errorCode"], codes::BAD_REQUEST);
        assert_eq!(frame["errorMsg"], DECODE_FAILURE_MSG);
    }

    #[test]
    fn test_is_error() {
        assert!(!CmdUpdate::data(1, json!({})).is_error());
        assert!(CmdUpdate::error(1, codes::TOO_MANY_UPDATES, TOO_MANY_UPDATES_MSG).is_error());
    }
}
