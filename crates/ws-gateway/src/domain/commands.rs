//! Inbound command envelopes.
//!
//! Three wire shapes exist, selected by [`SessionType`] at handshake. All of
//! them normalize into a single [`CommandEnvelope`]:
//!
//! ```text
//! general        {"authCmd":{..}, "cmds":[{"type":"TIMESERIES",..}, ..]}
//! telemetry      {"authCmd":{..}, "tsSubCmds":[..], "attrSubCmds":[..], "alarmSubCmds":[..]}
//! notifications  {"authCmd":{..}, "unreadSubCmd":{..}, "unreadCountSubCmd":{..}, "unsubCmd":{..}}
//! ```

use crate::domain::error::DecodeError;
use crate::domain::ids::EntityId;
use crate::domain::session::SessionType;
use serde::{Deserialize, Serialize};

/// First-frame authentication command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthCmd {
    #[serde(default)]
    pub cmd_id: i32,
    pub token: String,
}

/// Subscription on an entity's data stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDataCmd {
    pub cmd_id: i32,
    #[serde(default)]
    pub entity_type: String,
    pub entity_id: EntityId,
    /// Comma separated key filter; absent means every key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<String>,
}

impl EntityDataCmd {
    pub fn key_list(&self) -> Option<Vec<String>> {
        self.keys.as_ref().map(|keys| {
            keys.split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmdRef {
    pub cmd_id: i32,
}

/// Normalized subscription command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WsCmd {
    Timeseries(EntityDataCmd),
    Attributes(EntityDataCmd),
    Alarms(EntityDataCmd),
    Unsubscribe(CmdRef),
    Notifications(CmdRef),
    NotificationsCount(CmdRef),
    NotificationsUnsubscribe(CmdRef),
}

impl WsCmd {
    pub fn cmd_id(&self) -> i32 {
        match self {
            Self::Timeseries(c) | Self::Attributes(c) | Self::Alarms(c) => c.cmd_id,
            Self::Unsubscribe(c)
            | Self::Notifications(c)
            | Self::NotificationsCount(c)
            | Self::NotificationsUnsubscribe(c) => c.cmd_id,
        }
    }
}

/// What a subscription listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionKind {
    Timeseries,
    Attributes,
    Alarms,
    Notifications,
    NotificationsCount,
}

/// Decoded inbound frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandEnvelope {
    pub auth: Option<AuthCmd>,
    pub cmds: Vec<WsCmd>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneralWire {
    auth_cmd: Option<AuthCmd>,
    #[serde(default)]
    cmds: Vec<WsCmd>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyEntityCmd {
    cmd_id: i32,
    #[serde(default)]
    entity_type: String,
    entity_id: EntityId,
    #[serde(default)]
    keys: Option<String>,
    #[serde(default)]
    unsubscribe: bool,
}

impl LegacyEntityCmd {
    fn normalize(self, subscribe: fn(EntityDataCmd) -> WsCmd) -> WsCmd {
        if self.unsubscribe {
            return WsCmd::Unsubscribe(CmdRef {
                cmd_id: self.cmd_id,
            });
        }
        subscribe(EntityDataCmd {
            cmd_id: self.cmd_id,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            keys: self.keys,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TelemetryWire {
    auth_cmd: Option<AuthCmd>,
    #[serde(default)]
    ts_sub_cmds: Vec<LegacyEntityCmd>,
    #[serde(default)]
    attr_sub_cmds: Vec<LegacyEntityCmd>,
    #[serde(default)]
    alarm_sub_cmds: Vec<LegacyEntityCmd>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationsWire {
    auth_cmd: Option<AuthCmd>,
    unread_sub_cmd: Option<CmdRef>,
    unread_count_sub_cmd: Option<CmdRef>,
    unsub_cmd: Option<CmdRef>,
}

/// Decode a raw text frame according to the session's wire shape.
pub fn decode(session_type: SessionType, raw: &str) -> Result<CommandEnvelope, DecodeError> {
    match session_type {
        SessionType::General => {
            let wire: GeneralWire = serde_json::from_str(raw)?;
            Ok(CommandEnvelope {
                auth: wire.auth_cmd,
                cmds: wire.cmds,
            })
        }
        SessionType::Telemetry => {
            let wire: TelemetryWire = serde_json::from_str(raw)?;
            let cmds = wire
                .ts_sub_cmds
                .into_iter()
                .map(|c| c.normalize(WsCmd::Timeseries))
                .chain(
                    wire.attr_sub_cmds
                        .into_iter()
                        .map(|c| c.normalize(WsCmd::Attributes)),
                )
                .chain(
                    wire.alarm_sub_cmds
                        .into_iter()
                        .map(|c| c.normalize(WsCmd::Alarms)),
                )
                .collect();
            Ok(CommandEnvelope {
                auth: wire.auth_cmd,
                cmds,
            })
        }
        SessionType::Notifications => {
            let wire: NotificationsWire = serde_json::from_str(raw)?;
            let cmds = [
                wire.unread_sub_cmd.map(WsCmd::Notifications),
                wire.unread_count_sub_cmd.map(WsCmd::NotificationsCount),
                wire.unsub_cmd.map(WsCmd::NotificationsUnsubscribe),
            ]
            .into_iter()
            .flatten()
            .collect();
            Ok(CommandEnvelope {
                auth: wire.auth_cmd,
                cmds,
            })
        }
    }
}
