//! JSON frames exchanged over the remote-control channel.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::keys::Key;

/// Event name of the TV's first frame once the channel is open.
pub const CHANNEL_CONNECT_EVENT: &str = "ms.channel.connect";
const REMOTE_CONTROL_METHOD: &str = "ms.remote.control";

// 发送给电视的命令帧
#[derive(Debug, Serialize)]
pub struct RemoteCommand {
    pub method: &'static str,
    pub params: ControlParams,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ControlParams {
    pub cmd: String,
    pub data_of_cmd: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option: Option<String>,
    pub type_of_remote: &'static str,
}

impl RemoteCommand {
    /// A single click of `key`.
    pub fn key(key: Key) -> Self {
        Self {
            method: REMOTE_CONTROL_METHOD,
            params: ControlParams {
                cmd: "Click".to_string(),
                data_of_cmd: key.code().to_string(),
                option: Some("false".to_string()),
                type_of_remote: "SendRemoteKey",
            },
        }
    }

    /// Text for the input field currently focused on the TV.
    pub fn text(text: &str) -> Self {
        Self {
            method: REMOTE_CONTROL_METHOD,
            params: ControlParams {
                cmd: BASE64_STANDARD.encode(text.as_bytes()),
                data_of_cmd: "base64".to_string(),
                option: None,
                type_of_remote: "SendInputString",
            },
        }
    }
}

// 电视发来的事件帧
#[derive(Debug, Deserialize)]
pub struct ChannelEvent {
    pub event: String,
    #[serde(default)]
    pub data: Option<ChannelData>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ChannelData {
    pub token: Option<String>,
    #[serde(default)]
    pub clients: Vec<PairedClient>,
}

#[derive(Debug, Deserialize)]
pub struct PairedClient {
    pub attributes: Option<ClientAttributes>,
}

#[derive(Debug, Deserialize)]
pub struct ClientAttributes {
    pub name: Option<String>,
    pub token: Option<String>,
}

/// Where a pairing token was found in the handshake frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Direct,
    PairedClients,
}

/// Extracts the pairing token from the TV's first frame.
///
/// `data.token` wins; otherwise the paired client registered under
/// `app_name_base64` supplies it. Anything that is not a well formed
/// channel-connect event yields `None`.
pub fn pairing_token(frame: &str, app_name_base64: &str) -> Option<(String, TokenSource)> {
    let event: ChannelEvent = match serde_json::from_str(frame) {
        Ok(event) => event,
        Err(e) => {
            log::warn!("Unexpected handshake frame: {}", e);
            return None;
        }
    };
    if event.event != CHANNEL_CONNECT_EVENT {
        log::warn!("Unexpected handshake event: {}", event.event);
        return None;
    }
    let data = event.data?;

    if let Some(token) = data.token.filter(|t| !t.is_empty()) {
        return Some((token, TokenSource::Direct));
    }

    data.clients
        .into_iter()
        .filter_map(|client| client.attributes)
        .find(|attrs| attrs.name.as_deref() == Some(app_name_base64))
        .and_then(|attrs| attrs.token)
        .filter(|t| !t.is_empty())
        .map(|token| (token, TokenSource::PairedClients))
}
