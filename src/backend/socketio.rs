//! Engine.IO v4 / Socket.IO v5 text framing, enough to hold one namespace
//! open over a WebSocket and exchange JSON events.

use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error::AppError;

/// Where to open the WebSocket and which namespace to join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketIoEndpoint {
    pub ws_url: String,
    pub namespace: String,
}

impl SocketIoEndpoint {
    /// `http://host:3001/crypto` becomes
    /// `ws://host:3001/socket.io/?EIO=4&transport=websocket` plus namespace `/crypto`.
    pub fn from_stream_url(stream_url: &str) -> Result<Self, AppError> {
        let mut url = Url::parse(stream_url)
            .map_err(|e| AppError::Config(format!("invalid stream url '{}': {}", stream_url, e)))?;

        let ws_scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(AppError::Config(format!(
                    "unsupported stream url scheme '{}'",
                    other
                )))
            }
        };

        let path = url.path().trim_end_matches('/');
        let namespace = if path.is_empty() {
            "/".to_string()
        } else {
            path.to_string()
        };

        url.set_scheme(ws_scheme)
            .map_err(|_| AppError::Config(format!("cannot use '{}' as ws url", stream_url)))?;
        url.set_path("/socket.io/");
        url.set_query(Some("EIO=4&transport=websocket"));
        url.set_fragment(None);

        Ok(Self {
            ws_url: url.to_string(),
            namespace,
        })
    }
}

/// Engine.IO open handshake payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(text: &str) -> Result<Self, AppError> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| AppError::Protocol("empty engine.io frame".to_string()))?;
        let body = chars.as_str();
        match kind {
            '0' => Ok(Self::Open(serde_json::from_str(body)?)),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(body.to_string())),
            '3' => Ok(Self::Pong(body.to_string())),
            '4' => Ok(Self::Message(body.to_string())),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(AppError::Protocol(format!(
                "unknown engine.io packet type '{}'",
                other
            ))),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Open(_) => "0".to_string(),
            Self::Close => "1".to_string(),
            Self::Ping(body) => format!("2{}", body),
            Self::Pong(body) => format!("3{}", body),
            Self::Message(body) => format!("4{}", body),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        id: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        message: String,
    },
    /// Binary attachments follow in separate frames; not supported.
    Binary {
        namespace: String,
    },
}

impl SocketPacket {
    pub fn namespace(&self) -> &str {
        match self {
            Self::Connect { namespace, .. }
            | Self::Disconnect { namespace }
            | Self::Event { namespace, .. }
            | Self::Ack { namespace, .. }
            | Self::ConnectError { namespace, .. }
            | Self::Binary { namespace } => namespace,
        }
    }

    /// Decode the body of an Engine.IO message packet:
    /// `<type>[<attachments>-][<namespace>,][<ack id>][<json>]`.
    pub fn decode(text: &str) -> Result<Self, AppError> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| AppError::Protocol("empty socket.io packet".to_string()))?;
        let mut rest = chars.as_str();

        if matches!(kind, '5' | '6') {
            if let Some(dash) = rest.find('-') {
                rest = &rest[dash + 1..];
            }
        }

        let namespace = if rest.starts_with('/') {
            match rest.find(',') {
                Some(comma) => {
                    let ns = rest[..comma].to_string();
                    rest = &rest[comma + 1..];
                    ns
                }
                None => {
                    let ns = rest.to_string();
                    rest = "";
                    ns
                }
            }
        } else {
            "/".to_string()
        };

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let id = if digits > 0 {
            let parsed = rest[..digits]
                .parse::<u64>()
                .map_err(|e| AppError::Protocol(format!("bad ack id: {}", e)))?;
            rest = &rest[digits..];
            Some(parsed)
        } else {
            None
        };

        let payload: Option<Value> = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str(rest)?)
        };

        match kind {
            '0' => Ok(Self::Connect {
                namespace,
                data: payload,
            }),
            '1' => Ok(Self::Disconnect { namespace }),
            '2' => {
                let mut args = match payload {
                    Some(Value::Array(args)) => args,
                    _ => {
                        return Err(AppError::Protocol(
                            "event payload must be a JSON array".to_string(),
                        ))
                    }
                };
                if args.is_empty() {
                    return Err(AppError::Protocol("event without a name".to_string()));
                }
                let name = match args.remove(0) {
                    Value::String(name) => name,
                    other => {
                        return Err(AppError::Protocol(format!(
                            "event name must be a string, got {}",
                            other
                        )))
                    }
                };
                Ok(Self::Event {
                    namespace,
                    id,
                    name,
                    args,
                })
            }
            '3' => {
                let id = id.ok_or_else(|| AppError::Protocol("ack without id".to_string()))?;
                let args = match payload {
                    Some(Value::Array(args)) => args,
                    _ => Vec::new(),
                };
                Ok(Self::Ack {
                    namespace,
                    id,
                    args,
                })
            }
            '4' => {
                let message = match payload {
                    Some(Value::Object(obj)) => obj
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("connect error")
                        .to_string(),
                    Some(Value::String(s)) => s,
                    _ => "connect error".to_string(),
                };
                Ok(Self::ConnectError { namespace, message })
            }
            '5' | '6' => Ok(Self::Binary { namespace }),
            other => Err(AppError::Protocol(format!(
                "unknown socket.io packet type '{}'",
                other
            ))),
        }
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        let (kind, namespace) = match self {
            Self::Connect { namespace, .. } => ('0', namespace),
            Self::Disconnect { namespace } => ('1', namespace),
            Self::Event { namespace, .. } => ('2', namespace),
            Self::Ack { namespace, .. } => ('3', namespace),
            Self::ConnectError { namespace, .. } => ('4', namespace),
            Self::Binary { namespace } => ('5', namespace),
        };
        out.push(kind);
        if namespace != "/" {
            out.push_str(namespace);
            out.push(',');
        }
        match self {
            Self::Connect {
                data: Some(data), ..
            } => out.push_str(&data.to_string()),
            Self::Event { id, name, args, .. } => {
                if let Some(id) = id {
                    out.push_str(&id.to_string());
                }
                let mut payload = Vec::with_capacity(args.len() + 1);
                payload.push(Value::String(name.clone()));
                payload.extend(args.iter().cloned());
                out.push_str(&Value::Array(payload).to_string());
            }
            Self::Ack { id, args, .. } => {
                out.push_str(&id.to_string());
                out.push_str(&Value::Array(args.clone()).to_string());
            }
            Self::ConnectError { message, .. } => {
                out.push_str(&serde_json::json!({ "message": message }).to_string());
            }
            _ => {}
        }
        out
    }

    /// Wrap into the Engine.IO message frame that goes on the wire.
    pub fn to_frame(&self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }
}

pub fn connect_frame(namespace: &str) -> String {
    SocketPacket::Connect {
        namespace: namespace.to_string(),
        data: None,
    }
    .to_frame()
}

pub fn event_frame(namespace: &str, name: &str, payload: Value) -> String {
    SocketPacket::Event {
        namespace: namespace.to_string(),
        id: None,
        name: name.to_string(),
        args: vec![payload],
    }
    .to_frame()
}
