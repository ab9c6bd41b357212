use std::time::Duration;

use thiserror::Error;

/// Errors produced by the cordwire gateway and REST layers.
#[derive(Debug, Error)]
pub enum CordError {
    /// I/O or TLS failure on the gateway link.
    #[error("transport error: {0}")]
    Transport(String),

    /// The REST connection is no longer usable (stream end, broken pipe, reset).
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The server rejected the gateway session (op 9).
    #[error("invalid session (resumable: {resumable})")]
    InvalidSession { resumable: bool },

    #[error("protocol error: {0}")]
    Protocol(String),

    /// Unclassified non-2xx REST response.
    #[error("API error {status}: {message}")]
    Api {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    /// HTTP 429, surfaced only when quota retries are disabled.
    #[error("quota exceeded for route {route}, retry after {retry_after:?}")]
    QuotaExceeded { route: String, retry_after: Duration },

    #[error("unknown {entity}: {message}")]
    UnknownEntity {
        entity: EntityKind,
        code: i64,
        message: String,
    },

    #[error("{limit} limit reached: {message}")]
    LimitReached {
        limit: LimitKind,
        code: i64,
        message: String,
    },

    /// Client-side validation failure, or a server report about one parameter.
    #[error("invalid parameter {parameter}: {reason}")]
    InvalidParameter { parameter: String, reason: String },

    #[error("codec error: {0}")]
    Codec(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("gateway already connected")]
    AlreadyConnected,

    #[error("timeout")]
    Timeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CordError {
    /// Whether the REST pipeline may reopen the transport and retry.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }

    /// Whether the error is a server-side rejection of the gateway session.
    pub fn is_invalid_session(&self) -> bool {
        matches!(self, Self::InvalidSession { .. })
    }

    /// Whether this error came back from the REST API.
    pub fn is_api(&self) -> bool {
        matches!(
            self,
            Self::Api { .. }
                | Self::UnknownEntity { .. }
                | Self::LimitReached { .. }
                | Self::QuotaExceeded { .. }
        )
    }
}

impl From<serde_json::Error> for CordError {
    fn from(e: serde_json::Error) -> Self {
        CordError::Codec(e.to_string())
    }
}

pub type CordResult<T> = Result<T, CordError>;

/// Entity named by a 10xxx API error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Account,
    Application,
    Channel,
    Guild,
    Integration,
    Invite,
    Member,
    Message,
    Overwrite,
    Provider,
    Role,
    Token,
    User,
    Emoji,
    Other(i64),
}

impl EntityKind {
    pub fn from_code(code: i64) -> Self {
        match code % 10000 {
            1 => Self::Account,
            2 => Self::Application,
            3 => Self::Channel,
            4 => Self::Guild,
            5 => Self::Integration,
            6 => Self::Invite,
            7 => Self::Member,
            8 => Self::Message,
            9 => Self::Overwrite,
            10 => Self::Provider,
            11 => Self::Role,
            12 => Self::Token,
            13 => Self::User,
            14 => Self::Emoji,
            _ => Self::Other(code),
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Account => "account",
            Self::Application => "application",
            Self::Channel => "channel",
            Self::Guild => "guild",
            Self::Integration => "integration",
            Self::Invite => "invite",
            Self::Member => "member",
            Self::Message => "message",
            Self::Overwrite => "overwrite",
            Self::Provider => "provider",
            Self::Role => "role",
            Self::Token => "token",
            Self::User => "user",
            Self::Emoji => "emoji",
            Self::Other(code) => return write!(f, "entity ({code})"),
        };
        f.write_str(name)
    }
}

/// Limit named by a 30xxx API error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Guilds,
    Friends,
    Pins,
    GuildRoles,
    Reactions,
    Other(i64),
}

impl LimitKind {
    pub fn from_code(code: i64) -> Self {
        match code {
            30001 => Self::Guilds,
            30002 => Self::Friends,
            30003 => Self::Pins,
            30005 => Self::GuildRoles,
            30010 => Self::Reactions,
            _ => Self::Other(code),
        }
    }
}

impl std::fmt::Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Guilds => f.write_str("guilds"),
            Self::Friends => f.write_str("friends"),
            Self::Pins => f.write_str("pins"),
            Self::GuildRoles => f.write_str("guild roles"),
            Self::Reactions => f.write_str("reactions"),
            Self::Other(code) => write!(f, "code {code}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_from_code() {
        assert_eq!(EntityKind::from_code(10003), EntityKind::Channel);
        assert_eq!(EntityKind::from_code(10008), EntityKind::Message);
        assert_eq!(EntityKind::from_code(10099), EntityKind::Other(10099));
    }

    #[test]
    fn limit_from_code() {
        assert_eq!(LimitKind::from_code(30003), LimitKind::Pins);
        assert_eq!(LimitKind::from_code(30042), LimitKind::Other(30042));
    }

    #[test]
    fn display_messages() {
        let err = CordError::UnknownEntity {
            entity: EntityKind::Channel,
            code: 10003,
            message: "Unknown Channel".into(),
        };
        assert_eq!(err.to_string(), "unknown channel: Unknown Channel");

        let err = CordError::InvalidParameter {
            parameter: "content".into(),
            reason: "too long".into(),
        };
        assert_eq!(err.to_string(), "invalid parameter content: too long");
    }

    #[test]
    fn classification_helpers() {
        assert!(CordError::ConnectionLost("reset".into()).is_connection_lost());
        assert!(!CordError::Transport("reset".into()).is_connection_lost());
        assert!(CordError::InvalidSession { resumable: false }.is_invalid_session());
        assert!(CordError::Api {
            status: 500,
            code: None,
            message: "boom".into()
        }
        .is_api());
    }
}
