//! Close codes for persistent client connections.
//!
//! Internal termination reasons map onto the standard websocket closure
//! codes so clients can tell a restart (`GoingAway`) from a real fault.

use std::fmt;

pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_GOING_AWAY: u16 = 1001;
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;
pub const CLOSE_UNSUPPORTED_DATA: u16 = 1003;
pub const CLOSE_NO_STATUS: u16 = 1005;
pub const CLOSE_ABNORMAL: u16 = 1006;
pub const CLOSE_INVALID_DATA: u16 = 1007;

/// Why a connection is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    Normal,
    /// Server shutting down or restarting.
    GoingAway,
    ProtocolError,
    /// A frame type the endpoint does not accept (e.g. binary).
    UnsupportedPayload,
    /// Reserved: no status code was present.
    NoStatus,
    /// Reserved: connection dropped without a close frame.
    Abnormal,
    /// Frame data inconsistent with its type.
    InvalidPayload,
}

impl CloseReason {
    pub const ALL: [CloseReason; 7] = [
        CloseReason::Normal,
        CloseReason::GoingAway,
        CloseReason::ProtocolError,
        CloseReason::UnsupportedPayload,
        CloseReason::NoStatus,
        CloseReason::Abnormal,
        CloseReason::InvalidPayload,
    ];

    pub const fn code(self) -> u16 {
        match self {
            CloseReason::Normal => CLOSE_NORMAL,
            CloseReason::GoingAway => CLOSE_GOING_AWAY,
            CloseReason::ProtocolError => CLOSE_PROTOCOL_ERROR,
            CloseReason::UnsupportedPayload => CLOSE_UNSUPPORTED_DATA,
            CloseReason::NoStatus => CLOSE_NO_STATUS,
            CloseReason::Abnormal => CLOSE_ABNORMAL,
            CloseReason::InvalidPayload => CLOSE_INVALID_DATA,
        }
    }

    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            CLOSE_NORMAL => Some(CloseReason::Normal),
            CLOSE_GOING_AWAY => Some(CloseReason::GoingAway),
            CLOSE_PROTOCOL_ERROR => Some(CloseReason::ProtocolError),
            CLOSE_UNSUPPORTED_DATA => Some(CloseReason::UnsupportedPayload),
            CLOSE_NO_STATUS => Some(CloseReason::NoStatus),
            CLOSE_ABNORMAL => Some(CloseReason::Abnormal),
            CLOSE_INVALID_DATA => Some(CloseReason::InvalidPayload),
            _ => None,
        }
    }

    /// Whether the code may appear in a close frame on the wire.
    ///
    /// 1005 and 1006 are only ever reported locally.
    pub const fn is_sendable(self) -> bool {
        !matches!(self, CloseReason::NoStatus | CloseReason::Abnormal)
    }

    /// The reason actually put in a close frame.
    pub const fn on_wire(self) -> Self {
        if self.is_sendable() {
            self
        } else {
            CloseReason::Normal
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            CloseReason::Normal => "normal closure",
            CloseReason::GoingAway => "server going away",
            CloseReason::ProtocolError => "protocol error",
            CloseReason::UnsupportedPayload => "unsupported payload",
            CloseReason::NoStatus => "no status",
            CloseReason::Abnormal => "abnormal closure",
            CloseReason::InvalidPayload => "invalid payload",
        }
    }
}

/// Numeric close code for `reason`.
pub fn map_close_reason(reason: CloseReason) -> u16 {
    reason.code()
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}
