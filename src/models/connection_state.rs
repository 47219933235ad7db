use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a doclink session.
///
/// Exactly one value is active at a time. The only way to change it is a
/// transition accepted by [`ConnectionState::can_transition_to`].
///
/// ```text
/// Initial ──connect──▶ Connecting ──open──▶ Connected ──lost──▶ Offline
///                          │                    ▲                 │
///                          ▼                    │                 ▼
///                        Error ◀──exhausted── Reconnecting ◀──attempt
/// (any) ──close──▶ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Created, `connect()` not called yet.
    Initial,
    /// First connection attempt in progress.
    Connecting,
    /// Transport open; offline queue drained.
    Connected,
    /// Connection lost (or dropped by `disconnect()`); waiting to reconnect.
    Offline,
    /// A reconnection attempt is in progress.
    Reconnecting,
    /// Connection failed and no automatic retry remains.
    Error,
    /// Session closed; terminal.
    Closed,
}

impl ConnectionState {
    /// Returns `true` if the session can hand requests to the transport.
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    /// Returns `true` for the states in which requests may be queued.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Offline | ConnectionState::Reconnecting
        )
    }

    /// Returns `true` when `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        if next == Closed {
            return self != Closed;
        }
        matches!(
            (self, next),
            (Initial, Connecting)
                | (Connecting, Connected)
                | (Connecting, Error)
                | (Connecting, Offline)
                | (Connected, Offline)
                | (Offline, Reconnecting)
                | (Reconnecting, Connected)
                | (Reconnecting, Error)
                | (Reconnecting, Offline)
                | (Error, Connecting)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Initial => "initial",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Offline => "offline",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Error => "error",
            ConnectionState::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    const ALL: [ConnectionState; 7] = [
        Initial,
        Connecting,
        Connected,
        Offline,
        Reconnecting,
        Error,
        Closed,
    ];

    #[test]
    fn test_offline_never_jumps_to_connected() {
        assert!(!Offline.can_transition_to(Connected));
        assert!(Offline.can_transition_to(Reconnecting));
    }

    #[test]
    fn test_closed_is_terminal() {
        for next in ALL {
            assert!(!Closed.can_transition_to(next), "closed -> {}", next);
        }
    }

    #[test]
    fn test_every_live_state_can_close() {
        for state in ALL.iter().copied().filter(|s| *s != Closed) {
            assert!(state.can_transition_to(Closed), "{} -> closed", state);
        }
    }

    #[test]
    fn test_no_self_transitions() {
        for state in ALL {
            assert!(!state.can_transition_to(state), "{} -> {}", state, state);
        }
    }

    #[test]
    fn test_connected_only_reached_through_attempts() {
        let sources: Vec<_> = ALL
            .iter()
            .copied()
            .filter(|s| s.can_transition_to(Connected))
            .collect();
        assert_eq!(sources, vec![Connecting, Reconnecting]);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&Reconnecting).unwrap(), "\"reconnecting\"");
        assert_eq!(Offline.to_string(), "offline");
    }
}
