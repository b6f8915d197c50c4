//! Payment rail adapters: one module per external backend, all implementing
//! `domain::ports::SettlementRail` over HTTP.

pub mod explorer;
pub mod node;
pub mod token;

use crate::domain::ports::RailError;

/// Maps a transport-level failure onto rail failure semantics: deadline
/// overruns are ambiguous (`Timeout`), connection failures are proof the
/// request never left (`Unavailable`).
pub(crate) fn transport_error(e: reqwest::Error) -> RailError {
    if e.is_timeout() {
        RailError::Timeout(e.to_string())
    } else if e.is_connect() {
        RailError::Unavailable(e.to_string())
    } else {
        RailError::Protocol(e.to_string())
    }
}
