//! Numeric limits shared by the client layer and the service.

use std::time::Duration;

// ============================================================================
// Network configuration defaults
// ============================================================================

pub const DEFAULT_MAX_DEVICE_COUNT: u32 = 8;
pub const DEFAULT_MAX_DEVICES_PER_USER: u32 = 1;
pub const DEFAULT_MAX_ENDPOINTS_PER_DEVICE: u32 = 1;
pub const DEFAULT_MAX_USER_COUNT: u32 = 8;
pub const DEFAULT_MAX_USERS_PER_DEVICE: u32 = 1;

// ============================================================================
// Descriptor / transport
// ============================================================================

/// Maximum length of a serialized network descriptor, in characters.
pub const MAX_SERIALIZED_DESCRIPTOR_LEN: usize = 448;

/// Default inbound packet queue capacity of a virtual socket.
pub const DEFAULT_SOCKET_QUEUE_CAPACITY: usize = 2048;

/// Acknowledgment timeout for virtual socket sends.
pub const SEND_TIMEOUT: Duration = Duration::from_millis(500);

/// Largest payload accepted by a single send.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

// ============================================================================
// Matchmaking
// ============================================================================

/// Ticket timeout used when the caller passes a negative timeout (service maximum).
pub const MAX_TICKET_TIMEOUT_SECS: u32 = 3600;

/// Delay between join-after-match attempts.
pub const JOIN_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Join-after-match attempts before giving up.
pub const JOIN_RETRY_MAX_ATTEMPTS: u32 = 15;

/// Maps a caller-supplied timeout (seconds, negative meaning "as long as possible") onto the
/// value sent to the service.
#[inline]
pub const fn ticket_timeout_secs(requested: i32) -> u32 {
    if requested < 0 {
        MAX_TICKET_TIMEOUT_SECS
    } else {
        requested as u32
    }
}

/// Smallest power of two that is at least `requested` (and at least 2).
#[inline]
pub const fn queue_capacity(requested: usize) -> usize {
    let requested = if requested < 2 { 2 } else { requested };
    requested.next_power_of_two()
}
