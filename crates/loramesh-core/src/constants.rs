//! Protocol constants shared across the node runtime.

/// Node numbers below this value are reserved and never self-assigned.
pub const NUM_RESERVED: u32 = 4;

/// Total transmit attempts for a reliable packet (initial send included).
pub const NUM_RETRANSMISSIONS: u8 = 3;

/// A peer heard within this many seconds counts as online.
pub const NUM_ONLINE_SECS: u32 = 2 * 60 * 60;

/// Upper bound on the node directory. Sized above any realistic mesh.
pub const MAX_NUM_NODES: usize = 32;

/// Maximum number of channels we advertise to peers.
pub const MAX_NUM_CHANNELS: u32 = 8;

/// How long the flooding substrate remembers a packet, in milliseconds.
/// Also used as the default message timeout advertised to the phone.
pub const FLOOD_EXPIRE_TIME_MSEC: u32 = 10 * 60 * 1000;

/// Version stamped into every saved device state.
pub const DEVICESTATE_CUR_VER: u32 = 11;

/// Saved device states below this version are discarded at load.
pub const DEVICESTATE_MIN_VER: u32 = DEVICESTATE_CUR_VER;

/// Oldest phone app build we can talk to, in Mmmss form.
pub const MIN_APP_VERSION: u32 = 20200;
