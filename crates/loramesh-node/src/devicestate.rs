//! The persisted device state.
//!
//! Everything a node must remember across a power cycle lives in one
//! [`DeviceState`] record: who we are, how the radio is tuned, which
//! channels we speak, and the directory of peers we have heard. The
//! whole record is serialized as a single blob whose first field is the
//! schema version.

use serde::{Deserialize, Serialize};

use loramesh_core::NodeNum;

use crate::region::RegionCode;

/// Display identity for a node. `id` defaults to the `!hex` form of the
/// node number until a user configures one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub long_name: String,
    pub short_name: String,
    pub macaddr: [u8; 6],
}

/// Last known position report for a peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude_i: i32,
    pub longitude_i: i32,
    /// Seconds-epoch of the report; zero means unknown.
    pub time: u32,
    /// Battery percentage; zero means unreported.
    pub battery_level: u32,
}

/// One record per known peer, including ourselves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub num: NodeNum,
    pub user: User,
    pub has_user: bool,
    pub position: Position,
    pub has_position: bool,
    /// Most recent receive SNR for this peer, in dB.
    pub snr: f32,
}

impl NodeInfo {
    /// A fresh record: everything missing except the node number.
    pub fn new(num: NodeNum) -> Self {
        Self {
            num,
            ..Default::default()
        }
    }
}

/// Codes for errors worth reporting to the user and analytics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CriticalErrorCode {
    #[default]
    None,
    TxWatchdog,
    SleepEnterWait,
    NoRadio,
    Unspecified,
    UBloxInitFailed,
    NoAXP192,
    InvalidRadioSetting,
    TransmitFailed,
}

/// Local-only node facts, persisted alongside the directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MyNodeInfo {
    pub my_node_num: NodeNum,
    pub has_gps: bool,
    /// Legacy textual region tag, e.g. `"1.0-EU433"`. The enum form in
    /// [`RadioPreferences::region`] supersedes it.
    pub region: String,
    pub hw_model: String,
    pub firmware_version: String,
    /// Error state from the current boot only; cleared at init.
    pub error_code: CriticalErrorCode,
    pub error_address: u32,
    pub error_count: u32,
    pub max_channels: u32,
    pub min_app_version: u32,
    pub message_timeout_msec: u32,
}

/// A channel the node participates in. Key handling belongs to the
/// crypto module; only the persisted settings live here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub name: String,
    pub psk: Vec<u8>,
}

impl ChannelSettings {
    /// The out-of-the-box primary channel. The one-byte psk selects the
    /// well-known default key.
    pub fn default_primary() -> Self {
        Self {
            name: "Default".to_string(),
            psk: vec![1],
        }
    }
}

/// User-tunable radio parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RadioPreferences {
    pub position_broadcast_secs: u32,
    pub send_owner_interval: u32,
    pub screen_on_secs: u32,
    pub wait_bluetooth_secs: u32,
    pub phone_timeout_secs: u32,
    pub ls_secs: u32,
    pub min_wake_secs: u32,
    pub sds_secs: u32,
    pub mesh_sds_timeout_secs: u32,
    pub region: RegionCode,
    /// Wipe everything back to defaults at the next config reset.
    pub factory_reset: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RadioConfig {
    pub has_preferences: bool,
    pub preferences: RadioPreferences,
}

/// The persisted root record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    /// Schema version, first field of the blob. States below
    /// `DEVICESTATE_MIN_VER` are discarded at load.
    pub version: u32,
    pub has_my_node: bool,
    pub my_node: MyNodeInfo,
    pub has_owner: bool,
    pub owner: User,
    pub has_radio: bool,
    pub radio: RadioConfig,
    pub channels: Vec<ChannelSettings>,
    /// The peer directory. Bounded by `MAX_NUM_NODES`; the length is
    /// the live record count.
    pub node_db: Vec<NodeInfo>,
    /// Development flag: skip flash writes entirely.
    pub no_save: bool,
    pub receive_queue_count: u32,
}
