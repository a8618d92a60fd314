//! The node directory.
//!
//! A bounded, self-healing mapping from node number to peer record,
//! living inside the owned [`DeviceState`] so the whole directory
//! persists with the rest of the device configuration. Peers broadcast
//! heterogeneous partial reports, so updates merge field by field: the
//! strongest known value wins, except user records, which are full
//! snapshots.

use rand::Rng;

use loramesh_core::constants::{
    DEVICESTATE_MIN_VER, FLOOD_EXPIRE_TIME_MSEC, MAX_NUM_CHANNELS, MAX_NUM_NODES, MIN_APP_VERSION,
    NUM_ONLINE_SECS, NUM_RESERVED,
};
use loramesh_core::packet::effective_from;
use loramesh_core::{MeshPacket, NodeNum, PacketIdSource};

use crate::devicestate::{
    ChannelSettings, CriticalErrorCode, DeviceState, NodeInfo, Position, User,
};
use crate::region::{from_legacy_tag, region_for_code, RegionCode, RegionInfo};

/// Facts that come from the running build rather than from flash.
#[derive(Debug, Clone, Default)]
pub struct BootInfo {
    pub firmware_version: String,
    pub hw_model: String,
    /// Build-time region tag, e.g. `"1.0-EU433"`. Trumps whatever the
    /// saved state holds.
    pub region_tag: Option<String>,
}

/// What came off the flash at boot.
#[derive(Debug)]
pub enum LoadedState {
    /// No saved state; the defaults stand.
    Absent,
    /// The blob would not decode.
    Corrupt,
    /// A decoded state, version not yet checked.
    State(DeviceState),
}

/// Summary of a directory mutation, for observer notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryUpdate {
    pub node: NodeNum,
    /// The user record changed; the power state machine wants to know.
    pub user_changed: bool,
    /// Observers should redraw whether or not counts changed.
    pub notify: bool,
}

/// The node directory plus the device state it lives in.
pub struct NodeDb {
    state: DeviceState,
    mac: [u8; 6],
    read_pointer: usize,
    /// Bumped whenever the radio settings may have changed, so other
    /// components can notice they might be on a new channel.
    radio_generation: u32,
    active_region: Option<&'static RegionInfo>,
}

impl NodeDb {
    pub fn new(mac: [u8; 6]) -> Self {
        Self {
            state: DeviceState::default(),
            mac,
            read_pointer: 0,
            radio_generation: 0,
            active_region: None,
        }
    }

    pub fn device_state(&self) -> &DeviceState {
        &self.state
    }

    pub fn device_state_mut(&mut self) -> &mut DeviceState {
        &mut self.state
    }

    /// Our node number.
    pub fn node_num(&self) -> NodeNum {
        self.state.my_node.my_node_num
    }

    pub fn num_nodes(&self) -> usize {
        self.state.node_db.len()
    }

    pub fn radio_generation(&self) -> u32 {
        self.radio_generation
    }

    pub fn active_region(&self) -> Option<&'static RegionInfo> {
        self.active_region
    }

    /// Find a peer record. A pure linear scan with no allocation, safe
    /// to call from interrupt context.
    #[must_use]
    pub fn get_node(&self, n: NodeNum) -> Option<&NodeInfo> {
        self.state.node_db.iter().find(|info| info.num == n)
    }

    /// Find or append a peer record.
    ///
    /// Panics when the directory is full: `MAX_NUM_NODES` is sized
    /// above mesh capacity, so overflow means the deployment exceeded
    /// design bounds.
    pub fn get_or_create_node(&mut self, n: NodeNum) -> &mut NodeInfo {
        if let Some(idx) = self.state.node_db.iter().position(|info| info.num == n) {
            return &mut self.state.node_db[idx];
        }

        assert!(
            self.state.node_db.len() < MAX_NUM_NODES,
            "node directory full; mesh exceeds design bounds"
        );
        self.state.node_db.push(NodeInfo::new(n));
        let idx = self.state.node_db.len() - 1;
        &mut self.state.node_db[idx]
    }

    /// Stateful iteration cursor over the directory. Returns successive
    /// records, then nothing past the end; resetting is the caller's
    /// responsibility.
    pub fn read_next_info(&mut self) -> Option<&NodeInfo> {
        let idx = self.read_pointer;
        if idx < self.state.node_db.len() {
            self.read_pointer += 1;
            Some(&self.state.node_db[idx])
        } else {
            None
        }
    }

    pub fn reset_read_pointer(&mut self) {
        self.read_pointer = 0;
    }

    /// Seconds since we last heard from a peer. A clock still behind a
    /// peer's GPS-synced stamp clamps to zero.
    #[must_use]
    pub fn since_last_seen(info: &NodeInfo, now_secs: u32) -> u32 {
        now_secs.saturating_sub(info.position.time)
    }

    /// Peers heard within the online threshold.
    #[must_use]
    pub fn num_online_nodes(&self, now_secs: u32) -> usize {
        self.state
            .node_db
            .iter()
            .filter(|info| Self::since_last_seen(info, now_secs) < NUM_ONLINE_SECS)
            .count()
    }

    /// Merge a received position report into a peer record.
    pub fn update_position(&mut self, node: NodeNum, p: &Position) -> DirectoryUpdate {
        tracing::debug!(
            node = %node,
            time = p.time,
            lat = p.latitude_i,
            lon = p.longitude_i,
            "directory position update"
        );
        let info = self.get_or_create_node(node);

        // Only adopt fields the sender populated. Many reports carry no
        // time; the stamp recorded from rx_time must survive those.
        if info.position.time == 0 && p.time != 0 {
            info.position.time = p.time;
        }
        if p.battery_level != 0 {
            info.position.battery_level = p.battery_level;
        }
        if p.latitude_i != 0 || p.longitude_i != 0 {
            info.position.latitude_i = p.latitude_i;
            info.position.longitude_i = p.longitude_i;
        }
        info.has_position = true;

        DirectoryUpdate {
            node,
            user_changed: false,
            notify: true,
        }
    }

    /// Replace a peer's user record with a received snapshot.
    pub fn update_user(&mut self, node: NodeNum, user: User) -> DirectoryUpdate {
        let info = self.get_or_create_node(node);
        let changed = info.user != user;

        tracing::debug!(
            node = %node,
            changed,
            id = %user.id,
            long_name = %user.long_name,
            "directory user update"
        );
        info.user = user;
        info.has_user = true;

        DirectoryUpdate {
            node,
            user_changed: changed,
            notify: changed,
        }
    }

    /// Update the sender's record from a packet sniffed off the mesh.
    pub fn update_from(&mut self, mp: &MeshPacket) {
        if mp.decoded().is_none() {
            return;
        }

        let from = effective_from(mp, self.node_num());
        tracing::debug!(node = %from, rx_time = mp.rx_time, "directory update from packet");

        let info = self.get_or_create_node(from);
        if mp.rx_time != 0 {
            // At least the time is valid.
            info.has_position = true;
            info.position.time = mp.rx_time;
        }
        info.snr = mp.rx_snr;
    }

    /// Choose our node number.
    ///
    /// Starts from whatever flash held, falls back to the low MAC
    /// bytes, clamps out of the reserved and broadcast values, then
    /// re-rolls while a different-MAC peer already owns the number. The
    /// loop terminates because the address space dwarfs the directory.
    pub fn pick_new_node_num(&mut self) {
        let mut r = self.state.my_node.my_node_num.as_u32();

        if r == 0 {
            r = u32::from_be_bytes([self.mac[2], self.mac[3], self.mac[4], self.mac[5]]);
        }
        if r == NodeNum::BROADCAST.as_u32() || r < NUM_RESERVED {
            r = NUM_RESERVED;
        }

        let mut rng = rand::thread_rng();
        loop {
            let taken = self
                .get_node(NodeNum::new(r))
                .is_some_and(|found| found.user.macaddr != self.state.owner.macaddr);
            if !taken {
                break;
            }
            let n = rng.gen_range(NUM_RESERVED..NodeNum::BROADCAST.as_u32());
            tracing::info!(
                wanted = %NodeNum::new(r),
                trying = %NodeNum::new(n),
                "desired node number is in use"
            );
            r = n;
        }

        self.state.my_node.my_node_num = NodeNum::new(r);
    }

    /// Wipe the state back to factory defaults.
    pub fn install_default_device_state(&mut self, ids: &mut PacketIdSource) {
        // Discarding the region would really bum users out, so both
        // encodings survive the wipe.
        let old_region_tag = std::mem::take(&mut self.state.my_node.region);
        let old_region = self.state.radio.preferences.region;

        self.state = DeviceState::default();

        // Presence flags up front so the serialized form is well formed.
        self.state.has_my_node = true;
        self.state.has_radio = true;
        self.state.has_owner = true;
        self.state.radio.has_preferences = true;

        self.reset_radio_config(ids);

        // No GPS until probing finds one.
        self.state.my_node.has_gps = false;
        self.state.my_node.message_timeout_msec = FLOOD_EXPIRE_TIME_MSEC;
        ids.reserve();

        self.pick_new_node_num();
        let num = self.node_num();
        self.state.owner.long_name = format!("Unknown {:02x}{:02x}", self.mac[4], self.mac[5]);
        self.state.owner.short_name = format!("?{:02X}", num.as_u32() & 0xff);
        self.state.owner.id = num.to_string();
        self.state.owner.macaddr = self.mac;

        if old_region != RegionCode::Unset {
            self.state.radio.preferences.region = old_region;
        }
        if !old_region_tag.is_empty() {
            self.state.my_node.region = old_region_tag;
        }
    }

    /// Re-derive everything that depends on the radio settings. Returns
    /// whether a factory reset was performed.
    pub fn reset_radio_config(&mut self, ids: &mut PacketIdSource) -> bool {
        let mut did_factory_reset = false;

        self.radio_generation += 1;

        if self.state.radio.preferences.factory_reset {
            tracing::warn!("performing factory reset");
            // The wipe clears the flag, so this does not recurse again.
            self.install_default_device_state(ids);
            did_factory_reset = true;
        } else if self.state.channels.is_empty() {
            tracing::info!("installing default channel and radio preferences");
            self.state.channels.push(ChannelSettings::default_primary());
            self.state.radio.has_preferences = true;
        }

        if self.state.no_save {
            tracing::warn!("development mode, applying quick-cycle preferences");
            let prefs = &mut self.state.radio.preferences;
            prefs.screen_on_secs = 10;
            prefs.wait_bluetooth_secs = 10;
            prefs.position_broadcast_secs = 6 * 60;
            prefs.ls_secs = 60;
            prefs.region = RegionCode::Tw;
        }

        self.active_region = region_for_code(self.state.radio.preferences.region);

        did_factory_reset
    }

    /// Boot the directory: defaults, then whatever flash held, then the
    /// facts that only the running build can supply.
    pub fn init(&mut self, loaded: LoadedState, boot: &BootInfo, ids: &mut PacketIdSource) {
        self.install_default_device_state(ids);

        let mut corrupt = false;
        match loaded {
            LoadedState::Absent => tracing::info!("no saved device state found"),
            LoadedState::Corrupt => {
                tracing::warn!("saved device state corrupt, keeping defaults");
                corrupt = true;
            }
            LoadedState::State(state) => {
                if state.version < DEVICESTATE_MIN_VER {
                    tracing::warn!(version = state.version, "saved device state is old, discarding");
                    // Adopt first so the saved region survives the
                    // reinstall.
                    self.state = state;
                    self.install_default_device_state(ids);
                } else {
                    tracing::info!(version = state.version, "loaded saved device state");
                    self.state = state;
                }
            }
        }

        self.state.my_node.max_channels = MAX_NUM_CHANNELS;

        // Only errors from this boot may surface; flash may hold stale
        // ones.
        self.state.my_node.error_code = CriticalErrorCode::None;
        self.state.my_node.error_address = 0;

        if corrupt {
            self.record_critical_error(CriticalErrorCode::Unspecified, 0);
        }

        // App requirements always come from the running build.
        self.state.my_node.min_app_version = MIN_APP_VERSION;

        // Flash may hold a bogus node number; re-check against the
        // directory instead of trusting it forever.
        self.pick_new_node_num();

        // Our own record always exists and mirrors the owner.
        let owner = self.state.owner.clone();
        let num = self.node_num();
        let info = self.get_or_create_node(num);
        info.user = owner;
        info.has_user = true;

        // Build metadata is more trusted than whatever flash held.
        if let Some(tag) = &boot.region_tag {
            self.state.my_node.region = tag.clone();
        }

        // Convert the old style of region string to the enum once.
        if self.state.radio.preferences.region == RegionCode::Unset {
            if let Some(code) = from_legacy_tag(&self.state.my_node.region) {
                self.state.radio.preferences.region = code;
            }
        }

        self.state.my_node.firmware_version = boot.firmware_version.clone();
        self.state.my_node.hw_model = boot.hw_model.clone();

        // If bogus settings got saved, fix them.
        self.reset_radio_config(ids);

        tracing::debug!(
            legacy_region = %self.state.my_node.region,
            region = ?self.state.radio.preferences.region,
            node = %self.node_num(),
            nodes = self.state.node_db.len(),
            "directory initialized"
        );
    }

    /// Record an error worth showing the user and reporting upstream.
    pub fn record_critical_error(&mut self, code: CriticalErrorCode, address: u32) {
        tracing::error!(?code, address, "recording critical error");
        self.state.my_node.error_code = code;
        self.state.my_node.error_address = address;
        self.state.my_node.error_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC: [u8; 6] = [0x02, 0x11, 0x22, 0x33, 0x44, 0x55];

    fn booted_db() -> NodeDb {
        let mut db = NodeDb::new(MAC);
        let mut ids = PacketIdSource::from_seed(0);
        db.init(LoadedState::Absent, &BootInfo::default(), &mut ids);
        db
    }

    // === directory basics ===

    #[test]
    fn boot_includes_own_record() {
        let db = booted_db();
        let own = db.get_node(db.node_num()).expect("own record must exist");
        assert!(own.has_user);
        assert_eq!(own.user, db.device_state().owner);
    }

    #[test]
    fn node_num_avoids_reserved_and_broadcast() {
        let db = booted_db();
        assert!(!db.node_num().is_reserved());
        assert!(!db.node_num().is_broadcast());
    }

    #[test]
    fn node_num_derived_from_mac() {
        let db = booted_db();
        assert_eq!(db.node_num(), NodeNum::new(0x2233_4455));
    }

    #[test]
    fn low_mac_candidate_clamps_to_reserved_floor() {
        let mut db = NodeDb::new([0, 0, 0, 0, 0, 2]);
        let mut ids = PacketIdSource::from_seed(0);
        db.init(LoadedState::Absent, &BootInfo::default(), &mut ids);
        assert_eq!(db.node_num(), NodeNum::new(NUM_RESERVED));
    }

    #[test]
    fn conflicting_node_num_rerolls() {
        // A saved directory where a different-MAC peer already owns the
        // number our MAC derives.
        let mut saved = DeviceState {
            version: DEVICESTATE_MIN_VER,
            ..Default::default()
        };
        let mut peer = NodeInfo::new(NodeNum::new(0x2233_4455));
        peer.user.macaddr = [0xAA; 6];
        peer.has_user = true;
        saved.node_db.push(peer);

        let mut db = NodeDb::new(MAC);
        let mut ids = PacketIdSource::from_seed(0);
        db.init(LoadedState::State(saved), &BootInfo::default(), &mut ids);

        assert_ne!(db.node_num(), NodeNum::new(0x2233_4455));
        assert!(!db.node_num().is_reserved());
        assert!(!db.node_num().is_broadcast());
    }

    #[test]
    fn same_mac_record_is_not_a_conflict() {
        let mut db = NodeDb::new(MAC);
        let mut ids = PacketIdSource::from_seed(0);
        db.install_default_device_state(&mut ids);

        // Our own earlier record, same MAC: keep the number.
        let num = db.node_num();
        let own = db.get_or_create_node(num);
        own.user.macaddr = MAC;

        db.pick_new_node_num();
        assert_eq!(db.node_num(), num);
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let mut db = booted_db();
        db.get_or_create_node(NodeNum::new(0x42));
        db.get_or_create_node(NodeNum::new(0x42));
        // Own record plus one peer.
        assert_eq!(db.num_nodes(), 2);
    }

    #[test]
    #[should_panic(expected = "node directory full")]
    fn full_directory_asserts() {
        let mut db = booted_db();
        for i in 0..MAX_NUM_NODES as u32 {
            db.get_or_create_node(NodeNum::new(0x1000 + i));
        }
    }

    #[test]
    fn read_cursor_walks_and_stops() {
        let mut db = booted_db();
        db.get_or_create_node(NodeNum::new(0x42));

        db.reset_read_pointer();
        let mut seen = 0;
        while db.read_next_info().is_some() {
            seen += 1;
        }
        assert_eq!(seen, db.num_nodes());
        assert!(db.read_next_info().is_none());

        db.reset_read_pointer();
        assert!(db.read_next_info().is_some());
    }

    // === liveness ===

    #[test]
    fn online_count_honors_threshold() {
        let mut db = booted_db();
        let now = 100_000;

        db.get_or_create_node(NodeNum::new(1)).position.time = now - NUM_ONLINE_SECS + 1;
        db.get_or_create_node(NodeNum::new(2)).position.time = now - NUM_ONLINE_SECS;

        // Own record has time zero and counts as offline; node 1 is
        // just inside the window, node 2 just outside.
        assert_eq!(db.num_online_nodes(now), 1);
    }

    #[test]
    fn since_last_seen_clamps_clock_skew() {
        let mut info = NodeInfo::new(NodeNum::new(1));
        info.position.time = 5000;
        // Our clock is behind the peer's GPS-synced stamp.
        assert_eq!(NodeDb::since_last_seen(&info, 4000), 0);
        assert_eq!(NodeDb::since_last_seen(&info, 6000), 1000);
    }

    // === merge rules ===

    #[test]
    fn position_merge_keeps_known_fields() {
        let mut db = booted_db();
        let node = NodeNum::new(0x42);

        let first = Position {
            latitude_i: 50,
            longitude_i: 60,
            time: 1000,
            battery_level: 80,
        };
        db.update_position(node, &first);

        // A later report with no time, no coordinates, fresher battery.
        let partial = Position {
            latitude_i: 0,
            longitude_i: 0,
            time: 0,
            battery_level: 75,
        };
        let update = db.update_position(node, &partial);
        assert!(update.notify);

        let info = db.get_node(node).unwrap();
        assert!(info.has_position);
        assert_eq!(info.position.time, 1000);
        assert_eq!(info.position.latitude_i, 50);
        assert_eq!(info.position.longitude_i, 60);
        assert_eq!(info.position.battery_level, 75);
    }

    #[test]
    fn position_time_is_written_once() {
        let mut db = booted_db();
        let node = NodeNum::new(0x42);

        db.update_position(node, &Position { time: 1000, ..Default::default() });
        db.update_position(node, &Position { time: 2000, ..Default::default() });

        // The first known time wins; later reports do not overwrite it.
        assert_eq!(db.get_node(node).unwrap().position.time, 1000);
    }

    #[test]
    fn coordinates_update_when_either_is_set() {
        let mut db = booted_db();
        let node = NodeNum::new(0x42);

        db.update_position(
            node,
            &Position {
                latitude_i: 50,
                longitude_i: 60,
                ..Default::default()
            },
        );
        db.update_position(
            node,
            &Position {
                latitude_i: 0,
                longitude_i: 70,
                ..Default::default()
            },
        );

        let info = db.get_node(node).unwrap();
        assert_eq!(info.position.latitude_i, 0);
        assert_eq!(info.position.longitude_i, 70);
    }

    #[test]
    fn user_update_detects_change() {
        let mut db = booted_db();
        let node = NodeNum::new(0x42);
        let user = User {
            id: "!00000042".to_string(),
            long_name: "Test Node".to_string(),
            short_name: "TN".to_string(),
            macaddr: [1, 2, 3, 4, 5, 6],
        };

        let first = db.update_user(node, user.clone());
        assert!(first.user_changed);
        assert!(first.notify);
        assert!(db.get_node(node).unwrap().has_user);

        let repeat = db.update_user(node, user);
        assert!(!repeat.user_changed);
        assert!(!repeat.notify);
    }

    #[test]
    fn update_from_records_time_and_snr() {
        use loramesh_core::{Data, PacketId, PayloadVariant, PortNum};

        let mut db = booted_db();
        let mp = MeshPacket {
            from: NodeNum::new(0x42),
            rx_time: 12345,
            rx_snr: 7.5,
            payload: Some(PayloadVariant::Decoded(Data {
                portnum: PortNum::TextMessage,
                payload: vec![],
                request_id: PacketId::ZERO,
            })),
            ..Default::default()
        };
        db.update_from(&mp);

        let info = db.get_node(NodeNum::new(0x42)).unwrap();
        assert!(info.has_position);
        assert_eq!(info.position.time, 12345);
        assert_eq!(info.snr, 7.5);
    }

    #[test]
    fn update_from_ignores_undecoded_packets() {
        let mut db = booted_db();
        let before = db.num_nodes();

        let mp = MeshPacket {
            from: NodeNum::new(0x42),
            rx_time: 12345,
            ..Default::default()
        };
        db.update_from(&mp);
        assert_eq!(db.num_nodes(), before);
    }

    #[test]
    fn update_from_zero_rx_time_keeps_stamp() {
        use loramesh_core::{Data, PacketId, PayloadVariant, PortNum};

        let mut db = booted_db();
        let node = NodeNum::new(0x42);
        db.get_or_create_node(node).position.time = 999;

        let mp = MeshPacket {
            from: node,
            rx_time: 0,
            rx_snr: 3.0,
            payload: Some(PayloadVariant::Decoded(Data {
                portnum: PortNum::TextMessage,
                payload: vec![],
                request_id: PacketId::ZERO,
            })),
            ..Default::default()
        };
        db.update_from(&mp);

        let info = db.get_node(node).unwrap();
        assert_eq!(info.position.time, 999);
        assert_eq!(info.snr, 3.0);
    }

    // === defaults and boot ===

    #[test]
    fn default_owner_strings_from_mac() {
        let db = booted_db();
        let owner = &db.device_state().owner;

        assert_eq!(owner.long_name, "Unknown 4455");
        assert_eq!(owner.short_name, "?55");
        assert_eq!(owner.id, "!22334455");
        assert_eq!(owner.macaddr, MAC);
    }

    #[test]
    fn default_install_sets_presence_flags() {
        let mut db = NodeDb::new(MAC);
        let mut ids = PacketIdSource::from_seed(0);
        db.install_default_device_state(&mut ids);

        let state = db.device_state();
        assert!(state.has_my_node);
        assert!(state.has_radio);
        assert!(state.has_owner);
        assert!(state.radio.has_preferences);
        assert!(state.node_db.is_empty());
        assert!(!state.my_node.has_gps);
        assert_eq!(state.my_node.message_timeout_msec, FLOOD_EXPIRE_TIME_MSEC);
        assert_eq!(state.channels.len(), 1);
    }

    #[test]
    fn default_install_preserves_region() {
        let mut db = NodeDb::new(MAC);
        let mut ids = PacketIdSource::from_seed(0);
        db.install_default_device_state(&mut ids);

        db.device_state_mut().radio.preferences.region = RegionCode::Eu433;
        db.device_state_mut().my_node.region = "1.0-EU433".to_string();

        db.install_default_device_state(&mut ids);
        assert_eq!(db.device_state().radio.preferences.region, RegionCode::Eu433);
        assert_eq!(db.device_state().my_node.region, "1.0-EU433");
    }

    #[test]
    fn init_discards_stale_version_but_keeps_region() {
        let mut stale = DeviceState {
            version: DEVICESTATE_MIN_VER - 1,
            ..Default::default()
        };
        stale.radio.preferences.region = RegionCode::Kr;
        stale.owner.long_name = "Old Owner".to_string();
        stale.node_db.push(NodeInfo::new(NodeNum::new(0x42)));

        let mut db = NodeDb::new(MAC);
        let mut ids = PacketIdSource::from_seed(0);
        db.init(LoadedState::State(stale), &BootInfo::default(), &mut ids);

        // The stale directory and owner are gone, the region survives.
        assert!(db.get_node(NodeNum::new(0x42)).is_none());
        assert_eq!(db.device_state().owner.long_name, "Unknown 4455");
        assert_eq!(db.device_state().radio.preferences.region, RegionCode::Kr);
    }

    #[test]
    fn init_accepts_current_version() {
        let mut saved = DeviceState {
            version: DEVICESTATE_MIN_VER,
            ..Default::default()
        };
        saved.owner.long_name = "Kept Owner".to_string();
        saved.owner.macaddr = MAC;

        let mut db = NodeDb::new(MAC);
        let mut ids = PacketIdSource::from_seed(0);
        db.init(LoadedState::State(saved), &BootInfo::default(), &mut ids);

        assert_eq!(db.device_state().owner.long_name, "Kept Owner");
    }

    #[test]
    fn init_clears_prior_boot_errors() {
        let mut saved = DeviceState {
            version: DEVICESTATE_MIN_VER,
            ..Default::default()
        };
        saved.my_node.error_code = CriticalErrorCode::NoRadio;
        saved.my_node.error_address = 0xDEAD;
        saved.my_node.error_count = 3;

        let mut db = NodeDb::new(MAC);
        let mut ids = PacketIdSource::from_seed(0);
        db.init(LoadedState::State(saved), &BootInfo::default(), &mut ids);

        let my_node = &db.device_state().my_node;
        assert_eq!(my_node.error_code, CriticalErrorCode::None);
        assert_eq!(my_node.error_address, 0);
        // The lifetime count is not reset.
        assert_eq!(my_node.error_count, 3);
    }

    #[test]
    fn init_surfaces_corrupt_state() {
        let mut db = NodeDb::new(MAC);
        let mut ids = PacketIdSource::from_seed(0);
        db.init(LoadedState::Corrupt, &BootInfo::default(), &mut ids);

        let my_node = &db.device_state().my_node;
        assert_eq!(my_node.error_code, CriticalErrorCode::Unspecified);
        assert_eq!(my_node.error_count, 1);
    }

    #[test]
    fn init_converts_legacy_region_tag() {
        let boot = BootInfo {
            region_tag: Some("1.0-EU865".to_string()),
            ..Default::default()
        };

        let mut db = NodeDb::new(MAC);
        let mut ids = PacketIdSource::from_seed(0);
        db.init(LoadedState::Absent, &boot, &mut ids);

        assert_eq!(db.device_state().radio.preferences.region, RegionCode::Eu865);
        assert_eq!(db.active_region().unwrap().name, "EU865");
    }

    #[test]
    fn legacy_tag_does_not_override_configured_region() {
        let mut saved = DeviceState {
            version: DEVICESTATE_MIN_VER,
            ..Default::default()
        };
        saved.radio.preferences.region = RegionCode::Us;

        let boot = BootInfo {
            region_tag: Some("1.0-EU865".to_string()),
            ..Default::default()
        };

        let mut db = NodeDb::new(MAC);
        let mut ids = PacketIdSource::from_seed(0);
        db.init(LoadedState::State(saved), &boot, &mut ids);

        assert_eq!(db.device_state().radio.preferences.region, RegionCode::Us);
    }

    #[test]
    fn init_stamps_build_facts() {
        let boot = BootInfo {
            firmware_version: "9.9.9".to_string(),
            hw_model: "bench".to_string(),
            region_tag: None,
        };

        let mut db = NodeDb::new(MAC);
        let mut ids = PacketIdSource::from_seed(0);
        db.init(LoadedState::Absent, &boot, &mut ids);

        let my_node = &db.device_state().my_node;
        assert_eq!(my_node.firmware_version, "9.9.9");
        assert_eq!(my_node.hw_model, "bench");
        assert_eq!(my_node.max_channels, MAX_NUM_CHANNELS);
        assert_eq!(my_node.min_app_version, MIN_APP_VERSION);
    }

    // === radio config ===

    #[test]
    fn factory_reset_flag_wipes_state() {
        let mut db = booted_db();
        let mut ids = PacketIdSource::from_seed(0);

        db.get_or_create_node(NodeNum::new(0x42));
        db.device_state_mut().radio.preferences.factory_reset = true;

        assert!(db.reset_radio_config(&mut ids));
        assert!(db.get_node(NodeNum::new(0x42)).is_none());
        assert!(!db.device_state().radio.preferences.factory_reset);
    }

    #[test]
    fn radio_generation_bumps_on_reset() {
        let mut db = booted_db();
        let mut ids = PacketIdSource::from_seed(0);
        let before = db.radio_generation();
        db.reset_radio_config(&mut ids);
        assert_eq!(db.radio_generation(), before + 1);
    }

    #[test]
    fn dev_mode_applies_quick_cycle_preferences() {
        let mut db = booted_db();
        let mut ids = PacketIdSource::from_seed(0);

        db.device_state_mut().no_save = true;
        db.reset_radio_config(&mut ids);

        let prefs = &db.device_state().radio.preferences;
        assert_eq!(prefs.screen_on_secs, 10);
        assert_eq!(prefs.ls_secs, 60);
        assert_eq!(prefs.region, RegionCode::Tw);
    }

    // === critical errors ===

    #[test]
    fn critical_errors_accumulate() {
        let mut db = booted_db();
        db.record_critical_error(CriticalErrorCode::NoRadio, 0x100);
        db.record_critical_error(CriticalErrorCode::TransmitFailed, 0x200);

        let my_node = &db.device_state().my_node;
        assert_eq!(my_node.error_code, CriticalErrorCode::TransmitFailed);
        assert_eq!(my_node.error_address, 0x200);
        assert_eq!(my_node.error_count, 2);
    }
}
