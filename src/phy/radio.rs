//! # Radio State Machine
//!
//! [`Radio`] arbitrates access to a half-duplex transceiver. It moves between
//! `Idle`, `Rx` and `Tx` under the following rules:
//!
//! ```text
//!   Uninitialized --init--> Idle <--set_rx / set_idle--> Rx
//!   {Idle, Rx} --send_packet--> Tx --TxDone--> target (Idle or Rx)
//! ```
//!
//! * TX always pre-empts RX; a reception in progress is dropped.
//! * `set_idle` and `set_rx` never abort a transmission. While TX is in
//!   flight they only replace the post-TX target; the last request wins.
//! * `set_idle` aborts a reception immediately.
//!
//! ## Execution contexts
//!
//! Cooperative calls (`init`, `set_idle`, `set_rx`, `send_packet`, the
//! observers) do O(1) work and never invoke a callback inline. Callbacks only
//! run from the restricted context entry points [`Radio::handle_event`] and
//! [`Radio::service`]. Buffers released by a cooperative call travel through a
//! completion channel and are handed back on the next restricted entry.
//!
//! The shared state sits behind one mutex and callbacks are invoked without
//! it, so a callback may request `set_idle`/`set_rx`. A callback must not call
//! `handle_event` or `service`.

use crate::error::{PhyError, SendRejected};
use crate::phy::access_profile::{AccessClass, AccessProfileTable, SubBand};
use crate::phy::buffer::{BoundCallbacks, RadioCallbacks};
use crate::phy::channel::{clamp_eirp, ChannelId, RxConfig};
use crate::phy::hal::{Clock, HalError, HwEvent, RadioHal};
use crate::phy::packet::{CrcStatus, Packet, RxMetadata, TxStatus, MAX_PACKET_LEN};
use crate::phy::rssi::RssiTracker;
use crate::util::logging::LogThrottle;
use log::{debug, info, warn};
use std::mem;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Operating mode of the transceiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    Uninitialized,
    Idle,
    Rx,
    Tx,
}

/// Counters for frames the driver dropped or completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RadioStats {
    pub rx_frames: u64,
    pub rx_crc_errors: u64,
    pub rx_dropped_no_buffer: u64,
    pub rx_aborted: u64,
    pub rx_faults: u64,
    pub tx_frames: u64,
    pub tx_failures: u64,
}

/// Driver parameters that do not change after construction.
#[derive(Debug, Clone)]
pub struct RadioSettings {
    pub rssi_settle: Duration,
    pub max_packet_len: usize,
    pub eirp_range: (i8, i8),
    pub access_class: AccessClass,
    pub access_profiles: AccessProfileTable,
}

impl Default for RadioSettings {
    fn default() -> Self {
        Self {
            rssi_settle: Duration::from_millis(1),
            max_packet_len: MAX_PACKET_LEN,
            eirp_range: (-39, 10),
            access_class: AccessClass::default(),
            access_profiles: AccessProfileTable::default(),
        }
    }
}

/// State the radio returns to once nothing else is going on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Idle,
    Rx(RxConfig),
}

#[derive(Debug)]
enum RxSlot {
    Empty,
    /// Buffer allocated for the frame on air, with the time its syncword
    /// was detected.
    Receiving { packet: Packet, sync_at: Duration },
    /// A frame is on air but no buffer could be allocated for it.
    Dropping,
}

/// Work handed from the cooperative context to the restricted context.
#[derive(Debug)]
enum Completion {
    Release(Packet),
    /// The hardware refused to start the in-flight transmission.
    TxAborted,
}

enum Action {
    Release(Packet),
    Rx(Packet),
    Tx(Packet),
    RssiValid(i16),
}

struct Inner {
    initialized: bool,
    target: Target,
    hw: RadioState,
    tuned: Option<RxConfig>,
    tx: Option<Packet>,
    rx: RxSlot,
    rx_generation: u64,
    rssi: RssiTracker,
    profiles: AccessProfileTable,
    access_class: AccessClass,
    stats: RadioStats,
    drop_log: LogThrottle,
}

/// PHY driver for one transceiver.
pub struct Radio<H: RadioHal> {
    inner: Mutex<Inner>,
    hal: Mutex<H>,
    callbacks: Mutex<Option<BoundCallbacks>>,
    clock: Box<dyn Clock>,
    completions_tx: UnboundedSender<Completion>,
    completions_rx: Mutex<UnboundedReceiver<Completion>>,
    max_packet_len: usize,
    eirp_range: (i8, i8),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn hardware_failure(err: HalError) -> PhyError {
    PhyError::HardwareFailure(err.to_string())
}

impl<H: RadioHal> Radio<H> {
    /// Create an uninitialized driver.
    ///
    /// The packet size limit and EIRP range are the intersection of
    /// `settings` and what `hal` supports.
    pub fn new(hal: H, clock: impl Clock + 'static, settings: RadioSettings) -> Self {
        let max_packet_len = settings
            .max_packet_len
            .min(hal.max_packet_len())
            .min(MAX_PACKET_LEN);
        let (hal_min, hal_max) = hal.eirp_range();
        let eirp_range = (
            settings.eirp_range.0.max(hal_min),
            settings.eirp_range.1.min(hal_max),
        );
        let (completions_tx, completions_rx) = unbounded_channel();

        Self {
            inner: Mutex::new(Inner {
                initialized: false,
                target: Target::Idle,
                hw: RadioState::Uninitialized,
                tuned: None,
                tx: None,
                rx: RxSlot::Empty,
                rx_generation: 0,
                rssi: RssiTracker::new(settings.rssi_settle),
                profiles: settings.access_profiles,
                access_class: settings.access_class,
                stats: RadioStats::default(),
                drop_log: LogThrottle::new(1000, 5),
            }),
            hal: Mutex::new(hal),
            callbacks: Mutex::new(None),
            clock: Box::new(clock),
            completions_tx,
            completions_rx: Mutex::new(completions_rx),
            max_packet_len,
            eirp_range,
        }
    }

    /// Register the callbacks and put the radio in `Idle`.
    pub fn init(&self, callbacks: RadioCallbacks) -> Result<(), PhyError> {
        {
            let mut slot = lock(&self.callbacks);
            if slot.is_some() {
                return Err(PhyError::AlreadyInitialized);
            }
            *slot = Some(callbacks.bind()?);
        }

        let result = {
            let mut inner = lock(&self.inner);
            let result = lock(&self.hal).enter_idle();
            if result.is_ok() {
                inner.initialized = true;
                inner.target = Target::Idle;
                inner.hw = RadioState::Idle;
            }
            result
        };

        match result {
            Ok(()) => {
                info!("Radio initialized (max packet {} bytes, EIRP {:?} dBm)", self.max_packet_len, self.eirp_range);
                Ok(())
            }
            Err(e) => {
                warn!("Radio initialization failed: {e}");
                lock(&self.callbacks).take();
                Err(hardware_failure(e))
            }
        }
    }

    /// Request IDLE.
    ///
    /// A reception in progress is aborted at once. Its buffer is handed back
    /// through `release` on the next `handle_event` or `service` call; an idle
    /// transceiver raises no events, so the host must call `service` to get
    /// it back. A transmission in progress completes first; `is_idle` reports
    /// true meanwhile.
    pub fn set_idle(&self) -> Result<(), PhyError> {
        let mut inner = lock(&self.inner);
        if !inner.initialized {
            return Err(PhyError::NotInitialized);
        }
        if inner.target == Target::Idle {
            return Err(PhyError::AlreadyIdle);
        }

        inner.target = Target::Idle;
        if inner.tx.is_some() {
            debug!("IDLE requested during TX, deferred");
            return Ok(());
        }

        self.enter_idle(&mut inner).map_err(hardware_failure)
    }

    /// True if the (target) state is IDLE.
    pub fn is_idle(&self) -> bool {
        let inner = lock(&self.inner);
        inner.initialized && inner.target == Target::Idle
    }

    /// Arm reception with `rx_cfg`.
    ///
    /// Fails with `InvalidArgument` if the active access profile does not
    /// permit the channel and with `AlreadyActive` if the radio already
    /// listens with the same configuration.
    pub fn set_rx(&self, rx_cfg: RxConfig) -> Result<(), PhyError> {
        let mut inner = lock(&self.inner);
        if !inner.initialized {
            return Err(PhyError::NotInitialized);
        }
        if !inner.profiles.permits(&rx_cfg.channel_id, inner.access_class) {
            return Err(PhyError::InvalidArgument(format!(
                "channel {:?} not permitted by access class 0x{:02X}",
                rx_cfg.channel_id, inner.access_class.0
            )));
        }
        if inner.target == Target::Rx(rx_cfg) {
            return Err(PhyError::AlreadyActive);
        }

        inner.target = Target::Rx(rx_cfg);
        if inner.tx.is_some() {
            debug!("RX requested during TX, deferred");
            return Ok(());
        }

        self.enter_rx(&mut inner, rx_cfg).map_err(hardware_failure)
    }

    /// True if the (target) state is RX.
    pub fn is_rx(&self) -> bool {
        let inner = lock(&self.inner);
        inner.initialized && matches!(inner.target, Target::Rx(_))
    }

    /// The configuration RX is (or will be, after TX) armed with.
    pub fn rx_config(&self) -> Option<RxConfig> {
        match lock(&self.inner).target {
            Target::Rx(cfg) => Some(cfg),
            Target::Idle => None,
        }
    }

    /// Start transmitting `packet` with its embedded TX configuration.
    ///
    /// On success the driver owns `packet` until the `tx` callback returns it.
    /// On failure it is returned inside the error and no callback fires.
    pub fn send_packet(&self, mut packet: Packet) -> Result<(), SendRejected> {
        let mut inner = lock(&self.inner);
        if !inner.initialized {
            return Err(SendRejected::new(PhyError::NotInitialized, packet));
        }
        let Some(meta) = packet.tx_meta().copied() else {
            return Err(SendRejected::new(
                PhyError::InvalidArgument("packet carries no TX metadata".into()),
                packet,
            ));
        };
        if packet.is_empty() || packet.len() > self.max_packet_len {
            let error = PhyError::SizeError {
                len: packet.len(),
                max: self.max_packet_len,
            };
            return Err(SendRejected::new(error, packet));
        }
        let Some(limits) = inner
            .profiles
            .limits_for(&meta.tx_cfg.channel_id, inner.access_class)
            .copied()
        else {
            return Err(SendRejected::new(
                PhyError::InvalidArgument(format!(
                    "channel {:?} not permitted by access class 0x{:02X}",
                    meta.tx_cfg.channel_id, inner.access_class.0
                )),
                packet,
            ));
        };
        if inner.tx.is_some() {
            return Err(SendRejected::new(PhyError::Busy, packet));
        }

        let (eirp_min, eirp_max) = self.eirp_range;
        let mut tx_cfg = meta.tx_cfg;
        tx_cfg.eirp = clamp_eirp(tx_cfg.eirp, eirp_min, eirp_max.min(limits.eirp_limit));
        if tx_cfg.eirp != meta.tx_cfg.eirp {
            debug!("EIRP {} dBm clamped to {} dBm", meta.tx_cfg.eirp, tx_cfg.eirp);
        }
        if let Some(meta) = packet.tx_meta_mut() {
            meta.tx_cfg = tx_cfg;
            meta.timestamp = None;
            meta.status = TxStatus::Pending;
        }

        self.abort_reception(&mut inner);
        inner.rssi.invalidate();
        inner.tuned = None;
        inner.hw = RadioState::Tx;

        if let Err(e) = lock(&self.hal).start_tx(&tx_cfg, packet.data()) {
            warn!("Transceiver refused TX: {e}");
            if let Some(meta) = packet.tx_meta_mut() {
                meta.status = TxStatus::HardwareFailure;
            }
            self.defer(Completion::TxAborted);
        } else {
            if let Some(meta) = packet.tx_meta_mut() {
                meta.timestamp = Some(self.clock.now());
            }
            debug!("TX started: {} bytes on {:?}", packet.len(), tx_cfg.channel_id);
        }
        inner.tx = Some(packet);
        Ok(())
    }

    /// True while a transmission is in flight.
    pub fn is_tx_busy(&self) -> bool {
        lock(&self.inner).tx.is_some()
    }

    /// True while a frame is being received.
    pub fn is_rx_busy(&self) -> bool {
        !matches!(lock(&self.inner).rx, RxSlot::Empty)
    }

    pub fn rssi_valid(&self) -> bool {
        lock(&self.inner).rssi.is_valid()
    }

    /// Last measured RSSI in dBm, or `RSSI_INVALID`. Never measures.
    pub fn get_rssi(&self) -> i16 {
        lock(&self.inner).rssi.value()
    }

    /// Current transceiver mode.
    pub fn state(&self) -> RadioState {
        lock(&self.inner).hw
    }

    pub fn stats(&self) -> RadioStats {
        lock(&self.inner).stats
    }

    pub fn max_packet_len(&self) -> usize {
        self.max_packet_len
    }

    /// Replace the loaded access profiles.
    pub fn load_access_profiles(&self, profiles: AccessProfileTable) {
        info!("Loaded {} access profiles", profiles.len());
        lock(&self.inner).profiles = profiles;
    }

    /// Select the active access profile and sub-profiles.
    pub fn set_access_class(&self, access_class: AccessClass) -> Result<(), PhyError> {
        let mut inner = lock(&self.inner);
        if inner.profiles.active(access_class).is_none() {
            return Err(PhyError::InvalidArgument(format!(
                "no access profile for access class 0x{:02X}",
                access_class.0
            )));
        }
        inner.access_class = access_class;
        Ok(())
    }

    pub fn access_class(&self) -> AccessClass {
        lock(&self.inner).access_class
    }

    /// Power, duty and CCA limits for `channel` under the active profile.
    pub fn channel_limits(&self, channel: &ChannelId) -> Option<SubBand> {
        let inner = lock(&self.inner);
        inner.profiles.limits_for(channel, inner.access_class).copied()
    }

    /// Restricted-context entry for a hardware event.
    pub fn handle_event(&self, event: HwEvent) {
        self.run_deferred();
        match event {
            HwEvent::SyncDetected { length } => self.on_sync(length),
            HwEvent::RxDone {
                data,
                lqi,
                rssi,
                crc,
            } => self.on_rx_done(&data, lqi, rssi, crc),
            HwEvent::RxFault => self.on_rx_fault(),
            HwEvent::TxDone { ok } => self.on_tx_done(ok),
        }
        self.poll_rssi();
    }

    /// Restricted-context entry without a hardware event: delivers deferred
    /// releases and checks RSSI settling.
    pub fn service(&self) {
        self.run_deferred();
        self.poll_rssi();
    }

    fn defer(&self, completion: Completion) {
        if let Err(e) = self.completions_tx.send(completion) {
            warn!("Completion channel closed, dropping {:?}", e.0);
        }
    }

    fn fire(&self, action: Action) {
        let mut slot = lock(&self.callbacks);
        let Some(cb) = slot.as_mut() else {
            return;
        };
        match action {
            Action::Release(packet) => (cb.release)(packet),
            Action::Rx(packet) => (cb.rx)(packet),
            Action::Tx(packet) => (cb.tx)(packet),
            Action::RssiValid(rssi) => (cb.rssi)(rssi),
        }
    }

    fn run_deferred(&self) {
        let pending: Vec<Completion> = {
            let mut rx = lock(&self.completions_rx);
            std::iter::from_fn(|| rx.try_recv().ok()).collect()
        };
        for completion in pending {
            match completion {
                Completion::Release(packet) => self.fire(Action::Release(packet)),
                Completion::TxAborted => self.on_tx_done(false),
            }
        }
    }

    fn abort_reception(&self, inner: &mut Inner) {
        match mem::replace(&mut inner.rx, RxSlot::Empty) {
            RxSlot::Receiving { packet, .. } => {
                inner.stats.rx_aborted += 1;
                debug!("Reception aborted, releasing buffer");
                self.defer(Completion::Release(packet));
            }
            RxSlot::Dropping | RxSlot::Empty => {}
        }
        inner.rx_generation = inner.rx_generation.wrapping_add(1);
    }

    fn enter_idle(&self, inner: &mut Inner) -> Result<(), HalError> {
        self.abort_reception(inner);
        inner.rssi.invalidate();
        inner.tuned = None;
        inner.hw = RadioState::Idle;
        debug!("Radio -> IDLE");
        lock(&self.hal).enter_idle()
    }

    fn enter_rx(&self, inner: &mut Inner, cfg: RxConfig) -> Result<(), HalError> {
        self.abort_reception(inner);
        let started = lock(&self.hal).start_rx(&cfg);
        if let Err(e) = started {
            warn!("Transceiver refused RX: {e}");
            inner.target = Target::Idle;
            // best effort, the RX error is the one reported
            let _ = self.enter_idle(inner);
            return Err(e);
        }
        inner.tuned = Some(cfg);
        inner.hw = RadioState::Rx;
        inner.rssi.arm(self.clock.now());
        debug!(
            "Radio -> RX on {:?} ({} Hz)",
            cfg.channel_id,
            cfg.channel_id.center_frequency_hz()
        );
        Ok(())
    }

    /// Move to the target state after a transmission.
    fn apply_target(&self, inner: &mut Inner) {
        let result = match inner.target {
            Target::Idle => self.enter_idle(inner),
            Target::Rx(cfg) => self.enter_rx(inner, cfg),
        };
        if let Err(e) = result {
            warn!("Post-TX transition failed: {e}");
        }
    }

    fn on_sync(&self, length: usize) {
        let sync_at = self.clock.now();
        let generation = {
            let mut inner = lock(&self.inner);
            if !inner.initialized || inner.hw != RadioState::Rx {
                debug!("Ignoring syncword outside RX");
                return;
            }
            if let RxSlot::Receiving { packet: stale, .. } =
                mem::replace(&mut inner.rx, RxSlot::Empty)
            {
                inner.stats.rx_faults += 1;
                self.defer(Completion::Release(stale));
            }
            if length == 0 || length > self.max_packet_len {
                inner.stats.rx_faults += 1;
                inner.rx = RxSlot::Dropping;
                debug!("Dropping frame with invalid length {length}");
                return;
            }
            inner.rx_generation
        };
        self.run_deferred();

        // The alloc callback runs without the state lock held.
        let buffer = {
            let mut slot = lock(&self.callbacks);
            slot.as_mut().and_then(|cb| (cb.alloc)(length))
        };

        let mut inner = lock(&self.inner);
        let current = inner.rx_generation == generation && inner.hw == RadioState::Rx;
        match buffer {
            None => {
                inner.stats.rx_dropped_no_buffer += 1;
                if inner.drop_log.allow() {
                    warn!("No buffer for {length}-byte frame, dropping");
                }
                if current {
                    inner.rx = RxSlot::Dropping;
                }
            }
            Some(packet) if !current || packet.capacity() < length => {
                if current {
                    warn!("Allocated buffer too small for {length}-byte frame");
                    inner.stats.rx_dropped_no_buffer += 1;
                    inner.rx = RxSlot::Dropping;
                }
                drop(inner);
                self.fire(Action::Release(packet));
            }
            Some(packet) => inner.rx = RxSlot::Receiving { packet, sync_at },
        }
    }

    fn on_rx_done(&self, data: &[u8], lqi: u8, rssi: i16, crc: CrcStatus) {
        let needs_buffer = {
            let inner = lock(&self.inner);
            inner.initialized && inner.hw == RadioState::Rx && matches!(inner.rx, RxSlot::Empty)
        };
        if needs_buffer {
            self.on_sync(data.len());
        }

        let action = {
            let mut inner = lock(&self.inner);
            if !inner.initialized || inner.hw != RadioState::Rx {
                debug!("Ignoring RX completion outside RX");
                return;
            }
            let Some(rx_cfg) = inner.tuned else {
                return;
            };
            match mem::replace(&mut inner.rx, RxSlot::Empty) {
                RxSlot::Receiving { mut packet, sync_at } => {
                    if packet.fill(data) < data.len() {
                        inner.stats.rx_faults += 1;
                        Action::Release(packet)
                    } else {
                        packet.set_rx_meta(RxMetadata {
                            rx_cfg,
                            lqi,
                            rssi,
                            crc_status: crc,
                            timestamp: Some(sync_at),
                        });
                        inner.stats.rx_frames += 1;
                        if crc == CrcStatus::Invalid {
                            inner.stats.rx_crc_errors += 1;
                        }
                        inner.rssi.record_frame(rssi);
                        Action::Rx(packet)
                    }
                }
                RxSlot::Dropping | RxSlot::Empty => return,
            }
        };
        self.fire(action);
    }

    fn on_rx_fault(&self) {
        let released = {
            let mut inner = lock(&self.inner);
            match mem::replace(&mut inner.rx, RxSlot::Empty) {
                RxSlot::Receiving { packet, .. } => {
                    inner.stats.rx_faults += 1;
                    Some(packet)
                }
                RxSlot::Dropping => {
                    inner.stats.rx_faults += 1;
                    None
                }
                RxSlot::Empty => None,
            }
        };
        if let Some(packet) = released {
            warn!("Reception fault, releasing buffer");
            self.fire(Action::Release(packet));
        }
    }

    fn on_tx_done(&self, ok: bool) {
        let packet = {
            let mut inner = lock(&self.inner);
            let Some(mut packet) = inner.tx.take() else {
                debug!("Ignoring TX completion without a packet in flight");
                return;
            };
            let mut failed = !ok;
            if let Some(meta) = packet.tx_meta_mut() {
                failed |= meta.status == TxStatus::HardwareFailure;
                meta.status = if failed {
                    TxStatus::HardwareFailure
                } else {
                    TxStatus::Sent
                };
            }
            if failed {
                inner.stats.tx_failures += 1;
                warn!("Transmission failed");
            } else {
                inner.stats.tx_frames += 1;
            }
            self.apply_target(&mut inner);
            packet
        };
        self.fire(Action::Tx(packet));
    }

    fn poll_rssi(&self) {
        let measured = {
            let mut inner = lock(&self.inner);
            if !inner.initialized || inner.hw != RadioState::Rx {
                return;
            }
            let now = self.clock.now();
            let hal = &self.hal;
            inner.rssi.poll(now, || lock(hal).measure_rssi())
        };
        if let Some(rssi) = measured {
            debug!("RSSI valid: {rssi} dBm");
            self.fire(Action::RssiValid(rssi));
        }
    }
}
