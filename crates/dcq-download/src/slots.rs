//! Slot ledger: process-wide transfer permits.
//!
//! Download, upload and mini-upload permits are plain atomic counters; a
//! [`SlotHandle`] gives its permit back when dropped. The extra upload slot
//! raises the upload limit by one while [`ExtraSlotPolicy`] holds it.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use dcq_core::SlotConfig;

/// Upload speed samples averaged by the extra slot rule.
const SPEED_SAMPLES: usize = 6;

/// Kind of transfer permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Download,
    Upload,
    /// Small payloads; never competes with regular upload slots.
    MiniUpload,
}

/// One bounded counter. A limit of 0 means unlimited.
#[derive(Debug)]
struct Pool {
    limit: AtomicUsize,
    used: AtomicUsize,
}

impl Pool {
    fn new(limit: u32) -> Self {
        Self {
            limit: AtomicUsize::new(usize::try_from(limit).unwrap_or(usize::MAX)),
            used: AtomicUsize::new(0),
        }
    }

    fn try_acquire(&self) -> bool {
        let mut used = self.used.load(Ordering::Acquire);
        loop {
            let limit = self.limit.load(Ordering::Acquire);
            if limit != 0 && used >= limit {
                return false;
            }
            match self.used.compare_exchange_weak(
                used,
                used + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => used = actual,
            }
        }
    }

    fn release(&self) {
        let mut used = self.used.load(Ordering::Acquire);
        while used > 0 {
            match self.used.compare_exchange_weak(
                used,
                used - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => used = actual,
            }
        }
    }

    fn free(&self) -> Option<usize> {
        let limit = self.limit.load(Ordering::Acquire);
        (limit != 0).then(|| limit.saturating_sub(self.used.load(Ordering::Acquire)))
    }

    fn in_use(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }
}

/// Shared slot counters.
#[derive(Debug)]
pub struct SlotLedger {
    download: Pool,
    upload: Pool,
    mini: Pool,
    mini_max_size: u64,
    extra: AtomicBool,
}

impl SlotLedger {
    pub fn new(config: &SlotConfig) -> Arc<Self> {
        Arc::new(Self {
            download: Pool::new(config.download_slots),
            upload: Pool::new(config.upload_slots),
            mini: Pool::new(config.mini_slots),
            mini_max_size: config.mini_slot_max_size,
            extra: AtomicBool::new(false),
        })
    }

    const fn pool(&self, kind: SlotKind) -> &Pool {
        match kind {
            SlotKind::Download => &self.download,
            SlotKind::Upload => &self.upload,
            SlotKind::MiniUpload => &self.mini,
        }
    }

    /// Take a permit without waiting.
    pub fn try_acquire(self: &Arc<Self>, kind: SlotKind) -> Option<SlotHandle> {
        self.pool(kind).try_acquire().then(|| SlotHandle {
            ledger: Arc::clone(self),
            kind,
        })
    }

    /// Take an upload permit for a payload of `size` bytes: a mini slot for
    /// small payloads when one is free, a regular slot otherwise.
    pub fn acquire_for_upload(self: &Arc<Self>, size: u64) -> Option<SlotHandle> {
        if size <= self.mini_max_size {
            if let Some(handle) = self.try_acquire(SlotKind::MiniUpload) {
                return Some(handle);
            }
        }
        self.try_acquire(SlotKind::Upload)
    }

    /// Free permits of `kind`; `None` when unlimited.
    pub fn free(&self, kind: SlotKind) -> Option<usize> {
        self.pool(kind).free()
    }

    pub fn in_use(&self, kind: SlotKind) -> usize {
        self.pool(kind).in_use()
    }

    pub fn has_extra_slot(&self) -> bool {
        self.extra.load(Ordering::Acquire)
    }

    /// Raise the upload limit by one. Fails when already granted or when
    /// uploads are unlimited.
    fn grant_extra(&self) -> bool {
        if self.upload.limit.load(Ordering::Acquire) == 0 {
            return false;
        }
        if self
            .extra
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.upload.limit.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Lower the upload limit again, only while a regular upload slot is idle.
    fn reclaim_extra(&self) -> bool {
        if !self.has_extra_slot() {
            return false;
        }
        let mut limit = self.upload.limit.load(Ordering::Acquire);
        loop {
            if self.upload.in_use() >= limit || limit <= 1 {
                return false;
            }
            match self.upload.limit.compare_exchange_weak(
                limit,
                limit - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => limit = actual,
            }
        }
        self.extra.store(false, Ordering::Release);
        true
    }
}

/// A held permit. Released on drop.
#[derive(Debug)]
pub struct SlotHandle {
    ledger: Arc<SlotLedger>,
    kind: SlotKind,
}

impl SlotHandle {
    pub const fn kind(&self) -> SlotKind {
        self.kind
    }
}

impl Drop for SlotHandle {
    fn drop(&mut self) {
        self.ledger.pool(self.kind).release();
    }
}

/// Change applied by [`ExtraSlotPolicy::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraSlotChange {
    Granted,
    Reclaimed,
}

/// Opens an extra upload slot while uploads are slow.
#[derive(Debug, Clone)]
pub struct ExtraSlotPolicy {
    floor: u64,
    cooldown: Duration,
    last_grant: Option<Instant>,
    samples: VecDeque<u64>,
}

impl ExtraSlotPolicy {
    pub fn new(config: &SlotConfig) -> Self {
        Self {
            floor: config.extra_slot_floor,
            cooldown: config.extra_slot_cooldown,
            last_grant: None,
            samples: VecDeque::with_capacity(SPEED_SAMPLES),
        }
    }

    /// Record the current total upload speed.
    pub fn report_speed(&mut self, bytes_per_sec: u64) {
        if self.samples.len() == SPEED_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back(bytes_per_sec);
    }

    /// Rolling average of reported speeds, `None` before the first report.
    pub fn average(&self) -> Option<u64> {
        let count = self.samples.len() as u64;
        (count > 0).then(|| self.samples.iter().sum::<u64>() / count)
    }

    /// Grant or reclaim the extra slot.
    ///
    /// Granted at most once per cooldown while the average is below the
    /// floor; reclaimed only when the average recovered and a slot is idle.
    pub fn evaluate(&mut self, now: Instant, ledger: &SlotLedger) -> Option<ExtraSlotChange> {
        let average = self.average()?;
        let slow = self.floor > 0 && average < self.floor;

        if slow {
            let cooled = self
                .last_grant
                .is_none_or(|at| now.duration_since(at) >= self.cooldown);
            if cooled && ledger.grant_extra() {
                self.last_grant = Some(now);
                info!(
                    target: "dcq.slots",
                    average_bps = average,
                    floor_bps = self.floor,
                    "Extra upload slot granted"
                );
                return Some(ExtraSlotChange::Granted);
            }
            return None;
        }

        if ledger.has_extra_slot() {
            if ledger.reclaim_extra() {
                info!(target: "dcq.slots", average_bps = average, "Extra upload slot reclaimed");
                return Some(ExtraSlotChange::Reclaimed);
            }
            debug!(target: "dcq.slots", "Extra upload slot still occupied");
        }
        None
    }
}
