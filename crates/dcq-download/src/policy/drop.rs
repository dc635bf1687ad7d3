//! Slow-source drop policy.
//!
//! Decides which transferring sources to drop. Gates, in order: the
//! per-kind switch, the minimum item size (regular files only), the slow or
//! stalled condition, and the online-source floor.

use std::time::Instant;

use dcq_core::{DropConfig, ItemId, ItemKind, PeerHandle};

use crate::queue::{LeaseId, QueueItem};

/// What to do with a dropped source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropAction {
    /// Remove the source from the item.
    Remove,
    /// Cancel the transfer but keep the source for a later retry.
    Disconnect,
}

/// One source selected for dropping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropDecision {
    pub item: ItemId,
    pub peer: PeerHandle,
    pub lease: LeaseId,
    pub bytes_per_sec: u64,
    pub action: DropAction,
    /// No byte arrived within the inactivity window.
    pub stalled: bool,
}

/// Whether the policy applies to `kind` with `size` bytes.
const fn applies(config: &DropConfig, kind: ItemKind, size: u64) -> bool {
    match kind {
        ItemKind::File => config.drop_slow_sources && size >= config.min_filesize,
        ItemKind::Listing => config.drop_slow_listings,
    }
}

/// Select sources to drop at `now`.
///
/// Never takes an item's online-source count below `min_sources_online`,
/// counting earlier drops of the same pass.
pub fn plan<'a>(
    config: &DropConfig,
    items: impl IntoIterator<Item = &'a QueueItem>,
    now: Instant,
) -> Vec<DropDecision> {
    let mut decisions = Vec::new();
    if !config.drop_slow_sources && !config.drop_slow_listings {
        return decisions;
    }

    for item in items {
        if item.status.is_terminal() || !applies(config, item.kind, item.size) {
            continue;
        }
        let online = item.sources.online_count();
        let mut dropped = 0usize;

        for source in item.sources.iter().filter(|s| s.online) {
            // Tree fetches hold a lease too, but only segment transfers are judged.
            let Some(lease) = source.active else { continue };
            if item.segments.find_lease(lease).is_none() {
                continue;
            }

            let slow = config.speed_floor > 0
                && source
                    .slow_since
                    .is_some_and(|since| now.duration_since(since) >= config.min_elapsed);
            let stalled = source
                .last_progress
                .is_some_and(|at| now.duration_since(at) > config.inactivity);
            if !slow && !stalled {
                continue;
            }
            if online.saturating_sub(dropped + 1) < config.min_sources_online {
                continue;
            }

            dropped += 1;
            decisions.push(DropDecision {
                item: item.id,
                peer: source.peer.clone(),
                lease,
                bytes_per_sec: source.bytes_per_sec(now),
                action: if config.disconnect_only {
                    DropAction::Disconnect
                } else {
                    DropAction::Remove
                },
                stalled: stalled && !slow,
            });
        }
    }
    decisions
}
