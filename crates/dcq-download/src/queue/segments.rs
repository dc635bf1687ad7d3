//! Segment model: the byte ranges of one item and their transfer state.

use dcq_core::{PeerHandle, PersistedSegment, SegmentSizing, SegmentState, TigerHash};

use super::LeaseId;

/// One contiguous byte range of an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub offset: u64,
    pub length: u64,
    pub state: SegmentState,
    /// Source holding this segment while it is in flight.
    pub source: Option<PeerHandle>,
    pub lease: Option<LeaseId>,
    pub retries: u32,
    /// Bytes received in the current attempt.
    pub received: u64,
    /// Leaf hashes observed when the segment verified.
    pub leaves: Vec<TigerHash>,
}

impl Segment {
    fn pending(offset: u64, length: u64) -> Self {
        Self {
            offset,
            length,
            state: SegmentState::Pending,
            source: None,
            lease: None,
            retries: 0,
            received: 0,
            leaves: Vec::new(),
        }
    }

    pub const fn end(&self) -> u64 {
        self.offset + self.length
    }

    fn release(&mut self) {
        self.state = SegmentState::Pending;
        self.source = None;
        self.lease = None;
        self.received = 0;
        self.leaves.clear();
    }
}

/// Round `value` up to a multiple of `block`.
const fn round_up(value: u64, block: u64) -> u64 {
    value.div_ceil(block) * block
}

/// Length of each segment for the first split of an item.
///
/// Always a whole number of blocks, so every segment boundary is a leaf
/// boundary.
pub fn plan_segment_length(size: u64, block_size: u64, sizing: SegmentSizing, sources: usize) -> u64 {
    let raw = match sizing {
        SegmentSizing::Auto { min, max } => {
            let per_source = size / (sources.max(1) as u64);
            per_source.clamp(min, max.max(min))
        }
        SegmentSizing::Fixed(bytes) => bytes,
    };
    round_up(raw.max(1), block_size).min(round_up(size.max(1), block_size))
}

/// Ordered, disjoint segments covering `[0, size)` once split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMap {
    size: u64,
    block_size: u64,
    segments: Vec<Segment>,
}

impl SegmentMap {
    /// An unsplit map.
    pub const fn new(size: u64, block_size: u64) -> Self {
        Self {
            size,
            block_size,
            segments: Vec::new(),
        }
    }

    pub const fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn is_split(&self) -> bool {
        !self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    /// First split, sized for `sources` concurrent sources.
    pub fn split(&mut self, sizing: SegmentSizing, sources: usize) {
        if self.is_split() || self.size == 0 {
            return;
        }
        let length = plan_segment_length(self.size, self.block_size, sizing, sources);
        let mut offset = 0;
        while offset < self.size {
            let len = length.min(self.size - offset);
            self.segments.push(Segment::pending(offset, len));
            offset += len;
        }
    }

    /// Halve pending segments while idle sources outnumber them.
    ///
    /// Only `Pending` ranges are cut and the cut falls on a block boundary.
    /// Returns the number of new segments.
    pub fn resplit(&mut self, idle_sources: usize) -> usize {
        let mut added = 0;
        while idle_sources > self.pending_count() {
            let candidate = self
                .segments
                .iter()
                .enumerate()
                .filter(|(_, s)| s.state == SegmentState::Pending && s.length > self.block_size)
                .max_by_key(|(_, s)| s.length)
                .map(|(i, _)| i);
            let Some(index) = candidate else { break };

            let seg = &mut self.segments[index];
            let blocks = seg.length.div_ceil(self.block_size);
            let first = blocks.div_ceil(2) * self.block_size;
            let tail = Segment::pending(seg.offset + first, seg.length - first);
            seg.length = first;
            self.segments.insert(index + 1, tail);
            added += 1;
        }
        added
    }

    pub fn pending_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| s.state == SegmentState::Pending)
            .count()
    }

    pub fn in_flight_count(&self) -> usize {
        self.segments.iter().filter(|s| s.state.is_in_flight()).count()
    }

    pub fn verified_bytes(&self) -> u64 {
        self.segments
            .iter()
            .filter(|s| s.state == SegmentState::Verified)
            .map(|s| s.length)
            .sum()
    }

    pub fn all_verified(&self) -> bool {
        self.is_split()
            && self
                .segments
                .iter()
                .all(|s| s.state == SegmentState::Verified)
    }

    /// Index of the first pending segment.
    pub fn next_pending(&self) -> Option<usize> {
        self.segments
            .iter()
            .position(|s| s.state == SegmentState::Pending)
    }

    pub fn find_lease(&self, lease: LeaseId) -> Option<usize> {
        self.segments.iter().position(|s| s.lease == Some(lease))
    }

    /// Leases of all in-flight segments.
    pub fn leases(&self) -> Vec<LeaseId> {
        self.segments.iter().filter_map(|s| s.lease).collect()
    }

    /// Claim a pending segment for `peer`.
    pub fn assign(&mut self, index: usize, peer: PeerHandle, lease: LeaseId) -> Option<&Segment> {
        let seg = self.segments.get_mut(index)?;
        if seg.state != SegmentState::Pending {
            return None;
        }
        seg.state = SegmentState::Assigned;
        seg.source = Some(peer);
        seg.lease = Some(lease);
        seg.received = 0;
        Some(seg)
    }

    /// Record received bytes; moves an assigned segment to `Transferring`.
    pub fn record_received(&mut self, lease: LeaseId, received: u64) -> Option<&Segment> {
        let index = self.find_lease(lease)?;
        let seg = &mut self.segments[index];
        if matches!(seg.state, SegmentState::Assigned | SegmentState::Transferring) {
            seg.state = SegmentState::Transferring;
            seg.received = received.min(seg.length);
        }
        Some(seg)
    }

    pub fn mark_verifying(&mut self, lease: LeaseId) -> Option<&Segment> {
        let index = self.find_lease(lease)?;
        let seg = &mut self.segments[index];
        seg.state = SegmentState::Verifying;
        seg.received = seg.length;
        Some(seg)
    }

    /// Mark verified and record the observed leaves. Returns the holder.
    pub fn mark_verified(&mut self, lease: LeaseId, leaves: Vec<TigerHash>) -> Option<Segment> {
        let index = self.find_lease(lease)?;
        let seg = &mut self.segments[index];
        seg.state = SegmentState::Verified;
        seg.lease = None;
        seg.received = seg.length;
        seg.leaves = leaves;
        let done = seg.clone();
        seg.source = None;
        Some(done)
    }

    /// A transfer failed: data discarded, segment back to pending with one
    /// more retry on record. Returns the former holder.
    ///
    /// The segment does not rest in `SegmentState::Failed`; it is pending
    /// again as soon as this returns.
    pub fn fail(&mut self, lease: LeaseId) -> Option<PeerHandle> {
        let index = self.find_lease(lease)?;
        let seg = &mut self.segments[index];
        let holder = seg.source.take();
        seg.release();
        seg.retries += 1;
        holder
    }

    /// Return a segment to pending without counting a retry (cancel, drop).
    pub fn release(&mut self, lease: LeaseId) -> Option<PeerHandle> {
        let index = self.find_lease(lease)?;
        let seg = &mut self.segments[index];
        let holder = seg.source.take();
        seg.release();
        holder
    }

    /// Reset every segment to pending (after a whole-tree mismatch).
    pub fn reset_all(&mut self) -> Vec<LeaseId> {
        let leases = self.leases();
        for seg in &mut self.segments {
            seg.release();
            seg.retries += 1;
        }
        leases
    }

    /// Observed leaves of all verified segments, in file order.
    pub fn observed_leaves(&self) -> Vec<TigerHash> {
        self.segments
            .iter()
            .flat_map(|s| s.leaves.iter().copied())
            .collect()
    }

    /// Disjoint segments whose union is exactly `[0, size)`.
    pub fn covers_exactly(&self) -> bool {
        let mut expected = 0;
        for seg in &self.segments {
            if seg.offset != expected || seg.length == 0 {
                return false;
            }
            expected = seg.end();
        }
        expected == self.size || (self.segments.is_empty() && self.size == 0)
    }

    pub fn to_persisted(&self) -> Vec<PersistedSegment> {
        self.segments
            .iter()
            .map(|s| {
                let verified = s.state == SegmentState::Verified;
                PersistedSegment {
                    offset: s.offset,
                    length: s.length,
                    verified,
                    leaves: if verified { s.leaves.clone() } else { Vec::new() },
                }
            })
            .collect()
    }

    /// Rebuild from persisted segments; an inconsistent layout yields an
    /// unsplit map so the item starts over.
    pub fn from_persisted(size: u64, block_size: u64, persisted: &[PersistedSegment]) -> Self {
        let segments: Vec<Segment> = persisted
            .iter()
            .map(|p| {
                let mut seg = Segment::pending(p.offset, p.length);
                if p.verified {
                    seg.state = SegmentState::Verified;
                    seg.received = p.length;
                    seg.leaves.clone_from(&p.leaves);
                }
                seg
            })
            .collect();
        let map = Self {
            size,
            block_size,
            segments,
        };
        if map.covers_exactly() {
            map
        } else {
            Self::new(size, block_size)
        }
    }
}
