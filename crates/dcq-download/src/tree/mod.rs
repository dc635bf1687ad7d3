//! Tiger tree hashing and verification.
//!
//! Merkle tree over 1024-byte base pieces: a leaf is `Tiger(0x00 || data)`,
//! an inner node is `Tiger(0x01 || left || right)`, and an odd node at the
//! end of a level is promoted unchanged. The root identifies the content.
//!
//! Items are verified at a coarser granularity: each leaf of a
//! [`HashTree`] covers one *block* (a power-of-two multiple of 1024 bytes),
//! and the hash of a block is the subtree root over its pieces.

use thiserror::Error;
use tiger::{Digest, Tiger};

use dcq_core::TigerHash;

/// Size of a base piece.
pub const BASE_PIECE: u64 = 1024;

/// Smallest block size chosen by [`default_block_size`].
pub const MIN_BLOCK_SIZE: u64 = 64 * 1024;

/// Most leaves an item tree will have with [`default_block_size`].
pub const MAX_LEAVES: u64 = 512;

/// Errors building or reshaping a tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("tree has no leaves")]
    Empty,

    #[error("expected {expected} leaves, got {actual}")]
    LeafCount { expected: u64, actual: u64 },

    #[error("leaves do not recombine to the root")]
    RootMismatch,

    #[error("block size {0} is not a power-of-two multiple of 1024")]
    BadBlockSize(u64),

    #[error("cannot refine {from}-byte leaves into {to}-byte leaves")]
    TooCoarse { from: u64, to: u64 },
}

fn digest(prefix: u8, parts: &[&[u8]]) -> TigerHash {
    let mut hasher = Tiger::new();
    hasher.update([prefix]);
    for part in parts {
        hasher.update(part);
    }
    let out = hasher.finalize();
    let mut bytes = [0u8; 24];
    bytes.copy_from_slice(&out);
    TigerHash::from_bytes(bytes)
}

/// Hash of one base piece.
pub fn leaf_hash(data: &[u8]) -> TigerHash {
    digest(0x00, &[data])
}

/// Hash of an inner node.
pub fn node_hash(left: &TigerHash, right: &TigerHash) -> TigerHash {
    digest(0x01, &[left.as_bytes(), right.as_bytes()])
}

/// Collapse one level into the next.
fn reduce_level(level: &[TigerHash]) -> Vec<TigerHash> {
    level
        .chunks(2)
        .map(|pair| {
            if let [left, right] = pair {
                node_hash(left, right)
            } else {
                pair[0]
            }
        })
        .collect()
}

/// Recombine a level of hashes up to the root.
pub fn root_from_leaves(leaves: &[TigerHash]) -> Result<TigerHash, TreeError> {
    if leaves.is_empty() {
        return Err(TreeError::Empty);
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = reduce_level(&level);
    }
    Ok(level[0])
}

/// Subtree root over the base pieces of `data`.
///
/// Empty input hashes as a single empty piece, so the root of a zero-length
/// file is `leaf_hash(&[])`.
pub fn hash_block(data: &[u8]) -> TigerHash {
    if data.is_empty() {
        return leaf_hash(data);
    }
    #[allow(clippy::cast_possible_truncation)]
    let pieces: Vec<TigerHash> = data.chunks(BASE_PIECE as usize).map(leaf_hash).collect();
    let mut level = pieces;
    while level.len() > 1 {
        level = reduce_level(&level);
    }
    level[0]
}

/// Block size for an item of `size` bytes: at least 64 KiB, a power of two,
/// and large enough that the tree has at most 512 leaves.
pub fn default_block_size(size: u64) -> u64 {
    let mut block = MIN_BLOCK_SIZE;
    while size.div_ceil(block) > MAX_LEAVES {
        block *= 2;
    }
    block
}

/// Number of leaves covering `size` bytes at `block_size` (at least one).
pub fn leaf_count(size: u64, block_size: u64) -> u64 {
    size.div_ceil(block_size).max(1)
}

fn check_block_size(block_size: u64) -> Result<(), TreeError> {
    if block_size < BASE_PIECE || !block_size.is_power_of_two() {
        return Err(TreeError::BadBlockSize(block_size));
    }
    Ok(())
}

/// Leaf level of an item's tree plus the root it must reproduce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashTree {
    root: TigerHash,
    size: u64,
    block_size: u64,
    leaves: Vec<TigerHash>,
}

impl HashTree {
    /// Build a tree by hashing `data`.
    pub fn from_data(data: &[u8], block_size: u64) -> Result<Self, TreeError> {
        check_block_size(block_size)?;
        let leaves: Vec<TigerHash> = if data.is_empty() {
            vec![hash_block(data)]
        } else {
            #[allow(clippy::cast_possible_truncation)]
            data.chunks(block_size as usize).map(hash_block).collect()
        };
        let root = root_from_leaves(&leaves)?;
        Ok(Self {
            root,
            size: data.len() as u64,
            block_size,
            leaves,
        })
    }

    /// Accept leaves served by a peer, checking count and root.
    pub fn from_leaves(
        root: TigerHash,
        size: u64,
        block_size: u64,
        leaves: Vec<TigerHash>,
    ) -> Result<Self, TreeError> {
        check_block_size(block_size)?;
        let expected = leaf_count(size, block_size);
        if leaves.len() as u64 != expected {
            return Err(TreeError::LeafCount {
                expected,
                actual: leaves.len() as u64,
            });
        }
        if root_from_leaves(&leaves)? != root {
            return Err(TreeError::RootMismatch);
        }
        Ok(Self {
            root,
            size,
            block_size,
            leaves,
        })
    }

    /// Tree of an item that fits in a single block: the root is the leaf.
    pub fn single_leaf(root: TigerHash, size: u64, block_size: u64) -> Self {
        Self {
            root,
            size,
            block_size,
            leaves: vec![root],
        }
    }

    pub const fn root(&self) -> &TigerHash {
        &self.root
    }

    pub const fn size(&self) -> u64 {
        self.size
    }

    pub const fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn leaves(&self) -> &[TigerHash] {
        &self.leaves
    }

    pub fn leaf_count(&self) -> u64 {
        self.leaves.len() as u64
    }

    /// Byte range `(offset, length)` covered by leaf `index`.
    pub fn leaf_range(&self, index: u64) -> Option<(u64, u64)> {
        if index >= self.leaf_count() {
            return None;
        }
        let offset = index * self.block_size;
        let length = self.block_size.min(self.size - offset.min(self.size));
        Some((offset, length))
    }

    /// Check one block of data against its leaf.
    pub fn verify_block(&self, index: u64, data: &[u8]) -> bool {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.leaves.get(i))
            .is_some_and(|leaf| *leaf == hash_block(data))
    }

    /// Recombine independently observed leaves and compare with the root.
    pub fn verify_whole(&self, observed: &[TigerHash]) -> bool {
        observed.len() == self.leaves.len()
            && root_from_leaves(observed).is_ok_and(|root| root == self.root)
    }

    /// Regroup leaves into coarser `block_size` leaves.
    ///
    /// Only refinement towards larger blocks is possible; the target must be
    /// a power-of-two multiple of the current block size.
    pub fn coarsen_to(&self, block_size: u64) -> Result<Self, TreeError> {
        check_block_size(block_size)?;
        if block_size < self.block_size {
            return Err(TreeError::TooCoarse {
                from: self.block_size,
                to: block_size,
            });
        }
        if block_size == self.block_size {
            return Ok(self.clone());
        }
        #[allow(clippy::cast_possible_truncation)]
        let group = (block_size / self.block_size) as usize;
        let leaves = self
            .leaves
            .chunks(group)
            .map(root_from_leaves)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            root: self.root,
            size: self.size,
            block_size,
            leaves,
        })
    }
}
