use crate::error::AnalysisError;

/// Number of bytes in a node hash.
pub const HASH_LEN: usize = 32;
/// Number of bytes in a Node Identifier (`hash || flags`).
pub const NODE_ID_LEN: usize = 33;
/// Number of addressable slots in a batch array (index 0 is the header).
const BATCH_SLOTS: usize = 31;

/// A `hash || flags` pair as stored in a batch slot.
///
/// The 33rd byte is a 1-bit marker: `1` means the slot is a shortcut leaf,
/// `0` means internal. Whether a slot is present at all is decided solely by
/// its bitmap bit (see [`decode_batch`]) — an all-zero 33 bytes is an
/// ordinary, present value, not a marker for "no child"; only
/// [`NodeId::EMPTY`] used explicitly as a navigation input means that.
///
/// The same 33-byte shape is reused, unclassified, for the two slots that
/// sit underneath a shortcut position: there the bytes hold a raw 32-byte
/// trie key or value-DB key rather than a hash, and the flag byte is unused.
/// A key of `0x00…00` is a valid trie key, so these slots must round-trip
/// all-zero bytes verbatim rather than collapsing them to absent.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId([u8; NODE_ID_LEN]);

impl NodeId {
    pub const EMPTY: NodeId = NodeId([0u8; NODE_ID_LEN]);

    pub fn new(hash: [u8; HASH_LEN], shortcut: bool) -> Self {
        let mut bytes = [0u8; NODE_ID_LEN];
        bytes[..HASH_LEN].copy_from_slice(&hash);
        bytes[HASH_LEN] = shortcut as u8;
        NodeId(bytes)
    }

    fn from_bytes(raw: &[u8]) -> Result<Self, AnalysisError> {
        let arr: [u8; NODE_ID_LEN] = raw
            .try_into()
            .map_err(|_| AnalysisError::DecodeFailure("short node slot".into()))?;
        Ok(NodeId(arr))
    }

    /// The 32-byte hash (or raw key, depending on context) carried by this slot.
    pub fn hash(&self) -> [u8; HASH_LEN] {
        self.0[..HASH_LEN].try_into().expect("fixed-size slice")
    }

    pub fn is_shortcut(&self) -> bool {
        self.0[HASH_LEN] == 1
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; NODE_ID_LEN]
    }
}

impl std::fmt::Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeId({})", hex::encode(self.hash()))
    }
}

/// Classification of a batch slot, per §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Empty,
    Internal,
    Shortcut,
}

pub fn classify(slot: Option<&NodeId>) -> SlotKind {
    match slot {
        None => SlotKind::Empty,
        Some(node) if node.is_shortcut() => SlotKind::Shortcut,
        Some(_) => SlotKind::Internal,
    }
}

/// A decoded batch: up to 4 levels of the trie packed into one database value.
///
/// `slots[0]` is unused; slots `1..=30` hold child positions addressable by
/// `iBatch` (left child at `2*iBatch+1`, right at `2*iBatch+2`).
#[derive(Debug, Clone)]
pub struct Batch {
    /// Whether this batch's own root (the hash it was fetched under) is a
    /// shortcut leaf, i.e. the bit-31 override layout was used.
    pub is_shortcut: bool,
    slots: [Option<NodeId>; BATCH_SLOTS],
}

impl Batch {
    /// A fresh, empty default batch, used when navigating into an empty subtree.
    pub fn default_empty() -> Self {
        Batch {
            is_shortcut: false,
            slots: [None; BATCH_SLOTS],
        }
    }

    pub fn slot(&self, i: usize) -> Option<&NodeId> {
        self.slots.get(i).and_then(|s| s.as_ref())
    }

    pub fn left(&self, i_batch: usize) -> Option<&NodeId> {
        self.slot(2 * i_batch + 1)
    }

    pub fn right(&self, i_batch: usize) -> Option<&NodeId> {
        self.slot(2 * i_batch + 2)
    }
}

fn bit_is_set(bits: &[u8], i: usize) -> bool {
    bits[i / 8] & (1 << (7 - i % 8)) != 0
}

/// Decodes a batch blob per §4.1: a 4-byte presence bitmap followed by the
/// concatenation of present 33-byte slots, with bit 31 overriding the layout
/// to a standalone root-level shortcut.
pub fn decode_batch(blob: &[u8]) -> Result<Batch, AnalysisError> {
    if blob.len() < 4 {
        return Err(AnalysisError::DecodeFailure(
            "batch blob shorter than its bitmap header".into(),
        ));
    }
    let bitmap = &blob[0..4];
    let mut slots: [Option<NodeId>; BATCH_SLOTS] = [None; BATCH_SLOTS];

    if bit_is_set(bitmap, 31) {
        if blob.len() < 4 + NODE_ID_LEN * 2 {
            return Err(AnalysisError::DecodeFailure(
                "root-shortcut batch blob truncated".into(),
            ));
        }
        let key = NodeId::from_bytes(&blob[4..4 + NODE_ID_LEN])?;
        let value_key = NodeId::from_bytes(&blob[4 + NODE_ID_LEN..4 + 2 * NODE_ID_LEN])?;
        slots[1] = Some(key);
        slots[2] = Some(value_key);
        return Ok(Batch {
            is_shortcut: true,
            slots,
        });
    }

    let mut offset = 4;
    for i in 1..=30 {
        if bit_is_set(bitmap, i - 1) {
            if blob.len() < offset + NODE_ID_LEN {
                return Err(AnalysisError::DecodeFailure(format!(
                    "batch blob truncated at slot {i}"
                )));
            }
            let node = NodeId::from_bytes(&blob[offset..offset + NODE_ID_LEN])?;
            slots[i] = Some(node);
            offset += NODE_ID_LEN;
        }
    }
    Ok(Batch {
        is_shortcut: false,
        slots,
    })
}
