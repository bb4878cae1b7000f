//! Fixed-capacity slot table
//!
//! One arena of `capacity * slot_bytes` bytes, carved into slots indexed by
//! sequence number modulo capacity. Each slot remembers which sequence number
//! it currently holds, so a newer packet mapping to the same slot silently
//! invalidates the older one.

/// Slot table for one frame period per sequence number
pub struct SlotStore {
    /// Backing bytes for every slot, slot `i` at `i * slot_bytes`
    arena: Vec<u8>,
    /// Sequence number held by each slot
    tags: Vec<Option<u32>>,
    capacity: usize,
    /// `capacity - 1`; maps a sequence number onto its slot
    mask: usize,
    slot_bytes: usize,
}

impl SlotStore {
    /// Allocate `capacity` slots of `slot_bytes` each
    ///
    /// The slot count has to be a power of two so sequence numbers map onto
    /// slots with a mask.
    pub fn new(capacity: usize, slot_bytes: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "slot count {} is not a power of two",
            capacity
        );

        Self {
            arena: vec![0u8; capacity * slot_bytes],
            tags: vec![None; capacity],
            capacity,
            mask: capacity - 1,
            slot_bytes,
        }
    }

    #[inline]
    fn index(&self, seq: u32) -> usize {
        (seq as usize) & self.mask
    }

    #[inline]
    fn range(&self, index: usize) -> std::ops::Range<usize> {
        let start = index * self.slot_bytes;
        start..start + self.slot_bytes
    }

    /// Copy `bytes` into the slot for `seq`
    ///
    /// Returns the sequence number that was evicted, if the slot held a
    /// different one. Overwriting the same sequence number is not an eviction.
    pub fn store(&mut self, seq: u32, bytes: &[u8]) -> Option<u32> {
        debug_assert_eq!(bytes.len(), self.slot_bytes);
        let index = self.index(seq);
        let range = self.range(index);
        self.arena[range].copy_from_slice(bytes);
        match self.tags[index].replace(seq) {
            Some(old) if old != seq => Some(old),
            _ => None,
        }
    }

    /// Bytes for `seq`, if the slot still holds exactly that sequence number
    pub fn fetch(&self, seq: u32) -> Option<&[u8]> {
        let index = self.index(seq);
        if self.tags[index] == Some(seq) {
            Some(&self.arena[self.range(index)])
        } else {
            None
        }
    }

    /// Whether the slot for `seq` currently holds it
    pub fn contains(&self, seq: u32) -> bool {
        self.tags[self.index(seq)] == Some(seq)
    }

    /// Forget `seq` if it is still held
    pub fn invalidate(&mut self, seq: u32) {
        let index = self.index(seq);
        if self.tags[index] == Some(seq) {
            self.tags[index] = None;
        }
    }

    /// Forget every slot
    pub fn clear(&mut self) {
        self.tags.iter_mut().for_each(|tag| *tag = None);
    }

    /// Number of slots currently holding a packet
    pub fn occupied(&self) -> usize {
        self.tags.iter().filter(|tag| tag.is_some()).count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn slot_bytes(&self) -> usize {
        self.slot_bytes
    }
}
