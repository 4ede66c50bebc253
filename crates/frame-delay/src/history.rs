//! Frame history ring
//!
//! A fixed-capacity ring of [`HistoryItem`]s addressed newest-first: offset
//! 0 is the most recently inserted frame, offset `len() - 1` the oldest.
//! Inserting into a full ring evicts the oldest item.
//!
//! The ring is owned by the delay line and only touched from the owner
//! thread; the compression worker never sees it.

use crate::codec::CompressedFrame;
use crate::image::{ImageBuffer, PlanarImage};

/// Stored representation of a frame
#[derive(Debug, Clone)]
pub enum FramePayload {
    /// Uncompressed planar copy
    Raw(ImageBuffer),
    /// Codec output
    Compressed(CompressedFrame),
}

impl FramePayload {
    pub fn memory_usage(&self) -> usize {
        match self {
            FramePayload::Raw(image) => image.memory_usage(),
            FramePayload::Compressed(frame) => frame.memory_usage(),
        }
    }
}

/// One recorded frame and the time it was produced
#[derive(Debug, Clone)]
pub struct HistoryItem {
    pub payload: FramePayload,
    pub timestamp: f64,
}

impl HistoryItem {
    pub fn raw(image: ImageBuffer, timestamp: f64) -> Self {
        Self {
            payload: FramePayload::Raw(image),
            timestamp,
        }
    }

    pub fn compressed(frame: CompressedFrame, timestamp: f64) -> Self {
        Self {
            payload: FramePayload::Compressed(frame),
            timestamp,
        }
    }

    #[inline]
    pub fn memory_usage(&self) -> usize {
        self.payload.memory_usage()
    }
}

/// Newest-first bounded frame history
///
/// Slots outside the live range are always `None`, so the slot after the
/// newest one is either free or (when full) holds the oldest item.
#[derive(Debug, Default)]
pub struct HistoryStore {
    slots: Vec<Option<HistoryItem>>,
    /// Slot of the newest item
    head: usize,
    len: usize,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    #[inline]
    fn slot_index(&self, offset: usize) -> usize {
        let capacity = self.capacity();
        (self.head + capacity - offset) % capacity
    }

    /// Insert as the newest item
    ///
    /// Returns the item that fell out: the evicted oldest item when the ring
    /// was full, or `item` itself when the capacity is zero.
    pub fn push_front(&mut self, item: HistoryItem) -> Option<HistoryItem> {
        let capacity = self.capacity();
        if capacity == 0 {
            return Some(item);
        }

        let next = (self.head + 1) % capacity;
        let evicted = self.slots[next].replace(item);
        self.head = next;

        if self.len < capacity {
            debug_assert!(evicted.is_none(), "free slot held an item");
            self.len += 1;
        }
        evicted
    }

    /// Copy `image` in as the newest raw item
    ///
    /// When the ring is full and the oldest item is raw, its storage is
    /// reused for the copy.
    pub fn push_raw(&mut self, image: &PlanarImage<'_>, timestamp: f64) {
        if self.capacity() == 0 {
            return;
        }

        let mut buffer = match self.is_full().then(|| self.pop_back()).flatten() {
            Some(HistoryItem {
                payload: FramePayload::Raw(buffer),
                ..
            }) => buffer,
            _ => ImageBuffer::new(),
        };
        buffer.copy_from(image);

        self.push_front(HistoryItem::raw(buffer, timestamp));
    }

    /// Remove and return the oldest item
    pub fn pop_back(&mut self) -> Option<HistoryItem> {
        if self.len == 0 {
            return None;
        }
        let index = self.slot_index(self.len - 1);
        self.len -= 1;
        self.slots[index].take()
    }

    /// Item `offset` frames back (0 = newest)
    pub fn get(&self, offset: usize) -> Option<&HistoryItem> {
        if offset >= self.len {
            return None;
        }
        self.slots[self.slot_index(offset)].as_ref()
    }

    /// Items from newest to oldest
    pub fn iter(&self) -> impl Iterator<Item = &HistoryItem> + '_ {
        (0..self.len).filter_map(move |offset| self.get(offset))
    }

    /// Offset selected by a timestamp lookup
    ///
    /// Walks newest to oldest, advancing the candidate while the item's
    /// timestamp is not less than `timestamp`, and stops at the first item
    /// that is older. The result is the oldest item of the leading run at or
    /// after the query time, not the nearest frame before it.
    pub fn find_by_timestamp(&self, timestamp: f64) -> Option<usize> {
        let mut candidate = None;
        for (offset, item) in self.iter().enumerate() {
            if item.timestamp < timestamp {
                break;
            }
            candidate = Some(offset);
        }
        candidate
    }

    /// Change the capacity, evicting oldest items that no longer fit
    ///
    /// Returns the number of evicted items.
    pub fn set_capacity(&mut self, capacity: usize) -> usize {
        if capacity == self.capacity() {
            return 0;
        }

        let mut kept = Vec::with_capacity(self.len.min(capacity));
        while let Some(item) = self.pop_back() {
            kept.push(item);
        }
        // kept is oldest first
        let evicted = kept.len().saturating_sub(capacity);
        kept.drain(..evicted);

        *self = Self::new(capacity);
        for item in kept {
            self.push_front(item);
        }
        evicted
    }

    /// Drop every item, keeping the capacity
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.head = 0;
        self.len = 0;
    }

    /// Bytes held by stored frames
    pub fn memory_usage(&self) -> usize {
        self.iter().map(HistoryItem::memory_usage).sum()
    }
}
