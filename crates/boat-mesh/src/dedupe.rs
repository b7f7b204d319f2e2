use std::time::Instant;

pub const DEDUPE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy)]
struct DedupeEntry {
    origin_id: u16,
    sequence: u16,
    last_seen_at: Instant,
}

/// Fixed-capacity set of recently handled (origin, sequence) pairs.
///
/// Backed by a plain array; a full cache evicts the slot with the oldest
/// `last_seen_at`. Nothing expires on its own: a pair is "new" exactly
/// when no slot holds it.
#[derive(Debug, Clone)]
pub struct DedupeCache<const N: usize = DEDUPE_CAPACITY> {
    slots: [Option<DedupeEntry>; N],
}

impl<const N: usize> Default for DedupeCache<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> DedupeCache<N> {
    pub fn new() -> Self {
        Self { slots: [None; N] }
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn observed(&self, origin_id: u16, sequence: u16) -> bool {
        self.find(origin_id, sequence).is_some()
    }

    /// Record the pair. An existing entry is refreshed in place; otherwise
    /// the first free slot is used, or the oldest entry is overwritten.
    pub fn remember(&mut self, origin_id: u16, sequence: u16, now: Instant) {
        let idx = match self.find(origin_id, sequence) {
            Some(i) => i,
            None => self.free_or_oldest(),
        };
        if let Some(slot) = self.slots.get_mut(idx) {
            *slot = Some(DedupeEntry { origin_id, sequence, last_seen_at: now });
        }
    }

    /// Check and insert as one step. Returns true when the pair was new.
    pub fn check_and_remember(&mut self, origin_id: u16, sequence: u16, now: Instant) -> bool {
        if self.observed(origin_id, sequence) {
            return false;
        }
        self.remember(origin_id, sequence, now);
        true
    }

    fn find(&self, origin_id: u16, sequence: u16) -> Option<usize> {
        self.slots.iter().position(|s| {
            matches!(s, Some(e) if e.origin_id == origin_id && e.sequence == sequence)
        })
    }

    fn free_or_oldest(&self) -> usize {
        let mut oldest: Option<(usize, Instant)> = None;
        for (i, slot) in self.slots.iter().enumerate() {
            match slot {
                None => return i,
                Some(e) => match oldest {
                    Some((_, t)) if t <= e.last_seen_at => {}
                    _ => oldest = Some((i, e.last_seen_at)),
                },
            }
        }
        oldest.map(|(i, _)| i).unwrap_or(0)
    }
}
