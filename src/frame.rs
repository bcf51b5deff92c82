use crate::error::RenderError;

pub const MAX_INPUTS: usize = 5;

/// `(frame_no, sub_frame_no)` pair. `sub_frame_no` stays in `[0, sub_frames)`
/// and each wrap to zero moves `frame_no` on by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCounter {
    frame_no: u64,
    sub_frame_no: u32,
    sub_frames: u32,
}

impl FrameCounter {
    pub fn new(sub_frames: u32) -> Self {
        Self {
            frame_no: 0,
            sub_frame_no: 0,
            sub_frames: sub_frames.max(1),
        }
    }

    pub fn frame_no(&self) -> u64 {
        self.frame_no
    }

    pub fn sub_frame_no(&self) -> u32 {
        self.sub_frame_no
    }

    pub fn sub_frames(&self) -> u32 {
        self.sub_frames
    }

    /// Frame index counted in display refreshes.
    pub fn linear(&self) -> u64 {
        self.frame_no * self.sub_frames as u64 + self.sub_frame_no as u64
    }

    pub fn reset(&mut self) {
        self.frame_no = 0;
        self.sub_frame_no = 0;
    }

    pub fn advance(&mut self) {
        self.sub_frame_no += 1;
        if self.sub_frame_no == self.sub_frames {
            self.frame_no += 1;
            self.sub_frame_no = 0;
        }
    }

    /// Moves the sub-frame phase forward without touching `frame_no`.
    pub fn skip(&mut self, sub_frames: u32) {
        self.sub_frame_no = (self.sub_frame_no + sub_frames % self.sub_frames) % self.sub_frames;
    }
}

/// Input texture slots ordered newest first. Every entry is a valid slot and
/// the length is fixed; a missed capture repeats the newest entry, so the ring
/// only returns to a permutation of `0..len` after `len` fresh captures.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SlotRing {
    slots: Vec<usize>,
    capacity: usize,
}

impl SlotRing {
    pub fn new(count: usize) -> Result<Self, RenderError> {
        if count > MAX_INPUTS {
            return Err(RenderError::TooManyInputs {
                requested: count,
                max: MAX_INPUTS,
            });
        }
        Ok(Self {
            slots: (0..count).collect(),
            capacity: count,
        })
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot holding the most recent capture.
    pub fn front(&self) -> usize {
        self.slots.first().copied().unwrap_or(0)
    }

    /// Slot the next capture should be written to: a physical slot the ring
    /// does not reference, otherwise the oldest one.
    pub fn next_slot(&self) -> usize {
        let mut used = [false; MAX_INPUTS];
        for &slot in &self.slots {
            used[slot] = true;
        }
        (0..self.capacity)
            .find(|&slot| !used[slot])
            .or_else(|| self.slots.last().copied())
            .unwrap_or(0)
    }

    /// Shifts history down one place. The new front is the slot just written
    /// (if a frame arrived) or a repeat of the current front.
    ///
    /// Must run right after the write into `next_slot()`.
    pub fn roll(&mut self, new_frame: bool) {
        if self.slots.len() <= 1 {
            return;
        }

        let latest = if new_frame { self.next_slot() } else { self.front() };
        self.slots.rotate_right(1);
        self.slots[0] = latest;
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.capacity = 0;
    }
}
