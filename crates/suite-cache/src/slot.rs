//! Per-file arena of line slots.
//!
//! A slot stands for "line N of this file". Cached entries hold slot ids, so
//! renumbering a slot moves every entry that covers it in one write.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(usize);

impl SlotId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSlot {
    pub line: u32,
}

#[derive(Debug, Default)]
pub struct SlotArena {
    slots: Vec<LineSlot>,
    free: Vec<SlotId>,
}

impl SlotArena {
    pub fn alloc(&mut self, line: u32) -> SlotId {
        if let Some(id) = self.free.pop() {
            self.slots[id.0] = LineSlot { line };
            return id;
        }
        self.slots.push(LineSlot { line });
        SlotId(self.slots.len() - 1)
    }

    /// Returns the slot to the free list. The caller guarantees nothing
    /// references it anymore.
    pub fn release(&mut self, id: SlotId) {
        self.free.push(id);
    }

    pub fn line(&self, id: SlotId) -> u32 {
        self.slots[id.0].line
    }

    pub fn set_line(&mut self, id: SlotId, line: u32) {
        self.slots[id.0].line = line;
    }

    pub fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}
