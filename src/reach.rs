use crate::types::BlockIndex;

/// Per-block reachability observed during the live-tree traversal.
///
/// Marking is idempotent and out-of-range indices are silently
/// dropped; corrupt images routinely reference block numbers past the
/// end of the device and those must not fault the scan. The map is
/// mutated only while the traversal runs and is read-only afterwards.
#[derive(Debug, Clone)]
pub struct ReachabilityMap {
    marks: Vec<bool>,
}

impl ReachabilityMap {
    pub fn new(block_count: u32) -> Self {
        Self {
            marks: vec![false; block_count as usize],
        }
    }

    #[inline]
    pub fn mark(&mut self, index: BlockIndex) {
        if let Some(slot) = self.marks.get_mut(index as usize) {
            *slot = true;
        }
    }

    pub fn extend(&mut self, indices: impl IntoIterator<Item = BlockIndex>) {
        for index in indices {
            self.mark(index);
        }
    }

    #[inline]
    pub fn is_reachable(&self, index: BlockIndex) -> bool {
        self.marks.get(index as usize).copied().unwrap_or(false)
    }

    #[inline]
    pub fn block_count(&self) -> u32 {
        self.marks.len() as u32
    }

    /// Ascending indices of blocks seen during traversal.
    pub fn used_indices(&self) -> Vec<BlockIndex> {
        self.marks
            .iter()
            .enumerate()
            .filter(|(_, &m)| m)
            .map(|(i, _)| i as BlockIndex)
            .collect()
    }

    /// Ascending indices of blocks never seen during traversal.
    pub fn free_indices(&self) -> Vec<BlockIndex> {
        self.marks
            .iter()
            .enumerate()
            .filter(|(_, &m)| !m)
            .map(|(i, _)| i as BlockIndex)
            .collect()
    }
}
