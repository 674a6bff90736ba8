//! Offset/size bookkeeping for material runs inside a pass buffer.
//!
//! Every pass target (a pass, or one shadow cascade) owns an
//! [`OffsetSizeTable`] with one [`CommandRun`] per [`MaterialType`]. The pass
//! executor issues one multi-draw per non-empty run.

use crate::indirect::{DrawIndexedIndirect, IndirectCommand};
use crate::material::{MAT_COUNT, MaterialType};
use crate::pass::{PASS_TARGET_COUNT, PassTarget};
use std::ops::Range;

/// A contiguous range of command slots inside a pass buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CommandRun {
    /// First slot of the run.
    pub offset: u32,
    /// Number of commands in the run.
    pub count: u32,
}

impl CommandRun {
    pub const EMPTY: CommandRun = CommandRun {
        offset: 0,
        count: 0,
    };

    pub const fn new(offset: u32, count: u32) -> Self {
        Self { offset, count }
    }

    /// An empty run positioned at `offset`.
    pub const fn empty_at(offset: u32) -> Self {
        Self { offset, count: 0 }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// One past the last slot.
    #[inline]
    pub const fn end(&self) -> u32 {
        self.offset + self.count
    }

    /// Byte offset of the first command in the buffer.
    #[inline]
    pub const fn byte_offset(&self) -> u64 {
        self.offset as u64 * DrawIndexedIndirect::SIZE
    }

    /// Slot range covered by the run.
    pub fn range(&self) -> Range<u32> {
        self.offset..self.end()
    }
}

/// Runs of one pass target, indexed by [`MaterialType`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct OffsetSizeTable {
    runs: [CommandRun; MAT_COUNT],
}

impl OffsetSizeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset every run to size 0 at offset 0.
    pub fn clear(&mut self) {
        self.runs = [CommandRun::EMPTY; MAT_COUNT];
    }

    pub fn set(&mut self, material: MaterialType, run: CommandRun) {
        self.runs[material.index()] = run;
    }

    #[inline]
    pub fn get(&self, material: MaterialType) -> CommandRun {
        self.runs[material.index()]
    }

    /// All runs in material order, empty ones included.
    pub fn iter(&self) -> impl Iterator<Item = (MaterialType, CommandRun)> + '_ {
        MaterialType::ALL.iter().map(|m| (*m, self.runs[m.index()]))
    }

    /// Runs with at least one command, in material order.
    pub fn non_empty(&self) -> impl Iterator<Item = (MaterialType, CommandRun)> + '_ {
        self.iter().filter(|(_, run)| !run.is_empty())
    }

    /// The aggregate run spanning every material of this target.
    ///
    /// Runs are contiguous, so this is a single range a consumer can draw
    /// with one call when per-material pipelines are not needed.
    pub fn total(&self) -> CommandRun {
        let offset = self.runs[0].offset;
        let count = self.runs.iter().map(|run| run.count).sum();
        CommandRun::new(offset, count)
    }

    /// Total number of commands across all runs.
    pub fn command_count(&self) -> u32 {
        self.total().count
    }

    /// Number of multi-draw calls needed to consume this table.
    pub fn draw_call_count(&self) -> usize {
        self.non_empty().count()
    }

    /// Whether runs are back to back from the first one, in material order.
    pub fn is_contiguous(&self) -> bool {
        self.runs
            .windows(2)
            .all(|pair| pair[0].end() == pair[1].offset)
    }
}

/// One [`OffsetSizeTable`] per [`PassTarget`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PassTables {
    tables: [OffsetSizeTable; PASS_TARGET_COUNT],
}

impl PassTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        for table in &mut self.tables {
            table.clear();
        }
    }

    #[inline]
    pub fn get(&self, target: PassTarget) -> &OffsetSizeTable {
        &self.tables[target.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, target: PassTarget) -> &mut OffsetSizeTable {
        &mut self.tables[target.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (PassTarget, &OffsetSizeTable)> + '_ {
        PassTarget::ALL.iter().map(|t| (*t, &self.tables[t.index()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::CascadeIndex;

    fn sample_table() -> OffsetSizeTable {
        let mut table = OffsetSizeTable::new();
        let mut cursor = 0;
        for (material, count) in MaterialType::ALL.iter().zip([3, 0, 2, 0, 0, 1, 0]) {
            table.set(*material, CommandRun::new(cursor, count));
            cursor += count;
        }
        table
    }

    #[test]
    fn test_cleared_table_is_all_empty() {
        let mut table = sample_table();
        table.clear();

        assert!(table.iter().all(|(_, run)| run == CommandRun::EMPTY));
        assert_eq!(table.draw_call_count(), 0);
        assert_eq!(table.total(), CommandRun::EMPTY);
    }

    #[test]
    fn test_non_empty_skips_zero_runs() {
        let table = sample_table();
        let materials: Vec<_> = table.non_empty().map(|(m, _)| m).collect();

        assert_eq!(
            materials,
            vec![
                MaterialType::Default,
                MaterialType::NormalMap,
                MaterialType::Splatting
            ]
        );
        assert_eq!(table.get(MaterialType::NormalMap), CommandRun::new(3, 2));
    }

    #[test]
    fn test_total_spans_all_runs() {
        let table = sample_table();
        assert!(table.is_contiguous());
        assert_eq!(table.total(), CommandRun::new(0, 6));
        assert_eq!(table.command_count(), 6);
    }

    #[test]
    fn test_run_byte_offset() {
        let run = CommandRun::new(3, 2);
        assert_eq!(run.byte_offset(), 60);
        assert_eq!(run.range(), 3..5);
        assert!(CommandRun::empty_at(7).is_empty());
    }

    #[test]
    fn test_pass_tables_are_independent() {
        let mut tables = PassTables::new();
        let cascade_2 = PassTarget::Shadow(CascadeIndex::ALL[2]);
        tables
            .get_mut(cascade_2)
            .set(MaterialType::Unlit, CommandRun::new(0, 1));

        for (target, table) in tables.iter() {
            let expected = if target == cascade_2 { 1 } else { 0 };
            assert_eq!(table.command_count(), expected, "{target}");
        }
    }
}
