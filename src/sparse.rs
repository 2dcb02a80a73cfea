//! Sparse arrays of pairwise interaction distances and strengths.
//!
//! Each row holds the interactions *felt* by one individual, each column
//! the interactions *exerted* by one, so reading everything felt by a
//! focal individual is one contiguous slice. Storage is CSR-like: an
//! offset per row plus parallel column/distance/strength buffers. Columns
//! are deliberately never sorted within a row; queries scan linearly and
//! callers depend on insertion-order iteration of row slices.
//!
//! Misuse of the build protocol (writing after `finish`, rows out of
//! order, patching an absent cell) is a host programming error and
//! panics; absent cells on the query side are not errors and read as
//! +∞ distance / 0 strength.

use std::fmt;

pub type Distance = f32;
pub type Strength = f32;

pub struct SparseArray {
    // row_offsets grows as rows are added; nrows_set == row_offsets.len() - 1
    row_offsets: Vec<u32>,
    columns: Vec<u32>,
    distances: Vec<Distance>,
    strengths: Vec<Strength>,
    nrows: u32,
    ncols: u32,
    finished: bool,
}

impl SparseArray {
    pub fn new(nrows: u32, ncols: u32) -> Self {
        let mut row_offsets = Vec::with_capacity(nrows as usize + 1);
        row_offsets.push(0);
        Self {
            row_offsets,
            columns: Vec::new(),
            distances: Vec::new(),
            strengths: Vec::new(),
            nrows,
            ncols,
            finished: false,
        }
    }

    /// Zero the row state but keep the allocated buffers, for reuse across
    /// ticks.
    pub fn reset(&mut self) {
        self.row_offsets.clear();
        self.row_offsets.push(0);
        self.columns.clear();
        self.distances.clear();
        self.strengths.clear();
        self.finished = false;
    }

    /// Reset to new dimensions, keeping buffers.
    pub fn reset_to(&mut self, nrows: u32, ncols: u32) {
        self.reset();
        self.nrows = nrows;
        self.ncols = ncols;
    }

    pub fn row_count(&self) -> u32 {
        self.nrows
    }

    pub fn column_count(&self) -> u32 {
        self.ncols
    }

    /// Rows configured so far (at least partially) during building.
    pub fn added_row_count(&self) -> u32 {
        self.row_offsets.len() as u32 - 1
    }

    pub fn nnz(&self) -> u32 {
        self.columns.len() as u32
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn nrows_set(&self) -> u32 {
        self.row_offsets.len() as u32 - 1
    }

    /// Append an entire row of distances at once. Rows must be appended
    /// strictly sequentially; an empty slice records an empty row.
    pub fn add_row_distances(&mut self, row: u32, columns: &[u32], distances: &[Distance]) {
        self.add_row_prologue(row, columns.len(), distances.len());
        self.columns.extend_from_slice(columns);
        self.distances.extend_from_slice(distances);
        // a strength slot exists for every entry even when building with
        // distances only; values are filled in later in place
        self.strengths.resize(self.columns.len(), 0.0);
        self.row_offsets.push(self.columns.len() as u32);
    }

    /// Append an entire row of distances and strengths at once.
    pub fn add_row_interactions(
        &mut self,
        row: u32,
        columns: &[u32],
        distances: &[Distance],
        strengths: &[Strength],
    ) {
        assert_eq!(columns.len(), strengths.len(), "SparseArray: slice lengths differ");
        self.add_row_prologue(row, columns.len(), distances.len());
        self.columns.extend_from_slice(columns);
        self.distances.extend_from_slice(distances);
        self.strengths.extend_from_slice(strengths);
        self.row_offsets.push(self.columns.len() as u32);
    }

    fn add_row_prologue(&mut self, row: u32, ncolumns: usize, ndistances: usize) {
        assert!(!self.finished, "SparseArray: adding row to a finished sparse array");
        assert!(self.nrows_set() < self.nrows, "SparseArray: adding row beyond the end");
        assert_eq!(row, self.nrows_set(), "SparseArray: adding row out of order");
        assert_eq!(ncolumns, ndistances, "SparseArray: slice lengths differ");
        debug_assert!(ncolumns as u32 <= self.ncols);
    }

    /// Append one cell. The row may equal the current row or any later
    /// row; skipped rows collapse to zero-length offsets.
    pub fn add_entry_distance(&mut self, row: u32, column: u32, distance: Distance) {
        self.add_entry_prologue(row, column);
        self.push_entry(row, column, distance, 0.0);
    }

    pub fn add_entry_interaction(
        &mut self,
        row: u32,
        column: u32,
        distance: Distance,
        strength: Strength,
    ) {
        self.add_entry_prologue(row, column);
        self.push_entry(row, column, distance, strength);
    }

    fn add_entry_prologue(&self, row: u32, column: u32) {
        assert!(!self.finished, "SparseArray: adding entry to a finished sparse array");
        assert!(
            row + 1 >= self.nrows_set(),
            "SparseArray: adding entry out of order"
        );
        assert!(row < self.nrows, "SparseArray: adding row beyond the end");
        assert!(column < self.ncols, "SparseArray: adding column beyond the end");
    }

    fn push_entry(&mut self, row: u32, column: u32, distance: Distance, strength: Strength) {
        let offset = self.columns.len() as u32;
        while self.nrows_set() < row {
            self.row_offsets.push(offset);
        }
        if self.nrows_set() == row {
            self.row_offsets.push(offset + 1);
        } else {
            *self.row_offsets.last_mut().unwrap() += 1;
        }
        self.columns.push(column);
        self.distances.push(distance);
        self.strengths.push(strength);
    }

    /// Seal the array: trailing unfilled rows collapse to the current nnz
    /// and the structure becomes query-ready. No further writes (other
    /// than strength patching) are accepted.
    pub fn finish(&mut self) {
        assert!(!self.finished, "SparseArray: finishing an already finished sparse array");
        let offset = self.columns.len() as u32;
        while self.nrows_set() < self.nrows {
            self.row_offsets.push(offset);
        }
        self.finished = true;
    }

    fn row_slice(&self, row: u32) -> std::ops::Range<usize> {
        assert!(self.finished, "SparseArray: query before finish");
        assert!(row < self.nrows, "SparseArray: row out of range");
        let start = self.row_offsets[row as usize] as usize;
        let end = self.row_offsets[row as usize + 1] as usize;
        start..end
    }

    /// The distance stored for a cell, or +∞ when the cell is absent.
    pub fn distance(&self, row: u32, column: u32) -> Distance {
        assert!(column < self.ncols, "SparseArray: column out of range");
        let range = self.row_slice(row);
        for idx in range {
            if self.columns[idx] == column {
                return self.distances[idx];
            }
        }
        Distance::INFINITY
    }

    /// The strength stored for a cell, or 0 when the cell is absent.
    pub fn strength(&self, row: u32, column: u32) -> Strength {
        assert!(column < self.ncols, "SparseArray: column out of range");
        let range = self.row_slice(row);
        for idx in range {
            if self.columns[idx] == column {
                return self.strengths[idx];
            }
        }
        0.0
    }

    /// Mutate the strength of an existing cell after the array has been
    /// built; the cell must be present.
    pub fn patch_strength(&mut self, row: u32, column: u32, strength: Strength) {
        assert!(column < self.ncols, "SparseArray: column out of range");
        let range = self.row_slice(row);
        for idx in range {
            if self.columns[idx] == column {
                self.strengths[idx] = strength;
                return;
            }
        }
        panic!("SparseArray: patching a strength that was never added");
    }

    /// Columns and distances for one row, in insertion order.
    pub fn distances_for_row(&self, row: u32) -> (&[u32], &[Distance]) {
        let range = self.row_slice(row);
        (&self.columns[range.clone()], &self.distances[range])
    }

    /// Columns and strengths for one row, in insertion order.
    pub fn strengths_for_row(&self, row: u32) -> (&[u32], &[Strength]) {
        let range = self.row_slice(row);
        (&self.columns[range.clone()], &self.strengths[range])
    }

    /// Full row access with mutable strengths, for filling in strength
    /// values after a distances-only build.
    pub fn interactions_for_row(
        &mut self,
        row: u32,
    ) -> (&[u32], &[Distance], &mut [Strength]) {
        let range = self.row_slice(row);
        (
            &self.columns[range.clone()],
            &self.distances[range.clone()],
            &mut self.strengths[range],
        )
    }

    /// Heap bytes in use, for usage reporting.
    pub fn memory_usage(&self) -> usize {
        self.row_offsets.capacity() * std::mem::size_of::<u32>()
            + self.columns.capacity() * std::mem::size_of::<u32>()
            + self.distances.capacity() * std::mem::size_of::<Distance>()
            + self.strengths.capacity() * std::mem::size_of::<Strength>()
    }
}

impl fmt::Display for SparseArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "SparseArray: {} x {}, {} entries{}",
            self.nrows,
            self.ncols,
            self.nnz(),
            if self.finished { "" } else { " (unfinished)" }
        )?;
        if self.finished {
            for row in 0..self.nrows {
                let (columns, distances) = self.distances_for_row(row);
                let (_, strengths) = self.strengths_for_row(row);
                write!(f, "  row {}:", row)?;
                for i in 0..columns.len() {
                    write!(f, " [{}: {}, {}]", columns[i], distances[i], strengths[i])?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

/// The per-row capacity variant, for building with unknown row sizes.
///
/// Each row owns a separately growing buffer, so rows need not be added
/// in order, and different threads may fill *disjoint* rows in parallel
/// by splitting the slice returned from [`PerRowSparseArray::rows_mut`]
/// (no shared capacity expansion occurs). Neither variant supports
/// concurrent writes to one row.
pub struct PerRowSparseArray {
    rows: Vec<SparseRow>,
    ncols: u32,
    finished: bool,
}

#[derive(Default, Clone)]
pub struct SparseRow {
    columns: Vec<u32>,
    distances: Vec<Distance>,
    strengths: Vec<Strength>,
}

impl SparseRow {
    pub fn add(&mut self, column: u32, distance: Distance, strength: Strength) {
        self.columns.push(column);
        self.distances.push(distance);
        self.strengths.push(strength);
    }

    pub fn nnz(&self) -> u32 {
        self.columns.len() as u32
    }

    pub fn clear(&mut self) {
        self.columns.clear();
        self.distances.clear();
        self.strengths.clear();
    }
}

impl PerRowSparseArray {
    pub fn new(nrows: u32, ncols: u32) -> Self {
        Self {
            rows: vec![SparseRow::default(); nrows as usize],
            ncols,
            finished: false,
        }
    }

    pub fn row_count(&self) -> u32 {
        self.rows.len() as u32
    }

    pub fn column_count(&self) -> u32 {
        self.ncols
    }

    pub fn nnz(&self) -> u32 {
        self.rows.iter().map(SparseRow::nnz).sum()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Rows may be filled in any order.
    pub fn add_entry_interaction(
        &mut self,
        row: u32,
        column: u32,
        distance: Distance,
        strength: Strength,
    ) {
        assert!(!self.finished, "PerRowSparseArray: adding entry to a finished sparse array");
        assert!((row as usize) < self.rows.len(), "PerRowSparseArray: row out of range");
        assert!(column < self.ncols, "PerRowSparseArray: column out of range");
        self.rows[row as usize].add(column, distance, strength);
    }

    /// Mutable access to all row buffers; split this slice to fill
    /// disjoint rows from separate threads.
    pub fn rows_mut(&mut self) -> &mut [SparseRow] {
        assert!(!self.finished, "PerRowSparseArray: writing to a finished sparse array");
        &mut self.rows
    }

    pub fn finish(&mut self) {
        assert!(!self.finished, "PerRowSparseArray: finishing an already finished sparse array");
        self.finished = true;
    }

    fn row(&self, row: u32) -> &SparseRow {
        assert!(self.finished, "PerRowSparseArray: query before finish");
        assert!((row as usize) < self.rows.len(), "PerRowSparseArray: row out of range");
        &self.rows[row as usize]
    }

    pub fn distance(&self, row: u32, column: u32) -> Distance {
        assert!(column < self.ncols, "PerRowSparseArray: column out of range");
        let row = self.row(row);
        for (idx, &c) in row.columns.iter().enumerate() {
            if c == column {
                return row.distances[idx];
            }
        }
        Distance::INFINITY
    }

    pub fn strength(&self, row: u32, column: u32) -> Strength {
        assert!(column < self.ncols, "PerRowSparseArray: column out of range");
        let row = self.row(row);
        for (idx, &c) in row.columns.iter().enumerate() {
            if c == column {
                return row.strengths[idx];
            }
        }
        0.0
    }

    pub fn distances_for_row(&self, row: u32) -> (&[u32], &[Distance]) {
        let row = self.row(row);
        (&row.columns, &row.distances)
    }

    pub fn strengths_for_row(&self, row: u32) -> (&[u32], &[Strength]) {
        let row = self.row(row);
        (&row.columns, &row.strengths)
    }

    /// Reset row contents, keeping every row's capacity.
    pub fn reset(&mut self) {
        for row in &mut self.rows {
            row.clear();
        }
        self.finished = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_cells_read_infinity_and_zero() {
        let mut sa = SparseArray::new(3, 3);
        sa.add_entry_interaction(0, 1, 2.0, 0.5);
        sa.finish();
        assert_eq!(sa.distance(0, 1), 2.0);
        assert_eq!(sa.strength(0, 1), 0.5);
        assert!(sa.distance(0, 2).is_infinite());
        assert_eq!(sa.strength(0, 2), 0.0);
        assert!(sa.distance(2, 0).is_infinite());
    }

    #[test]
    fn row_build_and_entry_build_agree() {
        let mut by_rows = SparseArray::new(4, 5);
        by_rows.add_row_interactions(0, &[0, 3, 2], &[1.0, 3.0, 2.0], &[0.1, 0.3, 0.2]);
        by_rows.add_row_interactions(1, &[4], &[4.0], &[0.4]);
        by_rows.add_row_interactions(2, &[], &[], &[]);
        by_rows.add_row_interactions(3, &[4, 1], &[4.5, 1.5], &[0.45, 3.15]);
        by_rows.finish();

        let mut by_entries = SparseArray::new(4, 5);
        by_entries.add_entry_interaction(0, 0, 1.0, 0.1);
        by_entries.add_entry_interaction(0, 3, 3.0, 0.3);
        by_entries.add_entry_interaction(0, 2, 2.0, 0.2);
        by_entries.add_entry_interaction(1, 4, 4.0, 0.4);
        by_entries.add_entry_interaction(3, 4, 4.5, 0.45); // row 2 skipped
        by_entries.add_entry_interaction(3, 1, 1.5, 3.15);
        by_entries.finish();

        for sa in [&by_rows, &by_entries] {
            assert_eq!(sa.nnz(), 6);
            assert_eq!(sa.distance(0, 3), 3.0);
            assert!(sa.distance(2, 0).is_infinite());
            assert_eq!(sa.strength(3, 1), 3.15);
            let (columns, distances) = sa.distances_for_row(0);
            assert_eq!(columns, &[0, 3, 2], "insertion order is preserved");
            assert_eq!(distances, &[1.0, 3.0, 2.0]);
            assert_eq!(sa.distances_for_row(2).0.len(), 0);
        }
    }

    #[test]
    fn finish_collapses_trailing_rows() {
        let mut sa = SparseArray::new(5, 2);
        sa.add_entry_distance(1, 0, 1.0);
        sa.finish();
        assert_eq!(sa.added_row_count(), 5);
        assert_eq!(sa.distances_for_row(0).0.len(), 0);
        assert_eq!(sa.distances_for_row(4).0.len(), 0);
        assert_eq!(sa.distance(1, 0), 1.0);
    }

    #[test]
    fn strengths_can_be_filled_after_a_distances_only_build() {
        let mut sa = SparseArray::new(2, 3);
        sa.add_row_distances(0, &[2, 0], &[2.0, 0.5]);
        sa.add_row_distances(1, &[1], &[1.0]);
        sa.finish();

        for row in 0..2 {
            let (_, distances, strengths) = sa.interactions_for_row(row);
            for i in 0..distances.len() {
                strengths[i] = 1.0 / distances[i];
            }
        }
        assert_eq!(sa.strength(0, 2), 0.5);
        assert_eq!(sa.strength(0, 0), 2.0);
        assert_eq!(sa.strength(1, 1), 1.0);
    }

    #[test]
    fn patch_strength_mutates_existing_cells_only() {
        let mut sa = SparseArray::new(2, 2);
        sa.add_entry_interaction(0, 1, 1.0, 0.1);
        sa.finish();
        sa.patch_strength(0, 1, 0.9);
        assert_eq!(sa.strength(0, 1), 0.9);
        assert_eq!(sa.distance(0, 1), 1.0);

        let patch_absent = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            sa.patch_strength(0, 0, 1.0);
        }));
        assert!(patch_absent.is_err());
    }

    #[test]
    #[should_panic(expected = "out of order")]
    fn entries_cannot_go_backwards() {
        let mut sa = SparseArray::new(3, 3);
        sa.add_entry_distance(2, 0, 1.0);
        sa.add_entry_distance(0, 0, 1.0);
    }

    #[test]
    #[should_panic(expected = "finished")]
    fn writes_after_finish_panic() {
        let mut sa = SparseArray::new(2, 2);
        sa.finish();
        sa.add_entry_distance(0, 0, 1.0);
    }

    #[test]
    fn reset_keeps_buffers_and_permits_rebuilding() {
        let mut sa = SparseArray::new(2, 2);
        sa.add_entry_distance(0, 0, 1.0);
        sa.finish();
        let usage = sa.memory_usage();
        sa.reset();
        assert!(!sa.is_finished());
        assert_eq!(sa.nnz(), 0);
        sa.add_entry_distance(0, 1, 5.0);
        sa.finish();
        assert_eq!(sa.distance(0, 1), 5.0);
        assert!(sa.distance(0, 0).is_infinite());
        assert!(sa.memory_usage() >= usage);
    }

    #[test]
    fn per_row_variant_accepts_rows_in_any_order() {
        let mut sa = PerRowSparseArray::new(4, 5);
        sa.add_entry_interaction(3, 4, 4.5, 0.45);
        sa.add_entry_interaction(0, 0, 1.0, 0.1);
        sa.add_entry_interaction(3, 1, 1.5, 3.15);
        sa.add_entry_interaction(0, 3, 3.0, 0.3);
        sa.finish();

        assert_eq!(sa.nnz(), 4);
        assert_eq!(sa.distance(0, 3), 3.0);
        assert_eq!(sa.strength(3, 1), 3.15);
        assert!(sa.distance(2, 0).is_infinite());
        assert_eq!(sa.distances_for_row(3).0, &[4, 1]);
    }

    #[test]
    fn per_row_variant_supports_disjoint_row_filling() {
        let mut sa = PerRowSparseArray::new(2, 4);
        {
            let (left, right) = sa.rows_mut().split_at_mut(1);
            left[0].add(0, 1.0, 0.1);
            right[0].add(2, 2.0, 0.2);
        }
        sa.finish();
        assert_eq!(sa.distance(0, 0), 1.0);
        assert_eq!(sa.distance(1, 2), 2.0);
    }
}
