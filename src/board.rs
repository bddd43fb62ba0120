use crate::constants::PERIMETER_CELL_POINTS;
use crate::piece::{Piece, Shape};
use crate::types::{Owner, Stats};

/// Lines removed by a single lock.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClearedLines {
    pub rows: Vec<usize>,
    pub cols: Vec<usize>,
}

impl ClearedLines {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.cols.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Board {
    rows: usize,
    cols: usize,
    cells: Vec<Option<Owner>>,
}

impl Board {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![None; rows * cols],
        }
    }

    pub fn square(size: usize) -> Self {
        Self::new(size, size)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, x: i32, y: i32) -> Option<Owner> {
        self.index(x, y).and_then(|idx| self.cells[idx])
    }

    pub fn set(&mut self, x: i32, y: i32, owner: Option<Owner>) {
        if let Some(idx) = self.index(x, y) {
            self.cells[idx] = owner;
        }
    }

    pub fn clear(&mut self) {
        self.cells.fill(None);
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x as usize >= self.cols || y as usize >= self.rows {
            return None;
        }
        Some(y as usize * self.cols + x as usize)
    }

    /// Collision check: every occupied cell of `shape` (or the piece's own
    /// shape) shifted by `(dx, dy)` must be in bounds and empty.
    pub fn fits(&self, piece: &Piece, dx: i32, dy: i32, shape: Option<&Shape>) -> bool {
        let shape = shape.unwrap_or(&piece.shape);
        piece
            .cells_with(shape, dx, dy)
            .all(|(x, y)| self.index(x, y).is_some_and(|idx| self.cells[idx].is_none()))
    }

    /// Writes the piece under its owner tag, then clears every row and column
    /// that is full on the post-lock board. Both axes are judged on the same
    /// snapshot, so crossing lines clear together.
    pub fn lock(&mut self, piece: &Piece) -> ClearedLines {
        for (x, y) in piece.cells() {
            self.set(x, y, Some(piece.owner));
        }

        let cleared = ClearedLines {
            rows: (0..self.rows).filter(|r| self.row_full(*r)).collect(),
            cols: (0..self.cols).filter(|c| self.col_full(*c)).collect(),
        };
        for &r in &cleared.rows {
            for c in 0..self.cols {
                self.cells[r * self.cols + c] = None;
            }
        }
        for &c in &cleared.cols {
            for r in 0..self.rows {
                self.cells[r * self.cols + c] = None;
            }
        }
        cleared
    }

    fn row_full(&self, r: usize) -> bool {
        self.cells[r * self.cols..(r + 1) * self.cols]
            .iter()
            .all(Option::is_some)
    }

    fn col_full(&self, c: usize) -> bool {
        (0..self.rows).all(|r| self.cells[r * self.cols + c].is_some())
    }

    fn on_perimeter(&self, r: usize, c: usize) -> bool {
        r == 0 || c == 0 || r + 1 == self.rows || c + 1 == self.cols
    }

    pub fn stats(&self) -> Stats {
        let mut stats = Stats::default();
        for r in 0..self.rows {
            for c in 0..self.cols {
                let Some(owner) = self.cells[r * self.cols + c] else {
                    continue;
                };
                stats.total += 1;
                let points = if self.on_perimeter(r, c) {
                    PERIMETER_CELL_POINTS
                } else {
                    0
                };
                match owner {
                    Owner::Primary => {
                        stats.primary_count += 1;
                        stats.primary_score += points;
                    }
                    Owner::Secondary => {
                        stats.secondary_count += 1;
                        stats.secondary_score += points;
                    }
                }
            }
        }
        stats
    }

    pub fn to_rows(&self) -> Vec<Vec<u8>> {
        self.cells
            .chunks(self.cols.max(1))
            .take(self.rows)
            .map(|row| row.iter().map(|cell| cell.map_or(0, Owner::tag)).collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GravityDirection;

    fn piece(shape: usize, x: i32, y: i32, owner: Owner) -> Piece {
        Piece {
            shape: Shape::standard(shape),
            x,
            y,
            owner,
            direction: GravityDirection::Down,
        }
    }

    #[test]
    fn fits_rejects_out_of_bounds_and_occupied() {
        let mut board = Board::square(10);
        let o = piece(1, 0, 0, Owner::Primary);
        assert!(board.fits(&o, 0, 0, None));
        assert!(!board.fits(&o, -1, 0, None));
        assert!(!board.fits(&o, 0, -1, None));
        assert!(board.fits(&o, 8, 8, None));
        assert!(!board.fits(&o, 9, 8, None));

        board.set(1, 1, Some(Owner::Secondary));
        assert!(!board.fits(&o, 0, 0, None));
        assert!(board.fits(&o, 2, 0, None));
    }

    #[test]
    fn fits_uses_override_shape() {
        let board = Board::square(4);
        let i = piece(0, 0, 0, Owner::Primary);
        let vertical = i.shape.rotated();
        assert!(board.fits(&i, 0, 0, Some(&vertical)));
        assert!(!board.fits(&i, 0, 1, Some(&vertical)));
    }

    #[test]
    fn lock_writes_owner_tag_without_clearing_partial_lines() {
        let mut board = Board::square(6);
        let cleared = board.lock(&piece(1, 2, 2, Owner::Secondary));
        assert!(cleared.is_empty());
        assert_eq!(board.get(2, 2), Some(Owner::Secondary));
        assert_eq!(board.get(3, 3), Some(Owner::Secondary));
        assert_eq!(board.stats().secondary_count, 4);
    }

    #[test]
    fn full_row_is_cleared_on_lock() {
        let mut board = Board::square(6);
        for x in 0..2 {
            board.set(x, 5, Some(Owner::Primary));
        }
        let cleared = board.lock(&piece(0, 2, 5, Owner::Secondary));
        assert_eq!(cleared.rows, vec![5]);
        assert!(cleared.cols.is_empty());
        assert_eq!(board.stats().total, 0);
    }

    #[test]
    fn full_column_is_cleared_on_lock() {
        let mut board = Board::square(5);
        board.set(4, 0, Some(Owner::Primary));
        let vertical = Piece {
            shape: Shape::standard(0).rotated(),
            x: 4,
            y: 1,
            owner: Owner::Primary,
            direction: GravityDirection::Down,
        };
        let cleared = board.lock(&vertical);
        assert_eq!(cleared.cols, vec![4]);
        assert_eq!(board.stats().total, 0);
    }

    #[test]
    fn crossing_row_and_column_clear_together() {
        let mut board = Board::square(4);
        board.set(0, 3, Some(Owner::Primary));
        board.set(1, 3, Some(Owner::Primary));
        board.set(2, 0, Some(Owner::Secondary));
        board.set(2, 1, Some(Owner::Secondary));
        let o = piece(1, 2, 2, Owner::Primary);
        assert!(board.fits(&o, 0, 0, None));

        // The O completes row 3 and column 2, which cross at (2, 3).
        let cleared = board.lock(&o);
        assert_eq!(cleared.rows, vec![3]);
        assert_eq!(cleared.cols, vec![2]);
        assert_eq!(board.get(2, 3), None);
        assert_eq!(board.get(2, 0), None);
        assert_eq!(board.get(0, 3), None);
        assert_eq!(board.get(3, 2), Some(Owner::Primary));
        assert_eq!(board.stats().total, 1);
    }

    #[test]
    fn lock_of_fitting_piece_never_overwrites_or_escapes() {
        let mut board = Board::square(8);
        board.set(0, 0, Some(Owner::Secondary));
        let mut total_before = board.stats().total;
        for (shape, x, y) in [(2, 3, 3), (5, 0, 6), (6, 5, 0), (3, 1, 1)] {
            let p = piece(shape, x, y, Owner::Primary);
            if !board.fits(&p, 0, 0, None) {
                continue;
            }
            let cleared = board.lock(&p);
            assert!(cleared.is_empty());
            assert_eq!(board.get(0, 0), Some(Owner::Secondary));
            let total_after = board.stats().total;
            assert_eq!(total_after, total_before + 4);
            total_before = total_after;
        }
    }

    #[test]
    fn only_perimeter_cells_score() {
        let mut board = Board::square(5);
        board.set(0, 0, Some(Owner::Primary));
        board.set(4, 2, Some(Owner::Primary));
        board.set(2, 2, Some(Owner::Primary));
        board.set(1, 1, Some(Owner::Secondary));
        board.set(2, 4, Some(Owner::Secondary));
        let stats = board.stats();
        assert_eq!(stats.primary_count, 3);
        assert_eq!(stats.secondary_count, 2);
        assert_eq!(stats.total, 5);
        assert_eq!(stats.primary_score, 2 * PERIMETER_CELL_POINTS);
        assert_eq!(stats.secondary_score, PERIMETER_CELL_POINTS);
    }

    #[test]
    fn to_rows_uses_owner_tags() {
        let mut board = Board::new(2, 3);
        board.set(2, 1, Some(Owner::Secondary));
        board.set(0, 0, Some(Owner::Primary));
        assert_eq!(board.to_rows(), vec![vec![1, 0, 0], vec![0, 0, 2]]);
    }
}
