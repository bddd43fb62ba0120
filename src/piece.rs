use std::collections::HashMap;

use crate::rng::Rng;
use crate::types::{GravityDirection, Owner, PieceView};

pub const SHAPE_COUNT: usize = 7;

const SHAPES: [&[&[u8]]; SHAPE_COUNT] = [
    &[&[1, 1, 1, 1]],
    &[&[1, 1], &[1, 1]],
    &[&[0, 1, 0], &[1, 1, 1]],
    &[&[1, 0, 0], &[1, 1, 1]],
    &[&[0, 0, 1], &[1, 1, 1]],
    &[&[0, 1, 1], &[1, 1, 0]],
    &[&[1, 1, 0], &[0, 1, 1]],
];

/// Immutable bitmask matrix. Rotation builds a new value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shape {
    rows: Vec<Vec<bool>>,
}

impl Shape {
    /// `index` is taken modulo the shape count.
    pub fn standard(index: usize) -> Self {
        let rows = SHAPES[index % SHAPE_COUNT]
            .iter()
            .map(|row| row.iter().map(|cell| *cell != 0).collect())
            .collect();
        Self { rows }
    }

    pub fn width(&self) -> i32 {
        self.rows.first().map(|row| row.len()).unwrap_or(0) as i32
    }

    pub fn height(&self) -> i32 {
        self.rows.len() as i32
    }

    /// Occupied cells as `(col, row)` offsets from the origin.
    pub fn cells(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.rows.iter().enumerate().flat_map(|(r, row)| {
            row.iter()
                .enumerate()
                .filter(|(_, filled)| **filled)
                .map(move |(c, _)| (c as i32, r as i32))
        })
    }

    /// Clockwise quarter turn.
    pub fn rotated(&self) -> Self {
        let height = self.rows.len();
        let width = self.width() as usize;
        let rows = (0..width)
            .map(|c| (0..height).rev().map(|r| self.rows[r][c]).collect())
            .collect();
        Self { rows }
    }

    pub fn to_mask(&self) -> Vec<Vec<u8>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|filled| u8::from(*filled)).collect())
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Piece {
    pub shape: Shape,
    pub x: i32,
    pub y: i32,
    pub owner: Owner,
    pub direction: GravityDirection,
}

impl Piece {
    pub fn gravity(&self) -> (i32, i32) {
        self.direction.delta()
    }

    /// Absolute board coordinates of the occupied cells, optionally for a
    /// replacement shape and offset.
    pub fn cells_with<'a>(
        &'a self,
        shape: &'a Shape,
        dx: i32,
        dy: i32,
    ) -> impl Iterator<Item = (i32, i32)> + 'a {
        shape
            .cells()
            .map(move |(c, r)| (self.x + c + dx, self.y + r + dy))
    }

    pub fn cells(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.cells_with(&self.shape, 0, 0)
    }

    pub fn translate(&mut self, dx: i32, dy: i32) {
        self.x += dx;
        self.y += dy;
    }

    pub fn view(&self) -> PieceView {
        let (grav_dx, grav_dy) = self.gravity();
        PieceView {
            shape: self.shape.to_mask(),
            x: self.x,
            y: self.y,
            owner: self.owner,
            dir: self.direction,
            grav_dx,
            grav_dy,
        }
    }
}

/// One shuffle bag per participant.
#[derive(Clone, Debug, Default)]
pub struct PieceBag {
    bags: HashMap<String, Vec<usize>>,
}

impl PieceBag {
    pub fn next(&mut self, participant_id: &str, rng: &mut Rng) -> usize {
        let bag = self.bags.entry(participant_id.to_string()).or_default();
        if bag.is_empty() {
            bag.extend(0..SHAPE_COUNT);
            rng.shuffle(bag);
        }
        bag.pop().unwrap_or(0)
    }

    pub fn reset(&mut self) {
        self.bags.clear();
    }

    pub fn forget(&mut self, participant_id: &str) {
        self.bags.remove(participant_id);
    }

    /// Shapes left before the participant's bag refills.
    pub fn remaining(&self, participant_id: &str) -> usize {
        self.bags.get(participant_id).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_is_clockwise_and_returns_new_value() {
        let t = Shape::standard(2);
        let turned = t.rotated();
        assert_eq!(t.to_mask(), vec![vec![0, 1, 0], vec![1, 1, 1]]);
        assert_eq!(turned.to_mask(), vec![vec![1, 0], vec![1, 1], vec![1, 0]]);
        assert_eq!(turned.rotated().rotated().rotated(), t);
    }

    #[test]
    fn i_piece_rotates_to_vertical() {
        let i = Shape::standard(0);
        let vertical = i.rotated();
        assert_eq!(vertical.width(), 1);
        assert_eq!(vertical.height(), 4);
    }

    #[test]
    fn every_shape_has_four_cells() {
        for idx in 0..SHAPE_COUNT {
            assert_eq!(Shape::standard(idx).cells().count(), 4, "shape {idx}");
        }
    }

    #[test]
    fn bag_yields_each_shape_once_per_cycle() {
        let mut rng = Rng::new(2024);
        let mut bags = PieceBag::default();
        for _ in 0..10 {
            let mut seen: Vec<usize> = (0..SHAPE_COUNT).map(|_| bags.next("p1", &mut rng)).collect();
            seen.sort_unstable();
            assert_eq!(seen, (0..SHAPE_COUNT).collect::<Vec<_>>());
        }
    }

    #[test]
    fn bags_are_independent_per_participant() {
        let mut rng = Rng::new(5);
        let mut bags = PieceBag::default();
        let mut a = Vec::new();
        let mut b = Vec::new();
        for _ in 0..SHAPE_COUNT {
            a.push(bags.next("a", &mut rng));
            b.push(bags.next("b", &mut rng));
        }
        a.sort_unstable();
        b.sort_unstable();
        assert_eq!(a, (0..SHAPE_COUNT).collect::<Vec<_>>());
        assert_eq!(b, (0..SHAPE_COUNT).collect::<Vec<_>>());
    }

    #[test]
    fn forget_starts_a_fresh_bag() {
        let mut rng = Rng::new(11);
        let mut bags = PieceBag::default();
        bags.next("a", &mut rng);
        bags.forget("a");
        let mut seen: Vec<usize> = (0..SHAPE_COUNT).map(|_| bags.next("a", &mut rng)).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..SHAPE_COUNT).collect::<Vec<_>>());
    }

    #[test]
    fn piece_cells_are_offset_by_origin() {
        let piece = Piece {
            shape: Shape::standard(1),
            x: 3,
            y: 4,
            owner: Owner::Primary,
            direction: GravityDirection::Down,
        };
        let mut cells: Vec<_> = piece.cells().collect();
        cells.sort_unstable();
        assert_eq!(cells, vec![(3, 4), (3, 5), (4, 4), (4, 5)]);
        assert_eq!(piece.gravity(), (0, 1));
    }
}
