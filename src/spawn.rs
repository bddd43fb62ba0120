use crate::constants::CENTER_ZONE_HALF;
use crate::piece::{Piece, Shape};
use crate::rng::Rng;
use crate::types::{GravityDirection, Owner};

/// Uniform pick among directions not yet taken by other live pieces, falling
/// back to all four when every direction is in use.
pub fn choose_direction(taken: &[GravityDirection], rng: &mut Rng) -> GravityDirection {
    let free: Vec<GravityDirection> = GravityDirection::ALL
        .into_iter()
        .filter(|dir| !taken.contains(dir))
        .collect();
    let pool: &[GravityDirection] = if free.is_empty() {
        &GravityDirection::ALL
    } else {
        &free
    };
    rng.pick(pool).unwrap_or(GravityDirection::Down)
}

/// Origin that puts the shape against the center zone boundary on the side
/// matching `direction`, centered on the perpendicular axis.
pub fn spawn_origin(shape: &Shape, direction: GravityDirection, rows: usize, cols: usize) -> (i32, i32) {
    let center_x = (cols / 2) as i32;
    let center_y = (rows / 2) as i32;
    let width = shape.width();
    let height = shape.height();
    match direction {
        GravityDirection::Down => (center_x - width / 2, center_y - CENTER_ZONE_HALF),
        GravityDirection::Up => (center_x - width / 2, center_y + CENTER_ZONE_HALF - height),
        GravityDirection::Right => (center_x - CENTER_ZONE_HALF, center_y - height / 2),
        GravityDirection::Left => (center_x + CENTER_ZONE_HALF - width, center_y - height / 2),
    }
}

pub fn place_piece(
    shape: Shape,
    owner: Owner,
    taken: &[GravityDirection],
    rows: usize,
    cols: usize,
    rng: &mut Rng,
) -> Piece {
    let direction = choose_direction(taken, rng);
    let (x, y) = spawn_origin(&shape, direction, rows, cols);
    Piece {
        shape,
        x,
        y,
        owner,
        direction,
    }
}
