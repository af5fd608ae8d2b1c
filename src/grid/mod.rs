//! Spatial-hash neighbor search: uniform grid, parallel scan, counting sort,
//! and flat per-particle neighbor lists.

pub mod grid;
pub mod neighbors;
pub mod prefix_sum;
pub mod sort;
