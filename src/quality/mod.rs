pub mod score;

pub use score::{compute_quality, expected_bar_count};
