pub mod batch;

pub use batch::{BatchSweeper, SweepOutcome, CHUNK_SIZE, PAGE_SIZE};
