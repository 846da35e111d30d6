pub mod hash;
pub mod store;

pub use hash::compute_hash;
pub use store::{OutputStore, StoredOutput};
