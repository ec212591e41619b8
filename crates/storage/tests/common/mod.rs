pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{chunked, file_names, pending_after, read_all, seeded_bytes};
