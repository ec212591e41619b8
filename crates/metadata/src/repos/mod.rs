//! Repository traits for metadata operations.

pub mod books;

pub use books::BookRepo;
