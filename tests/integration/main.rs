//! Integration tests: the full engine over in-memory and SQLite stores.

mod fixtures;
mod persistence;
mod pipeline;
