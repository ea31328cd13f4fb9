//! Configuration constants for page geometry and size limits.

mod constants;

pub use constants::{
    HEADER_SIZE, KV_HEADER_SIZE, MAX_KEY_SIZE, MAX_VAL_SIZE, MERGE_THRESHOLD, OFFSET_SIZE,
    PAGE_SIZE, PTR_SIZE,
};
