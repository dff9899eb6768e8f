//! Boundary services kept apart from the compositing and removal logic

pub mod codec;

pub use codec::{ImageCodec, PNG_DATA_URL_PREFIX};
