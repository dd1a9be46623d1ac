//! Byte layouts of stored keys and values.

pub mod fragment;
pub mod key;
