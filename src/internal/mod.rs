//! Internal building blocks (object envelope, pack formats, zlib streams) behind the store.

pub mod object;
pub mod pack;
pub mod zlib;
