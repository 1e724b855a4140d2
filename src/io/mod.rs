//! Map persistence.

pub mod map_file;

pub use map_file::{MapDecoder, VpsMapDecoder, decode_map, encode_map, load_map, save_map};
