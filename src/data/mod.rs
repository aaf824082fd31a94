pub mod map;
pub mod map_file;
pub mod material;
pub mod spectrum;
