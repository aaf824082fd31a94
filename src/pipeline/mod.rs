pub mod analysis;
pub mod fitting;
pub mod numeric;
