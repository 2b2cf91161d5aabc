pub mod legacy;
pub mod target;
