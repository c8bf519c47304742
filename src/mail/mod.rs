pub mod extract;
pub mod host;
