pub mod kv;
pub mod links;
