pub mod document;
pub mod email;
pub mod issue;
