pub mod jira;
pub mod strategy;
pub mod transport;
