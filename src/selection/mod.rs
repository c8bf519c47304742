pub mod negotiator;
pub mod terminal;
