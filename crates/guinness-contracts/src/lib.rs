pub mod catalog;
pub mod chat;
pub mod events;
pub mod prompt;
pub mod runs;
