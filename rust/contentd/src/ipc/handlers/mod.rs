pub mod core;
pub mod notifications;
pub mod problems;
pub mod settings;
