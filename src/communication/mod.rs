pub mod error_handler;
pub mod keyboards;
pub mod telegram;
