pub mod commands;
pub mod dispatch;
