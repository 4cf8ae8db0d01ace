pub mod app;
pub mod chat;
pub mod config;
pub mod handler;
pub mod tui;
pub mod ui;
pub mod voice;
pub mod weather;
