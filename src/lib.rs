pub mod app;
pub mod audio;
pub mod clock;
pub mod config;
pub mod control;
pub mod error;
pub mod features;
pub mod logging;
pub mod media;
pub mod render;
pub mod terminal;
pub mod visual;
