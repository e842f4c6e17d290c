pub mod decoder;
mod play_impl;
pub mod progress;
pub mod sink;

pub use play_impl::cmd_play;
