pub mod command;
pub mod config;
pub mod demux;
pub mod extract;
pub mod info;
pub mod play;
