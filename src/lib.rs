pub mod archive;
pub mod config;
pub mod fetch;
pub mod logging;
pub mod manifest;
pub mod process;
