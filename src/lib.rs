pub mod arm;
pub mod avoid;
pub mod config;
pub mod controller;
pub mod demo;
pub mod display;
pub mod interface;
pub mod trajectory;
mod utils;

pub use log;

pub fn init_logging() {
    if let Err(_) = std::env::var("RUST_LOG") {
        std::env::set_var("RUST_LOG", "info");
    }

    env_logger::builder().try_init().ok();
}
