pub mod control;
pub mod control_script;
pub mod dashboard;
pub mod gamepad;
pub mod probe;
pub mod robot_state;
pub mod rtde;
pub mod script_client;
pub mod teleop;
mod utils;

pub use log;

pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }

    env_logger::builder().try_init().ok();
}
