pub mod util;
pub mod stats;
pub mod outcome;
pub mod log_call;
pub mod health;
pub mod config;
pub mod watch;

pub use stats::{call, calls, stats};
pub use outcome::outcome;
pub use log_call::{log_call, LogCallArgs};
pub use health::health;
pub use config::show_config;
pub use watch::watch;
