mod draw;
mod events;
mod run;
mod state;

pub use run::run_dashboard;
