mod builder;
mod controller;
mod state;

#[cfg(test)]
mod tests;

pub use builder::SessionBuilder;
pub use controller::SessionController;
pub use state::{SessionGuard, SessionState, SessionStats, SessionStatsSnapshot, SessionView};
