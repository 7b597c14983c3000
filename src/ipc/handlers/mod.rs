pub mod attendance;
pub mod core;
pub mod credits;
pub mod records;
pub mod results;
pub mod setup;
