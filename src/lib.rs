pub mod checkins;
pub mod database;
pub mod env;
pub mod error;
pub mod models;
pub mod ranks;
pub mod registry;
pub mod roles;
pub mod session;
pub mod telemetry;
#[cfg(test)]
mod test;

pub use env::CoreConfig;
pub use error::AppError;
