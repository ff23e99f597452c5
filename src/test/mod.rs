mod checkins;
pub mod utils;
