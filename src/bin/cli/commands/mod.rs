pub mod cards;
pub mod data;
pub mod progress;
pub mod session;
