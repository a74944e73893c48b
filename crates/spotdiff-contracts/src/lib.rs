pub mod cards;
pub mod events;
pub mod models;
pub mod play;
pub mod session;
pub mod settings;
