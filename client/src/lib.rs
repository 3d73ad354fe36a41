pub mod discovery;
pub mod game;
pub mod network;
