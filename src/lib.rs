pub mod board;
pub mod broadcaster;
pub mod config;
pub mod constants;
pub mod error;
pub mod game_loop;
pub mod gateway;
pub mod match_history;
pub mod piece;
pub mod registry;
pub mod rng;
pub mod room;
pub mod server_protocol;
pub mod server_utils;
pub mod spawn;
pub mod types;
