pub mod ai;
pub mod commit;
pub mod config;
pub mod delta;
pub mod game_loop;
pub mod kobold_api;
pub mod models;
pub mod state;

mod io;
