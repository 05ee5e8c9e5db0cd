pub mod api_connection;
pub mod assistant;
pub mod cli;
pub mod config;
pub mod error;
pub mod recipe_provider;
pub mod routes;
pub mod session;
pub mod state;
pub mod views;
