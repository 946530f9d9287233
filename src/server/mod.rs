pub mod auth;
pub mod config;
pub mod connection;
pub mod database;
pub mod error;
pub mod groups;
pub mod invitations;
pub mod profiles;
