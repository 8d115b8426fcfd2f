pub mod handler;
pub mod health;
pub mod reporter;
