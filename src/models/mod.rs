pub mod auth;
pub mod menu;
pub mod order;
pub mod selection;
pub mod token;
pub mod user;
pub mod wallet;
