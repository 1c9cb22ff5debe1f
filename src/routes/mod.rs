pub mod admin;
pub mod auth;
pub mod health;
pub mod menu;
pub mod metrics;
pub mod orders;
pub mod redemption;
pub mod selections;
pub mod wallet;
