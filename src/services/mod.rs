pub mod admin;
pub mod auth;
pub mod cron;
pub mod email;
pub mod entitlement;
pub mod menu;
pub mod metrics;
pub mod orders;
pub mod payments;
pub mod pricing;
pub mod selections;
pub mod tokens;
pub mod wallet;
