pub mod access;
pub mod health;
pub mod letters;
pub mod metrics;
pub mod ratelimit;
pub mod stats;
pub mod visitors;
pub mod worker;
