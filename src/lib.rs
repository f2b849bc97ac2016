pub mod config;
pub mod frame;
pub mod link;
pub mod messages;
pub mod motion;
pub mod motor;
pub mod runtime;
