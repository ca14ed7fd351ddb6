pub mod coordinator;
pub mod handler;
pub mod member;
pub mod registry;
