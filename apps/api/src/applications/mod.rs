pub mod handlers;
pub mod lifecycle;
