pub mod quote;
pub mod service;
pub mod session;
pub mod suggestion;
