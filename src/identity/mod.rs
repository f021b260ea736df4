pub mod pin;
pub mod service;

pub use pin::Pin;
pub use service::IdentityService;
