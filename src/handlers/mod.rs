pub mod basic_auth;
pub mod disk;
pub mod dynamic;
pub mod embedded;
pub mod error_page;
pub mod redirect;

pub use dynamic::DynamicRegistry;
