//! Raw database queries. Handlers and services go through these functions
//! rather than embedding SQL inline.

pub mod session;
pub mod token;
pub mod user;
