//! Persistent state kept between runs

pub mod url_status;

pub use url_status::*;
