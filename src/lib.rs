pub mod config;
pub mod db;
pub mod error;

pub use db::WordleStorage;
pub use error::WordleError;
