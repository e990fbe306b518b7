pub mod aggregate;
pub mod conf;
pub mod stats;
