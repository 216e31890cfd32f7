pub mod config;
pub mod router;
pub mod shutdown;
pub mod world;
