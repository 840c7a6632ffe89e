pub mod builder;
pub mod config;
pub mod error;
pub mod event;
pub mod export;
pub mod observability;
pub mod orchestrator;
pub mod protocol;
pub mod stream;
pub mod transport;

mod util;

pub use util::next_id;
