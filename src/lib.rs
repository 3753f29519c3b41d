pub mod browser;
pub mod config;
pub mod db;
pub mod http;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod pages;
pub mod scraping;
pub mod sync;
pub mod utils;

pub use models::{Category, Event, TicketDetail, TicketStatus};
pub use orchestrator::{run_with_deadline, Orchestrator, RunError, RunSummary};
