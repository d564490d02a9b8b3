pub mod config;
pub mod history;
pub mod providers;

pub use config::ConfigCommand;
pub use history::HistoryCommand;
pub use providers::ProvidersCommand;
