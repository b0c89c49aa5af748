//! Infrastructure layer: event storage, command dispatch, read models,
//! application service, reports, config.

pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod reports;
pub mod services;


pub use config::{ConfigError, StockroomConfig};
pub use reports::{write_report, DateRange, Report, ReportKind};
pub use services::{MovementInput, ServiceError, StockAlert, Stockroom};
