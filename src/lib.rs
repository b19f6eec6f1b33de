pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use crate::config::{AppConfig, ChainMode, RetryPolicy};
pub use crate::core::dag::{TaskGraph, TaskReport, TaskState};
pub use crate::core::etl::{EtlEngine, RunReport};
pub use crate::core::schedule::CronTrigger;
pub use crate::utils::error::{EtlError, Result};
