pub mod app;
pub mod cli;
pub mod config;
pub mod entities;
pub mod error;
pub mod layout;
pub mod logging;
pub mod query;

pub use layout::{BidsFile, BidsLayout, LayoutOptions};
pub use query::{DatasetQuery, FilterMap, Scope};
