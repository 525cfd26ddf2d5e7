//! External work sources
//!
//! A [`SourceProvider`] hands the [`SourcePoller`](crate::orchestrator::SourcePoller)
//! a fresh list of sources whenever the queue runs dry.
//! - [`SheetSource`] - CSV export of a spreadsheet fetched over HTTP
//! - [`StaticSource`] - fixed list, for offline use and tests

mod sheet;
mod traits;

pub use sheet::{SheetSource, parse_csv};
pub use traits::{SourceProvider, StaticSource};
