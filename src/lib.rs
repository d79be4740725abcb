//! A small Rust client for AutoCAD I/O work items.
//!
//! The flow is linear: exchange the app's consumer key/secret for a token,
//! submit a work item, poll its status, then download the result and the
//! status report once it succeeded.
//!
//! ## Quick start
//! - Configure credentials via environment variables (`ACADIO_CONSUMER_KEY`,
//!   `ACADIO_CONSUMER_SECRET`) or a `.acadiorc` file (current directory or home).
//! - Call [`Client::run`] with a [`WorkItem`].
//!
//! ```no_run
//! use acadio::{Client, Config, Outcome, WorkItem};
//! use tokio_util::sync::CancellationToken;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?.with_output_path("plot.pdf");
//!     let client = Client::new(config)?;
//!     let item = WorkItem::plot_to_pdf(acadio::SAMPLE_DRAWING);
//!
//!     match client.run(&item, &CancellationToken::new())? {
//!         Outcome::Downloaded { output, .. } => println!("wrote {}", output.display()),
//!         Outcome::Finished { status, .. } => println!("work item ended as {status}"),
//!     }
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

mod client;
mod config;
mod error;
pub mod poll;
mod workflow;
mod workitem;

pub use client::{Client, Token, odata_headers};
pub use config::{Config, ConfigOverrides, Credentials, DEFAULT_API_URL, DEFAULT_AUTH_URL};
pub use error::{Error, Result};
pub use poll::{Clock, PollPolicy, SystemClock};
pub use workflow::{Outcome, WorkItemApi, run};
pub use workitem::{
    Argument, Arguments, HttpVerb, JobId, JobResult, JobStatus, PLOT_TO_PDF, SAMPLE_DRAWING,
    StorageProvider, WorkItem,
};
