//! Download Komoot tours and convert them to GPX.
//!
//! [`api::KomootClient`] fetches tours and highlight tips, [`compile::compile`]
//! renders a tour as a GPX 1.1 document.

pub mod api;
pub mod compile;
pub mod error;
pub mod model;
pub mod output;
pub mod transport;

pub use api::{ClientConfig, KomootClient, Session, TourList};
pub use compile::{build, compile, CompileOptions, TipSource};
pub use error::{Error, Result};
pub use model::{Tip, Tour, TourSummary, TourType, TypeFilter};
