//! # iactpipe
//!
//! Building blocks of an Imaging Atmospheric Cherenkov Telescope (IACT) array analysis:
//! reading events from several input formats, combining telescope-wise reconstructions into
//! array-level (stereo) ones, writing processed data together with the simulation metadata, and
//! looking up bright stars around a pointing direction.
//!
//! ## Overview
//! -----------------
//! * [`io`] – the [`EventSource`](io::EventSource) interface and its backends, event
//!   containers, [`DataWriter`](io::DataWriter).
//! * [`catalog`] – packaged bright-star catalogs and [`get_bright_stars`](catalog::get_bright_stars),
//!   with proper-motion propagation to the observation time.
//! * [`simulation`] – simulation run configuration and **simulated shower distributions**.
//!   Every event source exposes the distributions through the same trait method, and the
//!   writer persists them with every processed output.
//! * [`stereo`] – weighted-mean combination of mono predictions.
//! * [`irf`] – effective area from the selected events and the thrown showers.
//! * [`processor`] – configuration and driver of a full processing run.
//! * [`display`] – table rendering of query results.
//! * [`optional_deps`] – the optional-dependency gate.
//!
//! ## Cargo features
//! -----------------
//! | Feature    | Enables |
//! |------------|---------|
//! | `parquet`  | the Parquet event source |
//! | `display`  | table rendering |
//! | `progress` | progress bars while processing |
//! | `all`      | everything above |
//!
//! The default build has none of them. Using a gated capability without its feature returns
//! [`PipeError::OptionalDependency`](pipe_errors::PipeError::OptionalDependency) at the call
//! site, naming the feature to enable.
pub mod catalog;
pub mod constants;
pub mod coordinates;
pub mod display;
pub mod io;
pub mod irf;
pub mod optional_deps;
pub mod pipe_errors;
pub mod processor;
#[cfg(feature = "progress")]
pub mod progress_bar;
pub mod simulation;
pub mod stereo;
pub mod time;

pub use pipe_errors::PipeError;
