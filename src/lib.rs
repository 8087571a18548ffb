#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::similar_names
)]

pub mod analysis;
pub(crate) mod api;
pub mod app;
pub mod classification;
pub mod config;
pub mod dataset;
pub mod evaluation;
pub mod experiment;
pub mod export;
pub mod observability;
pub mod pmml;
pub mod report;
