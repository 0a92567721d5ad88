//! Presentation layer: templates that turn application data into output.

pub mod mail;
