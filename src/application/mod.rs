//! Application services: the background side-effect pipeline and the
//! collaborator seams it depends on.

pub mod documents;
pub mod error;
pub mod mail;
pub mod notifications;
pub mod pipeline;
pub mod repos;
pub mod shutdown;
pub mod sink;
pub mod tasks;
pub mod tokens;
pub mod tracker;
