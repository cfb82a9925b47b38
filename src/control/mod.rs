//! Developer console support: a live loopback demo and its ratatui front end.

pub mod demo;
pub mod ui;
