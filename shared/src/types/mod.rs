//! Common types shared by the intake and processing services

pub mod error;
pub mod report;
