//! Intake flow: attachment download, upload, acknowledgement and report relay

pub mod intake;
pub mod poller;

pub use intake::{IntakeError, IntakeFlow};
pub use poller::{PollOutcome, ReportPoller};

pub const ACK_MESSAGE: &str = "Image received. Running text extraction and security analysis, this can take a minute.";
pub const NO_IMAGE_MESSAGE: &str = "Please attach an image (PNG, JPEG, GIF, BMP, TIFF or WEBP) to have it analyzed.";
pub const TIMEOUT_MESSAGE: &str = "Sorry, the analysis is taking longer than expected. Please try again later.";
pub const ERROR_MESSAGE: &str = "Sorry, something went wrong while handling your image. Please try again.";
