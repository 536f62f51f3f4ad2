pub mod error;
pub mod image;
pub mod info_display;
pub mod logger;
pub mod options;
pub mod reader;
pub mod writer;
