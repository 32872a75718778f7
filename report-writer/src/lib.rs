pub mod render;
pub mod report;
pub mod writer;

pub use render::{format_number, format_timestamp, render};
pub use report::{Report, Section, SectionBody};
pub use writer::ReportWriter;
