pub mod extract;
pub mod index;
pub mod parse;
pub mod pipeline;
pub mod report;
pub mod retrieve;
pub mod status;
