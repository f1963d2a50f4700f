pub mod chunk;
pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod ncbi;
pub mod output;
pub mod pacing;
pub mod poll;
pub mod ranges;
pub mod report;
pub mod resolver;
pub mod scrape;
pub mod search;
pub mod submit;
pub mod taxonomy;
pub mod webdriver;
