pub mod batch;
pub mod config;
pub mod driver;
pub mod input;
pub mod merge;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod portal;
pub mod record;
pub mod stages;
