pub mod models;
pub mod pipeline;
pub mod sink;
pub mod tag_index;
