pub mod measurements;
pub mod sessions;
pub mod tag_values;
pub mod tags;
