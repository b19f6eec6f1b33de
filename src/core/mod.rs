pub mod dag;
pub mod etl;
pub mod retry;
pub mod sanitize;
pub mod schedule;
pub mod stage;
