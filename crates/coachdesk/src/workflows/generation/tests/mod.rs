mod common;
mod queue;
mod store;
