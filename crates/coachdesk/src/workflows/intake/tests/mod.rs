mod catalog;
mod common;
mod logic;
