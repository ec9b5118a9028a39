mod common;
mod lifecycle;
mod resolution;
