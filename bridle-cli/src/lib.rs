//! Support code for the `bridle` command-line tool.

pub mod tokenizer;
