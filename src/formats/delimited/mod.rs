//! `;`-separated text files

pub mod reader;
