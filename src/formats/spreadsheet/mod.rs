//! `.xlsx` workbooks

pub mod reader;
