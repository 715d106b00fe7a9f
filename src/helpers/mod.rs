//! Low-level readers shared by the spreadsheet engines.

pub(crate) mod biff12;
pub(crate) mod biff8;
pub(crate) mod cfb;
pub(crate) mod reader;
pub(crate) mod string;
pub(crate) mod xml;
pub(crate) mod zip;
