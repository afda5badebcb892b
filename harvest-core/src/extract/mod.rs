mod detail;
mod links;

pub use detail::{extract_detail, DetailPage, LicenseeRecord, OfficeLocation};
pub use links::harvest_links;
