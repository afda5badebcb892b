use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use tracing::trace;

const NAME_PARAGRAPH: &str = "p.individual";
const IDENTITY_ROW: &str = "tr";
const IDENTITY_CELL: &str = "td.divider";
const LOCATION_ROW: &str = "tr";
const LOCATION_CELL: &str = "td";
const LOCATIONS_MARKER: &str = "REGISTERED LOCATIONS";
const NO_LOCATION_SENTINEL: &str = "None";

/// One output row of the crawl, in the sink's fixed column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseeRecord {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "NMLS ID")]
    pub nmls_id: String,
    #[serde(rename = "Phone")]
    pub phone: String,
    #[serde(rename = "Company")]
    pub company: String,
    #[serde(rename = "Company NMLS ID")]
    pub company_nmls_id: String,
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "Street Address")]
    pub street_address: String,
    #[serde(rename = "City")]
    pub city: String,
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "Zip Code")]
    pub zip_code: String,
    #[serde(rename = "Start Date")]
    pub start_date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfficeLocation {
    pub company: String,
    pub company_nmls_id: String,
    pub kind: String,
    pub street_address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub start_date: String,
}

/// Everything one detail page yields: the required identity fields plus
/// zero or more registered office locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailPage {
    pub name: String,
    pub nmls_id: String,
    pub phone: String,
    pub locations: Vec<OfficeLocation>,
}

impl DetailPage {
    /// One record per location row; a page without locations still yields a
    /// single record with the eight location fields empty.
    pub fn into_records(self) -> Vec<LicenseeRecord> {
        let identity = LicenseeRecord {
            name: self.name,
            nmls_id: self.nmls_id,
            phone: self.phone,
            ..LicenseeRecord::default()
        };
        if self.locations.is_empty() {
            return vec![identity];
        }
        self.locations
            .into_iter()
            .map(|location| LicenseeRecord {
                company: location.company,
                company_nmls_id: location.company_nmls_id,
                kind: location.kind,
                street_address: location.street_address,
                city: location.city,
                state: location.state,
                zip_code: location.zip_code,
                start_date: location.start_date,
                ..identity.clone()
            })
            .collect()
    }
}

/// Parse one rendered detail page. Returns `None` when the page is missing
/// either required group (the name paragraph or the first identity-row
/// cell); everything else degrades to empty strings.
pub fn extract_detail(html: &str) -> Option<DetailPage> {
    let document = Html::parse_document(html);

    let name_selector = Selector::parse(NAME_PARAGRAPH).expect("valid name selector");
    let name = match document.select(&name_selector).next() {
        Some(element) => cell_text(&element),
        None => {
            trace!("name paragraph missing, page discarded");
            return None;
        }
    };

    let row_selector = Selector::parse(IDENTITY_ROW).expect("valid row selector");
    let cell_selector = Selector::parse(IDENTITY_CELL).expect("valid identity cell selector");
    let identity_row = document.select(&row_selector).next()?;
    let mut cells = identity_row.select(&cell_selector);
    let nmls_id = match cells.next() {
        Some(cell) => cell_text(&cell),
        None => {
            trace!("identity row has no divider cells, page discarded");
            return None;
        }
    };
    let phone = cells.next().map(|cell| cell_text(&cell)).unwrap_or_default();

    Some(DetailPage {
        name,
        nmls_id,
        phone,
        locations: extract_locations(&document),
    })
}

fn extract_locations(document: &Html) -> Vec<OfficeLocation> {
    let Some(table) = locations_table(document) else {
        return Vec::new();
    };
    let row_selector = Selector::parse(LOCATION_ROW).expect("valid row selector");
    let cell_selector = Selector::parse(LOCATION_CELL).expect("valid cell selector");

    let mut locations = Vec::new();
    // First row is the header.
    for row in table.select(&row_selector).skip(1) {
        let cells: Vec<String> = row
            .select(&cell_selector)
            .map(|cell| cell_text(&cell))
            .collect();
        let first = cells.first().map(String::as_str).unwrap_or_default();
        if first == NO_LOCATION_SENTINEL {
            continue;
        }
        let column = |idx: usize| cells.get(idx).cloned().unwrap_or_default();
        locations.push(OfficeLocation {
            company: column(0),
            company_nmls_id: column(1),
            kind: column(2),
            street_address: column(3),
            city: column(4),
            state: column(5),
            zip_code: column(6),
            start_date: column(7),
        });
    }
    locations
}

/// First table following the section-title comment in document order.
fn locations_table(document: &Html) -> Option<ElementRef<'_>> {
    let mut after_marker = false;
    for node in document.tree.root().descendants() {
        match node.value() {
            Node::Comment(comment) if comment.contains(LOCATIONS_MARKER) => {
                after_marker = true;
            }
            Node::Element(element) if after_marker && element.name() == "table" => {
                return ElementRef::wrap(node);
            }
            _ => {}
        }
    }
    None
}

fn cell_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}
