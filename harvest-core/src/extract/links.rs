use scraper::{Html, Selector};
use tracing::trace;

const RESULT_ANCHOR: &str = "td a.individual";

/// Harvest detail-page references from a rendered search-results page.
///
/// The site routes result clicks through an inline handler instead of a
/// conventional href; the destination is the quoted fragment inside the
/// anchor's `onclick` attribute. Anchors with a missing or un-extractable
/// fragment are skipped individually. An empty list is a valid outcome.
pub fn harvest_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(RESULT_ANCHOR).expect("valid result anchor selector");

    let mut links = Vec::new();
    for anchor in document.select(&selector) {
        let Some(onclick) = anchor.value().attr("onclick") else {
            trace!("result anchor without inline handler skipped");
            continue;
        };
        match quoted_fragment(onclick) {
            Some(reference) => links.push(reference.to_string()),
            None => trace!(onclick = %onclick, "no quoted reference in handler, skipped"),
        }
    }
    links
}

/// Slice between the first and last single quote, the way the site embeds
/// the destination URL in its handler string.
fn quoted_fragment(handler: &str) -> Option<&str> {
    let start = handler.find('\'')?;
    let end = handler.rfind('\'')?;
    if end <= start + 1 {
        return None;
    }
    Some(&handler[start + 1..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results_page(anchors: &str) -> String {
        format!(
            "<html><body><table><tr><td>{anchors}</td></tr></table></body></html>"
        )
    }

    #[test]
    fn extracts_references_in_document_order() {
        let html = results_page(
            r#"<a class="individual" onclick="openDetail('/EntityDetails.aspx/INDIVIDUAL/11');">A</a>
               <a class="individual" onclick="openDetail('/EntityDetails.aspx/INDIVIDUAL/22');">B</a>"#,
        );
        let links = harvest_links(&html);
        assert_eq!(
            links,
            vec![
                "/EntityDetails.aspx/INDIVIDUAL/11".to_string(),
                "/EntityDetails.aspx/INDIVIDUAL/22".to_string(),
            ]
        );
    }

    #[test]
    fn malformed_anchors_are_skipped_individually() {
        let html = results_page(
            r#"<a class="individual">no handler</a>
               <a class="individual" onclick="openDetail(id)">no quotes</a>
               <a class="individual" onclick="openDetail('')">empty</a>
               <a class="individual" onclick="openDetail('/EntityDetails.aspx/INDIVIDUAL/33');">ok</a>"#,
        );
        let links = harvest_links(&html);
        assert_eq!(links, vec!["/EntityDetails.aspx/INDIVIDUAL/33".to_string()]);
    }

    #[test]
    fn anchors_outside_result_cells_are_ignored() {
        let html = r#"<html><body>
            <a class="individual" onclick="openDetail('/elsewhere');">not in a td</a>
            <a onclick="openDetail('/unclassed');">unclassed</a>
        </body></html>"#;
        assert!(harvest_links(html).is_empty());
    }

    #[test]
    fn zero_results_is_a_valid_outcome() {
        let html = "<html><body><p>No matching records.</p></body></html>";
        assert!(harvest_links(html).is_empty());
    }
}
