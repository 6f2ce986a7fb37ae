//! Positional extraction from a windgraf page.
//!
//! The station renders its wind diagram as `/html/body/windgraf/svg` with a
//! fixed sequence of `text` children. Values are read by their 1-based
//! position in that sequence, so every index the integration relies on lives
//! here.

use scraper::ElementRef;
use scraper::Html;

/// Wind direction, e.g. `123°`
pub const DIRECTION_NODE: usize = 5;
pub const MIN_SPEED_NODE: usize = 7;
pub const AVG_SPEED_NODE: usize = 9;
pub const MAX_SPEED_NODE: usize = 11;

/// Parse a page body into a document tree
pub fn parse_document(body: &str) -> Html {
    Html::parse_document(body)
}

/// Element children of `parent` with the given local name
fn child_elements<'a>(
    parent: ElementRef<'a>,
    name: &'a str,
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    parent
        .children()
        .filter_map(ElementRef::wrap)
        .filter(move |el| el.value().name() == name)
}

/// Text before the first child element of `node`
fn leading_text(node: ElementRef<'_>) -> Option<String> {
    let first = node.children().next()?;
    first.value().as_text().map(|text| String::from(&**text))
}

/// Leading text of the `index`-th (1-based) `text` node of the first
/// `windgraf` block.
///
/// Only the text before the node's first child element is returned, so
/// markup such as `<text>5.6<tspan>m/s</tspan></text>` reads as `5.6`.
/// Returns `None` when the page does not have that node or it has no
/// leading text.
pub fn extract_node_text(document: &Html, index: usize) -> Option<String> {
    let position = index.checked_sub(1)?;

    let body = child_elements(document.root_element(), "body").next()?;
    let windgraf = child_elements(body, "windgraf").next()?;

    child_elements(windgraf, "svg")
        .find_map(|svg| child_elements(svg, "text").nth(position))
        .and_then(leading_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = include_str!("../../../tests/fixtures/windgraf.html");

    #[test]
    fn test_extracts_fixed_nodes() {
        let document = parse_document(PAGE);
        assert_eq!(
            extract_node_text(&document, DIRECTION_NODE).as_deref(),
            Some("123°")
        );
        assert_eq!(
            extract_node_text(&document, MIN_SPEED_NODE).as_deref(),
            Some("1.2")
        );
        assert_eq!(
            extract_node_text(&document, AVG_SPEED_NODE).as_deref(),
            Some("3.14159")
        );
        assert_eq!(
            extract_node_text(&document, MAX_SPEED_NODE).as_deref(),
            Some("5.6")
        );
    }

    #[test]
    fn test_index_is_one_based() {
        let document = parse_document(PAGE);
        assert_eq!(extract_node_text(&document, 1).as_deref(), Some("N"));
        assert_eq!(extract_node_text(&document, 0), None);
    }

    #[test]
    fn test_missing_node() {
        let document = parse_document(PAGE);
        assert_eq!(extract_node_text(&document, 12), None);
    }

    #[test]
    fn test_page_without_windgraf_block() {
        let document = parse_document("<html><body><svg><text>1</text></svg></body></html>");
        assert_eq!(extract_node_text(&document, 1), None);
    }

    #[test]
    fn test_nested_markup_is_not_read() {
        let document = parse_document(
            "<html><body><windgraf><svg>\
             <text>5.6<tspan>m/s</tspan></text>\
             <text><tspan>1.2</tspan></text>\
             </svg></windgraf></body></html>",
        );
        assert_eq!(extract_node_text(&document, 1).as_deref(), Some("5.6"));
        assert_eq!(extract_node_text(&document, 2), None);
    }

    #[test]
    fn test_only_first_windgraf_block_is_read() {
        let document = parse_document(
            "<html><body>\
             <windgraf><svg><text>a</text></svg></windgraf>\
             <windgraf><svg><text>b</text><text>c</text></svg></windgraf>\
             </body></html>",
        );
        assert_eq!(extract_node_text(&document, 1).as_deref(), Some("a"));
        assert_eq!(extract_node_text(&document, 2), None);
    }
}
