use scraper::{Html, Selector};

use crate::utils::error::{AppError, Result};

/// Extracts the price text located by a CSS selector.
///
/// The text of every matching element is concatenated in document order,
/// whitespace included. A selector that matches nothing yields an empty
/// string; only an unparsable selector is an error.
pub fn extract_price(body: &str, selector: &str) -> Result<String> {
    let css_selector = parse_selector(selector)?;
    let document = Html::parse_document(body);

    Ok(document
        .select(&css_selector)
        .flat_map(|element| element.text())
        .collect())
}

pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| AppError::Selector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}
