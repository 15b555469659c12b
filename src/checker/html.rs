//! Provider cards extracted from static HTML
//!
//! `scraper::Html` is not `Send`, so each page is reduced to owned
//! `HtmlCard`s before any await point.

use anyhow::anyhow;
use scraper::{ElementRef, Html, Selector};

use super::classifier::has_letter;
use super::ContentCard;

pub const DEFAULT_CARD_SELECTOR: &str = "div[data-sentry-component='ProviderCardFull']";
pub const DEFAULT_HEADING_SELECTOR: &str =
    "div[class*='ProviderCardHeader_provider-block'] p[class*='ProviderCardHeader']";

/// CSS selectors locating cards and their provider headings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardSelectors {
    card: String,
    heading: String,
}

impl CardSelectors {
    /// Validate both selectors up front so bad configuration fails before any page is fetched
    pub fn new(card: &str, heading: &str) -> Result<Self, anyhow::Error> {
        parse_selector(card)?;
        parse_selector(heading)?;
        Ok(Self {
            card: card.to_string(),
            heading: heading.to_string(),
        })
    }
}

impl Default for CardSelectors {
    fn default() -> Self {
        Self {
            card: DEFAULT_CARD_SELECTOR.to_string(),
            heading: DEFAULT_HEADING_SELECTOR.to_string(),
        }
    }
}

fn parse_selector(raw: &str) -> Result<Selector, anyhow::Error> {
    Selector::parse(raw).map_err(|err| anyhow!("Invalid CSS selector {:?}: {:?}", raw, err))
}

/// Owned view of one card element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HtmlCard {
    leaves: Vec<String>,
    heading: Option<String>,
    text: String,
}

impl HtmlCard {
    fn from_element(element: ElementRef<'_>, heading_selector: &Selector) -> Self {
        let leaves = element
            .descendants()
            .filter_map(ElementRef::wrap)
            .map(|el| normalize_text(&own_text(el)))
            .filter(|text| !text.is_empty())
            .collect();

        let heading = element
            .select(heading_selector)
            .map(|el| normalize_text(&el.text().collect::<String>()))
            .find(|text| has_letter(text));

        let text = element
            .text()
            .map(str::trim)
            .filter(|fragment| !fragment.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            leaves,
            heading,
            text,
        }
    }
}

impl ContentCard for HtmlCard {
    fn has_leaf(&self, text: &str) -> bool {
        self.leaves.iter().any(|leaf| leaf == text)
    }

    fn heading(&self) -> Option<String> {
        self.heading.clone()
    }

    fn full_text(&self) -> String {
        self.text.clone()
    }
}

/// Locate every provider card in `body`
pub fn parse_cards(body: &str, selectors: &CardSelectors) -> Result<Vec<HtmlCard>, anyhow::Error> {
    let card_selector = parse_selector(&selectors.card)?;
    let heading_selector = parse_selector(&selectors.heading)?;

    let document = Html::parse_document(body);
    let cards = document
        .select(&card_selector)
        .map(|element| HtmlCard::from_element(element, &heading_selector))
        .collect();

    Ok(cards)
}

/// Text held directly by the element, ignoring nested elements
fn own_text(element: ElementRef<'_>) -> String {
    element
        .children()
        .filter_map(|node| node.value().as_text())
        .map(|text| &**text)
        .collect()
}

/// Collapse whitespace runs (NBSP included) to single spaces and trim
pub(crate) fn normalize_text(value: &str) -> String {
    value
        .replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::{classify_cards, CardLabels};

    const PAGE: &str = r#"
        <html><body>
          <div data-sentry-component="ProviderCardFull">
            <div class="ProviderCardHeader_provider-block__x1">
              <p class="ProviderCardHeader_name__a2">FastNet</p>
            </div>
            <div><span>Speed</span><span>100 Mbit/s</span></div>
            <div><span>Connection</span><span>Free</span></div>
            <div><span>Subscription&nbsp;fee</span><span>500</span></div>
          </div>
          <div data-sentry-component="ProviderCardFull">
            <div class="ProviderCardHeader_provider-block__x1">
              <p class="ProviderCardHeader_name__a2">  HomeLink </p>
            </div>
            <div><span> Speed </span><span>300 Mbit/s</span></div>
            <div><span>Connection</span><span>Free</span></div>
          </div>
          <div data-sentry-component="ProviderCardFull">
            <div><span>Promo</span><b>Summer deal</b></div>
          </div>
          <div data-sentry-component="ProviderCardFull">
            <b>SkyWave</b>
            <div><span>Speed</span><span>50 Mbit/s</span></div>
            <div><span>Connection</span><span>990</span></div>
          </div>
          <div class="Footer"><span>Speed</span><span>Connection</span></div>
        </body></html>
    "#;

    #[test]
    fn parses_cards_and_normalises_leaves() {
        let cards = parse_cards(PAGE, &CardSelectors::default()).expect("cards");
        assert_eq!(cards.len(), 4);

        assert!(cards[0].has_leaf("Subscription fee"));
        assert!(cards[1].has_leaf("Speed"));
        assert_eq!(cards[1].heading().as_deref(), Some("HomeLink"));
        assert_eq!(cards[3].heading(), None);
        assert!(cards[3].full_text().starts_with("SkyWave\nSpeed"));
    }

    #[test]
    fn parent_text_does_not_count_as_leaf() {
        let body = r#"<div data-sentry-component="ProviderCardFull"><p>Speed <b>fast</b></p></div>"#;
        let cards = parse_cards(body, &CardSelectors::default()).expect("cards");

        assert!(cards[0].has_leaf("Speed"));
        assert!(!cards[0].has_leaf("Speed fast"));
    }

    #[test]
    fn classifies_parsed_page() {
        let cards = parse_cards(PAGE, &CardSelectors::default()).expect("cards");
        let tally = classify_cards(&cards, &CardLabels::default());

        assert_eq!(tally.total, 4);
        assert_eq!(tally.checked, 3);
        assert_eq!(
            tally.missing,
            vec!["HomeLink".to_string(), "SkyWave".to_string()]
        );
    }

    #[test]
    fn heading_skips_matches_without_letters() {
        let body = r#"
            <div data-sentry-component="ProviderCardFull">
              <span>Popular choice</span>
              <div class="ProviderCardHeader_provider-block__x1">
                <p class="ProviderCardHeader_rating__b3">4.9</p>
                <p class="ProviderCardHeader_name__a2">FastNet</p>
              </div>
              <div><span>Speed</span><span>100 Mbit/s</span></div>
              <div><span>Connection</span><span>Free</span></div>
            </div>
        "#;
        let cards = parse_cards(body, &CardSelectors::default()).expect("cards");
        assert_eq!(cards[0].heading().as_deref(), Some("FastNet"));

        let tally = classify_cards(&cards, &CardLabels::default());
        assert_eq!(tally.missing, vec!["FastNet".to_string()]);
    }

    #[test]
    fn page_without_cards_yields_nothing() {
        let cards = parse_cards("<html><body><p>Loading</p></body></html>", &CardSelectors::default())
            .expect("cards");
        assert!(cards.is_empty());
    }

    #[test]
    fn rejects_invalid_selector() {
        assert!(CardSelectors::new("div[", DEFAULT_HEADING_SELECTOR).is_err());
        assert!(CardSelectors::new(DEFAULT_CARD_SELECTOR, DEFAULT_HEADING_SELECTOR).is_ok());
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize_text("  Subscription\u{a0}\n fee "), "Subscription fee");
        assert_eq!(normalize_text("   "), "");
    }
}
