//! Card classification
//!
//! A card is in scope when it carries both the speed and the connection
//! labels. An in-scope card without the fee label is reported by provider
//! name, in page order.

use super::ContentCard;

/// Longest provider name taken from a card's free text
pub const NAME_MAX_CHARS: usize = 80;

/// Exact leaf labels the classifier looks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardLabels {
    pub speed: String,
    pub connection: String,
    pub fee: String,
}

impl Default for CardLabels {
    fn default() -> Self {
        Self {
            speed: "Speed".to_string(),
            connection: "Connection".to_string(),
            fee: "Subscription fee".to_string(),
        }
    }
}

/// Counts produced by one classification pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardTally {
    pub missing: Vec<String>,
    pub total: usize,
    pub checked: usize,
}

pub fn classify_cards<C: ContentCard>(cards: &[C], labels: &CardLabels) -> CardTally {
    if cards.is_empty() {
        return CardTally::default();
    }

    let mut tally = CardTally {
        total: cards.len(),
        ..CardTally::default()
    };

    for card in cards {
        if !(card.has_leaf(&labels.speed) && card.has_leaf(&labels.connection)) {
            continue;
        }
        tally.checked += 1;

        if !card.has_leaf(&labels.fee) {
            tally.missing.push(extract_provider_name(card, tally.checked));
        }
    }

    tally
}

/// Best-effort display name; `position` is 1-based among in-scope cards
pub fn extract_provider_name<C: ContentCard>(card: &C, position: usize) -> String {
    let strategies: [fn(&C) -> Option<String>; 2] = [name_from_heading, name_from_first_line];

    strategies
        .iter()
        .find_map(|strategy| strategy(card))
        .unwrap_or_else(|| format!("Provider #{position}"))
}

fn name_from_heading<C: ContentCard>(card: &C) -> Option<String> {
    card.heading()
        .map(|heading| heading.trim().to_string())
        .filter(|heading| has_letter(heading))
}

fn name_from_first_line<C: ContentCard>(card: &C) -> Option<String> {
    card.full_text()
        .lines()
        .map(str::trim)
        .find(|line| has_letter(line))
        .map(|line| line.chars().take(NAME_MAX_CHARS).collect())
}

pub(crate) fn has_letter(value: &str) -> bool {
    value.chars().any(char::is_alphabetic)
}
