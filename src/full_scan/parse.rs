//! Turns the OCR text of a combined scan artifact into structured data.
//!
//! The recognizer returns one text row per line, roughly:
//!
//! ```text
//! Gold
//! 296.8M      current amount, ignored
//! 589.7M      stored total, kept
//! Wood / Ore / Mana   same shape
//! Lord
//! dragonball Goten
//! Power
//! 14,837,914
//! HALLOFORDER
//! Level23
//! BAZAAR
//! Level23
//! 13,572      pet token, the last number in the text
//! ```

use serde::{Deserialize, Serialize};

use crate::scan::Resources;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullScanData {
    pub lord_name: String,
    pub power: u64,
    pub hall_level: u32,
    pub market_level: u32,
    pub pet_token: u64,
    pub resources: Resources,
}

/// Parse `13,572`, `589.7M`, `1.2B`, `500K`. Anything else is 0.
pub fn parse_value(text: &str) -> u64 {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    let (number, multiplier) = match cleaned.chars().last().map(|c| c.to_ascii_uppercase()) {
        Some('B') => (&cleaned[..cleaned.len() - 1], 1e9),
        Some('M') => (&cleaned[..cleaned.len() - 1], 1e6),
        Some('K') => (&cleaned[..cleaned.len() - 1], 1e3),
        _ => (cleaned.as_str(), 1.0),
    };
    match number.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => (value * multiplier).round() as u64,
        _ => 0,
    }
}

fn first_number(text: &str) -> Option<u32> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Markdown emphasis, headings and table bars are noise here.
fn clean_line(line: &str) -> &str {
    line.trim().trim_matches(|c: char| matches!(c, '#' | '*' | '|' | '_' | ' '))
}

fn resource_slot<'a>(resources: &'a mut Resources, label: &str) -> Option<&'a mut u64> {
    match label {
        "gold" => Some(&mut resources.gold),
        "wood" => Some(&mut resources.wood),
        "ore" => Some(&mut resources.ore),
        "mana" => Some(&mut resources.mana),
        _ => None,
    }
}

pub fn parse_scan_text(text: &str) -> FullScanData {
    let lines: Vec<&str> = text
        .lines()
        .map(clean_line)
        .filter(|line| !line.is_empty())
        .collect();
    let mut data = FullScanData::default();

    let mut i = 0;
    while i < lines.len() {
        let label = lines[i].to_lowercase();

        if let Some(slot) = resource_slot(&mut data.resources, &label) {
            if let Some(total) = lines.get(i + 2) {
                *slot = parse_value(total);
                i += 2;
            }
        } else if label == "lord" {
            if let Some(name) = lines.get(i + 1) {
                data.lord_name = name.to_string();
                i += 1;
            }
        } else if label == "power" {
            if let Some(value) = lines.get(i + 1) {
                data.power = parse_value(value);
                i += 1;
            }
        } else if label.contains("hall") {
            if let Some(level) = lines.get(i + 1).and_then(|l| first_number(l)) {
                data.hall_level = level;
                i += 1;
            }
        } else if label.contains("bazaar") || label.contains("market") {
            if let Some(level) = lines.get(i + 1).and_then(|l| first_number(l)) {
                data.market_level = level;
                i += 1;
            }
        }

        i += 1;
    }

    data.pet_token = lines
        .iter()
        .rev()
        .map(|line| parse_value(line))
        .find(|value| *value > 0)
        .unwrap_or(0);

    data
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Gold\n296.8M\n589.7M\nWood\n100K\n1.2B\nOre\n5\n7,500\nMana\n1\n2\n\
                          Lord\ndragonball Goten\nPower\n14,837,914\nMerits\n7,111\n\
                          HALLOFORDER\nLevel23\nBAZAAR\nLevel 21\n13,572\n";

    #[test]
    fn parses_the_full_document() {
        let data = parse_scan_text(SAMPLE);
        assert_eq!(
            data.resources,
            Resources { gold: 589_700_000, wood: 1_200_000_000, ore: 7_500, mana: 2 }
        );
        assert_eq!(data.lord_name, "dragonball Goten");
        assert_eq!(data.power, 14_837_914);
        assert_eq!(data.hall_level, 23);
        assert_eq!(data.market_level, 21);
        assert_eq!(data.pet_token, 13_572);
    }

    #[test]
    fn values_with_suffixes_and_separators() {
        assert_eq!(parse_value("13,572"), 13_572);
        assert_eq!(parse_value("500k"), 500_000);
        assert_eq!(parse_value(" 1.5B "), 1_500_000_000);
        assert_eq!(parse_value("Level23"), 0);
        assert_eq!(parse_value("-4"), 0);
        assert_eq!(parse_value(""), 0);
    }

    #[test]
    fn markdown_decoration_is_ignored() {
        let data = parse_scan_text("## **Lord**\n| Goten |\n**Power**\n1,000\n");
        assert_eq!(data.lord_name, "Goten");
        assert_eq!(data.power, 1_000);
        assert_eq!(data.pet_token, 1_000);
    }

    #[test]
    fn truncated_text_leaves_defaults() {
        let data = parse_scan_text("Gold\n12\nHall of Order\nno level here");
        assert_eq!(data.resources.gold, 0);
        assert_eq!(data.hall_level, 0);
        assert_eq!(data.pet_token, 12);
    }
}
