// Test fixtures with known web-novel style chapters
// WHY: Shared inputs keep the expected spans and speakers consistent across test files

#![allow(dead_code)]

use quotecast::RawChapter;

/// System line plus an exchange between two named characters
pub fn arrival_chapter() -> RawChapter {
    RawChapter::new(
        "Arrival",
        vec![
            "Chapter 1: Arrival".into(),
            "<Level Up!>".into(),
            "\"Hello, Maria,\" he said. \"Hi, John,\" she replied.".into(),
            "* * *".into(),
            "The tavern was quiet after that.".into(),
        ],
    )
}

/// Second chapter naming Maria with a spelling variant and a title
pub fn market_chapter() -> RawChapter {
    RawChapter::new(
        "Market",
        vec![
            "\"Good morning, Mrs. Maria,\" the old man said.".into(),
            "[Quest Accepted: Find the Merchant]".into(),
            "\"Over here, John!\" Maria called out.".into(),
            "Read ahead on my Patreon!".into(),
        ],
    )
}

/// Single-quoted thought with a trailing cue
pub fn thought_chapter() -> RawChapter {
    RawChapter::new(
        "Doubts",
        vec!["'I wonder if this will work,' Alice thought.".into()],
    )
}

pub fn book() -> Vec<RawChapter> {
    vec![arrival_chapter(), market_chapter(), thought_chapter()]
}
