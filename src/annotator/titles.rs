// WHY: honorifics and capitalized function words shared by roster harvesting and
// speaker canonicalization

use std::collections::HashSet;

/// Honorifics that prefix a character name, with and without the trailing period
pub const TITLES: &[&str] = &[
    "Mr.", "Mrs.", "Ms.", "Miss", "Dr.", "Capt.", "Captain", "Prof.", "Professor",
    "Sir", "Lady", "Lord", "Mr", "Mrs", "Ms", "Dr", "Capt", "Prof",
];

/// Capitalized words that look like names at a sentence start but never are
pub const NON_NAMES: &[&str] = &[
    "I", "He", "She", "It", "We", "They", "You", "Me", "Him", "Her", "Us", "Them",
    "His", "Hers", "Its", "Our", "Their", "Your", "My", "Mine",
    "The", "A", "An", "And", "But", "Or", "So", "Then", "Now", "Yes", "No", "Oh",
    "Well", "Hey", "Hello", "Hi", "Okay", "Ok", "Please", "Thanks", "Sorry", "What",
    "Why", "How", "Who", "Where", "When", "This", "That", "There", "Here", "Come",
    "Wait", "Stop", "Look", "Listen", "God", "Chapter", "System", "User", "Status",
    "Level", "Skill", "Quest", "Sir", "Madam", "Everyone", "Guys", "Right", "Fine",
    "Never", "Always", "Good", "Great", "Run", "Go", "Help",
];

const PRONOUNS: &[&str] = &[
    "he", "she", "they", "i", "we", "you", "it", "him", "her", "them", "me", "us",
];

/// Remove one leading honorific ("Dr. Watson" -> "Watson"); a bare title is kept
pub fn strip_leading_title(name: &str) -> &str {
    let trimmed = name.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((first, rest)) if TITLES.contains(&first) && !rest.trim().is_empty() => rest.trim(),
        _ => trimmed,
    }
}

/// Lookup sets for pronouns and non-name words
#[derive(Debug, Clone)]
pub struct NameLexicon {
    non_names: HashSet<&'static str>,
    pronouns: HashSet<&'static str>,
}

impl NameLexicon {
    pub fn new() -> Self {
        Self {
            non_names: NON_NAMES.iter().copied().collect(),
            pronouns: PRONOUNS.iter().copied().collect(),
        }
    }

    /// True for pronouns and capitalized function words
    pub fn is_non_name(&self, word: &str) -> bool {
        self.non_names.contains(word)
    }

    pub fn is_pronoun(&self, word: &str) -> bool {
        self.pronouns.contains(word.to_lowercase().as_str())
    }

    pub fn strip_title<'a>(&self, name: &'a str) -> &'a str {
        strip_leading_title(name)
    }

    /// Reject candidates made only of function words, or starting with one
    pub fn is_plausible_name(&self, name: &str) -> bool {
        let mut tokens = name.split_whitespace();
        match tokens.next() {
            Some(first) => {
                !self.is_non_name(first)
                    && first.chars().next().is_some_and(char::is_uppercase)
                    && name.split_whitespace().all(|t| !self.is_pronoun(t))
            }
            None => false,
        }
    }
}

impl Default for NameLexicon {
    fn default() -> Self {
        Self::new()
    }
}
