//! Keyword topic inference over question text

/// Topic used when no keyword matches or the question is unknown
pub const FALLBACK_TOPIC: &str = "Applied Concept";

/// (keywords, topic) in priority order; the first matching entry wins
const VOCABULARY: &[(&[&str], &str)] = &[
    (&["normalization"], "Normalization"),
    (&["sql"], "SQL Structure"),
    (&["index"], "Indexing"),
    (&["transaction"], "Transactions"),
    (&["integrity"], "Data Integrity"),
    (&["join"], "Joins"),
    (&["key"], "Keys & Constraints"),
    (&["class", "object"], "OOP Basics"),
    (&["inheritance"], "Inheritance"),
    (&["interface"], "Interfaces"),
    (&["exception"], "Exception Handling"),
];

/// Topic for a question text (substring match, case-insensitive)
pub fn infer_topic(question_text: &str) -> &'static str {
    let text = question_text.to_lowercase();
    VOCABULARY
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| text.contains(k)))
        .map(|(_, topic)| *topic)
        .unwrap_or(FALLBACK_TOPIC)
}
