//! Lexicon scorer for brand reputation text.

/// Word weights for brand coverage.
///
/// Keys are lowercase single words. Values in `(0.0, 1.0]` are positive,
/// in `[-1.0, 0.0)` are negative. The final score is clamped to `[-1.0, 1.0]`.
pub(crate) const LEXICON: &[(&str, f32)] = &[
    // Positive signals
    ("great", 0.4),
    ("good", 0.3),
    ("excellent", 0.5),
    ("award", 0.5),
    ("awarded", 0.5),
    ("innovative", 0.4),
    ("innovation", 0.4),
    ("growth", 0.4),
    ("growing", 0.3),
    ("record", 0.3),
    ("profit", 0.3),
    ("expands", 0.3),
    ("expansion", 0.3),
    ("launch", 0.2),
    ("launches", 0.2),
    ("love", 0.5),
    ("best", 0.5),
    ("recommend", 0.4),
    ("quality", 0.3),
    ("trusted", 0.4),
    ("popular", 0.3),
    ("partnership", 0.3),
    ("wins", 0.4),
    ("win", 0.4),
    // Negative signals
    ("layoffs", -0.6),
    ("layoff", -0.6),
    ("lawsuit", -0.5),
    ("sued", -0.5),
    ("recall", -0.7),
    ("scandal", -0.7),
    ("fraud", -0.8),
    ("breach", -0.6),
    ("outage", -0.5),
    ("decline", -0.4),
    ("loss", -0.4),
    ("losses", -0.4),
    ("bad", -0.4),
    ("terrible", -0.6),
    ("worst", -0.6),
    ("failed", -0.4),
    ("failure", -0.4),
    ("complaint", -0.4),
    ("complaints", -0.4),
    ("boycott", -0.6),
    ("fine", -0.3),
    ("fined", -0.5),
    ("investigation", -0.4),
];

/// Score a text string using the lexicon.
///
/// Splits text into lowercase words, sums matching weights, and clamps
/// the result to `[-1.0, 1.0]`. Returns `0.0` for empty or unknown text.
#[must_use]
pub fn lexicon_score(text: &str) -> f32 {
    let mut score = 0.0_f32;
    for word in text.split_whitespace() {
        let w = word
            .trim_matches(|c: char| !c.is_alphabetic())
            .to_lowercase();
        if let Some(&(_, weight)) = LEXICON.iter().find(|&&(lex, _)| lex == w) {
            score += weight;
        }
    }
    score.clamp(-1.0, 1.0)
}

/// Mean lexicon score over `texts`, `0.0` when empty.
#[must_use]
pub fn mean_score<'a>(texts: impl IntoIterator<Item = &'a str>) -> f64 {
    let mut sum = 0.0_f64;
    let mut count = 0_u32;
    for text in texts {
        sum += f64::from(lexicon_score(text));
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / f64::from(count)
    }
}
