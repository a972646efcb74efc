/// Control-flow keywords counted toward the complexity score.
const CONTROL_KEYWORDS: &[&str] = &[
    "if", "else", "elif", "for", "while", "loop", "match", "switch", "case", "try", "catch",
    "except", "finally", "return", "break", "continue",
];

/// Weighted complexity of a span of code: control-flow keywords count double,
/// block and statement punctuation counts single.
#[must_use]
pub fn complexity_score(content: &str) -> u32 {
    let mut keywords = 0u32;
    for line in content.lines() {
        for token in line.split(|c: char| !c.is_ascii_alphanumeric() && c != '_') {
            if token.is_empty() {
                continue;
            }
            if CONTROL_KEYWORDS.contains(&token) {
                keywords += 1;
            }
        }
    }

    let punctuation = content
        .chars()
        .filter(|c| matches!(c, '{' | ';' | '?'))
        .count() as u32;
    let logical = (content.matches("&&").count() + content.matches("||").count()) as u32;

    keywords * 2 + logical * 2 + punctuation
}
