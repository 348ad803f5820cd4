//! Turns raw assembly text into numbered, comment-free lines.

/// A non-empty source line with comments stripped and whitespace trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine<'src> {
  /// 1-based physical line number.
  pub number: usize,
  pub text: &'src str,
}

/// Characters that start a comment running to the end of the line.
const COMMENT_START: [char; 2] = [';', '#'];

/// Iterate over the meaningful lines of `source`.
pub fn lines(source: &str) -> impl Iterator<Item = SourceLine<'_>> + Clone {
  source.lines().enumerate().filter_map(|(index, raw)| {
    let code = match raw.find(COMMENT_START) {
      Some(start) => &raw[..start],
      None => raw,
    };
    let text = code.trim();
    (!text.is_empty()).then_some(SourceLine {
      number: index + 1,
      text,
    })
  })
}
