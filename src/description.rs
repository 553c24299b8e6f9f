//! Formatting of task documentation into help/description text.

/// Column width used when re-wrapping description paragraphs.
pub const DESCRIPTION_WIDTH: usize = 70;

/// Placeholder used when a task carries no documentation.
pub const UNDOCUMENTED: &str = "<undocumented task>";

/// Turns a task's documentation text into a description suitable for CLI
/// help and generated docs.
///
/// Documentation is usually written with an unindented first line and
/// indented continuation lines. The first line is kept as-is, the common
/// leading whitespace of the remaining lines is removed, and each
/// blank-line-separated paragraph is re-wrapped to [`DESCRIPTION_WIDTH`]
/// columns.
///
/// # Examples
///
/// ```
/// use steptask::description::format_description;
///
/// let doc = "Publishes repositories\n\n    Publishes every requested repo\n    to its distributors.\n";
/// assert_eq!(
///     format_description(doc),
///     "Publishes repositories\n\nPublishes every requested repo to its distributors."
/// );
/// ```
pub fn format_description(doc: &str) -> String {
    let doc = if doc.trim().is_empty() {
        UNDOCUMENTED
    } else {
        doc
    };

    let (first, rest) = match doc.split_once('\n') {
        Some((first, rest)) => (first, rest),
        None => (doc, ""),
    };
    let joined = format!("{}\n{}", first, dedent(rest));

    joined
        .trim()
        .split("\n\n")
        .map(|paragraph| wrap(paragraph, DESCRIPTION_WIDTH).join("\n"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Removes the whitespace prefix shared by every non-blank line.
///
/// Lines consisting only of whitespace are normalized to empty lines and do
/// not take part in computing the common prefix.
pub fn dedent(text: &str) -> String {
    let margin = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(leading_whitespace)
        .reduce(common_prefix);

    text.lines()
        .map(|line| {
            if line.trim().is_empty() {
                ""
            } else {
                margin.map_or(line, |m| &line[m.len()..])
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn leading_whitespace(line: &str) -> &str {
    let end = line.len() - line.trim_start().len();
    &line[..end]
}

fn common_prefix<'a>(a: &'a str, b: &'a str) -> &'a str {
    let len = a
        .char_indices()
        .zip(b.chars())
        .take_while(|((_, ca), cb)| ca == cb)
        .last()
        .map_or(0, |((i, c), _)| i + c.len_utf8());
    &a[..len]
}

/// Greedy word wrap. Runs of whitespace (including newlines) collapse to a
/// single space; words longer than `width` are split across lines.
pub fn wrap(paragraph: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in paragraph.split_whitespace() {
        let mut word = word;
        loop {
            let room = if current.is_empty() {
                width
            } else {
                width.saturating_sub(current.chars().count() + 1)
            };
            let word_len = word.chars().count();

            if word_len <= room {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(word);
                break;
            }

            if word_len > width {
                // Only break a long word when nothing fits beside it.
                if room == 0 {
                    lines.push(std::mem::take(&mut current));
                    continue;
                }
                let split = word
                    .char_indices()
                    .nth(room)
                    .map_or(word.len(), |(i, _)| i);
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(&word[..split]);
                lines.push(std::mem::take(&mut current));
                word = &word[split..];
                continue;
            }

            lines.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
