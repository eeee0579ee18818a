//! Caret diagnostics for syntax errors.

/// Locates the byte at `pos` in `src` and renders the surrounding context.
///
/// `pos` counts consumed bytes, so an error on the very first byte has
/// `pos == 1`. Returns the 1-based line, the column, and a highlight block
/// quoting the offending line (and the one before it, when there is one)
/// with a caret under the error position:
///
/// ```text
///     3:   {"type": 123
///     4:  ]
///         ^
/// ```
///
/// Line content is byte-faithful; tabs and other whitespace are kept as-is
/// and invalid UTF-8 is rendered lossily.
pub fn highlight_position(src: &[u8], pos: usize) -> (usize, usize, String) {
    let mut line = 1usize;
    let mut col = 0usize;
    let mut last_line: Vec<u8> = Vec::new();
    let mut this_line: Vec<u8> = Vec::new();

    for &b in src.iter().take(pos) {
        if b == b'\n' {
            // Keep the finished line around in case the next one is the
            // offender.
            last_line = std::mem::take(&mut this_line);
            line += 1;
            col = 1;
        } else {
            col += 1;
            this_line.push(b);
        }
    }

    let mut highlight = String::new();
    if line > 1 {
        highlight.push_str(&format!(
            "{:5}: {}\n",
            line - 1,
            String::from_utf8_lossy(&last_line)
        ));
    }
    highlight.push_str(&format!(
        "{:5}: {}\n",
        line,
        String::from_utf8_lossy(&this_line)
    ));
    highlight.push_str(&format!("{}^\n", " ".repeat(col + 5)));

    (line, col, highlight)
}
