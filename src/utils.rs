/// 1-based line and column of a byte offset. Walks the whole prefix, so only
/// error paths call it.
pub fn get_line_and_column(source: &str, position: usize) -> (usize, usize) {
    let mut line = 1;
    let mut column = 1;
    for (i, c) in source.char_indices() {
        if i >= position {
            break;
        }
        if c == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}

/// Ordinal name comparison used wherever type names meet on the wire.
pub(crate) fn names_equal(left: Option<&str>, right: Option<&str>) -> bool {
    left == right
}
