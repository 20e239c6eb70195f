//! Character-level scanning helpers shared by the transform stages and
//! the minifier. All of them are string- and comment-aware so source
//! literals never get rewritten.

/// Index one past the end of the string literal starting at `start`
pub fn string_end(cs: &[char], start: usize) -> usize {
    let quote = cs[start];
    let mut i = start + 1;
    while i < cs.len() {
        if cs[i] == '\\' {
            i += 2;
            continue;
        }
        if cs[i] == quote {
            return i + 1;
        }
        i += 1;
    }
    cs.len()
}

/// Index one past the end of the comment starting at `start` (which must
/// point at the leading '/')
pub fn comment_end(cs: &[char], start: usize) -> usize {
    if cs[start + 1] == '/' {
        let mut i = start + 2;
        while i < cs.len() && cs[i] != '\n' {
            i += 1;
        }
        i
    } else {
        let mut i = start + 2;
        while i + 1 < cs.len() {
            if cs[i] == '*' && cs[i + 1] == '/' {
                return i + 2;
            }
            i += 1;
        }
        cs.len()
    }
}

/// Index one past the end of the identifier starting at `start`
pub fn word_end(cs: &[char], start: usize) -> usize {
    let mut i = start;
    while i < cs.len() && (cs[i].is_alphanumeric() || cs[i] == '_' || cs[i] == '$') {
        i += 1;
    }
    i
}

/// Replace exact identifier matches outside strings and comments.
/// Identifiers preceded by '.' (property access) are left alone.
pub fn replace_words(source: &str, table: &[(&str, &str)]) -> String {
    let cs: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;

    while i < cs.len() {
        let c = cs[i];

        if c == '"' || c == '\'' || c == '`' {
            let end = string_end(&cs, i);
            out.extend(&cs[i..end]);
            i = end;
            continue;
        }

        if c == '/' && i + 1 < cs.len() && (cs[i + 1] == '/' || cs[i + 1] == '*') {
            let end = comment_end(&cs, i);
            out.extend(&cs[i..end]);
            i = end;
            continue;
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            let end = word_end(&cs, i);
            let word: String = cs[i..end].iter().collect();
            let after_dot = i > 0 && cs[i - 1] == '.';
            match table.iter().find(|(from, _)| *from == word && !after_dot) {
                Some((_, to)) => out.push_str(to),
                None => out.push_str(&word),
            }
            i = end;
            continue;
        }

        out.push(c);
        i += 1;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn test_string_end_handles_escapes() {
        let cs = chars(r#""a\"b" rest"#);
        assert_eq!(string_end(&cs, 0), 6);
    }

    #[test]
    fn test_comment_end() {
        let cs = chars("// line\nnext");
        assert_eq!(comment_end(&cs, 0), 7);

        let cs = chars("/* block */x");
        assert_eq!(comment_end(&cs, 0), 11);
    }

    #[test]
    fn test_replace_words_skips_properties() {
        let out = replace_words("foo.let = let;", &[("let", "var")]);
        assert_eq!(out, "foo.let = var;");
    }

    #[test]
    fn test_replace_words_skips_strings_and_comments() {
        let out = replace_words("let x = 'let'; // let\nlet y;", &[("let", "var")]);
        assert_eq!(out, "var x = 'let'; // let\nvar y;");
    }
}
