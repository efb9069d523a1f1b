/// Returns the index of the `}` that closes the `{` at `open`.
///
/// Braces inside string literals and comments are ignored. An unterminated
/// block yields `None`.
pub fn find_block_end(bytes: &[u8], open: usize) -> Option<usize> {
    if bytes.get(open) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
        } else if let Some(next) = skip_comment(bytes, i) {
            i = next;
            continue;
        } else {
            match b {
                b'"' | b'\'' | b'`' => quote = Some(b),
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Collects the keys that sit directly inside a bounded `{ ... }` block.
///
/// Both quoted (`"key":`) and bare (`key:`) keys are recognised, as well as
/// shorthand properties (`{ user, token }`). Keys of nested objects, arrays
/// and call arguments are skipped: only depth one is inspected.
pub fn top_level_keys(block: &[u8]) -> Vec<String> {
    let mut keys = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut expect_key = false;
    let mut i = 0;

    while i < block.len() {
        let b = block[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        if let Some(next) = skip_comment(block, i) {
            i = next;
            continue;
        }

        if depth == 1 && expect_key && !b.is_ascii_whitespace() {
            expect_key = false;
            if let Some((key, next)) = read_key(block, i) {
                keys.push(key);
                i = next;
                continue;
            }
        }

        match b {
            b'"' | b'\'' | b'`' => quote = Some(b),
            b'{' | b'[' | b'(' => {
                depth += 1;
                if depth == 1 {
                    expect_key = true;
                }
            }
            b'}' | b']' | b')' => depth = depth.saturating_sub(1),
            b',' if depth == 1 => expect_key = true,
            _ => {}
        }
        i += 1;
    }

    keys
}

// Returns the key and the index scanning resumes from.
fn read_key(bytes: &[u8], pos: usize) -> Option<(String, usize)> {
    let first = bytes[pos];
    if first == b'"' || first == b'\'' {
        let mut end = pos + 1;
        while end < bytes.len() && bytes[end] != first {
            if bytes[end] == b'\\' || bytes[end] == b'\n' {
                return None;
            }
            end += 1;
        }
        if end >= bytes.len() {
            return None;
        }
        let after = skip_whitespace(bytes, end + 1);
        if bytes.get(after) != Some(&b':') {
            return None;
        }
        let key = String::from_utf8_lossy(&bytes[pos + 1..end]).to_string();
        return Some((key, after + 1));
    }

    let ident = read_ident_forward(&bytes[pos..])?;
    let after = skip_whitespace(bytes, pos + ident.len());
    match bytes.get(after) {
        Some(b':') => Some((ident, after + 1)),
        Some(b',') | Some(b'}') => Some((ident, after)),
        _ => None,
    }
}

/// Splits a captured list (`a, b = 1, ...rest`, `{ a: alias, b }`) into bare names.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|item| {
            let mut name = item.trim();
            if let Some(idx) = name.find('=') {
                name = &name[..idx];
            }
            if let Some(idx) = name.find(':') {
                name = &name[..idx];
            }
            let name = name
                .trim()
                .trim_start_matches("...")
                .trim_matches(|c: char| matches!(c, '{' | '}' | '[' | ']') || c.is_whitespace());
            if name.is_empty() {
                None
            } else {
                Some(name.to_string())
            }
        })
        .collect()
}

fn skip_comment(bytes: &[u8], pos: usize) -> Option<usize> {
    if bytes.get(pos) != Some(&b'/') {
        return None;
    }
    match bytes.get(pos + 1) {
        Some(b'/') => {
            let rest = &bytes[pos + 2..];
            Some(memchr::memchr(b'\n', rest).map_or(bytes.len(), |n| pos + 2 + n + 1))
        }
        Some(b'*') => {
            let rest = &bytes[pos + 2..];
            Some(memchr::memmem::find(rest, b"*/").map_or(bytes.len(), |n| pos + 2 + n + 2))
        }
        _ => None,
    }
}

fn skip_whitespace(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

fn read_ident_forward(bytes: &[u8]) -> Option<String> {
    let first = *bytes.first()?;
    if !(first.is_ascii_alphabetic() || first == b'_' || first == b'$') {
        return None;
    }
    let end = bytes.iter().position(|&b| !is_ident_char(b)).unwrap_or(bytes.len());
    Some(String::from_utf8_lossy(&bytes[..end]).to_string())
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_end_skips_nested_and_quoted_braces() {
        let src = b"x = {a: '}', b: {c: 2}, d: \"{\"} tail";
        let open = src.iter().position(|&b| b == b'{').unwrap();
        let close = find_block_end(src, open).unwrap();
        assert_eq!(&src[close + 1..], b" tail");
    }

    #[test]
    fn unterminated_block_is_none() {
        assert_eq!(find_block_end(b"{a: {b: 1}", 0), None);
        assert_eq!(find_block_end(b"abc", 0), None);
    }

    #[test]
    fn top_level_keys_ignore_nested_objects() {
        let keys = top_level_keys(b"{a: 1, b: {c: 2}, d: 3}");
        assert_eq!(keys, vec!["a", "b", "d"]);
    }

    #[test]
    fn top_level_keys_handle_quoted_and_shorthand() {
        let src = br#"{"userId": 1, 'page': [1, {x: 2}], token, run() { return {y: 1}; }}"#;
        let keys = top_level_keys(src);
        assert_eq!(keys, vec!["userId", "page", "token"]);
    }

    #[test]
    fn values_with_colons_are_not_keys() {
        let keys = top_level_keys(b"{mode: a ? b : c, url: \"http://x\"}");
        assert_eq!(keys, vec!["mode", "url"]);
    }

    #[test]
    fn comments_inside_objects_are_skipped() {
        let src = b"var cfg = {\n // don't change\n alpha: 1, /* beta's twin */\n beta: '}',\n};";
        let open = src.iter().position(|&b| b == b'{').unwrap();
        let close = find_block_end(src, open).unwrap();
        assert_eq!(&src[close..], b"};");
        assert_eq!(top_level_keys(&src[open..=close]), vec!["alpha", "beta"]);
    }

    #[test]
    fn split_list_strips_decorations() {
        assert_eq!(split_list("a, b = 1, ...rest"), vec!["a", "b", "rest"]);
        assert_eq!(split_list("{ id: userId, name }, page"), vec!["id", "name", "page"]);
        assert!(split_list(" , ").is_empty());
    }
}
