//! Minimal PGN reading: header tags and a movetext tokenizer.
//!
//! Only what the decoder needs. Comments, NAGs, variations, move numbers and
//! result markers are stripped; what remains is the mainline as SAN tokens.

use indexmap::IndexMap;

const RESULT_TOKENS: [&str; 4] = ["1-0", "0-1", "1/2-1/2", "*"];

/// Header tags of one PGN game, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PgnTags(IndexMap<String, String>);

impl PgnTags {
    /// Tag value, skipping empty and `?` placeholders.
    pub fn get(&self, name: &str) -> Option<&str> {
        match self.0.get(name)?.trim() {
            "" | "?" => None,
            // "-" is a real value only for TimeControl (correspondence).
            "-" if name != "TimeControl" => None,
            v => Some(v),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Splits a PGN game into its tags and raw movetext.
pub fn parse_pgn(text: &str) -> (PgnTags, String) {
    let mut tags = IndexMap::new();
    let mut movetext = String::new();
    let mut in_headers = true;

    for line in text.lines() {
        let trimmed = line.trim();
        if in_headers {
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                if let Some((name, value)) = parse_tag(trimmed) {
                    tags.insert(name, value);
                }
                continue;
            }
            in_headers = false;
        }
        movetext.push_str(line);
        movetext.push('\n');
    }

    (PgnTags(tags), movetext)
}

fn parse_tag(line: &str) -> Option<(String, String)> {
    let inner = line.strip_prefix('[')?.strip_suffix(']')?.trim();
    let (name, rest) = inner.split_once(char::is_whitespace)?;
    let quoted = rest.trim().strip_prefix('"')?.strip_suffix('"')?;

    let mut value = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                value.push(next);
            }
        } else {
            value.push(c);
        }
    }
    Some((name.to_string(), value))
}

/// Mainline SAN tokens of a movetext section.
///
/// Accepts both full PGN movetext (`1. e4 {comment} e5 (1... c5) 2. Nf3 1-0`)
/// and bare space-separated SAN (`e4 e5 Nf3`).
pub fn tokenize_movetext(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut token = String::new();
    let mut depth = 0usize;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                flush(&mut token, &mut out);
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                }
            }
            ';' => {
                flush(&mut token, &mut out);
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '(' => {
                flush(&mut token, &mut out);
                depth += 1;
            }
            ')' => {
                flush(&mut token, &mut out);
                depth = depth.saturating_sub(1);
            }
            c if c.is_whitespace() => flush(&mut token, &mut out),
            c if depth == 0 => token.push(c),
            _ => {}
        }
    }
    flush(&mut token, &mut out);
    out
}

fn flush(token: &mut String, out: &mut Vec<String>) {
    if let Some(san) = clean_token(token) {
        out.push(san);
    }
    token.clear();
}

fn clean_token(raw: &str) -> Option<String> {
    if raw.is_empty() || RESULT_TOKENS.contains(&raw) || raw.starts_with('$') {
        return None;
    }
    // Zero-style castling would be eaten by the move-number strip below.
    if raw.starts_with("0-0") {
        return Some(raw.replace('0', "O"));
    }
    let san = raw
        .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.')
        .trim_end_matches(['!', '?']);
    (!san.is_empty()).then(|| san.to_string())
}
