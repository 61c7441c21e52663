//! Splitting BibTeX value strings into lists of names, and names into
//! their components (first, von, last, jr).

use std::ops::Range;

use crate::errors::{Diagnostic, ErrorClass};
use crate::post::collapse_whitespace;
use crate::Context;

/// A list of substrings sliced out of one owned buffer. Items are byte
/// ranges into the buffer; an absent item marks an empty element (for
/// example, two adjacent delimiters in the input).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StringList {
    buf: String,
    items: Vec<Option<Range<usize>>>,
}

impl StringList {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The item at `index`, or `None` if the item is empty or the index
    /// out of range.
    pub fn get(&self, index: usize) -> Option<&str> {
        let range = self.items.get(index)?.clone()?;
        Some(&self.buf[range])
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&str>> + '_ {
        self.items
            .iter()
            .map(|item| item.clone().map(|range| &self.buf[range]))
    }
}

/// One personal name, split into the four BibTeX components. Components
/// are ranges over the name's token list; a token inside a component can
/// itself be empty (from consecutive commas in the input).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Name {
    tokens: StringList,
    first: Range<usize>,
    von: Range<usize>,
    last: Range<usize>,
    jr: Range<usize>,
}

impl Name {
    pub fn tokens(&self) -> &StringList {
        &self.tokens
    }

    pub fn first(&self) -> Vec<&str> {
        self.part(&self.first)
    }

    pub fn von(&self) -> Vec<&str> {
        self.part(&self.von)
    }

    pub fn last(&self) -> Vec<&str> {
        self.part(&self.last)
    }

    pub fn jr(&self) -> Vec<&str> {
        self.part(&self.jr)
    }

    fn part(&self, range: &Range<usize>) -> Vec<&str> {
        range
            .clone()
            .map(|i| self.tokens.get(i).unwrap_or(""))
            .collect()
    }

    fn empty(tokens: StringList) -> Name {
        Name {
            tokens,
            first: 0..0,
            von: 0..0,
            last: 0..0,
            jr: 0..0,
        }
    }
}

fn update_depth(byte: u8, depth: &mut i32) {
    match byte {
        b'{' => *depth += 1,
        b'}' => *depth -= 1,
        _ => {}
    }
}

fn name_warning(
    ctx: &mut Context,
    source: Option<&str>,
    line: Option<u32>,
    message: String,
) {
    ctx.report(Diagnostic::new(
        ErrorClass::Content,
        message,
        source,
        line,
        None,
    ));
}

/// Split a string on a fixed word delimiter, the BibTeX way:
/// the delimiter is matched case-insensitively, must be surrounded by
/// whitespace, and is ignored at non-zero brace depth or at either end of
/// the string. Whitespace in `text` is collapsed first. `delim` must be
/// lowercase and free of whitespace (`"and"` for name lists).
///
/// An element between two adjacent delimiters comes back as an absent
/// item, with a content diagnostic naming it by `description` and its
/// 1-based position.
pub fn split_list(
    ctx: &mut Context,
    text: &str,
    delim: &str,
    source: Option<&str>,
    line: Option<u32>,
    description: &str,
) -> StringList {
    let buf = collapse_whitespace(text);
    let bytes = buf.as_bytes();
    let d = delim.as_bytes();
    let maxoffs = bytes.len() as isize - d.len() as isize + 1;

    let mut starts: Vec<usize> = vec![0];
    let mut stops: Vec<usize> = Vec::new();
    let mut depth = 0i32;
    let mut i = 0isize;
    let mut j = 0usize;
    // Treat the start of the string as mid-word so a leading delimiter
    // does not split.
    let mut inword = true;

    while i < maxoffs {
        let c = bytes[i as usize];
        if depth == 0 && !inword && j < d.len() && c.to_ascii_lowercase() == d[j] {
            j += 1;
            i += 1;
            // A whole delimiter only counts if a space follows; at end of
            // string it is part of the last element instead.
            if j == d.len() && (i as usize) < bytes.len() && bytes[i as usize] == b' ' {
                stops.push((i - d.len() as isize - 1) as usize);
                i += 1;
                starts.push(i as usize);
                j = 0;
            }
        } else {
            update_depth(c, &mut depth);
            inword = c != b' ';
            i += 1;
            j = 0;
        }
    }
    stops.push(bytes.len());

    let mut items = Vec::with_capacity(starts.len());
    for (k, (&start, &stop)) in starts.iter().zip(stops.iter()).enumerate() {
        if stop > start {
            items.push(Some(start..stop));
        } else {
            // stop < start is an empty element between two delimiters;
            // stop == start only happens for empty input.
            if stop < start {
                name_warning(
                    ctx,
                    source,
                    line,
                    format!("{} {} is empty", description, k + 1),
                );
            }
            items.push(None);
        }
    }
    StringList { buf, items }
}

/// Split one name into its components.
///
/// Names with no depth-zero comma follow the simple rules: the first
/// contiguous run of lowercase tokens is the von part, everything before
/// it the first name, everything after it the last name. Names with one
/// comma are `von Last, First`; with two, `von Last, Jr, First`. Excess
/// or trailing commas are dropped with a content diagnostic. `name_index`
/// is the 0-based position of the name within its list, used in
/// diagnostics (printed 1-based).
pub fn split_name(
    ctx: &mut Context,
    text: &str,
    source: Option<&str>,
    line: Option<u32>,
    name_index: usize,
) -> Name {
    let mut buf = collapse_whitespace(text).into_bytes();
    let num_commas = find_commas(ctx, &mut buf, 2, source, line, name_index);
    let (tokens, comma_token) = find_tokens(buf);

    if tokens.buf.is_empty() {
        return Name::empty(tokens);
    }

    let (first_lc, last_lc) = find_lc_tokens(&tokens);
    let name = if num_commas == 0 {
        split_simple_name(ctx, tokens, first_lc, last_lc, source, line, name_index)
    } else {
        split_general_name(
            ctx,
            tokens,
            num_commas,
            &comma_token,
            first_lc,
            last_lc,
            source,
            line,
            name_index,
        )
    };
    flag_empty_tokens(ctx, &name, source, line, name_index);
    name
}

/// An empty token (from consecutive commas) that ends up inside one of the
/// four components gets a content diagnostic.
fn flag_empty_tokens(
    ctx: &mut Context,
    name: &Name,
    source: Option<&str>,
    line: Option<u32>,
    name_index: usize,
) {
    let ranges = [&name.first, &name.von, &name.last, &name.jr];
    for i in 0..name.tokens.len() {
        let used = ranges.iter().any(|r| r.contains(&i));
        if used && name.tokens.items[i].is_none() {
            name_warning(
                ctx,
                source,
                line,
                format!("name {}: empty token in name", name_index + 1),
            );
        }
    }
}

/// Count depth-zero commas, removing whitespace around them in place.
/// Commas beyond `max_commas` are blanked out with a warning, and
/// trailing commas are stripped with a warning. Returns the number of
/// commas kept.
fn find_commas(
    ctx: &mut Context,
    buf: &mut Vec<u8>,
    max_commas: usize,
    source: Option<&str>,
    line: Option<u32>,
    name_index: usize,
) -> usize {
    let mut depth = 0i32;
    let mut num_commas = 0usize;
    let mut warned = false;

    for i in 0..buf.len() {
        if depth == 0 && buf[i] == b',' {
            num_commas += 1;
            if num_commas > max_commas {
                if !warned {
                    name_warning(
                        ctx,
                        source,
                        line,
                        format!(
                            "name {}: too many commas in name (removing extras)",
                            name_index + 1
                        ),
                    );
                    warned = true;
                }
                buf[i] = b' ';
            }
        }
        update_depth(buf[i], &mut depth);
    }

    if warned {
        let collapsed = collapse_whitespace(&String::from_utf8_lossy(buf));
        *buf = collapsed.into_bytes();
    }
    if num_commas == 0 {
        return 0;
    }

    // Compact the buffer, squeezing out the spaces around each comma.
    num_commas = 0;
    depth = 0;
    let len = buf.len();
    let mut i = 0usize;
    let mut j = 0usize;
    while i < len {
        let at_comma = depth == 0 && buf[i] == b',';
        if at_comma {
            while j > 0 && buf[j - 1] == b' ' {
                j -= 1;
            }
            num_commas += 1;
        }
        update_depth(buf[i], &mut depth);
        if i != j {
            buf[j] = buf[i];
        }
        i += 1;
        j += 1;
        if at_comma {
            while i < len && buf[i] == b' ' {
                i += 1;
            }
        }
    }
    buf.truncate(j);

    if buf.last() == Some(&b',') {
        name_warning(
            ctx,
            source,
            line,
            format!("name {}: comma(s) at end of name (removing)", name_index + 1),
        );
        while buf.last() == Some(&b',') {
            buf.pop();
            num_commas -= 1;
        }
    }
    num_commas
}

/// Tokenize on depth-zero spaces and commas. Consecutive separators
/// produce absent (empty) tokens. Also records, for each comma, the index
/// of the token immediately preceding it.
fn find_tokens(buf: Vec<u8>) -> (StringList, Vec<usize>) {
    let len = buf.len();
    let mut items: Vec<Option<Range<usize>>> = Vec::new();
    let mut comma_token: Vec<usize> = Vec::new();
    let mut in_boundary = true;
    let mut depth = 0i32;

    for i in 0..len {
        let b = buf[i];
        if depth == 0 && in_boundary {
            items.push(Some(i..len));
        }
        if depth == 0 && (b == b' ' || b == b',') {
            if b == b',' {
                comma_token.push(items.len() - 1);
            }
            let last = items.len() - 1;
            if in_boundary {
                items[last] = None;
            } else if let Some(range) = &mut items[last] {
                range.end = i;
            }
            in_boundary = true;
        } else {
            in_boundary = false;
        }
        update_depth(b, &mut depth);
    }

    let buf = String::from_utf8_lossy(&buf).into_owned();
    (StringList { buf, items }, comma_token)
}

/// First contiguous run of lowercase tokens, as `(first, last)` token
/// indices, or `(-1, -1)` if there is none. A token is lowercase when its
/// first byte is an ASCII lowercase letter; an empty token or one opening
/// with a brace counts as capitalized.
fn find_lc_tokens(tokens: &StringList) -> (isize, isize) {
    let is_lc = |i: usize| {
        tokens
            .get(i)
            .and_then(|t| t.bytes().next())
            .map(|b| b.is_ascii_lowercase())
            .unwrap_or(false)
    };
    for i in 0..tokens.len() {
        if is_lc(i) {
            let mut j = i;
            while j + 1 < tokens.len() && is_lc(j + 1) {
                j += 1;
            }
            return (i as isize, j as isize);
        }
    }
    (-1, -1)
}

/// Inclusive token range `[start, stop]` as a half-open `Range`, empty
/// when `stop < start`.
fn token_range(start: isize, stop: isize) -> Range<usize> {
    if stop < start {
        0..0
    } else {
        start as usize..(stop + 1) as usize
    }
}

fn split_simple_name(
    ctx: &mut Context,
    tokens: StringList,
    first_lc: isize,
    mut last_lc: isize,
    source: Option<&str>,
    line: Option<u32>,
    name_index: usize,
) -> Name {
    let end = tokens.len() as isize - 1;
    let (first, von, last);

    if first_lc > -1 {
        first = token_range(0, first_lc - 1);
        if last_lc == end {
            // Lowercase tokens run to the end of the name; pull the last
            // one back out so there is still a lastname.
            last_lc -= 1;
            name_warning(
                ctx,
                source,
                line,
                format!(
                    "name {}: no capitalized token at end of name; using \"{}\" as lastname",
                    name_index + 1,
                    tokens.get(end as usize).unwrap_or("")
                ),
            );
        }
        von = token_range(first_lc, last_lc);
        last = token_range(last_lc + 1, end);
    } else {
        von = 0..0;
        first = token_range(0, end - 1);
        last = token_range(end, end);
    }

    Name {
        tokens,
        first,
        von,
        last,
        jr: 0..0,
    }
}

#[allow(clippy::too_many_arguments)]
fn split_general_name(
    ctx: &mut Context,
    tokens: StringList,
    num_commas: usize,
    comma_token: &[usize],
    first_lc: isize,
    mut last_lc: isize,
    source: Option<&str>,
    line: Option<u32>,
    name_index: usize,
) -> Name {
    let end = tokens.len() as isize - 1;
    let von;

    if first_lc == 0 {
        if last_lc == comma_token[0] as isize {
            name_warning(
                ctx,
                source,
                line,
                format!(
                    "name {}: no capitalized tokens before first comma",
                    name_index + 1
                ),
            );
            last_lc -= 1;
        }
        von = token_range(first_lc, last_lc);
    } else {
        von = 0..0;
        last_lc = -1;
    }

    let last = token_range(last_lc + 1, comma_token[0] as isize);
    let (first, jr);
    if num_commas == 1 {
        first = token_range(comma_token[0] as isize + 1, end);
        jr = 0..0;
    } else {
        jr = token_range(comma_token[0] as isize + 1, comma_token[1] as isize);
        first = token_range(comma_token[1] as isize + 1, end);
    }

    Name {
        tokens,
        first,
        von,
        last,
        jr,
    }
}
