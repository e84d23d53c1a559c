//! Tag shapes of the agent command protocol and the scanner that recognizes them.
//!
//! Accepted shapes (tag names are case-sensitive):
//!
//! ```text
//! <makef path="P"/>            self-closing, makef only
//! <makef path="P">…</makef>
//! <writf path="P">…</writf>
//! <exe>…</exe>
//! ```
//!
//! The `path` attribute is optional on every opener and may be empty; nothing else
//! is allowed inside an opener besides whitespace. A body runs to the first closing
//! tag of the same name, so bodies never nest.
//!
//! The scanner classifies each `<` as a complete match, a definite non-match, or
//! pending. Pending means the decision depends on text that has not arrived yet;
//! scanning stops there so a later chunk can complete it. Decisions only ever look
//! at text already present, which is what makes extraction independent of where
//! chunk boundaries fall.

/// Start of the `path` attribute on `makef`/`writf` openers.
const PATH_ATTR_PREFIX: &str = "path=\"";

/// One of the three command tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    MakeFile,
    WriteFile,
    Exec,
}

impl TagKind {
    pub const ALL: [TagKind; 3] = [Self::MakeFile, Self::WriteFile, Self::Exec];

    /// Literal tag name used on the wire.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::MakeFile => "makef",
            Self::WriteFile => "writf",
            Self::Exec => "exe",
        }
    }

    /// Returns the tag kind for an exact wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Only `makef` has a bodiless `<makef …/>` form.
    #[must_use]
    pub fn allows_self_closing(self) -> bool {
        matches!(self, Self::MakeFile)
    }

    fn closing_tag(self) -> &'static str {
        match self {
            Self::MakeFile => "</makef>",
            Self::WriteFile => "</writf>",
            Self::Exec => "</exe>",
        }
    }
}

/// A fully closed tag occurrence, borrowed from the scanned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TagMatch<'a> {
    pub kind: TagKind,
    /// Byte offset of the opening `<`.
    pub start: usize,
    /// Byte offset one past the final `>`.
    pub end: usize,
    pub path: Option<&'a str>,
    /// `None` for the self-closing form.
    pub body: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe<'a> {
    Match(TagMatch<'a>),
    NoMatch,
    Pending,
}

/// Scans `text` left to right and returns every complete occurrence in order.
///
/// With `at_eof == false` scanning stops at the first pending opener, because a later
/// chunk may still close it. With `at_eof == true` pending openers are treated as
/// literal text and scanning continues past them.
pub(crate) fn scan(text: &str, at_eof: bool) -> Vec<TagMatch<'_>> {
    let mut matches = Vec::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find('<') {
        let start = pos + offset;
        match probe_at(text, start) {
            Probe::Match(found) => {
                pos = found.end;
                matches.push(found);
            }
            Probe::Pending if !at_eof => break,
            Probe::Pending | Probe::NoMatch => pos = start + 1,
        }
    }

    matches
}

fn probe_at(text: &str, start: usize) -> Probe<'_> {
    let after_lt = &text[start + 1..];
    let Some(kind) = TagKind::ALL
        .into_iter()
        .find(|kind| after_lt.starts_with(kind.name()))
    else {
        let could_still_match = TagKind::ALL
            .into_iter()
            .any(|kind| kind.name().starts_with(after_lt));
        return if could_still_match {
            Probe::Pending
        } else {
            Probe::NoMatch
        };
    };

    let mut cursor = start + 1 + kind.name().len();
    let mut path = None;

    // A tag name must be followed by whitespace, `>` or `/`; `<exec>` is not `<exe>`.
    match text[cursor..].chars().next() {
        None => return Probe::Pending,
        Some(ch) if ch.is_whitespace() => {
            cursor = skip_whitespace(text, cursor);
            let rest = &text[cursor..];
            if rest.starts_with(PATH_ATTR_PREFIX) {
                let value_start = cursor + PATH_ATTR_PREFIX.len();
                let Some(value_len) = text[value_start..].find('"') else {
                    return Probe::Pending;
                };
                path = Some(&text[value_start..value_start + value_len]);
                cursor = skip_whitespace(text, value_start + value_len + 1);
            } else if rest.len() < PATH_ATTR_PREFIX.len() && PATH_ATTR_PREFIX.starts_with(rest) {
                return Probe::Pending;
            }
        }
        Some('>' | '/') => {}
        Some(_) => return Probe::NoMatch,
    }

    let rest = &text[cursor..];
    if rest.is_empty() {
        return Probe::Pending;
    }

    if rest.starts_with('/') {
        return match rest[1..].chars().next() {
            None => Probe::Pending,
            Some('>') if kind.allows_self_closing() => Probe::Match(TagMatch {
                kind,
                start,
                end: cursor + 2,
                path,
                body: None,
            }),
            Some(_) => Probe::NoMatch,
        };
    }

    if !rest.starts_with('>') {
        return Probe::NoMatch;
    }

    let body_start = cursor + 1;
    let closing = kind.closing_tag();
    match text[body_start..].find(closing) {
        None => Probe::Pending,
        Some(body_len) => Probe::Match(TagMatch {
            kind,
            start,
            end: body_start + body_len + closing.len(),
            path,
            body: Some(&text[body_start..body_start + body_len]),
        }),
    }
}

fn skip_whitespace(text: &str, from: usize) -> usize {
    text[from..]
        .char_indices()
        .find(|(_, ch)| !ch.is_whitespace())
        .map_or(text.len(), |(offset, _)| from + offset)
}
