//! Citation extraction and verification against the supplied context.

use std::collections::HashSet;
use std::sync::LazyLock;

use onboard_index::SearchResult;
use regex::Regex;

static CITATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"`?(?P<path>[A-Za-z0-9_./\\-]*[A-Za-z0-9_-]\.[A-Za-z0-9]+):L?(?P<start>\d+)(?:\s*[-–]\s*L?(?P<end>\d+))?`?",
    )
    .expect("citation regex is valid")
});

static EMPTY_GROUP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[ \t]*(?:\[[\s,;]*\]|\([\s,;]*\))").expect("empty group regex is valid")
});

static OPEN_SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\[(])[\s,;]+").expect("open separator regex is valid"));

static CLOSE_SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s,;]+([\])])").expect("close separator regex is valid"));

static REPEATED_SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([,;])(?:\s*[,;])+").expect("separator regex is valid"));

/// Top-level domains that mark `name.tld:port` as a network address.
const HOST_SUFFIXES: &[&str] = &[
    "com", "org", "net", "io", "dev", "app", "local", "localhost", "internal", "cloud", "ai",
    "co", "us", "uk", "de", "edu", "gov", "svc", "cluster",
];

/// A `path:start-end` mention found in model output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Citation {
    pub path: String,
    pub start: usize,
    pub end: usize,
}

impl Citation {
    #[must_use]
    pub fn location(&self) -> String {
        if self.start == self.end {
            format!("{}:{}", self.path, self.start)
        } else {
            format!("{}:{}-{}", self.path, self.start, self.end)
        }
    }
}

/// A citation backed by a context chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCitation {
    /// Position of the backing chunk in the context.
    pub context_index: usize,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Verification {
    /// Model output with unverified citations removed.
    pub text: String,
    /// Distinct verified citations in order of first appearance.
    pub verified: Vec<VerifiedCitation>,
    /// Distinct unverified citations in order of first appearance.
    pub unverified: Vec<String>,
}

impl Verification {
    #[must_use]
    pub fn distinct_citations(&self) -> usize {
        self.verified.len() + self.unverified.len()
    }
}

fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    path.trim_start_matches("./").to_owned()
}

/// Whether `cited` names `actual`, either exactly or as a trailing path
/// component sequence (`app.py` for `src/app.py`).
fn same_file(cited: &str, actual: &str) -> bool {
    cited == actual
        || actual
            .strip_suffix(cited)
            .is_some_and(|prefix| prefix.ends_with('/'))
}

/// Whether the mention `raw` at `start` is a network address rather than a
/// file: it follows `scheme://` or `user@`, or it is a slash-free name ending
/// in a numeric label (an IP address) or a well-known domain suffix.
fn is_host_port(text: &str, start: usize, raw: &str) -> bool {
    let before = text[..start].trim_end_matches('`');
    if before.ends_with("://")
        || before.ends_with('@')
        || (before.ends_with(':') && raw.starts_with("//"))
    {
        return true;
    }
    let path = raw.trim_start_matches('/');
    if path.contains('/') {
        return false;
    }
    let suffix = path.rsplit('.').next().unwrap_or_default();
    suffix.bytes().all(|b| b.is_ascii_digit())
        || HOST_SUFFIXES.contains(&suffix.to_ascii_lowercase().as_str())
}

/// Remove bracket and separator debris left where citations were cut out.
fn tidy(text: &str) -> String {
    let text = REPEATED_SEPARATOR_RE.replace_all(text, "$1");
    let text = OPEN_SEPARATOR_RE.replace_all(&text, "$1");
    let text = CLOSE_SEPARATOR_RE.replace_all(&text, "$1");
    EMPTY_GROUP_RE.replace_all(&text, "").into_owned()
}

/// Find every citation in `text` and check it against `context`.
///
/// Any `name.ext:line` mention counts as a citation unless it names a
/// network address. A citation is verified when a context chunk from the
/// same file contains the whole cited range; every other citation is cut
/// from the text.
#[must_use]
pub fn verify(text: &str, context: &[SearchResult]) -> Verification {
    let mut verification = Verification::default();
    let mut seen: HashSet<Citation> = HashSet::new();
    let mut cleaned = String::with_capacity(text.len());
    let mut last = 0;

    for caps in CITATION_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let raw = &caps["path"];
        let path = normalize(raw);
        let names_context_file = context.iter().any(|r| same_file(&path, &r.chunk.file_path));
        if !names_context_file && is_host_port(text, whole.start(), raw) {
            continue;
        }
        let Ok(start) = caps["start"].parse::<usize>() else {
            continue;
        };
        let end = caps
            .name("end")
            .and_then(|m| m.as_str().parse::<usize>().ok())
            .unwrap_or(start);

        let citation = Citation { path, start, end };
        let backing = context.iter().position(|r| {
            same_file(&citation.path, &r.chunk.file_path) && r.chunk.contains_range(start, end)
        });

        match backing {
            Some(context_index) => {
                if seen.insert(citation) {
                    verification.verified.push(VerifiedCitation {
                        context_index,
                        start,
                        end,
                    });
                }
            }
            None => {
                cleaned.push_str(text[last..whole.start()].trim_end_matches(' '));
                last = whole.end();
                let location = citation.location();
                if seen.insert(citation) {
                    tracing::warn!(citation = %location, "stripping citation not backed by context");
                    verification.unverified.push(location);
                }
            }
        }
    }

    cleaned.push_str(&text[last..]);
    verification.text = if verification.unverified.is_empty() {
        cleaned
    } else {
        tidy(&cleaned)
    };
    verification
}
