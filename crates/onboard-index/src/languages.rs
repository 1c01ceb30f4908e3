//! Language detection and boundary-detector registry.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Source language of a file, as far as segmentation is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Java,
    C,
    Cpp,
    CSharp,
    Php,
    Kotlin,
    Swift,
    Scala,
    Ruby,
    PlainText,
}

/// How construct boundaries are found for a language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// Full tree-sitter syntax tree.
    Syntax,
    /// Declaration patterns plus brace matching.
    Heuristic,
    /// No detector; always windowed.
    Unsupported,
}

const ALL: [Lang; 15] = [
    Lang::Rust,
    Lang::Python,
    Lang::JavaScript,
    Lang::TypeScript,
    Lang::Go,
    Lang::Java,
    Lang::C,
    Lang::Cpp,
    Lang::CSharp,
    Lang::Php,
    Lang::Kotlin,
    Lang::Swift,
    Lang::Scala,
    Lang::Ruby,
    Lang::PlainText,
];

/// Extensions accepted as source code even though no detector exists for them.
const WINDOW_ONLY_EXTENSIONS: &[&str] = &["clj", "hs", "ml", "fs"];

impl Lang {
    /// Identifier used in store payloads, prompts and config.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Go => "go",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::CSharp => "csharp",
            Self::Php => "php",
            Self::Kotlin => "kotlin",
            Self::Swift => "swift",
            Self::Scala => "scala",
            Self::Ruby => "ruby",
            Self::PlainText => "plaintext",
        }
    }

    /// Parse a tag produced by [`Lang::id`].
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        ALL.into_iter().find(|lang| lang.id().eq_ignore_ascii_case(tag))
    }

    #[must_use]
    pub fn detection(self) -> Detection {
        match self {
            Self::Rust | Self::Python | Self::JavaScript | Self::TypeScript | Self::Go => {
                Detection::Syntax
            }
            Self::Java
            | Self::C
            | Self::Cpp
            | Self::CSharp
            | Self::Php
            | Self::Kotlin
            | Self::Swift
            | Self::Scala => Detection::Heuristic,
            Self::Ruby | Self::PlainText => Detection::Unsupported,
        }
    }

    /// Get the tree-sitter grammar. Returns `None` if the
    /// corresponding feature is not enabled or the language has none.
    #[must_use]
    pub fn grammar(self) -> Option<tree_sitter::Language> {
        match self {
            #[cfg(feature = "lang-rust")]
            Self::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            #[cfg(feature = "lang-python")]
            Self::Python => Some(tree_sitter_python::LANGUAGE.into()),
            #[cfg(feature = "lang-js")]
            Self::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            #[cfg(feature = "lang-js")]
            Self::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            #[cfg(feature = "lang-go")]
            Self::Go => Some(tree_sitter_go::LANGUAGE.into()),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Detect language from file extension. Unknown extensions are plain text.
#[must_use]
pub fn detect_language(path: &Path) -> Lang {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return Lang::PlainText;
    };
    match ext.to_ascii_lowercase().as_str() {
        "rs" => Lang::Rust,
        "py" | "pyi" => Lang::Python,
        "js" | "jsx" | "mjs" | "cjs" => Lang::JavaScript,
        "ts" | "tsx" | "mts" | "cts" => Lang::TypeScript,
        "go" => Lang::Go,
        "java" => Lang::Java,
        "c" | "h" => Lang::C,
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Lang::Cpp,
        "cs" => Lang::CSharp,
        "php" => Lang::Php,
        "kt" | "kts" => Lang::Kotlin,
        "swift" => Lang::Swift,
        "scala" | "sc" => Lang::Scala,
        "rb" => Lang::Ruby,
        _ => Lang::PlainText,
    }
}

/// Whether a path looks like source code worth ingesting.
#[must_use]
pub fn is_code_file(path: &Path) -> bool {
    if detect_language(path) != Lang::PlainText {
        return true;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| WINDOW_ONLY_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_language_rs() {
        assert_eq!(detect_language(Path::new("src/main.rs")), Lang::Rust);
    }

    #[test]
    fn detect_language_is_case_insensitive() {
        assert_eq!(detect_language(Path::new("Main.JAVA")), Lang::Java);
    }

    #[test]
    fn detect_language_ts_variants() {
        for ext in &["ts", "tsx", "mts", "cts"] {
            let path = format!("file.{ext}");
            assert_eq!(
                detect_language(Path::new(&path)),
                Lang::TypeScript,
                "failed for .{ext}"
            );
        }
    }

    #[test]
    fn detect_language_unknown_is_plain_text() {
        assert_eq!(detect_language(Path::new("file.xyz")), Lang::PlainText);
        assert_eq!(detect_language(Path::new("Makefile")), Lang::PlainText);
    }

    #[test]
    fn code_file_filter() {
        assert!(is_code_file(Path::new("a/b.py")));
        assert!(is_code_file(Path::new("lib/Main.hs")));
        assert!(is_code_file(Path::new("app.rb")));
        assert!(!is_code_file(Path::new("README.md")));
        assert!(!is_code_file(Path::new("logo.png")));
    }

    #[test]
    fn tags_round_trip() {
        for lang in ALL {
            assert_eq!(Lang::from_tag(lang.id()), Some(lang));
        }
        assert_eq!(Lang::from_tag("cobol"), None);
    }

    #[test]
    fn detection_strategy() {
        assert_eq!(Lang::Rust.detection(), Detection::Syntax);
        assert_eq!(Lang::Kotlin.detection(), Detection::Heuristic);
        assert_eq!(Lang::Ruby.detection(), Detection::Unsupported);
    }

    #[test]
    fn grammar_returns_some_for_enabled_features() {
        #[cfg(feature = "lang-rust")]
        assert!(Lang::Rust.grammar().is_some());
        #[cfg(feature = "lang-python")]
        assert!(Lang::Python.grammar().is_some());
        #[cfg(feature = "lang-js")]
        assert!(Lang::TypeScript.grammar().is_some());
        assert!(Lang::Java.grammar().is_none());
    }
}
