use crate::error::{ChunkerError, Result};

/// Language as seen by the chunker's strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Java,
    C,
    Cpp,
    CSharp,
    Ruby,
    Swift,
    Kotlin,
    Markdown,
    Json,
    Yaml,
    Toml,
    Unknown,
}

impl Language {
    /// Resolve from the engine's language name (see the protocol table).
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "rust" => Language::Rust,
            "python" => Language::Python,
            "javascript" => Language::JavaScript,
            "typescript" => Language::TypeScript,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" => Language::C,
            "cpp" => Language::Cpp,
            "csharp" => Language::CSharp,
            "ruby" => Language::Ruby,
            "swift" => Language::Swift,
            "kotlin" => Language::Kotlin,
            "markdown" => Language::Markdown,
            "json" => Language::Json,
            "yaml" => Language::Yaml,
            "toml" => Language::Toml,
            _ => Language::Unknown,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Ruby => "ruby",
            Language::Swift => "swift",
            Language::Kotlin => "kotlin",
            Language::Markdown => "markdown",
            Language::Json => "json",
            Language::Yaml => "yaml",
            Language::Toml => "toml",
            Language::Unknown => "unknown",
        }
    }

    /// Languages with a bundled tree-sitter grammar.
    #[must_use]
    pub const fn supports_ast(self) -> bool {
        matches!(
            self,
            Language::Rust | Language::Python | Language::JavaScript | Language::TypeScript
        )
    }

    /// Languages whose block structure is `{ ... }` based, eligible for the
    /// bracket-balanced strategy.
    #[must_use]
    pub const fn uses_braces(self) -> bool {
        matches!(
            self,
            Language::Rust
                | Language::JavaScript
                | Language::TypeScript
                | Language::Go
                | Language::Java
                | Language::C
                | Language::Cpp
                | Language::CSharp
                | Language::Swift
                | Language::Kotlin
        )
    }

    /// Tree-sitter grammar for AST-supported languages.
    pub fn tree_sitter_language(self) -> Result<tree_sitter::Language> {
        match self {
            Language::Rust => Ok(tree_sitter_rust::LANGUAGE.into()),
            Language::Python => Ok(tree_sitter_python::LANGUAGE.into()),
            Language::JavaScript => Ok(tree_sitter_javascript::LANGUAGE.into()),
            Language::TypeScript => Ok(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            _ => Err(ChunkerError::unsupported_language(self.as_str())),
        }
    }

    /// Line-comment prefixes, used for comment-aware depth tracking and
    /// content normalization.
    #[must_use]
    pub fn line_comment_prefixes(self) -> &'static [&'static str] {
        match self {
            Language::Rust
            | Language::JavaScript
            | Language::TypeScript
            | Language::Go
            | Language::Java
            | Language::C
            | Language::Cpp
            | Language::CSharp
            | Language::Swift
            | Language::Kotlin => &["//"],
            Language::Python | Language::Ruby | Language::Yaml | Language::Toml => &["#"],
            Language::Markdown | Language::Json | Language::Unknown => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_name_round_trips() {
        for lang in [
            Language::Rust,
            Language::Python,
            Language::TypeScript,
            Language::Markdown,
        ] {
            assert_eq!(Language::from_name(lang.as_str()), lang);
        }
    }

    #[test]
    fn unknown_names_map_to_unknown() {
        assert_eq!(Language::from_name("cobol"), Language::Unknown);
    }

    #[test]
    fn ast_support_matches_bundled_grammars() {
        assert!(Language::Rust.supports_ast());
        assert!(Language::Rust.tree_sitter_language().is_ok());
        assert!(!Language::Go.supports_ast());
        assert!(Language::Go.tree_sitter_language().is_err());
    }

    #[test]
    fn brace_languages_include_c_family() {
        assert!(Language::C.uses_braces());
        assert!(Language::Kotlin.uses_braces());
        assert!(!Language::Python.uses_braces());
        assert!(!Language::Markdown.uses_braces());
    }
}
