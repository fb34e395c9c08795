//! Language identifier detection from file extensions
//!
//! Used when the host editor does not report a language id for a file.
//! Identifiers follow the lowercase form editors use (`python`, `csharp`, ...).

use crate::types::FileUri;

/// Detect a language identifier from a file extension
pub fn detect_language(extension: &str) -> Option<&'static str> {
    let lang = match extension.to_lowercase().as_str() {
        "py" | "pyi" => "python",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "cs" => "csharp",
        "go" => "go",
        "rs" => "rust",
        "js" | "mjs" | "cjs" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "rb" => "ruby",
        "php" => "php",
        "scala" => "scala",
        "cpp" | "cc" | "cxx" | "hpp" => "cpp",
        "c" | "h" => "c",

        // files editors open but no provider will ever claim
        "md" | "markdown" => "markdown",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "xml" => "xml",
        "txt" => "plaintext",

        _ => return None,
    };

    Some(lang)
}

/// Detect a language identifier for a file, `plaintext` when unknown
pub fn language_for_file(uri: &FileUri) -> &'static str {
    uri.extension()
        .as_deref()
        .and_then(detect_language)
        .unwrap_or("plaintext")
}
