use once_cell::sync::Lazy;
use std::collections::HashMap;

static EXTENSION_TABLE: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut table = HashMap::new();
    table.insert("rs", "rust");
    table.insert("py", "python");
    table.insert("pyw", "python");
    table.insert("js", "javascript");
    table.insert("mjs", "javascript");
    table.insert("cjs", "javascript");
    table.insert("jsx", "javascript");
    table.insert("ts", "typescript");
    table.insert("tsx", "typescript");
    table.insert("go", "go");
    table.insert("java", "java");
    table.insert("c", "c");
    table.insert("h", "c");
    table.insert("cpp", "cpp");
    table.insert("cc", "cpp");
    table.insert("cxx", "cpp");
    table.insert("hpp", "cpp");
    table.insert("cs", "csharp");
    table.insert("rb", "ruby");
    table.insert("swift", "swift");
    table.insert("kt", "kotlin");
    table.insert("kts", "kotlin");
    table.insert("md", "markdown");
    table.insert("markdown", "markdown");
    table.insert("json", "json");
    table.insert("yaml", "yaml");
    table.insert("yml", "yaml");
    table.insert("toml", "toml");
    table
});

/// Map a file extension (without the dot) to its language name.
#[must_use]
pub fn language_for_extension(ext: &str) -> Option<&'static str> {
    EXTENSION_TABLE.get(ext.to_lowercase().as_str()).copied()
}

/// The default extension → language whitelist used by traversal.
#[must_use]
pub fn default_supported_extensions() -> HashMap<String, String> {
    EXTENSION_TABLE
        .iter()
        .map(|(ext, lang)| ((*ext).to_string(), (*lang).to_string()))
        .collect()
}
