//! Command-string parsing: prefix match, name and argument extraction

/// A successfully parsed command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed {
    /// The prefix that matched.
    pub prefix: String,
    /// The candidate command name (first token after the prefix).
    pub alias: String,
    /// Remaining whitespace-separated tokens.
    pub args: Vec<String>,
}

/// Try each candidate prefix against the message text; on the first match,
/// strip it, trim, and split the remainder on whitespace runs.
///
/// Returns `None` when no prefix matches or nothing follows the prefix.
pub fn parse_with(content: &str, prefixes: &[String]) -> Option<Parsed> {
    let prefix = prefixes
        .iter()
        .find(|prefix| !prefix.is_empty() && content.starts_with(prefix.as_str()))?;
    let rest = content[prefix.len()..].trim();
    let mut tokens = rest.split_whitespace();
    let alias = tokens.next()?.to_string();
    let args = tokens.map(str::to_string).collect();
    Some(Parsed {
        prefix: prefix.clone(),
        alias,
        args,
    })
}
