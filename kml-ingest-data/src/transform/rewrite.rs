//! Resource path rewriting for free-text fields.

use thiserror::Error;

/// Errors raised while building a [`RewriteRule`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RewriteConfigError {
    /// The prefix was empty.
    #[error("rewrite prefix must not be empty")]
    EmptyPrefix,
    /// A table entry was empty.
    #[error("rewrite table entry {index} is empty")]
    EmptyEntry {
        /// Position of the empty entry.
        index: usize,
    },
}

/// Prefix every occurrence of known resource paths inside free text.
///
/// Entries are applied in table order and every occurrence of an entry is
/// replaced. When one entry is a substring of another the result depends on
/// the order given.
///
/// # Examples
/// ```
/// use kml_ingest_data::transform::RewriteRule;
///
/// let rule = RewriteRule::new("/ctx/styles/", ["images/a.png"])?;
/// assert_eq!(
///     rule.apply(r#"<img src="images/a.png">"#),
///     r#"<img src="/ctx/styles/images/a.png">"#
/// );
/// # Ok::<(), kml_ingest_data::transform::RewriteConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRule {
    prefix: String,
    entries: Vec<String>,
}

impl RewriteRule {
    /// Build a rule from a prefix and a path table.
    ///
    /// # Errors
    ///
    /// Returns [`RewriteConfigError`] when the prefix or any entry is empty.
    pub fn new<I, S>(prefix: impl Into<String>, entries: I) -> Result<Self, RewriteConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(RewriteConfigError::EmptyPrefix);
        }
        let entries: Vec<String> = entries.into_iter().map(Into::into).collect();
        if let Some(index) = entries.iter().position(String::is_empty) {
            return Err(RewriteConfigError::EmptyEntry { index });
        }
        Ok(Self { prefix, entries })
    }

    /// Build the rule hosts use for resources deployed beside a style.
    ///
    /// The prefix is `context_path/relative_path/`.
    ///
    /// # Errors
    ///
    /// Returns [`RewriteConfigError`] when any entry is empty.
    pub fn for_resources<I, S>(
        context_path: &str,
        relative_path: &str,
        entries: I,
    ) -> Result<Self, RewriteConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let context = context_path.trim_end_matches('/');
        let relative = relative_path.trim_matches('/');
        let prefix = if relative.is_empty() {
            format!("{context}/")
        } else {
            format!("{context}/{relative}/")
        };
        Self::new(prefix, entries)
    }

    /// Prefix prepended to every match.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Path table in application order.
    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Rewrite `text`.
    #[must_use]
    pub fn apply(&self, text: &str) -> String {
        self.entries.iter().fold(text.to_owned(), |current, entry| {
            if current.contains(entry.as_str()) {
                current.replace(entry.as_str(), &format!("{}{entry}", self.prefix))
            } else {
                current
            }
        })
    }
}
