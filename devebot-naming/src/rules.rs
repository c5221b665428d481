//! Declarative naming-convention rules.

use devebot_primitives::ModuleKind;
use regex::Regex;

/// Shape of a short code: lowercase, starts with a letter, no trailing dash.
const CODE: &str = "[a-z][a-z0-9-]*[a-z0-9]";

/// Shape of an npm-style scope.
const SCOPE: &str = "@[a-z0-9][a-z0-9._-]*";

/// Outcome of matching a name against the rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasMatch {
    /// A rule matched and captured `code`.
    Matched {
        /// Extracted short code.
        code: String,
        /// Position of the matching rule.
        rule: usize,
    },
    /// No rule matched.
    Unmatched,
}

/// One anchored pattern whose first capture group is the code.
#[derive(Debug, Clone)]
pub struct NamingRule {
    pattern: Regex,
}

impl NamingRule {
    /// Compiles a rule.
    ///
    /// # Errors
    ///
    /// Returns the regex error when `pattern` does not compile.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(|pattern| Self { pattern })
    }

    /// Returns the code captured from `name`, if the rule applies.
    #[must_use]
    pub fn extract(&self, name: &str) -> Option<String> {
        self.pattern
            .captures(name)
            .and_then(|caps| caps.get(1))
            .map(|code| code.as_str().to_owned())
    }

    /// Returns the source pattern.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }
}

/// Ordered rules for one module kind; most specific first, generic last.
#[derive(Debug, Clone)]
pub struct NamingRules {
    rules: Vec<NamingRule>,
}

impl NamingRules {
    /// Builds the rules from explicit patterns, keeping their order.
    ///
    /// # Errors
    ///
    /// Returns the first regex compilation error.
    pub fn from_patterns<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = patterns
            .into_iter()
            .map(|p| NamingRule::new(p.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(Self { rules })
    }

    /// Builds the conventional rules of `namespace` for `kind`.
    ///
    /// Plugins are recognized as `{namespace}-plugin-{code}` and the older
    /// `{namespace}-dp-{code}`, bridges as `{namespace}-bridge-{code}` and
    /// `{namespace}-co-{code}`, each optionally scoped; any plain lowercase
    /// name is accepted last and becomes its own code.
    ///
    /// # Errors
    ///
    /// Returns the regex error when the namespace yields an invalid pattern.
    pub fn conventional(namespace: &str, kind: ModuleKind) -> Result<Self, regex::Error> {
        let namespace = regex::escape(namespace);
        let mut patterns = Vec::new();
        for prefix in prefixes_of(kind) {
            patterns.push(format!("^{SCOPE}/{namespace}-{prefix}-({CODE})$"));
            patterns.push(format!("^{namespace}-{prefix}-({CODE})$"));
        }
        patterns.push(format!("^{SCOPE}/({CODE})$"));
        patterns.push(format!("^({CODE})$"));
        Self::from_patterns(patterns)
    }

    /// Tries the rules in order and reports the first match.
    #[must_use]
    pub fn extract(&self, name: &str) -> AliasMatch {
        self.rules
            .iter()
            .enumerate()
            .find_map(|(rule, r)| r.extract(name).map(|code| AliasMatch::Matched { code, rule }))
            .unwrap_or(AliasMatch::Unmatched)
    }

    /// Returns the number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` when there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn prefixes_of(kind: ModuleKind) -> &'static [&'static str] {
    match kind {
        ModuleKind::Bridge => &["bridge", "co"],
        ModuleKind::Plugin | ModuleKind::Framework => &["plugin", "dp"],
        ModuleKind::Application => &[],
    }
}
