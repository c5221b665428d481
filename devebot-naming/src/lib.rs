//! Name resolution for plugins and bridges.
//!
//! Modules are published under long distribution names such as
//! `@acme/devebot-plugin-mailer`, while configuration trees and wiring refer to
//! them by short codes (`mailer`). [`NameResolver`] derives the codes once and
//! translates in both directions.

#![warn(missing_docs, clippy::pedantic)]

mod resolver;
mod rules;

pub use resolver::{AliasTable, NameResolver, NamingError, extract_alias_names};
pub use rules::{AliasMatch, NamingRule, NamingRules};
