//! Inline `style` attribute model with per-property priority.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single inline declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleDecl {
    pub value: String,
    /// `true` when the declaration carries `!important`.
    pub important: bool,
}

/// Ordered inline declarations, as found in a `style` attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineStyle {
    decls: Vec<(String, StyleDecl)>,
}

impl InlineStyle {
    /// Parse a `style` attribute value. Malformed declarations are skipped.
    pub fn parse(css: &str) -> Self {
        let mut style = Self::default();

        for raw in css.split(';') {
            let Some((name, value)) = raw.split_once(':') else {
                continue;
            };
            let name = name.trim().to_ascii_lowercase();
            if name.is_empty() {
                continue;
            }

            let (value, important) = split_important(value.trim());
            if value.is_empty() {
                continue;
            }
            style.set(&name, value, important);
        }

        style
    }

    pub fn get(&self, name: &str) -> Option<&StyleDecl> {
        self.decls
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, decl)| decl)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).map(|decl| decl.value.as_str())
    }

    pub fn is_important(&self, name: &str) -> bool {
        self.get(name).is_some_and(|decl| decl.important)
    }

    /// Set a declaration, keeping its original slot if it already exists.
    pub fn set(&mut self, name: &str, value: &str, important: bool) {
        let decl = StyleDecl {
            value: value.to_string(),
            important,
        };

        match self.decls.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some((_, existing)) => *existing = decl,
            None => self.decls.push((name.to_ascii_lowercase(), decl)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<StyleDecl> {
        let pos = self.decls.iter().position(|(n, _)| n.eq_ignore_ascii_case(name))?;
        Some(self.decls.remove(pos).1)
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }
}

impl fmt::Display for InlineStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, decl)) in self.decls.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{name}: {}", decl.value)?;
            if decl.important {
                f.write_str(" !important")?;
            }
            f.write_str(";")?;
        }
        Ok(())
    }
}

fn split_important(value: &str) -> (&str, bool) {
    if let Some(bang) = value.rfind('!') {
        let flag = value[bang + 1..].trim();
        if flag.eq_ignore_ascii_case("important") {
            return (value[..bang].trim_end(), true);
        }
    }
    (value, false)
}
