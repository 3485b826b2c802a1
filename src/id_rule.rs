//! Daughter ID directives.
//!
//! A logical volume declares how the items of a daughter are identified with
//! a directive stored under `mapping.daughter_id.<label>`. Two forms exist:
//!
//! - a bare category name, e.g. `detector`: the item index vector fills the
//!   category's remaining addresses positionally;
//! - a bracketed rule list, e.g. `[module:side=0, column+1, row-9]`: each
//!   rule names the next remaining address of the category and sets it to a
//!   constant (`=N`), to `N` plus the item index (`+N`) or to `N` minus the
//!   item index (`-N`). `[module]` sets no address at all.

use std::fmt;
use std::str::FromStr;

use itertools::Itertools;

use crate::error::{GeomError, Result};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_category() {
        let info: IdInfo = "  detector ".parse().unwrap();
        assert_eq!(info.category(), "detector");
        assert!(info.rules().is_none());
        assert_eq!(info.to_string(), "detector");
    }

    #[test]
    fn bracketed_rules() {
        let info: IdInfo = "[module: side=1, column+2 ,row-9]".parse().unwrap();
        assert_eq!(info.category(), "module");
        let rules = info.rules().unwrap();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0], AddressRule::new("side", RuleOp::Set, 1));
        assert_eq!(rules[1].apply(Some(4)).unwrap(), 6);
        assert_eq!(rules[2].apply(Some(4)).unwrap(), 5);
        assert_eq!(info.to_string(), "[module:side=1,column+2,row-9]");

        let empty: IdInfo = "[module]".parse().unwrap();
        assert_eq!(empty.rules().map(<[AddressRule]>::len), Some(0));
    }

    #[test]
    fn rule_application_errors() {
        let minus = AddressRule::new("row", RuleOp::Sub, 2);
        assert!(minus.apply(Some(3)).is_err());
        assert!(minus.apply(None).is_err());
        assert_eq!(AddressRule::new("row", RuleOp::Set, 2).apply(None).unwrap(), 2);
    }

    #[test]
    fn malformed_directives() {
        for bad in [
            "",
            "[]",
            "[module",
            "[:side=0]",
            "[a:b:c]",
            "[module:side]",
            "[module:=1]",
            "[module:side=x]",
            "[module:side=1,]",
            "two words",
        ] {
            assert!(bad.parse::<IdInfo>().is_err(), "accepted '{}'", bad);
        }
    }
}

/// How an address rule combines its constant with the item index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOp {
    Set,
    Add,
    Sub,
}

impl RuleOp {
    fn symbol(self) -> char {
        match self {
            RuleOp::Set => '=',
            RuleOp::Add => '+',
            RuleOp::Sub => '-',
        }
    }
}

/// One `label<op>N` rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRule {
    label: String,
    op: RuleOp,
    value: u32,
}

impl AddressRule {
    pub fn new(label: impl Into<String>, op: RuleOp, value: u32) -> Self {
        Self {
            label: label.into(),
            op,
            value,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn op(&self) -> RuleOp {
        self.op
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    /// Address produced for an item whose index at this rule's position is
    /// `index`.
    pub fn apply(&self, index: Option<u32>) -> Result<u32> {
        let needs_index = || {
            index.ok_or_else(|| {
                GeomError::syntax(self.to_string(), "no item index for this address rule")
            })
        };
        match self.op {
            RuleOp::Set => Ok(self.value),
            RuleOp::Add => self.value.checked_add(needs_index()?).ok_or_else(|| {
                GeomError::syntax(self.to_string(), "address overflow")
            }),
            RuleOp::Sub => self.value.checked_sub(needs_index()?).ok_or_else(|| {
                GeomError::syntax(self.to_string(), "negative address")
            }),
        }
    }
}

impl fmt::Display for AddressRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.label, self.op.symbol(), self.value)
    }
}

impl FromStr for AddressRule {
    type Err = GeomError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let pos = s
            .find(['=', '+', '-'])
            .ok_or_else(|| GeomError::syntax(s, "expected 'label=N', 'label+N' or 'label-N'"))?;
        let op = match &s[pos..pos + 1] {
            "=" => RuleOp::Set,
            "+" => RuleOp::Add,
            _ => RuleOp::Sub,
        };
        let label = s[..pos].trim();
        if label.is_empty() {
            return Err(GeomError::syntax(s, "missing address label"));
        }
        let value_token = s[pos + 1..].trim();
        let value = value_token
            .parse::<u32>()
            .map_err(|_| GeomError::syntax(s, format!("invalid address value '{}'", value_token)))?;
        Ok(Self::new(label, op, value))
    }
}

/// A parsed daughter ID directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdInfo {
    category: String,
    rules: Option<Vec<AddressRule>>,
}

impl IdInfo {
    /// A bare directive: addresses come from the item index vector.
    pub fn positional(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            rules: None,
        }
    }

    pub fn with_rules(category: impl Into<String>, rules: Vec<AddressRule>) -> Self {
        Self {
            category: category.into(),
            rules: Some(rules),
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// The explicit rules, or `None` for a bare directive.
    pub fn rules(&self) -> Option<&[AddressRule]> {
        self.rules.as_deref()
    }
}

impl fmt::Display for IdInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.rules {
            None => write!(f, "{}", self.category),
            Some(rules) if rules.is_empty() => write!(f, "[{}]", self.category),
            Some(rules) => write!(f, "[{}:{}]", self.category, rules.iter().join(",")),
        }
    }
}

impl FromStr for IdInfo {
    type Err = GeomError;

    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim();
        let Some(core) = text.strip_prefix('[') else {
            if text.is_empty() || text.contains(|c: char| c.is_whitespace() || "[]:=,".contains(c))
            {
                return Err(GeomError::syntax(s, "invalid category name"));
            }
            return Ok(Self::positional(text));
        };
        let core = core
            .strip_suffix(']')
            .ok_or_else(|| GeomError::syntax(s, "missing closing ']'"))?;

        let mut parts = core.split(':');
        let category = parts.next().unwrap_or_default().trim();
        if category.is_empty() {
            return Err(GeomError::syntax(s, "missing category"));
        }
        let rules_token = parts.next().map(str::trim).unwrap_or_default();
        if parts.next().is_some() {
            return Err(GeomError::syntax(s, "too many ':' separators"));
        }

        let rules = if rules_token.is_empty() {
            Vec::new()
        } else {
            rules_token
                .split(',')
                .map(str::parse::<AddressRule>)
                .collect::<Result<Vec<_>>>()
                .map_err(|e| match e {
                    GeomError::Syntax { reason, .. } => GeomError::syntax(s, reason),
                    other => other,
                })?
        };
        Ok(Self::with_rules(category, rules))
    }
}
