//! Pass arguments (§4.4): the scalar kinds a pass declares and binds
//! per-invocation, mirroring `original_source/scatha/include/scatha/IR/
//! Pass.h`'s `PassFlagArgument`/`PassNumericArgument`/`PassStringArgument`
//! and `PassArgumentMap`. `PassEnumArgument<E>` has no generic counterpart
//! here — see DESIGN.md for why; a pass that wants an enum argument just
//! declares a `String` and parses it itself.

use hashbrown::HashMap;

/// A bound argument value. Declaring a `Flag` and binding it with a numeric
/// literal (or vice versa) is a [`ArgumentMatchResult::BadValue`], not a
/// panic — arguments come from hand-written pipeline text.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Flag(bool),
    Numeric(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgKind {
    Flag,
    Numeric,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentMatchResult {
    Success,
    UnknownArgument,
    BadValue,
}

/// The set of arguments one pass accepts, plus whatever has been bound to
/// them by a pipeline invocation. Cloning a `PassArgumentMap` is how a pass
/// gets re-parameterized for a second spot in the same pipeline (§4.4).
#[derive(Debug, Clone, Default)]
pub struct PassArgumentMap {
    declared: HashMap<String, ArgKind>,
    bound: HashMap<String, ArgValue>,
}

impl PassArgumentMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_flag(mut self, name: impl Into<String>) -> Self {
        self.declared.insert(name.into(), ArgKind::Flag);
        self
    }

    pub fn declare_numeric(mut self, name: impl Into<String>) -> Self {
        self.declared.insert(name.into(), ArgKind::Numeric);
        self
    }

    pub fn declare_string(mut self, name: impl Into<String>) -> Self {
        self.declared.insert(name.into(), ArgKind::String);
        self
    }

    /// A copy with the same declared argument kinds but none of the bound
    /// values — what a pipeline parse starts from when it pulls a pass
    /// prototype out of the registry.
    pub fn cleared(&self) -> Self {
        Self { declared: self.declared.clone(), bound: HashMap::new() }
    }

    /// Bind `value` (raw pipeline text, §4.4) against whatever kind `key`
    /// was declared as. A bare flag (no `:value` in the pipeline grammar)
    /// is bound by the parser as `"YES"`.
    pub fn match_argument(&mut self, key: &str, value: &str) -> ArgumentMatchResult {
        let Some(kind) = self.declared.get(key).copied() else {
            return ArgumentMatchResult::UnknownArgument;
        };
        let parsed = match kind {
            ArgKind::Flag => match value {
                "YES" | "true" | "1" => ArgValue::Flag(true),
                "NO" | "false" | "0" => ArgValue::Flag(false),
                _ => return ArgumentMatchResult::BadValue,
            },
            ArgKind::Numeric => match value.parse::<f64>() {
                Ok(n) => ArgValue::Numeric(n),
                Err(_) => return ArgumentMatchResult::BadValue,
            },
            ArgKind::String => ArgValue::String(value.to_string()),
        };
        self.bound.insert(key.to_string(), parsed);
        ArgumentMatchResult::Success
    }

    pub fn flag(&self, key: &str) -> bool {
        matches!(self.bound.get(key), Some(ArgValue::Flag(v)) if *v)
    }

    pub fn numeric(&self, key: &str) -> Option<f64> {
        match self.bound.get(key) {
            Some(ArgValue::Numeric(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn string(&self, key: &str) -> Option<&str> {
        match self.bound.get(key) {
            Some(ArgValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_declared_arguments_by_kind() {
        let mut args = PassArgumentMap::new().declare_flag("aggressive").declare_numeric("threshold");
        assert_eq!(args.match_argument("aggressive", "YES"), ArgumentMatchResult::Success);
        assert_eq!(args.match_argument("threshold", "3.5"), ArgumentMatchResult::Success);
        assert!(args.flag("aggressive"));
        assert_eq!(args.numeric("threshold"), Some(3.5));
    }

    #[test]
    fn rejects_unknown_and_malformed_arguments() {
        let mut args = PassArgumentMap::new().declare_numeric("threshold");
        assert_eq!(args.match_argument("nope", "1"), ArgumentMatchResult::UnknownArgument);
        assert_eq!(args.match_argument("threshold", "not-a-number"), ArgumentMatchResult::BadValue);
    }
}
