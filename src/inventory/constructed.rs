//! Constructed groups and variables
//!
//! Creates groups and host variables from expressions evaluated against the
//! variables a host already carries, in the manner of the host framework's
//! `constructed` feature.
//!
//! # Features
//!
//! - **Composed groups**: add a host to a group when a conditional is truthy
//! - **Keyed groups**: derive group names from the value of an expression
//! - **Compose**: set host variables from expressions
//! - **Strict mode**: fail on expression errors instead of skipping the rule
//!
//! # Configuration
//!
//! ```yaml
//! strict: false
//! groups:
//!   ssh_hosts: ssh_enabled
//!   mint: "'Mint' in os"
//! keyed_groups:
//!   - key: groups | map(attribute='name')
//!     prefix: netbird
//!   - key: os
//!     default_value: unknown
//! compose:
//!   ansible_host: ip
//! ```
//!
//! # Expression Syntax
//!
//! Expressions are Jinja2 expressions evaluated with minijinja. Undefined
//! variables are errors, so `is defined` and `default(...)` should be used for
//! optional variables. `regex_replace(pattern, replacement)` is available in
//! addition to the builtin filters.

use indexmap::IndexMap;
use minijinja::{Environment, ErrorKind, UndefinedBehavior};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::{HostVars, InventoryError, InventoryResult, InventoryTarget};

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while evaluating a constructed rule
#[derive(Debug, Error)]
pub enum ConstructedError {
    #[error("expression error: {0}")]
    ExpressionError(String),

    #[error("invalid rule: {0}")]
    ConfigError(String),

    #[error("undefined value: {0}")]
    VariableNotFound(String),

    #[error("type error: {0}")]
    TypeError(String),
}

impl From<minijinja::Error> for ConstructedError {
    fn from(err: minijinja::Error) -> Self {
        match err.kind() {
            ErrorKind::UndefinedError => ConstructedError::VariableNotFound(err.to_string()),
            _ => ConstructedError::ExpressionError(err.to_string()),
        }
    }
}

// ============================================================================
// Keyed Groups
// ============================================================================

fn default_separator() -> String {
    "_".to_string()
}

fn default_leading_separator() -> bool {
    true
}

/// A keyed group rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyedGroup {
    /// Expression whose value names the group(s)
    pub key: String,

    /// Prefix for generated group names
    #[serde(default)]
    pub prefix: String,

    /// Separator between prefix and value
    #[serde(default = "default_separator")]
    pub separator: String,

    /// Group the generated groups become children of
    #[serde(default)]
    pub parent_group: Option<String>,

    /// Value used when the key is undefined, null or empty
    #[serde(default)]
    pub default_value: Option<String>,

    /// Whether a mapping entry with an empty value keeps its separator
    #[serde(default)]
    pub trailing_separator: Option<bool>,
}

impl KeyedGroup {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            prefix: String::new(),
            separator: default_separator(),
            parent_group: None,
            default_value: None,
            trailing_separator: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_group = Some(parent.into());
        self
    }

    pub fn with_default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_trailing_separator(mut self, trailing: bool) -> Self {
        self.trailing_separator = Some(trailing);
        self
    }

    /// Check the rule for contradictory settings
    pub fn validate(&self) -> Result<(), ConstructedError> {
        if self.key.trim().is_empty() {
            return Err(ConstructedError::ConfigError(
                "keyed group key must not be empty".to_string(),
            ));
        }
        if self.default_value.is_some() && self.trailing_separator.is_some() {
            return Err(ConstructedError::ConfigError(format!(
                "keyed group '{}': default_value and trailing_separator are mutually exclusive",
                self.key
            )));
        }
        Ok(())
    }

    /// Whether an evaluated key yields any group
    fn produces_groups(&self, value: &Value) -> bool {
        is_truthy(value) || (is_empty_key(value) && self.default_value.is_some())
    }

    fn bare_names(&self, value: &Value) -> Result<Vec<String>, ConstructedError> {
        if let (Some(default), true) = (&self.default_value, is_empty_key(value)) {
            return Ok(vec![default.clone()]);
        }

        let substitute = |name: String| match (&self.default_value, name.is_empty()) {
            (Some(default), true) => default.clone(),
            _ => name,
        };

        match value {
            Value::String(s) => Ok(vec![substitute(s.clone())]),
            Value::Number(_) | Value::Bool(_) => Ok(vec![value_to_string(value)]),
            Value::Array(items) => Ok(items
                .iter()
                .map(|item| substitute(value_to_string(item)))
                .collect()),
            Value::Object(map) => Ok(map
                .iter()
                .map(|(name, inner)| {
                    let inner = value_to_string(inner);
                    if !inner.is_empty() {
                        format!("{}{}{}", name, self.separator, inner)
                    } else if let Some(default) = &self.default_value {
                        format!("{}{}{}", name, self.separator, default)
                    } else if self.trailing_separator == Some(false) {
                        name.clone()
                    } else {
                        format!("{}{}", name, self.separator)
                    }
                })
                .collect()),
            Value::Null => Err(ConstructedError::TypeError(format!(
                "key '{}' evaluated to null",
                self.key
            ))),
        }
    }

    /// Derive the sanitized group names for an evaluated key
    pub fn group_names(
        &self,
        value: &Value,
        leading_separator: bool,
    ) -> Result<Vec<String>, ConstructedError> {
        let separator = if self.prefix.is_empty() && !leading_separator {
            ""
        } else {
            self.separator.as_str()
        };

        Ok(self
            .bare_names(value)?
            .into_iter()
            .map(|bare| sanitize_group_name(&format!("{}{}{}", self.prefix, separator, bare)))
            .collect())
    }
}

/// Keyed group rules plus the options shared by all of them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedGroups {
    pub rules: Vec<KeyedGroup>,
    pub leading_separator: bool,
}

impl Default for KeyedGroups {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            leading_separator: default_leading_separator(),
        }
    }
}

impl KeyedGroups {
    pub fn new(rules: Vec<KeyedGroup>) -> Self {
        Self {
            rules,
            ..Self::default()
        }
    }

    pub fn with_leading_separator(mut self, leading: bool) -> Self {
        self.leading_separator = leading;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Replace every character that is not valid in a group name with `_`
pub fn sanitize_group_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

// ============================================================================
// Expression Evaluator
// ============================================================================

/// Evaluates Jinja2 expressions against host variables
pub struct ExpressionEvaluator {
    env: Environment<'static>,
}

impl std::fmt::Debug for ExpressionEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionEvaluator").finish_non_exhaustive()
    }
}

impl Default for ExpressionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionEvaluator {
    /// Create a new expression evaluator
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_filter("regex_replace", regex_replace);
        Self { env }
    }

    /// Shared evaluator instance
    pub fn shared() -> &'static ExpressionEvaluator {
        static SHARED: Lazy<ExpressionEvaluator> = Lazy::new(ExpressionEvaluator::new);
        &SHARED
    }

    fn evaluate_raw(
        &self,
        expr: &str,
        hostvars: &HostVars,
    ) -> Result<minijinja::Value, ConstructedError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(ConstructedError::ExpressionError(
                "empty expression".to_string(),
            ));
        }

        let compiled = self.env.compile_expression(expr)?;
        let value = compiled.eval(hostvars)?;
        if value.is_undefined() {
            return Err(ConstructedError::VariableNotFound(format!(
                "'{}' is undefined",
                expr
            )));
        }
        Ok(value)
    }

    /// Evaluate an expression to a value
    pub fn evaluate_value(&self, expr: &str, hostvars: &HostVars) -> Result<Value, ConstructedError> {
        let value = self.evaluate_raw(expr, hostvars)?;
        serde_json::to_value(&value).map_err(|e| ConstructedError::TypeError(e.to_string()))
    }

    /// Evaluate an expression to a boolean result
    pub fn evaluate_bool(&self, expr: &str, hostvars: &HostVars) -> Result<bool, ConstructedError> {
        Ok(self.evaluate_raw(expr, hostvars)?.is_true())
    }
}

fn regex_replace(
    value: String,
    pattern: String,
    replacement: String,
) -> Result<String, minijinja::Error> {
    let re = Regex::new(&pattern).map_err(|e| {
        minijinja::Error::new(
            ErrorKind::InvalidOperation,
            format!("invalid regex '{}': {}", pattern, e),
        )
    })?;
    Ok(re.replace_all(&value, replacement.as_str()).into_owned())
}

/// Truthiness of a JSON value in the Jinja2 sense
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Null, an empty string or an empty collection
fn is_empty_key(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ============================================================================
// Rule Application
// ============================================================================

fn strict_or_skip<T>(
    result: Result<T, ConstructedError>,
    strict: bool,
    host: &str,
    rule: &str,
) -> InventoryResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if strict => Err(InventoryError::StrictEvaluation {
            host: host.to_string(),
            rule: rule.to_string(),
            message: e.to_string(),
        }),
        Err(e) => {
            debug!(host = %host, rule = %rule, error = %e, "skipping rule");
            Ok(None)
        }
    }
}

/// Add `host` to every group whose conditional is truthy
pub fn add_host_to_composed_groups<T: InventoryTarget + ?Sized>(
    target: &mut T,
    rules: &IndexMap<String, String>,
    vars: &HostVars,
    host: &str,
    strict: bool,
) -> InventoryResult<()> {
    let evaluator = ExpressionEvaluator::shared();

    for (group, conditional) in rules {
        let group = sanitize_group_name(group);
        let rule = format!("group {}", group);
        let result = evaluator.evaluate_bool(conditional, vars);

        if let Some(true) = strict_or_skip(result, strict, host, &rule)? {
            target.add_group(&group)?;
            target.add_host_to_group(host, &group)?;
        }
    }
    Ok(())
}

/// Add `host` to the groups named by each keyed group rule
pub fn add_host_to_keyed_groups<T: InventoryTarget + ?Sized>(
    target: &mut T,
    keyed: &KeyedGroups,
    vars: &HostVars,
    host: &str,
    strict: bool,
) -> InventoryResult<()> {
    let evaluator = ExpressionEvaluator::shared();

    for rule in &keyed.rules {
        let label = format!("keyed group '{}'", rule.key);

        let names = rule.validate().and_then(|()| {
            let value = match evaluator.evaluate_value(&rule.key, vars) {
                Err(ConstructedError::VariableNotFound(_)) if rule.default_value.is_some() => {
                    Value::Null
                }
                result => result?,
            };
            if !rule.produces_groups(&value) {
                return Err(ConstructedError::ExpressionError(
                    "key resulted empty".to_string(),
                ));
            }
            rule.group_names(&value, keyed.leading_separator)
        });

        let Some(names) = strict_or_skip(names, strict, host, &label)? else {
            continue;
        };

        let parent = rule
            .parent_group
            .as_deref()
            .map(sanitize_group_name)
            .filter(|p| !p.is_empty());

        if let Some(parent) = &parent {
            target.add_group(parent)?;
        }
        for name in names {
            target.add_group(&name)?;
            target.add_host_to_group(host, &name)?;
            if let Some(parent) = &parent {
                target.add_child_group(parent, &name)?;
            }
        }
    }
    Ok(())
}

/// Set one host variable per compose entry
///
/// Every entry is evaluated against `vars`, the variables the host had
/// before composition started.
pub fn set_composite_vars<T: InventoryTarget + ?Sized>(
    target: &mut T,
    compose: &IndexMap<String, String>,
    vars: &HostVars,
    host: &str,
    strict: bool,
) -> InventoryResult<()> {
    let evaluator = ExpressionEvaluator::shared();

    for (name, expr) in compose {
        let rule = format!("compose {}", name);
        let result = evaluator.evaluate_value(expr, vars);

        if let Some(value) = strict_or_skip(result, strict, host, &rule)? {
            target.set_variable(host, name, value)?;
        }
    }
    Ok(())
}
