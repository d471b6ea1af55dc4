//! Utility functions shared by rules and actions
//!
//! Rules render themselves as `{key=value, ...}` for log and error messages;
//! [`ToStringBuilder`] keeps that format consistent and skips unset fields.

use std::fmt::{self, Display};

/// Naming convention utilities for bean ids
pub mod naming {
    /// Converts a PascalCase type name to camelCase.
    ///
    /// Beans registered without an explicit id are named after their class,
    /// so `OrderService` becomes `orderService`.
    ///
    /// # Examples
    ///
    /// ```
    /// use aspectran_core::util::naming::to_camel_case;
    ///
    /// assert_eq!(to_camel_case("OrderService"), "orderService");
    /// assert_eq!(to_camel_case("A"), "a");
    /// assert_eq!(to_camel_case(""), "");
    /// ```
    pub fn to_camel_case(s: &str) -> String {
        let mut chars = s.chars();
        match chars.next() {
            None => String::new(),
            Some(first) => {
                let mut result = String::with_capacity(s.len());
                result.extend(first.to_lowercase());
                result.push_str(chars.as_str());
                result
            }
        }
    }

    /// Returns the last path segment of a qualified type name.
    ///
    /// ```
    /// use aspectran_core::util::naming::short_name;
    ///
    /// assert_eq!(short_name("app_demo::OrderService"), "OrderService");
    /// assert_eq!(short_name("OrderService"), "OrderService");
    /// ```
    pub fn short_name(s: &str) -> &str {
        s.rsplit("::").next().unwrap_or(s)
    }
}

/// Builds the `{key=value, ...}` description of a rule.
///
/// ```
/// use aspectran_core::util::ToStringBuilder;
///
/// let mut tsb = ToStringBuilder::new();
/// tsb.append("id", Some("a1"));
/// tsb.append("bean", None::<&str>);
/// tsb.append_if("hidden", true);
/// assert_eq!(tsb.to_string(), "{id=a1, hidden=true}");
/// ```
#[derive(Debug)]
pub struct ToStringBuilder {
    buf: String,
    empty: bool,
}

impl ToStringBuilder {
    pub fn new() -> Self {
        Self {
            buf: String::from("{"),
            empty: true,
        }
    }

    /// Starts with a type name, e.g. `invoke {bean=x}`.
    pub fn with_name(name: &str) -> Self {
        Self {
            buf: format!("{} {{", name),
            empty: true,
        }
    }

    fn separator(&mut self) {
        if !self.empty {
            self.buf.push_str(", ");
        }
        self.empty = false;
    }

    /// Appends `key=value` when `value` is present.
    pub fn append<V: Display>(&mut self, key: &str, value: Option<V>) -> &mut Self {
        if let Some(value) = value {
            self.separator();
            self.buf.push_str(key);
            self.buf.push('=');
            self.buf.push_str(&value.to_string());
        }
        self
    }

    /// Appends `key=true` only when the flag is set.
    pub fn append_if(&mut self, key: &str, flag: bool) -> &mut Self {
        if flag {
            self.append(key, Some(true));
        }
        self
    }

    /// Appends a list as `key=[a, b]` when it is not empty.
    pub fn append_list<V: Display>(&mut self, key: &str, values: &[V]) -> &mut Self {
        if !values.is_empty() {
            let joined = values
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            self.append(key, Some(format!("[{}]", joined)));
        }
        self
    }
}

impl Default for ToStringBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ToStringBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}}}", self.buf)
    }
}
