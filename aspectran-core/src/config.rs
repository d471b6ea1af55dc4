//! 运行环境：配置源与 profile
//!
//! 配置项以点分隔的键访问（`aspectran.logging.level`）。多个配置源按优先级从高到低查找，
//! 优先级相同时先添加的配置源优先。`%{key}` 令牌、日志设置和字符串化格式都从这里读取。

use crate::error::ConfigError;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt;
use std::fs;
use std::path::Path;

/// 激活 profile 的配置键
pub const ACTIVE_PROFILES_KEY: &str = "aspectran.profiles.active";

/// 配置值
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<ConfigValue>),
    Object(IndexMap<String, ConfigValue>),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// 整数；字符串按十进制解析
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            ConfigValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// 布尔值；字符串接受 `true/false`、`yes/no`、`on/off`、`1/0`
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            ConfigValue::Int(i) => Some(*i != 0),
            ConfigValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(true),
                "false" | "no" | "off" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// 标量值的文本形式，用于 `%{...}` 属性令牌
    pub fn to_text(&self) -> Option<String> {
        match self {
            ConfigValue::String(s) => Some(s.clone()),
            ConfigValue::Int(i) => Some(i.to_string()),
            ConfigValue::Float(f) => Some(f.to_string()),
            ConfigValue::Bool(b) => Some(b.to_string()),
            ConfigValue::Array(_) | ConfigValue::Object(_) => None,
        }
    }

    /// 数组的文本元素；字符串按逗号拆分
    pub fn to_text_list(&self) -> Option<Vec<String>> {
        match self {
            ConfigValue::Array(items) => Some(items.iter().filter_map(ConfigValue::to_text).collect()),
            ConfigValue::String(s) => Some(split_list(s)),
            _ => None,
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::String(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::String(s)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        ConfigValue::Int(i)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl From<toml::Value> for ConfigValue {
    fn from(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => ConfigValue::String(s),
            toml::Value::Integer(i) => ConfigValue::Int(i),
            toml::Value::Float(f) => ConfigValue::Float(f),
            toml::Value::Boolean(b) => ConfigValue::Bool(b),
            toml::Value::Datetime(dt) => ConfigValue::String(dt.to_string()),
            toml::Value::Array(items) => ConfigValue::Array(items.into_iter().map(Into::into).collect()),
            toml::Value::Table(table) => {
                ConfigValue::Object(table.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// 配置源
pub trait PropertySource: Send + Sync {
    fn name(&self) -> &str;

    fn get(&self, key: &str) -> Option<ConfigValue>;

    fn keys(&self) -> Vec<String>;

    /// 数值越大越先被查找
    fn priority(&self) -> i32 {
        0
    }
}

/// 运行环境
///
/// 持有配置源和当前激活的 profile。`ItemRuleMap` 的 profile 候选项在求值时通过
/// [`Environment::matches_profiles`] 选择。
#[derive(Default)]
pub struct Environment {
    sources: RwLock<Vec<Box<dyn PropertySource>>>,
    active_profiles: RwLock<Vec<String>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加配置源，插在优先级不高于它的第一个配置源之前
    pub fn add_property_source(&self, source: Box<dyn PropertySource>) {
        let mut sources = self.sources.write();
        let position = sources
            .iter()
            .position(|s| s.priority() < source.priority())
            .unwrap_or(sources.len());
        tracing::debug!(
            "Adding property source '{}' (priority {}) at position {}",
            source.name(),
            source.priority(),
            position
        );
        sources.insert(position, source);
    }

    pub fn property_source_names(&self) -> Vec<String> {
        self.sources.read().iter().map(|s| s.name().to_string()).collect()
    }

    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        self.sources.read().iter().find_map(|source| {
            let value = source.get(key)?;
            tracing::trace!("Property '{}' resolved from '{}'", key, source.name());
            Some(value)
        })
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.to_text())
    }

    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|| default.to_string())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    /// 字符串列表：TOML 数组或逗号分隔的字符串
    pub fn get_string_array(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).and_then(|v| v.to_text_list())
    }

    pub fn set_active_profiles(&self, profiles: Vec<String>) {
        *self.active_profiles.write() = profiles;
    }

    pub fn get_active_profiles(&self) -> Vec<String> {
        self.active_profiles.read().clone()
    }

    /// 从 [`ACTIVE_PROFILES_KEY`] 读取激活的 profile；没有配置时保持不变
    pub fn activate_configured_profiles(&self) {
        if let Some(profiles) = self.get_string_array(ACTIVE_PROFILES_KEY) {
            tracing::info!("Activating profiles: {:?}", profiles);
            self.set_active_profiles(profiles);
        }
    }

    pub fn accepts_profile(&self, profile: &str) -> bool {
        self.active_profiles.read().iter().any(|p| p == profile)
    }

    /// 判断 profile 表达式是否与当前激活的 profile 匹配
    ///
    /// 表达式为逗号分隔的列表，任意一项匹配即为真；`!name` 表示该 profile 未激活。
    /// 空表达式总是匹配。
    pub fn matches_profiles(&self, expression: &str) -> bool {
        let terms = split_list(expression);
        terms.is_empty()
            || terms.iter().any(|term| match term.strip_prefix('!') {
                Some(negated) => !self.accepts_profile(negated.trim()),
                None => self.accepts_profile(term),
            })
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("sources", &self.property_source_names())
            .field("active_profiles", &*self.active_profiles.read())
            .finish()
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ==================== 配置源 ====================

/// 进程环境变量
///
/// 键 `aspectran.logging.show-timestamp` 在前缀 `ASPECTRAN_` 下对应
/// `ASPECTRAN_ASPECTRAN_LOGGING_SHOW_TIMESTAMP`：`.` 与 `-` 都映射为 `_`。
pub struct EnvironmentPropertySource {
    prefix: String,
    priority: i32,
}

impl EnvironmentPropertySource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            priority: 100,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    fn variable_name(&self, key: &str) -> String {
        let suffix: String = key
            .chars()
            .map(|c| match c {
                '.' | '-' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        format!("{}{}", self.prefix, suffix)
    }
}

impl PropertySource for EnvironmentPropertySource {
    fn name(&self) -> &str {
        "environment"
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        std::env::var(self.variable_name(key)).ok().map(ConfigValue::String)
    }

    /// 变量名无法还原 `-`，这里统一还原为 `.`
    fn keys(&self) -> Vec<String> {
        std::env::vars()
            .filter_map(|(name, _)| {
                name.strip_prefix(&self.prefix)
                    .map(|rest| rest.to_ascii_lowercase().replace('_', "."))
            })
            .collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// 内存配置源
pub struct MapPropertySource {
    name: String,
    properties: IndexMap<String, ConfigValue>,
    priority: i32,
}

impl MapPropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: IndexMap::new(),
            priority: 50,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl PropertySource for MapPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// TOML 配置源，表按点分隔的键展平
///
/// ```toml
/// [aspectran.logging]
/// level = "debug"     # -> aspectran.logging.level
/// ```
pub struct TomlPropertySource(MapPropertySource);

impl TomlPropertySource {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content, path.display().to_string())
    }

    pub fn parse(content: &str, name: impl Into<String>) -> Result<Self, ConfigError> {
        let table: toml::Table = toml::from_str(content)?;
        let mut properties = IndexMap::new();
        flatten(String::new(), toml::Value::Table(table), &mut properties);
        Ok(Self(MapPropertySource {
            name: name.into(),
            properties,
            priority: 0,
        }))
    }

    pub fn with_priority(self, priority: i32) -> Self {
        Self(self.0.with_priority(priority))
    }
}

fn flatten(prefix: String, value: toml::Value, out: &mut IndexMap<String, ConfigValue>) {
    match value {
        toml::Value::Table(table) => {
            for (key, value) in table {
                let key = if prefix.is_empty() {
                    key
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten(key, value, out);
            }
        }
        scalar_or_array => {
            out.insert(prefix, scalar_or_array.into());
        }
    }
}

impl PropertySource for TomlPropertySource {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.0.get(key)
    }

    fn keys(&self) -> Vec<String> {
        self.0.keys()
    }

    fn priority(&self) -> i32 {
        self.0.priority()
    }
}
