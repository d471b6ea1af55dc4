//! 类型转换
//!
//! 注解方法参数从请求参数（字符串）绑定时，按目标类型在 [`TypeConverterRegistry`]
//! 中查找转换器。找不到转换器并不是错误：调用方会改为按组件 Bean 或模型对象绑定。

use crate::config::Environment;
use crate::error::{types, ActionError, Exception};
use crate::value::Value;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 目标类型标识
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeKey(Cow<'static, str>);

impl TypeKey {
    pub const STRING: TypeKey = TypeKey::from_static("String");
    pub const CHAR: TypeKey = TypeKey::from_static("char");
    pub const BOOL: TypeKey = TypeKey::from_static("bool");
    pub const BYTE: TypeKey = TypeKey::from_static("i8");
    pub const SHORT: TypeKey = TypeKey::from_static("i16");
    pub const INT: TypeKey = TypeKey::from_static("i32");
    pub const LONG: TypeKey = TypeKey::from_static("i64");
    pub const FLOAT: TypeKey = TypeKey::from_static("f32");
    pub const DOUBLE: TypeKey = TypeKey::from_static("f64");
    pub const DATE: TypeKey = TypeKey::from_static("Date");
    pub const TIME: TypeKey = TypeKey::from_static("Time");
    pub const DATE_TIME: TypeKey = TypeKey::from_static("DateTime");

    pub const fn from_static(name: &'static str) -> Self {
        TypeKey(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        TypeKey(Cow::Owned(name.into()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// 基本类型在无值时的默认值；非基本类型返回 `None`
    pub fn primitive_default(&self) -> Option<Value> {
        let value = match self.name() {
            "bool" => Value::Bool(false),
            "char" => Value::Char('\0'),
            "i8" => Value::Byte(0),
            "i16" => Value::Short(0),
            "i32" => Value::Int(0),
            "i64" => Value::Long(0),
            "f32" => Value::Float(0.0),
            "f64" => Value::Double(0.0),
            _ => return None,
        };
        Some(value)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 日期时间的字符串格式
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StringifyContext {
    pub date_format: String,
    pub time_format: String,
    pub date_time_format: String,
}

impl Default for StringifyContext {
    fn default() -> Self {
        Self {
            date_format: "%Y-%m-%d".to_string(),
            time_format: "%H:%M:%S".to_string(),
            date_time_format: "%Y-%m-%dT%H:%M:%S".to_string(),
        }
    }
}

impl StringifyContext {
    /// 从 `aspectran.stringify.*` 读取，缺省项使用默认格式
    pub fn from_environment(env: &Environment) -> Self {
        let defaults = Self::default();
        Self {
            date_format: env.get_string_or("aspectran.stringify.date-format", &defaults.date_format),
            time_format: env.get_string_or("aspectran.stringify.time-format", &defaults.time_format),
            date_time_format: env
                .get_string_or("aspectran.stringify.date-time-format", &defaults.date_time_format),
        }
    }
}

/// 单次转换的上下文
#[derive(Debug, Clone, Copy)]
pub struct ConversionContext<'a> {
    /// 参数上声明的格式（例如日期格式），优先于 `stringify`
    pub format: Option<&'a str>,
    pub stringify: &'a StringifyContext,
}

/// 类型转换器
pub trait TypeConverter: Send + Sync {
    fn convert(&self, value: &str, context: &ConversionContext<'_>) -> Result<Value, ActionError>;
}

impl<F> TypeConverter for F
where
    F: Fn(&str, &ConversionContext<'_>) -> Result<Value, ActionError> + Send + Sync,
{
    fn convert(&self, value: &str, context: &ConversionContext<'_>) -> Result<Value, ActionError> {
        self(value, context)
    }
}

/// 类型转换器注册表
#[derive(Clone)]
pub struct TypeConverterRegistry {
    converters: HashMap<TypeKey, Arc<dyn TypeConverter>>,
}

impl fmt::Debug for TypeConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.converters.keys().map(TypeKey::name).collect();
        keys.sort_unstable();
        f.debug_struct("TypeConverterRegistry").field("types", &keys).finish()
    }
}

impl Default for TypeConverterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn parse_number<T>(value: &str, target: &TypeKey) -> Result<T, ActionError>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.trim().parse::<T>().map_err(|e| {
        Exception::number_format(format!("For input string: \"{}\" ({})", value, target))
            .with_source(e)
            .into()
    })
}

fn date_time_error(value: &str, format: &str, e: chrono::ParseError) -> ActionError {
    Exception::new(
        &types::DATE_TIME_PARSE,
        format!("Text '{}' could not be parsed with format '{}'", value, format),
    )
    .with_source(e)
    .into()
}

impl TypeConverterRegistry {
    /// 空注册表
    pub fn empty() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    /// 带有内置转换器的注册表
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register_fn(TypeKey::STRING, |v, _| {
            Ok(Value::String(v.to_string()))
        });
        registry.register_fn(TypeKey::CHAR, |v, _| {
            let mut chars = v.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Char(c)),
                _ => Err(ActionError::illegal_argument(format!(
                    "Cannot convert '{}' to char: expected exactly one character",
                    v
                ))),
            }
        });
        registry.register_fn(TypeKey::BOOL, |v, _| {
            Value::from(v).as_bool().map(Value::Bool).ok_or_else(|| {
                ActionError::illegal_argument(format!("Cannot convert '{}' to bool", v))
            })
        });
        registry.register_fn(TypeKey::BYTE, |v, _| {
            parse_number::<i8>(v, &TypeKey::BYTE).map(Value::Byte)
        });
        registry.register_fn(TypeKey::SHORT, |v, _| {
            parse_number::<i16>(v, &TypeKey::SHORT).map(Value::Short)
        });
        registry.register_fn(TypeKey::INT, |v, _| {
            parse_number::<i32>(v, &TypeKey::INT).map(Value::Int)
        });
        registry.register_fn(TypeKey::LONG, |v, _| {
            parse_number::<i64>(v, &TypeKey::LONG).map(Value::Long)
        });
        registry.register_fn(TypeKey::FLOAT, |v, _| {
            parse_number::<f32>(v, &TypeKey::FLOAT).map(Value::Float)
        });
        registry.register_fn(TypeKey::DOUBLE, |v, _| {
            parse_number::<f64>(v, &TypeKey::DOUBLE).map(Value::Double)
        });
        registry.register_fn(TypeKey::DATE, |v, ctx| {
            let format = ctx.format.unwrap_or(&ctx.stringify.date_format);
            NaiveDate::parse_from_str(v.trim(), format)
                .map(Value::Date)
                .map_err(|e| date_time_error(v, format, e))
        });
        registry.register_fn(TypeKey::TIME, |v, ctx| {
            let format = ctx.format.unwrap_or(&ctx.stringify.time_format);
            NaiveTime::parse_from_str(v.trim(), format)
                .map(Value::Time)
                .map_err(|e| date_time_error(v, format, e))
        });
        registry.register_fn(TypeKey::DATE_TIME, |v, ctx| {
            let format = ctx.format.unwrap_or(&ctx.stringify.date_time_format);
            NaiveDateTime::parse_from_str(v.trim(), format)
                .map(Value::DateTime)
                .map_err(|e| date_time_error(v, format, e))
        });
        registry
    }

    /// 注册（或替换）某个目标类型的转换器
    pub fn register<C>(&mut self, target: TypeKey, converter: C)
    where
        C: TypeConverter + 'static,
    {
        self.converters.insert(target, Arc::new(converter));
    }

    /// 以闭包注册转换器
    pub fn register_fn<F>(&mut self, target: TypeKey, converter: F)
    where
        F: Fn(&str, &ConversionContext<'_>) -> Result<Value, ActionError> + Send + Sync + 'static,
    {
        self.converters.insert(target, Arc::new(converter));
    }

    pub fn get(&self, target: &TypeKey) -> Option<Arc<dyn TypeConverter>> {
        self.converters.get(target).cloned()
    }

    pub fn contains(&self, target: &TypeKey) -> bool {
        self.converters.contains_key(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(target: &TypeKey, value: &str) -> Result<Value, ActionError> {
        let registry = TypeConverterRegistry::with_defaults();
        let stringify = StringifyContext::default();
        let context = ConversionContext {
            format: None,
            stringify: &stringify,
        };
        registry.get(target).unwrap().convert(value, &context)
    }

    #[test]
    fn test_numeric_conversion() {
        assert_eq!(convert(&TypeKey::INT, " 42 ").unwrap(), Value::Int(42));
        assert_eq!(convert(&TypeKey::DOUBLE, "1.5").unwrap(), Value::Double(1.5));
        let err = convert(&TypeKey::INT, "abc").unwrap_err();
        assert!(err.exception_type().is_subtype_of(&types::NUMBER_FORMAT));
    }

    #[test]
    fn test_date_conversion_with_format() {
        let registry = TypeConverterRegistry::with_defaults();
        let stringify = StringifyContext::default();
        let context = ConversionContext {
            format: Some("%d/%m/%Y"),
            stringify: &stringify,
        };
        let value = registry.get(&TypeKey::DATE).unwrap().convert("31/12/2024", &context).unwrap();
        assert_eq!(value, Value::Date(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()));

        let err = convert(&TypeKey::DATE, "31/12/2024").unwrap_err();
        assert_eq!(err.exception_type(), &types::DATE_TIME_PARSE);
    }

    #[test]
    fn test_custom_converter() {
        let mut registry = TypeConverterRegistry::empty();
        registry.register_fn(TypeKey::new("Upper"), |v, _| {
            Ok(Value::String(v.to_uppercase()))
        });
        assert!(registry.contains(&TypeKey::new("Upper")));
        assert!(!registry.contains(&TypeKey::INT));
    }

    #[test]
    fn test_primitive_defaults() {
        assert_eq!(TypeKey::INT.primitive_default(), Some(Value::Int(0)));
        assert_eq!(TypeKey::BOOL.primitive_default(), Some(Value::Bool(false)));
        assert_eq!(TypeKey::STRING.primitive_default(), None);
    }
}
