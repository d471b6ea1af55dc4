//! 动态值
//!
//! 动作参数、属性、方法返回值都以 [`Value`] 表示。方法参数的声明类型用 [`ValueType`]
//! 描述，按名称动态查找方法时根据实参的运行期类型与形参类型计算匹配权重。

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Bean 实例
///
/// 容器中的 Bean 以 `Arc<dyn Any>` 形式共享。取运行期类型时使用
/// `Any::type_id(&**bean)`，而不是 `bean.type_id()`（后者是 `Arc` 本身的类型）。
pub type BeanInstance = Arc<dyn Any + Send + Sync>;

/// 动态值
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Char(char),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    Object(BeanInstance),
}

impl Value {
    /// 包装任意对象
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        Value::Object(Arc::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// 运行期类型
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Any,
            Value::Bool(_) => ValueType::Bool,
            Value::Char(_) => ValueType::Char,
            Value::Byte(_) => ValueType::Byte,
            Value::Short(_) => ValueType::Short,
            Value::Int(_) => ValueType::Int,
            Value::Long(_) => ValueType::Long,
            Value::Float(_) => ValueType::Float,
            Value::Double(_) => ValueType::Double,
            Value::String(_) => ValueType::String,
            Value::Date(_) => ValueType::Date,
            Value::Time(_) => ValueType::Time,
            Value::DateTime(_) => ValueType::DateTime,
            Value::List(_) => ValueType::List,
            Value::Map(_) => ValueType::Map,
            Value::Object(_) => ValueType::Object,
        }
    }

    /// 用于诊断输出的类型名
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            other => other.value_type().name(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(v) => Some(i64::from(*v)),
            Value::Short(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        self.as_i64().and_then(|v| i32::try_from(v).ok())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            Value::String(s) => s.trim().parse().ok(),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BeanInstance> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// 将对象值向下转型为具体类型
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Object(obj) => (**obj).downcast_ref::<T>(),
            _ => None,
        }
    }

    /// 字符串形式；`Null` 返回 `None`
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Char(v) => write!(f, "{}", v),
            Value::Byte(v) => write!(f, "{}", v),
            Value::Short(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::String(v) => f.write_str(v),
            Value::Date(v) => write!(f, "{}", v),
            Value::Time(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v),
            Value::List(list) => {
                f.write_str("[")?;
                for (i, v) in list.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}={}", k, v)?;
                }
                f.write_str("}")
            }
            Value::Object(_) => f.write_str("[object]"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::List(list) => f.debug_list().entries(list).finish(),
            Value::Map(map) => f.debug_map().entries(map).finish(),
            Value::Object(_) => f.write_str("Object(..)"),
            other => write!(f, "{}({})", other.type_name(), other),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Short(a), Value::Short(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Char(v) => serializer.serialize_char(*v),
            Value::Byte(v) => serializer.serialize_i8(*v),
            Value::Short(v) => serializer.serialize_i16(*v),
            Value::Int(v) => serializer.serialize_i32(*v),
            Value::Long(v) => serializer.serialize_i64(*v),
            Value::Float(v) => serializer.serialize_f32(*v),
            Value::Double(v) => serializer.serialize_f64(*v),
            Value::String(v) => serializer.serialize_str(v),
            Value::Date(_) | Value::Time(_) | Value::DateTime(_) | Value::Object(_) => {
                serializer.collect_str(self)
            }
            Value::List(list) => {
                let mut seq = serializer.serialize_seq(Some(list.len()))?;
                for v in list {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            Value::Map(map) => {
                let mut m = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    m.serialize_entry(k, v)?;
                }
                m.end()
            }
        }
    }
}

macro_rules! impl_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    char => Char,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => String,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => DateTime,
    Vec<Value> => List,
    IndexMap<String, Value> => Map,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// 方法形参类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// 请求上下文（Translet）
    Translet,
    Bool,
    Char,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    String,
    Date,
    Time,
    DateTime,
    List,
    Map,
    Object,
    /// 接受任何值
    Any,
}

/// 数值拓宽顺序
const NUMERIC_WIDENING: [ValueType; 6] = [
    ValueType::Byte,
    ValueType::Short,
    ValueType::Int,
    ValueType::Long,
    ValueType::Float,
    ValueType::Double,
];

/// 匹配到 `Any` 形参的权重，高于任何拓宽转换
const ANY_WEIGHT: u32 = 16;

impl ValueType {
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Translet => "Translet",
            ValueType::Bool => "bool",
            ValueType::Char => "char",
            ValueType::Byte => "i8",
            ValueType::Short => "i16",
            ValueType::Int => "i32",
            ValueType::Long => "i64",
            ValueType::Float => "f32",
            ValueType::Double => "f64",
            ValueType::String => "String",
            ValueType::Date => "Date",
            ValueType::Time => "Time",
            ValueType::DateTime => "DateTime",
            ValueType::List => "List",
            ValueType::Map => "Map",
            ValueType::Object => "Object",
            ValueType::Any => "Any",
        }
    }

    /// 布尔、字符和数值类型不接受 `null`
    pub fn is_primitive(&self) -> bool {
        matches!(self, ValueType::Bool | ValueType::Char) || NUMERIC_WIDENING.contains(self)
    }

    /// 形参为 `self` 时接受运行期类型为 `arg` 的实参的代价
    ///
    /// 完全相同为 0，数值拓宽按拓宽步数计，`Any` 形参代价最高；不可赋值返回 `None`。
    /// 实参为 `null`（`ValueType::Any`）时可赋给请求上下文和基本类型以外的形参。
    pub fn assignable_weight(&self, arg: ValueType) -> Option<u32> {
        if *self == arg {
            return Some(0);
        }
        match (self, arg) {
            (ValueType::Translet, _) | (_, ValueType::Translet) => None,
            (ValueType::Any, _) => Some(ANY_WEIGHT),
            (param, ValueType::Any) if param.is_primitive() => None,
            (_, ValueType::Any) => Some(1),
            _ => {
                let from = NUMERIC_WIDENING.iter().position(|t| *t == arg)?;
                let to = NUMERIC_WIDENING.iter().position(|t| t == self)?;
                if from < to {
                    Some((to - from) as u32)
                } else {
                    None
                }
            }
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignable_weight() {
        assert_eq!(ValueType::Int.assignable_weight(ValueType::Int), Some(0));
        assert_eq!(ValueType::Long.assignable_weight(ValueType::Int), Some(1));
        assert_eq!(ValueType::Double.assignable_weight(ValueType::Byte), Some(5));
        assert_eq!(ValueType::Int.assignable_weight(ValueType::Long), None);
        assert_eq!(ValueType::String.assignable_weight(ValueType::Int), None);
        assert_eq!(ValueType::Any.assignable_weight(ValueType::String), Some(ANY_WEIGHT));
        assert_eq!(ValueType::String.assignable_weight(ValueType::Any), Some(1));
        assert_eq!(ValueType::Translet.assignable_weight(ValueType::Any), None);
        assert_eq!(ValueType::Long.assignable_weight(ValueType::Any), None);
        assert_eq!(ValueType::Bool.assignable_weight(ValueType::Any), None);
        assert_eq!(ValueType::Map.assignable_weight(ValueType::Any), Some(1));
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from("42").as_i32(), Some(42));
        assert_eq!(Value::from("yes").as_bool(), Some(true));
        assert_eq!(Value::Int(7).as_f64(), Some(7.0));
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert!(Value::from("x").as_i64().is_none());
    }

    #[test]
    fn test_object_downcast() {
        let value = Value::object(String::from("inner"));
        assert_eq!(value.downcast_ref::<String>().map(String::as_str), Some("inner"));
        assert!(value.downcast_ref::<i32>().is_none());
        assert_eq!(value.value_type(), ValueType::Object);
    }

    #[test]
    fn test_serialize_to_json() {
        let mut map = IndexMap::new();
        map.insert("name".to_string(), Value::from("a"));
        map.insert("tags".to_string(), Value::List(vec![Value::Int(1), Value::Null]));
        let json = serde_json::to_string(&Value::Map(map)).unwrap();
        assert_eq!(json, r#"{"name":"a","tags":[1,null]}"#);
    }
}
