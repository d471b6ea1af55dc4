//! 执行上下文
//!
//! 动作只通过 [`Activity`] 与外部协作者交互：Bean 容器、项求值器、嵌套执行、
//! 类型转换、方法查找。一个 `Activity` 对应一次请求，只在一个线程上使用；
//! 动作本身（以及它们持有的规则）在所有请求之间共享。

use crate::advice::AspectAdviceResult;
use crate::config::Environment;
use crate::convert::{StringifyContext, TypeConverterRegistry};
use crate::error::ActionError;
use crate::process::ProcessResult;
use crate::reflect::{ClassRegistry, MethodResolver};
use crate::rule::item::{ItemRule, ItemRuleMap};
use crate::value::{BeanInstance, Value};
use indexmap::IndexMap;
use std::fmt;
use std::str::FromStr;

/// 请求方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodType {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Trace,
}

impl MethodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodType::Get => "GET",
            MethodType::Post => "POST",
            MethodType::Put => "PUT",
            MethodType::Patch => "PATCH",
            MethodType::Delete => "DELETE",
            MethodType::Head => "HEAD",
            MethodType::Options => "OPTIONS",
            MethodType::Trace => "TRACE",
        }
    }
}

impl FromStr for MethodType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(MethodType::Get),
            "POST" => Ok(MethodType::Post),
            "PUT" => Ok(MethodType::Put),
            "PATCH" => Ok(MethodType::Patch),
            "DELETE" => Ok(MethodType::Delete),
            "HEAD" => Ok(MethodType::Head),
            "OPTIONS" => Ok(MethodType::Options),
            "TRACE" => Ok(MethodType::Trace),
            _ => Err(format!("Invalid method type: {}", s)),
        }
    }
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 请求上下文
///
/// 方法签名的第一个参数可以声明为 [`ValueType::Translet`](crate::value::ValueType::Translet)，
/// 调用时传入当前的 `Translet`。所有写操作都通过 `&self` 完成。
pub trait Translet {
    /// 请求的 translet 名称
    fn request_name(&self) -> &str;

    fn request_method(&self) -> MethodType;

    /// 参数的第一个值
    fn get_parameter(&self, name: &str) -> Option<String>;

    /// 参数的所有值
    fn get_parameter_values(&self, name: &str) -> Option<Vec<String>>;

    fn parameter_names(&self) -> Vec<String>;

    fn all_parameters(&self) -> IndexMap<String, Vec<String>>;

    /// 结构化请求体（例如已解析的 JSON）；没有请求体时为 `None`
    fn body_as_parameters(&self) -> Option<IndexMap<String, Value>>;

    fn get_attribute(&self, name: &str) -> Option<Value>;

    fn set_attribute(&self, name: &str, value: Value);

    /// 添加响应头
    fn add_header(&self, name: &str, value: &str);

    fn header_values(&self, name: &str) -> Vec<String>;
}

/// 项求值器
///
/// 由 [`Activity::item_evaluator`] 创建，绑定到当前请求。
pub trait ItemEvaluator {
    /// 按声明顺序求值，得到 名称 -> 值
    fn evaluate(&self, rules: &ItemRuleMap) -> Result<IndexMap<String, Value>, ActionError>;

    fn evaluate_item(&self, rule: &ItemRule) -> Result<Value, ActionError>;

    /// 求值为多值的字符串映射（用于响应头、嵌套请求参数）
    fn evaluate_as_multi_value_map(
        &self,
        rules: &ItemRuleMap,
    ) -> Result<IndexMap<String, Vec<String>>, ActionError>;
}

/// 嵌套执行请求
#[derive(Debug, Clone, Default)]
pub struct NestedRequest {
    pub translet_name: String,
    pub method: Option<MethodType>,
    pub attributes: IndexMap<String, Value>,
    pub parameters: IndexMap<String, Vec<String>>,
}

/// 执行上下文
pub trait Activity {
    /// 当前请求上下文；非请求场景（例如调度任务）为 `None`
    fn translet(&self) -> Option<&dyn Translet>;

    /// 按 id 取 Bean
    fn get_bean(&self, id: &str) -> Result<BeanInstance, ActionError>;

    /// 按类名取 Bean
    ///
    /// 存在多个候选时，若给出 `qualifier` 则按名称区分，否则返回
    /// [`ActionError::NoUniqueBean`]。
    fn get_bean_by_class(
        &self,
        class_name: &str,
        qualifier: Option<&str>,
    ) -> Result<BeanInstance, ActionError>;

    /// 当前请求中按切面记录的通知 Bean 和通知结果
    fn aspect_advice_result(&self) -> &AspectAdviceResult;

    /// 按切面 id 取通知 Bean（仅在该切面的通知执行期间可见）
    fn get_aspect_advice_bean(&self, aspect_id: &str) -> Option<BeanInstance> {
        self.aspect_advice_result().aspect_advice_bean(aspect_id)
    }

    fn item_evaluator(&self) -> Box<dyn ItemEvaluator + '_>;

    /// 求值 `choose` 分支的布尔表达式
    fn evaluate_condition(&self, expression: &str) -> Result<bool, ActionError>;

    /// 同步执行一个嵌套的 translet；没有产生结果时返回 `None`
    fn run_nested(&self, request: NestedRequest) -> Result<Option<ProcessResult>, ActionError>;

    fn method_resolver(&self) -> &dyn MethodResolver;

    fn class_registry(&self) -> &ClassRegistry;

    fn converters(&self) -> &TypeConverterRegistry;

    fn stringify_context(&self) -> &StringifyContext;

    fn environment(&self) -> &Environment;
}
