//! 动作规则
//!
//! 规则在构建后不再修改，由同一 translet 的所有请求共享。唯一的例外是
//! [`RequiresTransletCache`]：按名称调用方法时记住目标方法是否需要请求上下文参数。

use crate::activity::MethodType;
use crate::convert::TypeKey;
use crate::reflect::MethodDescriptor;
use crate::rule::item::{ItemRule, ItemRuleMap};
use crate::util::ToStringBuilder;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// 目标方法是否需要请求上下文作为第一个参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransletRequirement {
    Unknown,
    Required,
    NotRequired,
}

const UNKNOWN: u8 = 0;
const REQUIRED: u8 = 1;
const NOT_REQUIRED: u8 = 2;

/// 三态缓存
///
/// 并发的首次调用可能各自探测一次，最终写入相同的值。这里不加锁：
/// 通知或 include 可能在同一线程上重入同一条规则。
#[derive(Debug)]
pub struct RequiresTransletCache(AtomicU8);

impl RequiresTransletCache {
    pub fn new() -> Self {
        Self(AtomicU8::new(UNKNOWN))
    }

    pub fn get(&self) -> TransletRequirement {
        match self.0.load(Ordering::Relaxed) {
            REQUIRED => TransletRequirement::Required,
            NOT_REQUIRED => TransletRequirement::NotRequired,
            _ => TransletRequirement::Unknown,
        }
    }

    pub fn set(&self, required: bool) {
        let value = if required { REQUIRED } else { NOT_REQUIRED };
        self.0.store(value, Ordering::Relaxed);
    }
}

impl Default for RequiresTransletCache {
    fn default() -> Self {
        Self::new()
    }
}

/// 方法调用方式，在构建规则时确定
#[derive(Debug, Clone)]
pub enum MethodInvoker {
    /// 已解析的方法
    Bound(Arc<MethodDescriptor>),

    /// 执行时按名称在 Bean 的运行期类型上查找
    ByName(String),
}

impl MethodInvoker {
    pub fn method_name(&self) -> &str {
        match self {
            MethodInvoker::Bound(method) => method.name(),
            MethodInvoker::ByName(name) => name,
        }
    }
}

/// 调用 Bean 方法的动作规则
#[derive(Debug)]
pub struct InvokeActionRule {
    action_id: Option<String>,
    bean_id: Option<String>,
    bean_class: Option<String>,
    invoker: MethodInvoker,
    argument_item_rule_map: Option<ItemRuleMap>,
    property_item_rule_map: Option<ItemRuleMap>,
    hidden: Option<bool>,
    requires_translet: RequiresTransletCache,
}

impl InvokeActionRule {
    /// 按名称查找方法
    pub fn method_name(name: impl Into<String>) -> Self {
        Self::new(MethodInvoker::ByName(name.into()))
    }

    /// 绑定已解析的方法
    pub fn bound(method: Arc<MethodDescriptor>) -> Self {
        Self::new(MethodInvoker::Bound(method))
    }

    pub fn new(invoker: MethodInvoker) -> Self {
        Self {
            action_id: None,
            bean_id: None,
            bean_class: None,
            invoker,
            argument_item_rule_map: None,
            property_item_rule_map: None,
            hidden: None,
            requires_translet: RequiresTransletCache::new(),
        }
    }

    pub fn with_action_id(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = Some(action_id.into());
        self
    }

    pub fn with_bean_id(mut self, bean_id: impl Into<String>) -> Self {
        self.bean_id = Some(bean_id.into());
        self
    }

    pub fn with_bean_class(mut self, bean_class: impl Into<String>) -> Self {
        self.bean_class = Some(bean_class.into());
        self
    }

    /// 追加一个方法实参
    pub fn with_argument(mut self, item: ItemRule) -> Self {
        self.argument_item_rule_map
            .get_or_insert_with(ItemRuleMap::new)
            .put_item_rule(item);
        self
    }

    pub fn with_arguments(mut self, items: ItemRuleMap) -> Self {
        self.argument_item_rule_map = Some(items);
        self
    }

    /// 追加一个调用前设置的属性
    pub fn with_property(mut self, item: ItemRule) -> Self {
        self.property_item_rule_map
            .get_or_insert_with(ItemRuleMap::new)
            .put_item_rule(item);
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = Some(hidden);
        self
    }

    pub fn action_id(&self) -> Option<&str> {
        self.action_id.as_deref()
    }

    pub fn bean_id(&self) -> Option<&str> {
        self.bean_id.as_deref()
    }

    pub fn bean_class(&self) -> Option<&str> {
        self.bean_class.as_deref()
    }

    /// 是否显式指定了 Bean
    pub fn has_bean_reference(&self) -> bool {
        self.bean_id.is_some() || self.bean_class.is_some()
    }

    pub fn invoker(&self) -> &MethodInvoker {
        &self.invoker
    }

    pub fn argument_item_rule_map(&self) -> Option<&ItemRuleMap> {
        self.argument_item_rule_map.as_ref()
    }

    pub fn property_item_rule_map(&self) -> Option<&ItemRuleMap> {
        self.property_item_rule_map.as_ref()
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden.unwrap_or(false)
    }

    /// 已绑定方法直接读取签名；按名称调用时读取缓存
    pub fn requires_translet(&self) -> TransletRequirement {
        match &self.invoker {
            MethodInvoker::Bound(method) if method.requires_translet() => TransletRequirement::Required,
            MethodInvoker::Bound(_) => TransletRequirement::NotRequired,
            MethodInvoker::ByName(_) => self.requires_translet.get(),
        }
    }

    pub(crate) fn requires_translet_cache(&self) -> &RequiresTransletCache {
        &self.requires_translet
    }
}

impl fmt::Display for InvokeActionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tsb = ToStringBuilder::new();
        tsb.append("id", self.action_id.as_deref())
            .append("bean", self.bean_id.as_deref())
            .append("class", self.bean_class.as_deref())
            .append("method", Some(self.invoker.method_name()));
        if let Some(args) = &self.argument_item_rule_map {
            let names: Vec<_> = args.names().collect();
            tsb.append_list("arguments", &names);
        }
        if let Some(props) = &self.property_item_rule_map {
            let names: Vec<_> = props.names().collect();
            tsb.append_list("properties", &names);
        }
        tsb.append("hidden", self.hidden);
        write!(f, "{}", tsb)
    }
}

/// 注解方法参数的种类
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterType {
    /// 请求上下文本身
    Translet,
    /// 只含请求上下文的数组
    TransletArray,
    /// 参数名 -> 全部值
    ParameterMap,
    /// 参数名 -> 值（多值时为列表）
    Map,
    /// 同名参数的全部值
    Collection,
    /// 结构化请求体，缺省时取请求参数
    Parameters,
    /// 单个值，按类型转换
    Value { type_key: TypeKey, primitive: bool },
    /// 同名参数的全部值，逐个按元素类型转换
    Array { type_key: TypeKey, primitive: bool },
}

impl ParameterType {
    /// 按类型转换的单值参数；基本类型由 `TypeKey` 决定
    pub fn value(type_key: TypeKey) -> Self {
        let primitive = type_key.primitive_default().is_some();
        ParameterType::Value { type_key, primitive }
    }

    /// 可为空的包装类型（没有值时为 `null` 而不是默认值）
    pub fn boxed(type_key: TypeKey) -> Self {
        ParameterType::Value {
            type_key,
            primitive: false,
        }
    }

    pub fn array(type_key: TypeKey) -> Self {
        let primitive = type_key.primitive_default().is_some();
        ParameterType::Array { type_key, primitive }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            ParameterType::Value { primitive: true, .. } | ParameterType::Array { primitive: true, .. }
        )
    }

    /// 用于按类型查找 Bean 与诊断输出的类型名
    pub fn type_name(&self) -> &str {
        match self {
            ParameterType::Translet => "Translet",
            ParameterType::TransletArray => "Translet[]",
            ParameterType::ParameterMap => "ParameterMap",
            ParameterType::Map => "Map",
            ParameterType::Collection => "Collection",
            ParameterType::Parameters => "Parameters",
            ParameterType::Value { type_key, .. } | ParameterType::Array { type_key, .. } => type_key.name(),
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterType::Array { type_key, .. } => write!(f, "{}[]", type_key),
            other => f.write_str(other.type_name()),
        }
    }
}

/// 注解方法参数的绑定规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterBindingRule {
    name: String,
    parameter_type: ParameterType,
    format: Option<String>,
    required: bool,
}

impl ParameterBindingRule {
    pub fn new(name: impl Into<String>, parameter_type: ParameterType) -> Self {
        Self {
            name: name.into(),
            parameter_type,
            format: None,
            required: false,
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_type(&self) -> &ParameterType {
        &self.parameter_type
    }

    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }
}

impl fmt::Display for ParameterBindingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tsb = ToStringBuilder::new();
        tsb.append("name", Some(&self.name))
            .append("type", Some(&self.parameter_type))
            .append("format", self.format.as_deref())
            .append_if("required", self.required);
        write!(f, "{}", tsb)
    }
}

/// 调用注解方法的动作规则
#[derive(Debug)]
pub struct AnnotatedActionRule {
    action_id: Option<String>,
    bean_id: Option<String>,
    bean_class: Option<String>,
    method: Arc<MethodDescriptor>,
    static_method: bool,
    parameter_binding_rules: Option<Vec<ParameterBindingRule>>,
    hidden: Option<bool>,
}

impl AnnotatedActionRule {
    pub fn new(bean_class: impl Into<String>, method: Arc<MethodDescriptor>) -> Self {
        Self {
            action_id: None,
            bean_id: None,
            bean_class: Some(bean_class.into()),
            method,
            static_method: false,
            parameter_binding_rules: None,
            hidden: None,
        }
    }

    /// 静态方法，调用时不解析 Bean
    pub fn new_static(method: Arc<MethodDescriptor>) -> Self {
        Self {
            action_id: None,
            bean_id: None,
            bean_class: None,
            method,
            static_method: true,
            parameter_binding_rules: None,
            hidden: None,
        }
    }

    /// 由通知 Bean 提供目标对象
    pub fn for_advice(method: Arc<MethodDescriptor>) -> Self {
        Self {
            bean_class: None,
            ..Self::new(String::new(), method)
        }
    }

    pub fn with_action_id(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = Some(action_id.into());
        self
    }

    pub fn with_bean_id(mut self, bean_id: impl Into<String>) -> Self {
        self.bean_id = Some(bean_id.into());
        self
    }

    pub fn with_parameter(mut self, rule: ParameterBindingRule) -> Self {
        self.parameter_binding_rules
            .get_or_insert_with(Vec::new)
            .push(rule);
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = Some(hidden);
        self
    }

    pub fn action_id(&self) -> Option<&str> {
        self.action_id.as_deref()
    }

    pub fn bean_id(&self) -> Option<&str> {
        self.bean_id.as_deref()
    }

    pub fn bean_class(&self) -> Option<&str> {
        self.bean_class.as_deref()
    }

    pub fn has_bean_reference(&self) -> bool {
        self.bean_id.is_some() || self.bean_class.is_some()
    }

    pub fn method(&self) -> &Arc<MethodDescriptor> {
        &self.method
    }

    pub fn is_static(&self) -> bool {
        self.static_method
    }

    pub fn parameter_binding_rules(&self) -> Option<&[ParameterBindingRule]> {
        self.parameter_binding_rules.as_deref()
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden.unwrap_or(false)
    }
}

impl fmt::Display for AnnotatedActionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tsb = ToStringBuilder::new();
        tsb.append("id", self.action_id.as_deref())
            .append("bean", self.bean_id.as_deref())
            .append("class", self.bean_class.as_deref())
            .append("method", Some(&self.method))
            .append_if("static", self.static_method)
            .append("hidden", self.hidden);
        write!(f, "{}", tsb)
    }
}

/// 输出项值的动作规则
#[derive(Debug, Clone, Default)]
pub struct EchoActionRule {
    action_id: Option<String>,
    echo_item_rule_map: Option<ItemRuleMap>,
    hidden: Option<bool>,
}

impl EchoActionRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_action_id(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = Some(action_id.into());
        self
    }

    pub fn with_item(mut self, item: ItemRule) -> Self {
        self.echo_item_rule_map
            .get_or_insert_with(ItemRuleMap::new)
            .put_item_rule(item);
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = Some(hidden);
        self
    }

    pub fn action_id(&self) -> Option<&str> {
        self.action_id.as_deref()
    }

    pub fn echo_item_rule_map(&self) -> Option<&ItemRuleMap> {
        self.echo_item_rule_map.as_ref()
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden.unwrap_or(false)
    }
}

impl fmt::Display for EchoActionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tsb = ToStringBuilder::new();
        tsb.append("id", self.action_id.as_deref());
        if let Some(items) = &self.echo_item_rule_map {
            let names: Vec<_> = items.names().collect();
            tsb.append_list("echo", &names);
        }
        tsb.append("hidden", self.hidden);
        write!(f, "{}", tsb)
    }
}

/// 设置响应头的动作规则；默认不出现在处理结果中
#[derive(Debug, Clone, Default)]
pub struct HeaderActionRule {
    action_id: Option<String>,
    header_item_rule_map: Option<ItemRuleMap>,
    hidden: Option<bool>,
}

impl HeaderActionRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_action_id(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = Some(action_id.into());
        self
    }

    pub fn with_header(mut self, item: ItemRule) -> Self {
        self.header_item_rule_map
            .get_or_insert_with(ItemRuleMap::new)
            .put_item_rule(item);
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = Some(hidden);
        self
    }

    pub fn action_id(&self) -> Option<&str> {
        self.action_id.as_deref()
    }

    pub fn header_item_rule_map(&self) -> Option<&ItemRuleMap> {
        self.header_item_rule_map.as_ref()
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden.unwrap_or(true)
    }
}

impl fmt::Display for HeaderActionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tsb = ToStringBuilder::new();
        tsb.append("id", self.action_id.as_deref());
        if let Some(items) = &self.header_item_rule_map {
            let names: Vec<_> = items.names().collect();
            tsb.append_list("headers", &names);
        }
        tsb.append("hidden", self.hidden);
        write!(f, "{}", tsb)
    }
}

/// 执行嵌套 translet 的动作规则
#[derive(Debug, Clone)]
pub struct IncludeActionRule {
    action_id: Option<String>,
    translet_name: String,
    method_type: Option<MethodType>,
    attribute_item_rule_map: Option<ItemRuleMap>,
    parameter_item_rule_map: Option<ItemRuleMap>,
    hidden: Option<bool>,
}

impl IncludeActionRule {
    pub fn new(translet_name: impl Into<String>) -> Self {
        Self {
            action_id: None,
            translet_name: translet_name.into(),
            method_type: None,
            attribute_item_rule_map: None,
            parameter_item_rule_map: None,
            hidden: None,
        }
    }

    pub fn with_action_id(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = Some(action_id.into());
        self
    }

    pub fn with_method(mut self, method_type: MethodType) -> Self {
        self.method_type = Some(method_type);
        self
    }

    pub fn with_attribute(mut self, item: ItemRule) -> Self {
        self.attribute_item_rule_map
            .get_or_insert_with(ItemRuleMap::new)
            .put_item_rule(item);
        self
    }

    pub fn with_parameter(mut self, item: ItemRule) -> Self {
        self.parameter_item_rule_map
            .get_or_insert_with(ItemRuleMap::new)
            .put_item_rule(item);
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = Some(hidden);
        self
    }

    pub fn action_id(&self) -> Option<&str> {
        self.action_id.as_deref()
    }

    pub fn translet_name(&self) -> &str {
        &self.translet_name
    }

    pub fn method_type(&self) -> Option<MethodType> {
        self.method_type
    }

    pub fn attribute_item_rule_map(&self) -> Option<&ItemRuleMap> {
        self.attribute_item_rule_map.as_ref()
    }

    pub fn parameter_item_rule_map(&self) -> Option<&ItemRuleMap> {
        self.parameter_item_rule_map.as_ref()
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden.unwrap_or(false)
    }
}

impl fmt::Display for IncludeActionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tsb = ToStringBuilder::new();
        tsb.append("id", self.action_id.as_deref())
            .append("translet", Some(&self.translet_name))
            .append("method", self.method_type)
            .append("hidden", self.hidden);
        write!(f, "{}", tsb)
    }
}
