//! 注解方法的参数绑定与调用
//!
//! 每个参数按 [`ParameterBindingRule`] 从当前请求解析：请求上下文本身、参数映射、
//! 按类型转换的单值或数组、按类型注入的组件 Bean，或者由请求参数绑定的模型对象。
//!
//! 失败处理：
//! - 转换失败记为类型不匹配；基本数值类型的格式错误退化为该类型的默认值
//! - 必需参数没有值或转换失败时报告缺少参数
//! - 可选参数失败时记录日志并使用 `null`
//! - 参数绑定阶段的失败都包装为 [`ActionError::ParameterBinding`]，指明出错的参数

use crate::activity::{Activity, Translet};
use crate::convert::{ConversionContext, TypeConverter, TypeKey};
use crate::error::{types, ActionError, Result};
use crate::reflect::{Argument, Arguments, MethodDescriptor};
use crate::rule::action::{ParameterBindingRule, ParameterType};
use crate::value::Value;
use indexmap::IndexMap;
use std::any::Any;
use std::sync::Arc;

/// 注解方法调用器
pub struct AnnotatedMethodInvoker;

impl AnnotatedMethodInvoker {
    /// 解析参数并调用方法；方法本身的失败不包装
    pub fn invoke(
        activity: &dyn Activity,
        target: &dyn Any,
        method: &MethodDescriptor,
        rules: Option<&[ParameterBindingRule]>,
    ) -> Result<Value> {
        let args = match rules {
            Some(rules) => Self::resolve_arguments(activity, rules)?,
            None => Arguments::default(),
        };
        method.invoke(target, args)
    }

    /// 按声明顺序解析所有参数
    pub fn resolve_arguments<'a>(
        activity: &'a dyn Activity,
        rules: &[ParameterBindingRule],
    ) -> Result<Arguments<'a>> {
        let mut args = Vec::with_capacity(rules.len());
        for rule in rules {
            let arg = Self::resolve_argument(activity, rule).map_err(|e| match e {
                e @ ActionError::ParameterBinding { .. } => e,
                e => ActionError::ParameterBinding {
                    rule: rule.to_string(),
                    cause: Box::new(e),
                },
            })?;
            args.push(arg);
        }
        Ok(Arguments::new(args))
    }

    fn resolve_argument<'a>(
        activity: &'a dyn Activity,
        rule: &ParameterBindingRule,
    ) -> Result<Argument<'a>> {
        let (mut value, mut error) = match Self::resolve_value(activity, rule) {
            Ok(value) => (value, None),
            Err(e @ ActionError::TypeMismatch { .. }) => (Argument::Value(Value::Null), Some(e)),
            Err(e) => return Err(e),
        };

        if let Some(e) = &error {
            if let Some(default) = primitive_default(rule) {
                if is_number_format(e) {
                    tracing::debug!(
                        parameter = rule.name(),
                        "Using the default value {} for {}; Cause: {}",
                        default,
                        rule,
                        e.root_cause()
                    );
                    value = Argument::Value(default);
                    error = None;
                }
            }
        }

        let missing = matches!(value, Argument::Value(Value::Null));
        if rule.is_required() && (missing || error.is_some()) {
            let mut message = format!("Missing required parameter '{}'", rule.name());
            return Err(match error {
                Some(e) => {
                    message.push_str(&format!("; Cause: {}", e.root_cause()));
                    ActionError::illegal_argument_caused_by(message, e)
                }
                None => ActionError::illegal_argument(message),
            });
        }

        if let Some(e) = error {
            tracing::debug!(
                parameter = rule.name(),
                "Failed to bind argument {}; Cause: {}",
                rule,
                e.root_cause()
            );
            value = Argument::Value(primitive_default(rule).unwrap_or(Value::Null));
        }
        Ok(value)
    }

    fn resolve_value<'a>(
        activity: &'a dyn Activity,
        rule: &ParameterBindingRule,
    ) -> Result<Argument<'a>> {
        let Some(translet) = activity.translet() else {
            return Self::resolve_without_translet(activity, rule);
        };
        let name = rule.name();

        let value = match rule.parameter_type() {
            ParameterType::Translet => return Ok(Argument::Translet(translet)),
            ParameterType::TransletArray => return Ok(Argument::Translets(vec![translet])),
            ParameterType::ParameterMap => Value::Map(
                translet
                    .all_parameters()
                    .into_iter()
                    .map(|(k, v)| (k, Value::List(v.into_iter().map(Value::String).collect())))
                    .collect(),
            ),
            ParameterType::Map => parameters_as_map(translet),
            ParameterType::Collection => Value::List(
                translet
                    .get_parameter_values(name)
                    .unwrap_or_default()
                    .into_iter()
                    .map(Value::String)
                    .collect(),
            ),
            ParameterType::Parameters => match translet.body_as_parameters() {
                Some(body) => Value::Map(body),
                None => parameters_as_map(translet),
            },
            ParameterType::Array { type_key, .. } => {
                match (activity.converters().get(type_key), translet.get_parameter_values(name)) {
                    (Some(converter), Some(values)) => {
                        let mut converted = Vec::with_capacity(values.len());
                        for text in &values {
                            converted.push(convert(activity, &*converter, type_key, rule.format(), text)?);
                        }
                        Value::List(converted)
                    }
                    _ => Value::Null,
                }
            }
            ParameterType::Value { type_key, primitive } => match activity.converters().get(type_key) {
                Some(converter) => match translet.get_parameter(name) {
                    Some(text) => convert(activity, &*converter, type_key, rule.format(), &text)?,
                    None if *primitive => type_key.primitive_default().unwrap_or(Value::Null),
                    None => Value::Null,
                },
                None if activity.class_registry().is_component(type_key.name()) => {
                    Value::Object(bean_by_type(activity, type_key.name(), name)?)
                }
                None => bind_model(activity, translet, type_key)?,
            },
        };
        Ok(Argument::Value(value))
    }

    /// 没有请求上下文时只能注入 Bean；需要请求参数的值没有来源
    fn resolve_without_translet<'a>(
        activity: &'a dyn Activity,
        rule: &ParameterBindingRule,
    ) -> Result<Argument<'a>> {
        match rule.parameter_type() {
            ParameterType::Translet => Ok(Argument::Value(Value::Null)),
            ParameterType::TransletArray => Ok(Argument::Translets(Vec::new())),
            ParameterType::Value { type_key, primitive } if activity.converters().contains(type_key) => {
                let value = if *primitive {
                    type_key.primitive_default().unwrap_or(Value::Null)
                } else {
                    Value::Null
                };
                Ok(Argument::Value(value))
            }
            ParameterType::Array { type_key, .. } if activity.converters().contains(type_key) => {
                Ok(Argument::Value(Value::Null))
            }
            other => {
                let bean = bean_by_type(activity, other.type_name(), rule.name())?;
                Ok(Argument::Value(Value::Object(bean)))
            }
        }
    }
}

fn primitive_default(rule: &ParameterBindingRule) -> Option<Value> {
    match rule.parameter_type() {
        ParameterType::Value {
            type_key,
            primitive: true,
        } => type_key.primitive_default(),
        _ => None,
    }
}

fn is_number_format(error: &ActionError) -> bool {
    error
        .root_cause()
        .exception_type()
        .is_subtype_of(&types::NUMBER_FORMAT)
}

/// 名称 -> 值；多值参数为列表
fn parameters_as_map(translet: &dyn Translet) -> Value {
    let mut map = IndexMap::new();
    for (name, mut values) in translet.all_parameters() {
        let value = if values.len() == 1 {
            Value::String(values.remove(0))
        } else {
            Value::List(values.into_iter().map(Value::String).collect())
        };
        map.insert(name, value);
    }
    Value::Map(map)
}

fn convert(
    activity: &dyn Activity,
    converter: &dyn TypeConverter,
    type_key: &TypeKey,
    format: Option<&str>,
    text: &str,
) -> Result<Value> {
    let context = ConversionContext {
        format,
        stringify: activity.stringify_context(),
    };
    converter
        .convert(text, &context)
        .map_err(|e| ActionError::TypeMismatch {
            source_type: "String".to_string(),
            target_type: type_key.name().to_string(),
            cause: Box::new(e),
        })
}

/// 按类型取 Bean；存在多个候选时以参数名区分
fn bean_by_type(
    activity: &dyn Activity,
    type_name: &str,
    qualifier: &str,
) -> Result<crate::value::BeanInstance> {
    match activity.get_bean_by_class(type_name, None) {
        Err(ActionError::NoUniqueBean { .. }) => activity.get_bean_by_class(type_name, Some(qualifier)),
        other => other,
    }
}

/// 由请求参数构建模型对象
///
/// 单个属性的转换失败只记录警告并跳过；缺少必需属性时整体失败。
fn bind_model(activity: &dyn Activity, translet: &dyn Translet, type_key: &TypeKey) -> Result<Value> {
    let model = activity.class_registry().model(type_key.name()).ok_or_else(|| {
        ActionError::IllegalState(format!("No model descriptor registered for type '{}'", type_key))
    })?;

    let mut values = IndexMap::new();
    let mut missing = Vec::new();
    for property in model.properties() {
        let param = property.parameter_name();
        let converter = activity.converters().get(&property.type_key);
        let result = if property.array {
            translet.get_parameter_values(param).map(|texts| {
                texts
                    .iter()
                    .map(|text| convert_property(activity, converter.as_ref(), property, text))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::List)
            })
        } else {
            translet
                .get_parameter(param)
                .map(|text| convert_property(activity, converter.as_ref(), property, &text))
        };

        match result {
            Some(Ok(value)) => {
                values.insert(property.name.clone(), value);
            }
            Some(Err(e)) => {
                tracing::warn!(
                    model = model.type_name(),
                    property = %property.name,
                    "Model binding error; Cause: {}",
                    e.root_cause()
                );
            }
            None if property.required => missing.push(property.name.clone()),
            None => {}
        }
    }

    if !missing.is_empty() {
        return Err(ActionError::illegal_argument(format!(
            "Missing required properties [{}] for {}",
            missing.join(", "),
            model.type_name()
        )));
    }
    model.instantiate(values)
}

fn convert_property(
    activity: &dyn Activity,
    converter: Option<&Arc<dyn TypeConverter>>,
    property: &crate::reflect::ModelProperty,
    text: &str,
) -> Result<Value> {
    let converter = converter.ok_or_else(|| {
        ActionError::IllegalState(format!("No type converter registered for type '{}'", property.type_key))
    })?;
    convert(activity, &**converter, &property.type_key, property.format.as_deref(), text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockActivity, Order};
    use crate::value::ValueType;

    fn resolve(activity: &MockActivity, rules: &[ParameterBindingRule]) -> Result<Vec<Value>> {
        let args = AnnotatedMethodInvoker::resolve_arguments(activity, rules)?;
        (0..args.len()).map(|i| args.value(i).cloned()).collect()
    }

    #[test]
    fn test_required_parameter_missing() {
        let activity = MockActivity::with_translet("orders");
        let rules = [ParameterBindingRule::new("id", ParameterType::boxed(TypeKey::LONG)).required()];
        let err = resolve(&activity, &rules).unwrap_err();
        match err {
            ActionError::ParameterBinding { rule, cause } => {
                assert!(rule.contains("name=id"));
                assert_eq!(cause.to_string(), "Missing required parameter 'id'");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_optional_parameter_missing_is_null() {
        let activity = MockActivity::with_translet("orders");
        let rules = [ParameterBindingRule::new("note", ParameterType::value(TypeKey::STRING))];
        assert_eq!(resolve(&activity, &rules).unwrap(), vec![Value::Null]);
    }

    #[test]
    fn test_primitive_number_format_degrades_to_default() {
        let activity = MockActivity::with_translet("orders").with_parameter("qty", "abc");
        let rules = [ParameterBindingRule::new("qty", ParameterType::value(TypeKey::INT)).required()];
        assert_eq!(resolve(&activity, &rules).unwrap(), vec![Value::Int(0)]);
    }

    #[test]
    fn test_boxed_conversion_failure() {
        let activity = MockActivity::with_translet("orders").with_parameter("qty", "abc");
        let optional = [ParameterBindingRule::new("qty", ParameterType::boxed(TypeKey::INT))];
        assert_eq!(resolve(&activity, &optional).unwrap(), vec![Value::Null]);

        let required = [ParameterBindingRule::new("qty", ParameterType::boxed(TypeKey::INT)).required()];
        let err = resolve(&activity, &required).unwrap_err();
        let cause = err.cause().unwrap();
        assert!(cause.to_string().starts_with("Missing required parameter 'qty'; Cause: "));
        assert!(matches!(cause.cause(), Some(ActionError::TypeMismatch { target_type, .. }) if target_type == "i32"));
    }

    #[test]
    fn test_value_conversion_with_format() {
        let activity = MockActivity::with_translet("orders")
            .with_parameter("day", "19/10/2026")
            .with_parameter("qty", "7");
        let rules = [
            ParameterBindingRule::new("day", ParameterType::value(TypeKey::DATE)).with_format("%d/%m/%Y"),
            ParameterBindingRule::new("qty", ParameterType::value(TypeKey::LONG)),
        ];
        let values = resolve(&activity, &rules).unwrap();
        assert_eq!(values[0].to_string(), "2026-10-19");
        assert_eq!(values[1], Value::Long(7));
    }

    #[test]
    fn test_collections_and_arrays() {
        let activity = MockActivity::with_translet("orders")
            .with_parameter("tag", "a")
            .with_parameter("tag", "b")
            .with_parameter("n", "1")
            .with_parameter("n", "2");
        let rules = [
            ParameterBindingRule::new("tag", ParameterType::Collection),
            ParameterBindingRule::new("n", ParameterType::array(TypeKey::INT)),
            ParameterBindingRule::new("none", ParameterType::array(TypeKey::INT)),
            ParameterBindingRule::new("params", ParameterType::Map),
        ];
        let values = resolve(&activity, &rules).unwrap();
        assert_eq!(values[0], Value::List(vec![Value::from("a"), Value::from("b")]));
        assert_eq!(values[1], Value::List(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(values[2], Value::Null);
        let map = values[3].as_map().unwrap();
        assert_eq!(map["tag"], Value::List(vec![Value::from("a"), Value::from("b")]));
    }

    #[test]
    fn test_translet_parameters() {
        let activity = MockActivity::with_translet("orders");
        let rules = [
            ParameterBindingRule::new("translet", ParameterType::Translet),
            ParameterBindingRule::new("translets", ParameterType::TransletArray),
        ];
        let args = AnnotatedMethodInvoker::resolve_arguments(&activity, &rules).unwrap();
        assert_eq!(args.translet(0).unwrap().request_name(), "orders");
        assert_eq!(args.translets(1).unwrap().len(), 1);

        let activity = MockActivity::new();
        let args = AnnotatedMethodInvoker::resolve_arguments(&activity, &rules).unwrap();
        assert!(args.optional_translet(0).unwrap().is_none());
        assert!(args.translets(1).unwrap().is_empty());
    }

    #[test]
    fn test_model_binding() {
        let activity = MockActivity::with_translet("orders")
            .with_parameter("item", "pen")
            .with_parameter("qty", "x3");
        let rules = [ParameterBindingRule::new("order", ParameterType::value(TypeKey::new("Order")))];
        let values = resolve(&activity, &rules).unwrap();
        let order = values[0].downcast_ref::<Order>().unwrap();
        assert_eq!(order.item, "pen");
        assert_eq!(order.qty, None);
    }

    #[test]
    fn test_model_missing_required_properties() {
        let activity = MockActivity::with_translet("orders").with_parameter("qty", "3");
        let rules = [ParameterBindingRule::new("order", ParameterType::value(TypeKey::new("Order")))];
        let err = resolve(&activity, &rules).unwrap_err();
        assert_eq!(
            err.cause().unwrap().to_string(),
            "Missing required properties [item] for Order"
        );
    }

    #[test]
    fn test_component_injected_by_type() {
        let activity = MockActivity::with_translet("orders");
        let rules = [ParameterBindingRule::new(
            "calculator",
            ParameterType::value(TypeKey::new("Calculator")),
        )];
        let values = resolve(&activity, &rules).unwrap();
        assert!(values[0].as_object().is_some());
    }

    #[test]
    fn test_invoke_method() {
        let activity = MockActivity::with_translet("orders")
            .with_parameter("a", "20")
            .with_parameter("b", "22");
        let registry = crate::testing::calculator_registry();
        let class = registry.get_by_name("Calculator").unwrap();
        let method = class.method("add", &[ValueType::Long, ValueType::Long]).unwrap();
        let rules = [
            ParameterBindingRule::new("a", ParameterType::value(TypeKey::LONG)),
            ParameterBindingRule::new("b", ParameterType::value(TypeKey::LONG)),
        ];
        let bean = activity.calculator_bean();
        let result = AnnotatedMethodInvoker::invoke(&activity, bean.as_ref(), &method, Some(&rules[..])).unwrap();
        assert_eq!(result, Value::Long(42));
    }
}
