//! 调用 Bean 方法

use super::{resolve_bean, wrap_failure, ActionType, Executable, Outcome};
use crate::activity::{Activity, Translet};
use crate::error::Result;
use crate::reflect::{Argument, Arguments, MethodDescriptor};
use crate::rule::action::{InvokeActionRule, MethodInvoker, TransletRequirement};
use crate::util::ToStringBuilder;
use crate::value::{BeanInstance, Value, ValueType};
use std::fmt;

/// 调用 Bean 方法的动作
#[derive(Debug)]
pub struct InvokeAction {
    rule: InvokeActionRule,
}

impl InvokeAction {
    pub fn new(rule: InvokeActionRule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> &InvokeActionRule {
        &self.rule
    }
}

impl Executable for InvokeAction {
    fn execute(&self, activity: &dyn Activity) -> Result<Outcome> {
        execute_invoke(&self.rule, activity, None).map_err(|e| wrap_failure(self, e))
    }

    fn action_id(&self) -> Option<&str> {
        self.rule.action_id()
    }

    fn is_hidden(&self) -> bool {
        self.rule.is_hidden()
    }

    fn action_type(&self) -> ActionType {
        ActionType::Invoke
    }
}

impl fmt::Display for InvokeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tsb = ToStringBuilder::new();
        tsb.append("actionType", Some(ActionType::Invoke))
            .append("invokeActionRule", Some(&self.rule));
        write!(f, "{}", tsb)
    }
}

/// 以切面的通知 Bean 为目标的调用动作
#[derive(Debug)]
pub struct AdviceAction {
    rule: InvokeActionRule,
    aspect_id: String,
}

impl AdviceAction {
    pub fn new(rule: InvokeActionRule, aspect_id: impl Into<String>) -> Self {
        Self {
            rule,
            aspect_id: aspect_id.into(),
        }
    }

    pub fn rule(&self) -> &InvokeActionRule {
        &self.rule
    }

    pub fn aspect_id(&self) -> &str {
        &self.aspect_id
    }
}

impl Executable for AdviceAction {
    fn execute(&self, activity: &dyn Activity) -> Result<Outcome> {
        execute_invoke(&self.rule, activity, Some(&self.aspect_id)).map_err(|e| wrap_failure(self, e))
    }

    fn action_id(&self) -> Option<&str> {
        self.rule.action_id()
    }

    fn is_hidden(&self) -> bool {
        self.rule.is_hidden()
    }

    fn action_type(&self) -> ActionType {
        ActionType::Advice
    }
}

impl fmt::Display for AdviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tsb = ToStringBuilder::new();
        tsb.append("actionType", Some(ActionType::Advice))
            .append("aspectId", Some(&self.aspect_id))
            .append("invokeActionRule", Some(&self.rule));
        write!(f, "{}", tsb)
    }
}

fn execute_invoke(
    rule: &InvokeActionRule,
    activity: &dyn Activity,
    aspect_id: Option<&str>,
) -> Result<Outcome> {
    let bean = resolve_bean(activity, rule.bean_id(), rule.bean_class(), aspect_id, rule)?;
    let evaluator = activity.item_evaluator();

    if let Some(properties) = rule.property_item_rule_map() {
        let properties = properties.resolve(activity.environment());
        for (name, value) in evaluator.evaluate(&properties)? {
            let property = activity.method_resolver().find_property(&bean, &name)?;
            property.set(bean.as_ref(), value)?;
        }
    }

    let mut arg_types = Vec::new();
    let mut arg_values = Vec::new();
    if let Some(arguments) = rule.argument_item_rule_map() {
        let arguments = arguments.resolve(activity.environment());
        for (name, value) in evaluator.evaluate(&arguments)? {
            let arg_type = arguments
                .get(&name)
                .map_or_else(|| value.value_type(), |item| item.prototype_type(&value));
            arg_types.push(arg_type);
            arg_values.push(value);
        }
    }

    let (method, with_translet) = match rule.invoker() {
        MethodInvoker::Bound(method) => (method.clone(), method.requires_translet()),
        MethodInvoker::ByName(name) => find_method(rule, activity, &bean, name, &arg_types)?,
    };

    let translet = if with_translet { activity.translet() } else { None };
    let result = invoke(&method, &bean, with_translet, translet, arg_values)?;
    if method.is_void() {
        Ok(Outcome::Void)
    } else {
        Ok(Outcome::Value(result))
    }
}

/// 按名称查找方法，返回方法以及是否需要在实参前加上请求上下文
///
/// 先按"带上下文"的签名探测；找不到则退回不带上下文的签名，并把结论记在规则上。
/// 没有请求上下文时上下文参数的位置传入 `Null`。
fn find_method(
    rule: &InvokeActionRule,
    activity: &dyn Activity,
    bean: &BeanInstance,
    name: &str,
    arg_types: &[ValueType],
) -> Result<(std::sync::Arc<MethodDescriptor>, bool)> {
    let resolver = activity.method_resolver();
    let with_translet_types = || {
        let mut types = Vec::with_capacity(arg_types.len() + 1);
        types.push(ValueType::Translet);
        types.extend_from_slice(arg_types);
        types
    };

    match rule.requires_translet() {
        TransletRequirement::Required => Ok((resolver.find_method(bean, name, &with_translet_types())?, true)),
        TransletRequirement::NotRequired => Ok((resolver.find_method(bean, name, arg_types)?, false)),
        TransletRequirement::Unknown => {
            match resolver.find_method(bean, name, &with_translet_types()) {
                Ok(method) => {
                    rule.requires_translet_cache().set(true);
                    Ok((method, true))
                }
                Err(e) if e.is_method_not_found() => {
                    tracing::trace!("No method with a translet parameter; {}", e);
                    rule.requires_translet_cache().set(false);
                    Ok((resolver.find_method(bean, name, arg_types)?, false))
                }
                Err(e) => Err(e),
            }
        }
    }
}

fn invoke(
    method: &MethodDescriptor,
    bean: &BeanInstance,
    with_translet: bool,
    translet: Option<&dyn Translet>,
    values: Vec<Value>,
) -> Result<Value> {
    let mut args = Vec::with_capacity(values.len() + 1);
    if with_translet {
        args.push(match translet {
            Some(translet) => Argument::Translet(translet),
            None => Argument::Value(Value::Null),
        });
    }
    args.extend(values.into_iter().map(Argument::Value));
    tracing::trace!("Invoking {}", method);
    method.invoke(bean.as_ref(), Arguments::new(args))
}
