//! 调用注解方法

use super::{resolve_bean, wrap_failure, ActionType, AnnotatedMethodInvoker, Executable, Outcome};
use crate::activity::Activity;
use crate::error::Result;
use crate::rule::action::AnnotatedActionRule;
use crate::util::ToStringBuilder;
use std::any::Any;
use std::fmt;

/// 调用注解方法的动作
#[derive(Debug)]
pub struct AnnotatedAction {
    rule: AnnotatedActionRule,
}

impl AnnotatedAction {
    pub fn new(rule: AnnotatedActionRule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> &AnnotatedActionRule {
        &self.rule
    }
}

impl Executable for AnnotatedAction {
    fn execute(&self, activity: &dyn Activity) -> Result<Outcome> {
        execute_annotated(&self.rule, activity, None).map_err(|e| wrap_failure(self, e))
    }

    fn action_id(&self) -> Option<&str> {
        self.rule.action_id()
    }

    fn is_hidden(&self) -> bool {
        self.rule.is_hidden()
    }

    fn action_type(&self) -> ActionType {
        ActionType::AnnotatedInvoke
    }
}

impl fmt::Display for AnnotatedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tsb = ToStringBuilder::new();
        tsb.append("actionType", Some(ActionType::AnnotatedInvoke))
            .append("annotatedActionRule", Some(&self.rule));
        write!(f, "{}", tsb)
    }
}

/// 以切面的通知 Bean 为目标的注解方法动作
#[derive(Debug)]
pub struct AnnotatedAdviceAction {
    rule: AnnotatedActionRule,
    aspect_id: String,
}

impl AnnotatedAdviceAction {
    pub fn new(rule: AnnotatedActionRule, aspect_id: impl Into<String>) -> Self {
        Self {
            rule,
            aspect_id: aspect_id.into(),
        }
    }

    pub fn rule(&self) -> &AnnotatedActionRule {
        &self.rule
    }

    pub fn aspect_id(&self) -> &str {
        &self.aspect_id
    }
}

impl Executable for AnnotatedAdviceAction {
    fn execute(&self, activity: &dyn Activity) -> Result<Outcome> {
        execute_annotated(&self.rule, activity, Some(&self.aspect_id)).map_err(|e| wrap_failure(self, e))
    }

    fn action_id(&self) -> Option<&str> {
        self.rule.action_id()
    }

    fn is_hidden(&self) -> bool {
        self.rule.is_hidden()
    }

    fn action_type(&self) -> ActionType {
        ActionType::AnnotatedAdvice
    }
}

impl fmt::Display for AnnotatedAdviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tsb = ToStringBuilder::new();
        tsb.append("actionType", Some(ActionType::AnnotatedAdvice))
            .append("aspectId", Some(&self.aspect_id))
            .append("annotatedActionRule", Some(&self.rule));
        write!(f, "{}", tsb)
    }
}

fn execute_annotated(
    rule: &AnnotatedActionRule,
    activity: &dyn Activity,
    aspect_id: Option<&str>,
) -> Result<Outcome> {
    let method = rule.method();
    let result = if rule.is_static() {
        AnnotatedMethodInvoker::invoke(activity, &(), method, rule.parameter_binding_rules())?
    } else {
        let bean = resolve_bean(activity, rule.bean_id(), rule.bean_class(), aspect_id, rule)?;
        let target: &dyn Any = bean.as_ref();
        AnnotatedMethodInvoker::invoke(activity, target, method, rule.parameter_binding_rules())?
    };
    if method.is_void() {
        Ok(Outcome::Void)
    } else {
        Ok(Outcome::Value(result))
    }
}
