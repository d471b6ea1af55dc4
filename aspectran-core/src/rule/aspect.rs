//! 切面规则
//!
//! 切点匹配在引擎之外完成；这里的切面已经附着到具体的 translet 上，
//! 只描述在各阶段执行哪些通知动作、由哪个 Bean 提供通知方法。

use crate::action::{Action, AdviceAction, AnnotatedAdviceAction, EchoAction, HeaderAction};
use crate::error::RuleError;
use crate::rule::action::{AnnotatedActionRule, EchoActionRule, HeaderActionRule, InvokeActionRule};
use crate::rule::exception::{ExceptionRule, ExceptionThrownRule};
use crate::util::ToStringBuilder;
use std::fmt;
use std::sync::Arc;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdviceType {
    Before,
    After,
    /// 同时在 before 与 after 阶段执行
    Around,
    /// 无论成功与否都执行
    Finally,
    /// 处理异常时执行
    Thrown,
}

impl AdviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdviceType::Before => "before",
            AdviceType::After => "after",
            AdviceType::Around => "around",
            AdviceType::Finally => "finally",
            AdviceType::Thrown => "thrown",
        }
    }
}

impl fmt::Display for AdviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 可以作为通知执行的动作规则
#[derive(Debug)]
pub enum AdviceActionRule {
    Invoke(InvokeActionRule),
    Annotated(AnnotatedActionRule),
    Echo(EchoActionRule),
    Header(HeaderActionRule),
}

impl From<InvokeActionRule> for AdviceActionRule {
    fn from(rule: InvokeActionRule) -> Self {
        AdviceActionRule::Invoke(rule)
    }
}

impl From<AnnotatedActionRule> for AdviceActionRule {
    fn from(rule: AnnotatedActionRule) -> Self {
        AdviceActionRule::Annotated(rule)
    }
}

impl From<EchoActionRule> for AdviceActionRule {
    fn from(rule: EchoActionRule) -> Self {
        AdviceActionRule::Echo(rule)
    }
}

impl From<HeaderActionRule> for AdviceActionRule {
    fn from(rule: HeaderActionRule) -> Self {
        AdviceActionRule::Header(rule)
    }
}

/// 一条通知：所属切面、阶段与动作
#[derive(Debug)]
pub struct AspectAdviceRule {
    aspect_id: String,
    advice_bean_id: Option<String>,
    advice_bean_class: Option<String>,
    advice_type: AdviceType,
    action: Action,
}

impl AspectAdviceRule {
    pub fn aspect_id(&self) -> &str {
        &self.aspect_id
    }

    pub fn advice_bean_id(&self) -> Option<&str> {
        self.advice_bean_id.as_deref()
    }

    pub fn advice_bean_class(&self) -> Option<&str> {
        self.advice_bean_class.as_deref()
    }

    pub fn advice_type(&self) -> AdviceType {
        self.advice_type
    }

    pub fn action(&self) -> &Action {
        &self.action
    }
}

impl fmt::Display for AspectAdviceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tsb = ToStringBuilder::new();
        tsb.append("aspectId", Some(&self.aspect_id))
            .append("adviceType", Some(self.advice_type))
            .append("bean", self.advice_bean_id.as_deref())
            .append("class", self.advice_bean_class.as_deref())
            .append("action", Some(&self.action));
        write!(f, "{}", tsb)
    }
}

/// 切面
#[derive(Debug)]
pub struct AspectRule {
    id: String,
    order: i32,
    isolated: bool,
    disabled: bool,
    advice_bean_id: Option<String>,
    advice_bean_class: Option<String>,
    advice_rules: Vec<Arc<AspectAdviceRule>>,
    exception_rule: Option<ExceptionRule>,
    description: Option<String>,
}

impl AspectRule {
    pub fn builder(id: impl Into<String>) -> AspectRuleBuilder {
        AspectRuleBuilder {
            rule: AspectRule {
                id: id.into(),
                order: i32::MAX,
                isolated: false,
                disabled: false,
                advice_bean_id: None,
                advice_bean_class: None,
                advice_rules: Vec::new(),
                exception_rule: None,
                description: None,
            },
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// 数值越小越先执行 before 通知、越后执行 after 通知
    pub fn order(&self) -> i32 {
        self.order
    }

    /// 通知失败只记录日志，不影响请求
    pub fn is_isolated(&self) -> bool {
        self.isolated
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn advice_bean_id(&self) -> Option<&str> {
        self.advice_bean_id.as_deref()
    }

    pub fn advice_bean_class(&self) -> Option<&str> {
        self.advice_bean_class.as_deref()
    }

    pub fn advice_rules(&self) -> &[Arc<AspectAdviceRule>] {
        &self.advice_rules
    }

    pub fn exception_rule(&self) -> Option<&ExceptionRule> {
        self.exception_rule.as_ref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn has_advice_bean(&self) -> bool {
        self.advice_bean_id.is_some() || self.advice_bean_class.is_some()
    }

    /// 把动作规则包装为绑定到本切面的通知动作
    ///
    /// 调用 Bean 方法的动作必须能确定目标：动作自身指定了 Bean，或者切面声明了通知 Bean。
    fn bind_action(&self, rule: AdviceActionRule) -> Result<Action, RuleError> {
        match rule {
            AdviceActionRule::Invoke(rule) => {
                if !rule.has_bean_reference() && !self.has_advice_bean() {
                    return Err(RuleError::IllegalRule(format!(
                        "No bean specified for advice action {} in aspect '{}'",
                        rule, self.id
                    )));
                }
                Ok(Action::Advice(AdviceAction::new(rule, self.id.clone())))
            }
            AdviceActionRule::Annotated(rule) => {
                if !rule.is_static() && !rule.has_bean_reference() && !self.has_advice_bean() {
                    return Err(RuleError::IllegalRule(format!(
                        "No bean specified for advice action {} in aspect '{}'",
                        rule, self.id
                    )));
                }
                Ok(Action::AnnotatedAdvice(AnnotatedAdviceAction::new(rule, self.id.clone())))
            }
            AdviceActionRule::Echo(rule) => Ok(Action::Echo(EchoAction::new(rule))),
            AdviceActionRule::Header(rule) => Ok(Action::Header(HeaderAction::new(rule))),
        }
    }
}

impl fmt::Display for AspectRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tsb = ToStringBuilder::new();
        tsb.append("id", Some(&self.id))
            .append("order", Some(self.order))
            .append_if("isolated", self.isolated)
            .append_if("disabled", self.disabled)
            .append("adviceBean", self.advice_bean_id.as_deref())
            .append("adviceBeanClass", self.advice_bean_class.as_deref());
        write!(f, "{}", tsb)
    }
}

/// [`AspectRule`] 构建器
///
/// 通知 Bean 需要在添加通知之前设置。
#[derive(Debug)]
pub struct AspectRuleBuilder {
    rule: AspectRule,
}

impl AspectRuleBuilder {
    pub fn order(mut self, order: i32) -> Self {
        self.rule.order = order;
        self
    }

    pub fn isolated(mut self) -> Self {
        self.rule.isolated = true;
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.rule.disabled = disabled;
        self
    }

    pub fn advice_bean_id(mut self, bean_id: impl Into<String>) -> Self {
        self.rule.advice_bean_id = Some(bean_id.into());
        self
    }

    pub fn advice_bean_class(mut self, class_name: impl Into<String>) -> Self {
        self.rule.advice_bean_class = Some(class_name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.rule.description = Some(description.into());
        self
    }

    /// 添加通知
    pub fn advice(
        mut self,
        advice_type: AdviceType,
        action: impl Into<AdviceActionRule>,
    ) -> Result<Self, RuleError> {
        if advice_type == AdviceType::Thrown {
            return Err(RuleError::IllegalRule(format!(
                "Thrown advice of aspect '{}' must be declared as an exception thrown rule",
                self.rule.id
            )));
        }
        let action = self.rule.bind_action(action.into())?;
        self.rule.advice_rules.push(Arc::new(AspectAdviceRule {
            aspect_id: self.rule.id.clone(),
            advice_bean_id: self.rule.advice_bean_id.clone(),
            advice_bean_class: self.rule.advice_bean_class.clone(),
            advice_type,
            action,
        }));
        Ok(self)
    }

    pub fn before(self, action: impl Into<AdviceActionRule>) -> Result<Self, RuleError> {
        self.advice(AdviceType::Before, action)
    }

    pub fn after(self, action: impl Into<AdviceActionRule>) -> Result<Self, RuleError> {
        self.advice(AdviceType::After, action)
    }

    pub fn around(self, action: impl Into<AdviceActionRule>) -> Result<Self, RuleError> {
        self.advice(AdviceType::Around, action)
    }

    pub fn finally(self, action: impl Into<AdviceActionRule>) -> Result<Self, RuleError> {
        self.advice(AdviceType::Finally, action)
    }

    /// 添加异常处理规则，不带动作或动作已经设置好
    pub fn thrown(mut self, rule: ExceptionThrownRule) -> Self {
        self.rule
            .exception_rule
            .get_or_insert_with(ExceptionRule::new)
            .put_exception_thrown_rule(rule);
        self
    }

    /// 添加异常处理规则，动作绑定到本切面的通知 Bean
    pub fn thrown_with(
        mut self,
        mut rule: ExceptionThrownRule,
        action: impl Into<AdviceActionRule>,
    ) -> Result<Self, RuleError> {
        let action = self.rule.bind_action(action.into())?;
        rule.set_action(action);
        self.rule
            .exception_rule
            .get_or_insert_with(ExceptionRule::new)
            .put_exception_thrown_rule(rule);
        Ok(self)
    }

    pub fn build(self) -> Arc<AspectRule> {
        Arc::new(self.rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advice_without_bean_is_rejected() {
        let result = AspectRule::builder("logging").before(InvokeActionRule::method_name("log"));
        let err = result.unwrap_err();
        assert!(matches!(err, RuleError::IllegalRule(_)));
        assert!(err.to_string().contains("aspect 'logging'"));
    }

    #[test]
    fn test_advice_inherits_aspect_bean() {
        let aspect = AspectRule::builder("logging")
            .order(1)
            .advice_bean_id("logger")
            .before(InvokeActionRule::method_name("start"))
            .unwrap()
            .after(InvokeActionRule::method_name("stop"))
            .unwrap()
            .build();
        assert_eq!(aspect.advice_rules().len(), 2);
        let before = &aspect.advice_rules()[0];
        assert_eq!(before.aspect_id(), "logging");
        assert_eq!(before.advice_bean_id(), Some("logger"));
        assert_eq!(before.advice_type(), AdviceType::Before);
    }

    #[test]
    fn test_action_with_own_bean_needs_no_advice_bean() {
        let aspect = AspectRule::builder("audit")
            .after(InvokeActionRule::method_name("record").with_bean_id("auditLog"))
            .unwrap()
            .after(EchoActionRule::new())
            .unwrap()
            .build();
        assert_eq!(aspect.advice_rules().len(), 2);
        assert!(aspect.advice_bean_id().is_none());
    }

    #[test]
    fn test_thrown_is_not_a_plain_advice() {
        let result = AspectRule::builder("tx")
            .advice_bean_id("tx")
            .advice(AdviceType::Thrown, InvokeActionRule::method_name("rollback"));
        assert!(result.is_err());

        let aspect = AspectRule::builder("tx")
            .advice_bean_id("tx")
            .thrown_with(
                ExceptionThrownRule::new().with_type("java.lang.IllegalStateException"),
                InvokeActionRule::method_name("rollback"),
            )
            .unwrap()
            .build();
        let exception_rule = aspect.exception_rule().unwrap();
        assert_eq!(exception_rule.thrown_rules().len(), 1);
        assert!(exception_rule.thrown_rules()[0].action().is_some());
    }
}
