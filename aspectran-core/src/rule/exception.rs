//! 异常处理规则
//!
//! 一个切面可以声明若干 [`ExceptionThrownRule`]，每条规则列出它处理的异常类型名。
//! 发生错误时取错误的根因，沿异常类型的父链向上查找，选择距离最近的规则；
//! 都不匹配时使用没有声明类型的默认规则。

use crate::action::Action;
use crate::error::{types, ActionError, ExceptionType};
use crate::util::ToStringBuilder;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// 异常发生时的响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRule {
    content_type: Option<String>,
    template: Option<String>,
    status: Option<u16>,
}

impl ResponseRule {
    pub fn new() -> Self {
        Self {
            content_type: None,
            template: None,
            status: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }
}

impl Default for ResponseRule {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResponseRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tsb = ToStringBuilder::new();
        tsb.append("contentType", self.content_type.as_deref())
            .append("status", self.status);
        write!(f, "{}", tsb)
    }
}

/// 处理一组异常类型的规则
#[derive(Debug, Default)]
pub struct ExceptionThrownRule {
    exception_types: Option<Vec<String>>,
    action: Option<Action>,
    responses: IndexMap<String, ResponseRule>,
    default_response: Option<ResponseRule>,
}

impl ExceptionThrownRule {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个处理的异常类型名（例如 `IllegalArgumentException`）
    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.exception_types
            .get_or_insert_with(Vec::new)
            .push(type_name.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<Action>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub(crate) fn set_action(&mut self, action: Action) {
        self.action = Some(action);
    }

    /// 添加响应；按内容类型区分，没有内容类型的响应作为默认响应
    pub fn with_response(mut self, response: ResponseRule) -> Self {
        match response.content_type.clone() {
            Some(content_type) => {
                self.responses.insert(content_type, response);
            }
            None => self.default_response = Some(response),
        }
        self
    }

    pub fn exception_types(&self) -> Option<&[String]> {
        self.exception_types.as_deref()
    }

    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }

    /// 按内容类型取响应；找不到时取默认响应
    pub fn response(&self, content_type: Option<&str>) -> Option<&ResponseRule> {
        content_type
            .and_then(|ct| self.responses.get(ct))
            .or(self.default_response.as_ref())
    }
}

impl fmt::Display for ExceptionThrownRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tsb = ToStringBuilder::new();
        if let Some(types) = &self.exception_types {
            tsb.append_list("types", types);
        }
        tsb.append("action", self.action.as_ref());
        write!(f, "{}", tsb)
    }
}

/// 切面的异常处理规则集合
#[derive(Debug, Default)]
pub struct ExceptionRule {
    thrown_rules: IndexMap<String, Arc<ExceptionThrownRule>>,
    default_rule: Option<Arc<ExceptionThrownRule>>,
    description: Option<String>,
}

impl ExceptionRule {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册规则
    ///
    /// 同一异常类型名以先注册的规则为准；没有声明类型的规则成为默认规则。
    pub fn put_exception_thrown_rule(&mut self, rule: ExceptionThrownRule) {
        let rule = Arc::new(rule);
        match rule.exception_types() {
            Some(types) if !types.is_empty() => {
                for type_name in types {
                    self.thrown_rules
                        .entry(type_name.clone())
                        .or_insert_with(|| Arc::clone(&rule));
                }
            }
            _ => self.default_rule = Some(rule),
        }
    }

    pub fn with_thrown(mut self, rule: ExceptionThrownRule) -> Self {
        self.put_exception_thrown_rule(rule);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn default_rule(&self) -> Option<&Arc<ExceptionThrownRule>> {
        self.default_rule.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.thrown_rules.is_empty() && self.default_rule.is_none()
    }

    /// 所有规则，按注册顺序且不重复
    pub fn thrown_rules(&self) -> Vec<&Arc<ExceptionThrownRule>> {
        let mut rules: Vec<&Arc<ExceptionThrownRule>> = Vec::new();
        for rule in self.thrown_rules.values().chain(self.default_rule.iter()) {
            if !rules.iter().any(|r| Arc::ptr_eq(r, rule)) {
                rules.push(rule);
            }
        }
        rules
    }

    /// 为错误选择处理规则
    ///
    /// 以错误的根因为准；在各规则声明的类型中选择继承距离最近的一个，
    /// 距离相同时保留先注册的规则。
    pub fn get_exception_thrown_rule(&self, error: &ActionError) -> Option<Arc<ExceptionThrownRule>> {
        let cause = error.root_cause();
        let exception_type = cause.exception_type();

        let mut matched: Option<&Arc<ExceptionThrownRule>> = None;
        let mut deepest = usize::MAX;
        for (type_name, rule) in &self.thrown_rules {
            if let Some(depth) = matched_depth(type_name, exception_type) {
                if depth < deepest {
                    deepest = depth;
                    matched = Some(rule);
                }
            }
        }

        match matched {
            Some(rule) => {
                tracing::debug!(
                    "Exception {} matched thrown rule {} at depth {}",
                    exception_type,
                    rule,
                    deepest
                );
                Some(Arc::clone(rule))
            }
            None => self.default_rule.clone(),
        }
    }
}

/// 从 `exception_type` 沿父链到名为 `type_name` 的节点的距离；到达根类型仍未匹配时为 `None`
fn matched_depth(type_name: &str, exception_type: &'static ExceptionType) -> Option<usize> {
    let mut current = Some(exception_type);
    let mut depth = 0;
    while let Some(t) = current {
        if t.name() == type_name {
            return Some(depth);
        }
        if t == &types::THROWABLE {
            return None;
        }
        current = t.parent();
        depth += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Exception;

    fn rule_for(types: &[&str], status: u16) -> ExceptionThrownRule {
        let mut rule = ExceptionThrownRule::new();
        for t in types {
            rule = rule.with_type(*t);
        }
        rule.with_response(ResponseRule::new().with_status(status))
    }

    fn status_of(rule: &ExceptionThrownRule) -> Option<u16> {
        rule.response(None).and_then(ResponseRule::status)
    }

    #[test]
    fn test_deepest_match_wins() {
        let exception_rule = ExceptionRule::new()
            .with_thrown(rule_for(&["java.lang.RuntimeException"], 500))
            .with_thrown(rule_for(&["java.lang.IllegalArgumentException"], 400));

        let error = ActionError::illegal_argument("bad input");
        let rule = exception_rule.get_exception_thrown_rule(&error).unwrap();
        assert_eq!(status_of(&rule), Some(400));

        let error: ActionError = Exception::number_format("abc").into();
        let rule = exception_rule.get_exception_thrown_rule(&error).unwrap();
        assert_eq!(status_of(&rule), Some(400));

        let error = ActionError::IllegalState("closed".to_string());
        let rule = exception_rule.get_exception_thrown_rule(&error).unwrap();
        assert_eq!(status_of(&rule), Some(500));
    }

    #[test]
    fn test_qualified_type_names_match_builtin_types() {
        assert_eq!(types::ILLEGAL_ARGUMENT.name(), "java.lang.IllegalArgumentException");
        assert_eq!(types::RUNTIME_EXCEPTION.name(), "java.lang.RuntimeException");

        let exception_rule = ExceptionRule::new()
            .with_thrown(rule_for(&["java.lang.RuntimeException"], 500))
            .with_thrown(rule_for(&["java.lang.IllegalArgumentException"], 400));
        let error = ActionError::illegal_argument("bad");
        let rule = exception_rule.get_exception_thrown_rule(&error).unwrap();
        assert_eq!(status_of(&rule), Some(400));

        let short_names = ExceptionRule::new().with_thrown(rule_for(&["IllegalArgumentException"], 400));
        assert!(short_names.get_exception_thrown_rule(&error).is_none());
    }

    #[test]
    fn test_root_cause_is_matched() {
        let exception_rule = ExceptionRule::new()
            .with_thrown(rule_for(&["com.aspectran.core.activity.process.action.ActionExecutionException"], 502))
            .with_thrown(rule_for(&["java.lang.IllegalStateException"], 409));

        let error = ActionError::execution("{bean=tx}", ActionError::IllegalState("closed".into()));
        let rule = exception_rule.get_exception_thrown_rule(&error).unwrap();
        assert_eq!(status_of(&rule), Some(409));
    }

    #[test]
    fn test_default_rule() {
        let exception_rule = ExceptionRule::new()
            .with_thrown(rule_for(&["java.lang.IllegalStateException"], 409))
            .with_thrown(rule_for(&[], 500));

        let error = ActionError::BeanNotFound("orderService".into());
        let rule = exception_rule.get_exception_thrown_rule(&error).unwrap();
        assert_eq!(status_of(&rule), Some(500));

        let only_default = ExceptionRule::new().with_thrown(rule_for(&[], 503));
        let rule = only_default.get_exception_thrown_rule(&error).unwrap();
        assert_eq!(status_of(&rule), Some(503));
    }

    #[test]
    fn test_no_match_without_default() {
        let exception_rule = ExceptionRule::new().with_thrown(rule_for(&["java.lang.IllegalStateException"], 409));
        let error = ActionError::illegal_argument("bad");
        assert!(exception_rule.get_exception_thrown_rule(&error).is_none());
    }

    #[test]
    fn test_first_registration_wins_and_ties_keep_first() {
        let exception_rule = ExceptionRule::new()
            .with_thrown(rule_for(&["java.lang.IllegalArgumentException"], 400))
            .with_thrown(rule_for(&["java.lang.IllegalArgumentException", "java.lang.IllegalStateException"], 422));

        let error = ActionError::illegal_argument("bad");
        let rule = exception_rule.get_exception_thrown_rule(&error).unwrap();
        assert_eq!(status_of(&rule), Some(400));

        let error = ActionError::IllegalState("closed".into());
        let rule = exception_rule.get_exception_thrown_rule(&error).unwrap();
        assert_eq!(status_of(&rule), Some(422));
        assert_eq!(exception_rule.thrown_rules().len(), 2);
    }

    #[test]
    fn test_throwable_is_the_farthest_match() {
        let exception_rule = ExceptionRule::new()
            .with_thrown(rule_for(&["java.lang.Throwable"], 500))
            .with_thrown(rule_for(&["java.lang.Exception"], 501));
        let error = ActionError::illegal_argument("bad");
        let rule = exception_rule.get_exception_thrown_rule(&error).unwrap();
        assert_eq!(status_of(&rule), Some(501));

        let only_root = ExceptionRule::new().with_thrown(rule_for(&["java.lang.Throwable"], 500));
        let rule = only_root.get_exception_thrown_rule(&error).unwrap();
        assert_eq!(status_of(&rule), Some(500));
        assert!(only_root.get_exception_thrown_rule(&error).is_some());
    }

    #[test]
    fn test_response_by_content_type() {
        let rule = ExceptionThrownRule::new()
            .with_response(ResponseRule::new().with_content_type("application/json").with_status(400))
            .with_response(ResponseRule::new().with_status(500));
        assert_eq!(rule.response(Some("application/json")).and_then(ResponseRule::status), Some(400));
        assert_eq!(rule.response(Some("text/html")).and_then(ResponseRule::status), Some(500));
    }
}
